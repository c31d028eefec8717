//! Everything related to handles: typed indices referring to mesh elements.
//!
//! A handle is a lightweight value (just a wrapped integer) that refers to one
//! slot of one element pool of a [`HalfedgeMesh`][crate::HalfedgeMesh]. The
//! pool is implicit in the handle's type, so a `VertexHandle` can never be
//! confused with a `FaceHandle`. Handles do not borrow the mesh: all
//! navigation goes through methods on the mesh itself.
//!
//! Handles stay meaningful as long as the mesh does not compact its storage.
//! [`compress`][crate::HalfedgeMesh::compress] and
//! [`canonicalize`][crate::HalfedgeMesh::canonicalize] reassign slots, after
//! which old handles refer to different (or no) elements. For references that
//! survive compaction, see the [`dynamic`][crate::dynamic] module.

use std::fmt;

/// The integer type used for handle indices.
///
/// Handles index into contiguous element pools, so `u32` covers meshes with
/// up to ~4 billion elements per kind while keeping handles (and the mesh
/// records holding them) small.
#[allow(non_camel_case_types)]
pub type hsize = u32;

/// The index value reserved as "no element" sentinel for optional handle
/// fields.
pub(crate) const NONE_IDX: hsize = hsize::MAX;


/// Types that can be used to refer to some element of a mesh.
///
/// This is implemented by all handle types in this crate and you usually
/// don't need to worry about it. It is mostly useful to write code generic
/// over the element kind.
pub trait Handle: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    /// Creates a handle from the given index.
    fn new(idx: hsize) -> Self;

    /// Returns the index of the current handle.
    fn idx(&self) -> hsize;

    /// Helper method to create a handle from a `usize`.
    ///
    /// If `raw` cannot be represented by `hsize`, this function either panics
    /// or returns a nonsensical handle. In debug mode, this function is
    /// guaranteed to panic in this case.
    #[inline(always)]
    fn from_usize(raw: usize) -> Self {
        debug_assert!(raw <= hsize::MAX as usize);
        Self::new(raw as hsize)
    }

    /// Helper method to get the index as a `usize`.
    #[inline(always)]
    fn to_usize(&self) -> usize {
        self.idx() as usize
    }
}

macro_rules! make_handle_type {
    ($(#[$attr:meta])* $name:ident = $short:expr;) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(hsize);

        impl Handle for $name {
            #[inline(always)]
            fn new(idx: hsize) -> Self {
                $name(idx)
            }

            #[inline(always)]
            fn idx(&self) -> hsize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!($short, "{}"), self.0)
            }
        }

        // These impls allow handles to be stored in `Opt<…>` record fields
        // without any memory overhead: the all-ones index doubles as the
        // "none" value. Pools never hand out that index.
        impl optional::Noned for $name {
            #[inline(always)]
            fn is_none(&self) -> bool {
                self.0 == NONE_IDX
            }

            #[inline(always)]
            fn get_none() -> Self {
                $name(NONE_IDX)
            }
        }

        impl optional::OptEq for $name {
            #[inline(always)]
            fn opt_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    }
}

make_handle_type!(
    /// A handle referring to a vertex.
    VertexHandle = "V";
);
make_handle_type!(
    /// A handle referring to a full edge (an unordered pair of twin
    /// halfedges).
    EdgeHandle = "E";
);
make_handle_type!(
    /// A handle referring to a real (interior) face.
    FaceHandle = "F";
);
make_handle_type!(
    /// A handle referring to a halfedge, real or imaginary.
    HalfedgeHandle = "HE";
);
make_handle_type!(
    /// A handle referring to a boundary loop: the face-shaped element that
    /// closes one boundary component with imaginary halfedges.
    BoundaryLoopHandle = "BL";
);
make_handle_type!(
    /// A handle referring to a corner: the incidence of a vertex with a real
    /// face.
    ///
    /// A corner is just a different view onto a real halfedge, namely the
    /// halfedge emanating from the corner's vertex inside the corner's face.
    /// Corner handles therefore share the halfedge index space: per-corner
    /// attribute maps are sized like per-halfedge ones.
    CornerHandle = "C";
);

impl CornerHandle {
    /// Returns the halfedge this corner is a view of.
    #[inline(always)]
    pub fn halfedge(&self) -> HalfedgeHandle {
        HalfedgeHandle::new(self.0)
    }
}

impl HalfedgeHandle {
    /// Returns this halfedge viewed as a corner.
    ///
    /// This is pure index conversion; whether the halfedge is real (and thus
    /// actually has a corner) is checked by
    /// [`corner_of`][crate::HalfedgeMesh::corner_of].
    #[inline(always)]
    pub(crate) fn as_corner(&self) -> CornerHandle {
        CornerHandle::new(self.0)
    }
}
