//! Attribute maps: associating data with mesh elements, kept valid through
//! mutations.
//!
//! This crate stores all per-element properties (positions, normals, colors,
//! anything) separately from the connectivity. An [`AttrMap`] is a dense
//! array indexed by element slot, sized to the pool capacity of its element
//! kind, with a default value for slots that don't carry data yet.
//!
//! What makes an `AttrMap` more than a `Vec` is its subscription to the
//! mesh's [callback registry][crate::callback]:
//!
//! - when the pool grows, the map extends itself with the default value, so
//!   data for freshly allocated elements can be written immediately;
//! - when the mesh is compacted, the map applies the same permutation, so
//!   data keeps following its element;
//! - when the mesh is dropped, the map detaches and lives on as a plain
//!   array.
//!
//! The map *owns* its storage; the mesh only keeps the (weakly referenced)
//! callback closures. Dropping the map deregisters it.
//!
//! Lookups are O(1). The storage sits behind a `RefCell`, so holding a
//! borrow obtained from [`get`][AttrMap::get] across a mesh mutation panics
//! (mutating while reading is a bug anyway).

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use crate::{
    callback::{CallbackToken, MeshCallbacks, MeshElement},
    handle::{hsize, BoundaryLoopHandle, CornerHandle, EdgeHandle, FaceHandle, Handle,
        HalfedgeHandle, VertexHandle},
    HalfedgeMesh,
};


/// Per-vertex attribute map.
pub type VertexAttr<T> = AttrMap<VertexHandle, T>;
/// Per-edge attribute map.
pub type EdgeAttr<T> = AttrMap<EdgeHandle, T>;
/// Per-face attribute map (real faces only).
pub type FaceAttr<T> = AttrMap<FaceHandle, T>;
/// Per-halfedge attribute map.
pub type HalfedgeAttr<T> = AttrMap<HalfedgeHandle, T>;
/// Per-corner attribute map (backed by halfedge-shaped storage).
pub type CornerAttr<T> = AttrMap<CornerHandle, T>;
/// Per-boundary-loop attribute map.
pub type BoundaryLoopAttr<T> = AttrMap<BoundaryLoopHandle, T>;


struct AttrInner<T> {
    data: Vec<T>,
    default: T,
    detached: bool,
}

/// A typed array of `T`, one slot per element of kind `H`, automatically
/// resized and permuted along with the mesh it is attached to.
pub struct AttrMap<H: MeshElement, T: Clone> {
    inner: Rc<RefCell<AttrInner<T>>>,
    registry: Weak<RefCell<MeshCallbacks>>,
    expand_token: CallbackToken,
    permute_token: CallbackToken,
    delete_token: CallbackToken,
    _handle: PhantomData<H>,
}

impl<H: MeshElement, T: Clone + Default + 'static> AttrMap<H, T> {
    /// Attaches a new map to `mesh`, with `T::default()` in every slot.
    pub fn new(mesh: &HalfedgeMesh) -> Self {
        Self::with_default(mesh, T::default())
    }
}

impl<H: MeshElement, T: Clone> AttrMap<H, T> {
    /// Attaches a new map to `mesh`, with `default` in every slot (and in
    /// every slot of elements allocated later).
    pub fn with_default(mesh: &HalfedgeMesh, default: T) -> Self
    where
        T: 'static,
    {
        let capacity = mesh.element_capacity(H::KIND) as usize;
        let inner = Rc::new(RefCell::new(AttrInner {
            data: vec![default.clone(); capacity],
            default,
            detached: false,
        }));

        let mut callbacks = mesh.callbacks.borrow_mut();

        let weak = Rc::downgrade(&inner);
        let expand_token = callbacks.add_expand(H::KIND, Box::new(move |new_capacity| {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.borrow_mut();
                let default = inner.default.clone();
                inner.data.resize(new_capacity as usize, default);
            }
        }));

        let weak = Rc::downgrade(&inner);
        let permute_token = callbacks.add_permute(H::KIND, Box::new(move |permutation| {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.borrow_mut();
                let permuted = permutation
                    .iter()
                    .map(|&old| inner.data[old as usize].clone())
                    .collect();
                inner.data = permuted;
            }
        }));

        let weak = Rc::downgrade(&inner);
        let delete_token = callbacks.add_delete(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().detached = true;
            }
        }));

        drop(callbacks);

        Self {
            inner,
            registry: Rc::downgrade(&mesh.callbacks),
            expand_token,
            permute_token,
            delete_token,
            _handle: PhantomData,
        }
    }

    /// Returns a borrow of the value associated with `handle`.
    ///
    /// Panics if the handle's slot is outside the mesh capacity this map is
    /// sized for.
    pub fn get(&self, handle: H) -> Ref<'_, T> {
        Ref::map(self.inner.borrow(), |inner| {
            match inner.data.get(handle.to_usize()) {
                Some(value) => value,
                None => panic!("no property slot for handle {:?}", handle),
            }
        })
    }

    /// Returns a mutable borrow of the value associated with `handle`.
    pub fn get_mut(&self, handle: H) -> RefMut<'_, T> {
        RefMut::map(self.inner.borrow_mut(), |inner| {
            match inner.data.get_mut(handle.to_usize()) {
                Some(value) => value,
                None => panic!("no property slot for handle {:?}", handle),
            }
        })
    }

    /// Overwrites the value associated with `handle`.
    pub fn set(&self, handle: H, value: T) {
        *self.get_mut(handle) = value;
    }

    /// The number of slots, which always equals the capacity of the mesh
    /// pool this map mirrors (until the mesh is dropped).
    pub fn len(&self) -> hsize {
        self.inner.borrow().data.len() as hsize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the mesh this map was attached to has been dropped.
    /// A detached map keeps its data but won't be resized anymore.
    pub fn is_detached(&self) -> bool {
        self.inner.borrow().detached
    }
}

impl<H: MeshElement, T: Clone> Drop for AttrMap<H, T> {
    fn drop(&mut self) {
        // If the mesh is already gone, the registry (and our closures) died
        // with it.
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.borrow_mut();
            registry.remove_expand(H::KIND, self.expand_token);
            registry.remove_permute(H::KIND, self.permute_token);
            registry.remove_delete(self.delete_token);
        }
    }
}

impl<H: MeshElement, T: Clone + fmt::Debug> fmt::Debug for AttrMap<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(
                self.inner
                    .borrow()
                    .data
                    .iter()
                    .enumerate()
                    .map(|(i, value)| (H::from_usize(i), value.clone())),
            )
            .finish()
    }
}
