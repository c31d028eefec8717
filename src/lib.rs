//! `hem`: a halfedge-based manifold surface mesh connectivity library.
//!
//! This crate provides one mutable data structure,
//! [`HalfedgeMesh`], encoding the combinatorial structure (not the
//! geometry!) of a 2-manifold surface, possibly with boundary. On top of it:
//!
//! - **Typed handles** ([`VertexHandle`], [`EdgeHandle`], [`FaceHandle`],
//!   [`HalfedgeHandle`], [`BoundaryLoopHandle`], [`CornerHandle`]) with all
//!   local navigation in O(1) per step.
//! - **Local mutations**: [`flip`][HalfedgeMesh::flip],
//!   [`insert_vertex_along_edge`][HalfedgeMesh::insert_vertex_along_edge],
//!   [`split_edge`][HalfedgeMesh::split_edge],
//!   [`insert_vertex`][HalfedgeMesh::insert_vertex],
//!   [`connect_vertices`][HalfedgeMesh::connect_vertices],
//!   [`collapse_edge`][HalfedgeMesh::collapse_edge] and
//!   [`triangulate`][HalfedgeMesh::triangulate], all preserving
//!   manifoldness.
//! - **Attribute maps** ([`map`]): user-owned per-element data arrays that
//!   the mesh keeps sized and permuted through its mutations.
//! - **Deletion tombstones and compaction**
//!   ([`compress`][HalfedgeMesh::compress],
//!   [`canonicalize`][HalfedgeMesh::canonicalize]) with a callback registry
//!   ([`callback`]) and [dynamic handles][dynamic] that stay valid across
//!   it all.
//!
//! Geometry (vertex positions and everything derived from them), file I/O
//! and numerical algorithms are deliberately out of scope: positions are
//! just another attribute map that some other crate owns.
//!
//!
//! # Quick start
//!
//! ```
//! use hem::{HalfedgeMesh, map::VertexAttr};
//!
//! // Two triangles glued along one edge.
//! let mut mesh = HalfedgeMesh::from_polygons(4, &[vec![0, 1, 2], vec![0, 2, 3]])?;
//! assert_eq!(mesh.num_faces(), 2);
//! assert_eq!(mesh.num_boundary_loops(), 1);
//!
//! // Attach data; it follows the elements through mutations.
//! let labels = VertexAttr::with_default(&mesh, 0u32);
//! labels.set(mesh.vertex_at(3), 42);
//!
//! // Split the shared edge.
//! let e = mesh.edge_between_vertices(mesh.vertex_at(0), mesh.vertex_at(2)).unwrap();
//! mesh.split_edge(e)?;
//! assert_eq!(mesh.num_faces(), 4);
//! # Ok::<(), failure::Error>(())
//! ```
//!
//!
//! # Mutation and handle validity
//!
//! Plain handles are slot indices. They survive every mutation except
//! [`compress`][HalfedgeMesh::compress] and
//! [`canonicalize`][HalfedgeMesh::canonicalize], which reorder storage.
//! Iterators borrow the mesh, so the borrow checker already prevents
//! iterating and mutating at the same time. For references that must
//! survive compaction, use [dynamic handles][dynamic]; for per-element
//! data, use [attribute maps][map]; both are kept up to date
//! automatically.

pub mod callback;
pub mod core;
pub mod dynamic;
pub mod map;

mod handle;
mod sealed;

pub use crate::{
    core::{
        BuildError, DataTransfer, HalfedgeMesh, MutationError, ValidationError,
    },
    handle::{
        hsize, BoundaryLoopHandle, CornerHandle, EdgeHandle, FaceHandle, Handle, HalfedgeHandle,
        VertexHandle,
    },
};

/// Reexports of the most important types and traits for convenient glob
/// import.
pub mod prelude {
    pub use crate::{
        callback::MeshElement,
        handle::{
            hsize, BoundaryLoopHandle, CornerHandle, EdgeHandle, FaceHandle, Handle,
            HalfedgeHandle, VertexHandle,
        },
        map::{AttrMap, EdgeAttr, FaceAttr, HalfedgeAttr, VertexAttr},
        HalfedgeMesh,
    };
    pub use leer::Empty;
}
