//! The mesh data structure itself: storage, navigation and global queries.
//!
//! A [`HalfedgeMesh`] encodes the connectivity (but not the geometry) of a
//! 2-manifold surface, possibly with boundary. Per-element data (positions,
//! normals, anything) is *not* stored here; use [attribute
//! maps][crate::map] for that purpose. This separation keeps the core small
//! and lets every algorithm decide which data it actually needs.
//!
//!
//! # The halfedge structure
//!
//! Every edge is split into two directed *halfedges*, one per side. A
//! halfedge knows its `twin` (the other side of the same edge), its `next`
//! (the following halfedge around the same face), its tail `vertex`, its
//! `edge` and its `face`. Each vertex stores one outgoing halfedge, each edge
//! and face one of its halfedges. That's enough to answer every local
//! adjacency query in constant time per step.
//!
//! Boundaries are made uniform by *imaginary* halfedges: the outside of each
//! boundary component is closed off by a cycle of halfedges belonging to a
//! *boundary loop*, a face-shaped element in its own storage pool. This way
//! `twin` is total and walking around a boundary vertex needs no special
//! cases. Boundary loops never show up when iterating over faces.
//!
//!
//! # Storage, tombstones and compaction
//!
//! Elements live in dense pools and are addressed by [handles][crate::handle].
//! Deleting an element leaves a *tombstone*; the surrounding slots do not
//! move. Tombstones are invisible to iteration and counts, but they occupy
//! memory until [`compress`][HalfedgeMesh::compress] removes them. Compaction
//! reassigns slots; [attribute maps][crate::map] and [dynamic
//! handles][crate::dynamic] are kept consistent through the [callback
//! registry][crate::callback], plain handles are not.
//!
//! References introduced in: Mäntylä, Martti. An introduction to solid
//! modeling. Computer science press, 1988.

use std::{
    cell::RefCell,
    fmt,
    ops,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use leer::Empty;
use optional::Optioned as Opt;

use crate::{
    callback::{CallbackToken, ElementKind, MeshCallbacks, MeshElement},
    handle::{
        hsize, BoundaryLoopHandle, CornerHandle, EdgeHandle, FaceHandle, Handle, HalfedgeHandle,
        VertexHandle,
    },
};
use self::pool::{ElementPool, Record};

pub(crate) mod pool;

mod adj;
mod build;
mod compact;
mod mutate;
mod validate;

#[cfg(test)]
mod tests;

pub use self::{
    adj::{
        FaceCorners, FaceEdges, FaceFaces, FaceHalfedges, FaceVertices, LoopHalfedges,
        LoopVertices, VertexCorners, VertexEdges, VertexFaces, VertexIncomingHalfedges,
        VertexOutgoingHalfedges, VertexVertices,
    },
    build::BuildError,
    mutate::MutationError,
    validate::ValidationError,
};


/// Source of unique per-mesh identifiers, used by dynamic handles to tell
/// meshes apart.
static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(0);


// ===============================================================================================
// ===== Definition of the records stored inside the pools
// ===============================================================================================

/// The face side of a halfedge: either a real (interior) face or a boundary
/// loop. A halfedge is *real* exactly if it sits in a real face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaceSlot {
    Real(FaceHandle),
    Boundary(BoundaryLoopHandle),
}

impl FaceSlot {
    pub(crate) fn is_real(&self) -> bool {
        matches!(self, FaceSlot::Real(_))
    }

    pub(crate) fn real(&self) -> Option<FaceHandle> {
        match *self {
            FaceSlot::Real(f) => Some(f),
            FaceSlot::Boundary(_) => None,
        }
    }

    pub(crate) fn boundary(&self) -> Option<BoundaryLoopHandle> {
        match *self {
            FaceSlot::Real(_) => None,
            FaceSlot::Boundary(b) => Some(b),
        }
    }
}

/// Data stored per halfedge.
///
/// A cleared `twin` marks the record as a tombstone; all other fields of a
/// live halfedge are always valid.
#[derive(Debug, Clone, Copy)]
pub struct Halfedge {
    pub(crate) twin: Opt<HalfedgeHandle>,
    /// The next halfedge around the same face (counter clock wise).
    pub(crate) next: HalfedgeHandle,
    /// The tail vertex: the vertex this halfedge points away from.
    pub(crate) vertex: VertexHandle,
    pub(crate) edge: EdgeHandle,
    pub(crate) face: FaceSlot,
    pub(crate) id: u64,
}

impl Halfedge {
    pub(crate) fn is_real(&self) -> bool {
        self.face.is_real()
    }
}

impl Record for Halfedge {
    fn is_dead(&self) -> bool {
        self.twin.is_none()
    }
    fn mark_dead(&mut self) {
        self.twin = Opt::none();
    }
}

/// Data stored per vertex. A cleared `halfedge` marks the tombstone.
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    /// One outgoing halfedge. Always a *real* halfedge: on a manifold
    /// surface every vertex has at least one incident real face.
    pub(crate) halfedge: Opt<HalfedgeHandle>,
    pub(crate) is_boundary: bool,
    pub(crate) id: u64,
}

impl Record for Vertex {
    fn is_dead(&self) -> bool {
        self.halfedge.is_none()
    }
    fn mark_dead(&mut self) {
        self.halfedge = Opt::none();
    }
}

/// Data stored per edge. A cleared `halfedge` marks the tombstone.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// One of the two halfedges. Convention: the real one if exactly one of
    /// the two is real.
    pub(crate) halfedge: Opt<HalfedgeHandle>,
    pub(crate) id: u64,
}

impl Record for Edge {
    fn is_dead(&self) -> bool {
        self.halfedge.is_none()
    }
    fn mark_dead(&mut self) {
        self.halfedge = Opt::none();
    }
}

/// Data stored per face. Boundary loops share this record shape (they live
/// in their own pool). A cleared `halfedge` marks the tombstone.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    /// Handle of one (arbitrary) halfedge of the face cycle.
    pub(crate) halfedge: Opt<HalfedgeHandle>,
    pub(crate) id: u64,
}

impl Record for Face {
    fn is_dead(&self) -> bool {
        self.halfedge.is_none()
    }
    fn mark_dead(&mut self) {
        self.halfedge = Opt::none();
    }
}


// ===============================================================================================
// ===== The mesh
// ===============================================================================================

/// A halfedge-based manifold surface mesh: connectivity only, mutable, with
/// stable element identities.
///
/// Build one with [`from_polygons`][HalfedgeMesh::from_polygons], then query
/// (`twin`/`next`/neighborhood iterators/…), mutate
/// ([`flip`][HalfedgeMesh::flip], [`split_edge`][HalfedgeMesh::split_edge],
/// [`collapse_edge`][HalfedgeMesh::collapse_edge], …) and compact
/// ([`compress`][HalfedgeMesh::compress]) it. Per-element user data lives in
/// [attribute maps][crate::map] which the mesh keeps valid through
/// [callbacks][crate::callback].
pub struct HalfedgeMesh {
    pub(crate) halfedges: ElementPool<HalfedgeHandle, Halfedge>,
    pub(crate) vertices: ElementPool<VertexHandle, Vertex>,
    pub(crate) edges: ElementPool<EdgeHandle, Edge>,
    pub(crate) faces: ElementPool<FaceHandle, Face>,
    pub(crate) boundary_loops: ElementPool<BoundaryLoopHandle, Face>,

    /// Live real/imaginary halfedge counts (the pool only knows the sum).
    pub(crate) num_real: hsize,
    pub(crate) num_imaginary: hsize,

    /// Source of unique element ids. Ids are never reused, not even after
    /// compaction, which makes them the one identity that survives
    /// everything short of mesh destruction.
    pub(crate) next_id: u64,

    mesh_id: u64,

    /// True while the pools contain no tombstones.
    pub(crate) compressed: bool,
    /// True while the element order matches the deterministic order the
    /// builder produces.
    pub(crate) canonical: bool,

    pub(crate) callbacks: Rc<RefCell<MeshCallbacks>>,
}

impl Empty for HalfedgeMesh {
    fn empty() -> Self {
        Self {
            halfedges: ElementPool::new(),
            vertices: ElementPool::new(),
            edges: ElementPool::new(),
            faces: ElementPool::new(),
            boundary_loops: ElementPool::new(),
            num_real: 0,
            num_imaginary: 0,
            next_id: 0,
            mesh_id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            compressed: true,
            canonical: true,
            callbacks: Rc::new(RefCell::new(MeshCallbacks::default())),
        }
    }
}

impl Clone for HalfedgeMesh {
    /// Returns a deep copy of the connectivity. The copy starts with a fresh,
    /// empty callback registry and a new mesh identity: attribute maps and
    /// dynamic handles of the original do not carry over. See
    /// [`copy_with_transfer`][HalfedgeMesh::copy_with_transfer] for
    /// re-attaching external data.
    fn clone(&self) -> Self {
        Self {
            halfedges: self.halfedges.clone(),
            vertices: self.vertices.clone(),
            edges: self.edges.clone(),
            faces: self.faces.clone(),
            boundary_loops: self.boundary_loops.clone(),
            num_real: self.num_real,
            num_imaginary: self.num_imaginary,
            next_id: self.next_id,
            mesh_id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            compressed: self.compressed,
            canonical: self.canonical,
            callbacks: Rc::new(RefCell::new(MeshCallbacks::default())),
        }
    }
}

impl Drop for HalfedgeMesh {
    fn drop(&mut self) {
        // Subscribers get one last notification so they can detach instead of
        // dereferencing a dead mesh later.
        self.callbacks.borrow_mut().fire_delete();
    }
}

impl fmt::Debug for HalfedgeMesh {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HalfedgeMesh")
            .field("num_vertices", &self.num_vertices())
            .field("num_edges", &self.num_edges())
            .field("num_faces", &self.num_faces())
            .field("num_boundary_loops", &self.num_boundary_loops())
            .field("num_halfedges", &self.num_all_halfedges())
            .field("is_compressed", &self.is_compressed())
            .field("is_canonical", &self.is_canonical())
            .finish()
    }
}

macro_rules! impl_index {
    ($handle:ident, $field:ident, $out:ty) => {
        impl ops::Index<$handle> for HalfedgeMesh {
            type Output = $out;

            #[inline(always)]
            fn index(&self, idx: $handle) -> &Self::Output {
                &self.$field[idx]
            }
        }

        impl ops::IndexMut<$handle> for HalfedgeMesh {
            #[inline(always)]
            fn index_mut(&mut self, idx: $handle) -> &mut Self::Output {
                &mut self.$field[idx]
            }
        }
    };
}

impl_index!(VertexHandle, vertices, Vertex);
impl_index!(EdgeHandle, edges, Edge);
impl_index!(FaceHandle, faces, Face);
impl_index!(HalfedgeHandle, halfedges, Halfedge);
impl_index!(BoundaryLoopHandle, boundary_loops, Face);


// ===============================================================================================
// ===== Internal helpers: allocation, deletion, ids
// ===============================================================================================

impl HalfedgeMesh {
    pub(crate) fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocates a halfedge. The caller is responsible for eventually setting
    /// a correct `twin` (pass `Opt::none()` for the first half of a pair and
    /// patch it right after pushing the second).
    pub(crate) fn push_halfedge(
        &mut self,
        twin: Opt<HalfedgeHandle>,
        next: HalfedgeHandle,
        vertex: VertexHandle,
        edge: EdgeHandle,
        face: FaceSlot,
    ) -> HalfedgeHandle {
        let id = self.fresh_id();
        let real = face.is_real();
        let (h, grown) = self.halfedges.push(Halfedge { twin, next, vertex, edge, face, id });
        if real {
            self.num_real += 1;
        } else {
            self.num_imaginary += 1;
        }
        if let Some(cap) = grown {
            self.callbacks.borrow_mut().fire_expand(ElementKind::Halfedge, cap);
        }
        h
    }

    pub(crate) fn push_vertex(
        &mut self,
        halfedge: Opt<HalfedgeHandle>,
        is_boundary: bool,
    ) -> VertexHandle {
        let id = self.fresh_id();
        let (v, grown) = self.vertices.push(Vertex { halfedge, is_boundary, id });
        if let Some(cap) = grown {
            self.callbacks.borrow_mut().fire_expand(ElementKind::Vertex, cap);
        }
        v
    }

    pub(crate) fn push_edge(&mut self, halfedge: Opt<HalfedgeHandle>) -> EdgeHandle {
        let id = self.fresh_id();
        let (e, grown) = self.edges.push(Edge { halfedge, id });
        if let Some(cap) = grown {
            self.callbacks.borrow_mut().fire_expand(ElementKind::Edge, cap);
        }
        e
    }

    pub(crate) fn push_face(&mut self, halfedge: Opt<HalfedgeHandle>) -> FaceHandle {
        let id = self.fresh_id();
        let (f, grown) = self.faces.push(Face { halfedge, id });
        if let Some(cap) = grown {
            self.callbacks.borrow_mut().fire_expand(ElementKind::Face, cap);
        }
        f
    }

    pub(crate) fn push_boundary_loop(&mut self, halfedge: Opt<HalfedgeHandle>) -> BoundaryLoopHandle {
        let id = self.fresh_id();
        let (b, grown) = self.boundary_loops.push(Face { halfedge, id });
        if let Some(cap) = grown {
            self.callbacks.borrow_mut().fire_expand(ElementKind::BoundaryLoop, cap);
        }
        b
    }

    pub(crate) fn kill_halfedge(&mut self, h: HalfedgeHandle) {
        if self.halfedges[h].is_real() {
            self.num_real -= 1;
        } else {
            self.num_imaginary -= 1;
        }
        self.halfedges.kill(h);
        self.compressed = false;
    }

    pub(crate) fn kill_vertex(&mut self, v: VertexHandle) {
        self.vertices.kill(v);
        self.compressed = false;
    }

    pub(crate) fn kill_edge(&mut self, e: EdgeHandle) {
        self.edges.kill(e);
        self.compressed = false;
    }

    pub(crate) fn kill_face(&mut self, f: FaceHandle) {
        self.faces.kill(f);
        self.compressed = false;
    }
}


// ===============================================================================================
// ===== Navigation and predicates
// ===============================================================================================

impl HalfedgeMesh {
    /// Returns the opposite halfedge on the same edge.
    #[inline(always)]
    pub fn twin(&self, he: HalfedgeHandle) -> HalfedgeHandle {
        self[he].twin.unpack()
    }

    /// Returns the next halfedge around the same face (or boundary loop).
    #[inline(always)]
    pub fn next(&self, he: HalfedgeHandle) -> HalfedgeHandle {
        self[he].next
    }

    /// Returns the halfedge whose `next` is `he`.
    ///
    /// `prev` handles are not stored; this walks the face cycle, so it is
    /// O(degree of the face).
    pub fn prev(&self, he: HalfedgeHandle) -> HalfedgeHandle {
        let mut current = he;
        loop {
            let next = self[current].next;
            if next == he {
                return current;
            }
            current = next;
        }
    }

    /// Returns the tail vertex: the vertex `he` points away from.
    #[inline(always)]
    pub fn tail_of(&self, he: HalfedgeHandle) -> VertexHandle {
        self[he].vertex
    }

    /// Returns the tip vertex: the vertex `he` points towards.
    #[inline(always)]
    pub fn tip_of(&self, he: HalfedgeHandle) -> VertexHandle {
        self[self.twin(he)].vertex
    }

    /// Returns the full edge `he` belongs to.
    #[inline(always)]
    pub fn edge_of(&self, he: HalfedgeHandle) -> EdgeHandle {
        self[he].edge
    }

    /// Returns the real face of `he`, or `None` if `he` is imaginary.
    #[inline(always)]
    pub fn face_of(&self, he: HalfedgeHandle) -> Option<FaceHandle> {
        self[he].face.real()
    }

    /// Returns the boundary loop of `he`, or `None` if `he` is real.
    #[inline(always)]
    pub fn boundary_loop_of(&self, he: HalfedgeHandle) -> Option<BoundaryLoopHandle> {
        self[he].face.boundary()
    }

    /// Returns whether `he` sits in a real face (as opposed to a boundary
    /// loop).
    #[inline(always)]
    pub fn is_real(&self, he: HalfedgeHandle) -> bool {
        self[he].is_real()
    }

    /// Returns the corner view of `he`, or `None` if `he` is imaginary.
    #[inline(always)]
    pub fn corner_of(&self, he: HalfedgeHandle) -> Option<CornerHandle> {
        if self.is_real(he) {
            Some(he.as_corner())
        } else {
            None
        }
    }

    /// Returns the halfedge a corner is a view of.
    #[inline(always)]
    pub fn halfedge_of_corner(&self, c: CornerHandle) -> HalfedgeHandle {
        c.halfedge()
    }

    /// Returns the vertex a corner sits at.
    #[inline(always)]
    pub fn vertex_of_corner(&self, c: CornerHandle) -> VertexHandle {
        self.tail_of(c.halfedge())
    }

    /// Returns the face a corner belongs to.
    pub fn face_of_corner(&self, c: CornerHandle) -> FaceHandle {
        match self.face_of(c.halfedge()) {
            Some(f) => f,
            None => panic!("{:?} does not refer to a live corner (imaginary halfedge)", c),
        }
    }

    /// Returns the next corner around the same face.
    pub fn next_corner(&self, c: CornerHandle) -> CornerHandle {
        self.next(c.halfedge()).as_corner()
    }

    /// Returns one outgoing *real* halfedge of the vertex.
    #[inline(always)]
    pub fn outgoing_halfedge(&self, v: VertexHandle) -> HalfedgeHandle {
        self[v].halfedge.unpack()
    }

    /// Returns whether the vertex lies on a boundary (i.e. on at least one
    /// imaginary halfedge).
    #[inline(always)]
    pub fn is_boundary_vertex(&self, v: VertexHandle) -> bool {
        self[v].is_boundary
    }

    /// Returns one of the two halfedges of the edge. Convention: the real
    /// one if exactly one of the two is real.
    #[inline(always)]
    pub fn halfedge_of_edge(&self, e: EdgeHandle) -> HalfedgeHandle {
        self[e].halfedge.unpack()
    }

    /// Returns the two endpoint vertices of the edge.
    pub fn endpoints_of_edge(&self, e: EdgeHandle) -> [VertexHandle; 2] {
        let he = self.halfedge_of_edge(e);
        [self.tail_of(he), self.tip_of(he)]
    }

    /// Returns whether the edge has exactly one real and one imaginary
    /// halfedge.
    pub fn is_boundary_edge(&self, e: EdgeHandle) -> bool {
        let he = self.halfedge_of_edge(e);
        self.is_real(he) != self.is_real(self.twin(he))
    }

    /// Returns one halfedge of the face cycle.
    #[inline(always)]
    pub fn halfedge_of_face(&self, f: FaceHandle) -> HalfedgeHandle {
        self[f].halfedge.unpack()
    }

    /// Returns one halfedge of the boundary loop cycle.
    #[inline(always)]
    pub fn halfedge_of_boundary_loop(&self, b: BoundaryLoopHandle) -> HalfedgeHandle {
        self[b].halfedge.unpack()
    }

    /// Returns whether any edge of the face is a boundary edge.
    pub fn is_boundary_face(&self, f: FaceHandle) -> bool {
        self.halfedges_around_face(f)
            .any(|he| !self.is_real(self.twin(he)))
    }

    /// Returns the number of halfedges of the face cycle.
    pub fn degree_of_face(&self, f: FaceHandle) -> hsize {
        self.halfedges_around_face(f).count() as hsize
    }

    /// Returns the number of halfedges of the boundary loop.
    pub fn degree_of_boundary_loop(&self, b: BoundaryLoopHandle) -> hsize {
        self.halfedges_around_boundary_loop(b).count() as hsize
    }

    /// Returns the number of edges incident to the vertex.
    pub fn valence(&self, v: VertexHandle) -> hsize {
        self.outgoing_halfedges(v).count() as hsize
    }

    // ----- liveness ----------------------------------------------------------------------------

    pub fn contains_vertex(&self, v: VertexHandle) -> bool {
        self.vertices.contains(v)
    }

    pub fn contains_edge(&self, e: EdgeHandle) -> bool {
        self.edges.contains(e)
    }

    pub fn contains_face(&self, f: FaceHandle) -> bool {
        self.faces.contains(f)
    }

    pub fn contains_halfedge(&self, he: HalfedgeHandle) -> bool {
        self.halfedges.contains(he)
    }

    pub fn contains_boundary_loop(&self, b: BoundaryLoopHandle) -> bool {
        self.boundary_loops.contains(b)
    }

    // ----- ids ---------------------------------------------------------------------------------

    /// The unique id of the vertex. Ids are monotone tags, not indices: they
    /// survive compaction and are never reused within one mesh.
    pub fn vertex_id(&self, v: VertexHandle) -> u64 {
        self[v].id
    }

    pub fn edge_id(&self, e: EdgeHandle) -> u64 {
        self[e].id
    }

    pub fn face_id(&self, f: FaceHandle) -> u64 {
        self[f].id
    }

    pub fn halfedge_id(&self, he: HalfedgeHandle) -> u64 {
        self[he].id
    }

    pub fn boundary_loop_id(&self, b: BoundaryLoopHandle) -> u64 {
        self[b].id
    }

    /// The identity of this mesh instance. Used by dynamic handles to check
    /// they are resolved against the mesh they were created from.
    pub fn mesh_id(&self) -> u64 {
        self.mesh_id
    }
}


// ===============================================================================================
// ===== Counts, capacities, element-by-index and global queries
// ===============================================================================================

impl HalfedgeMesh {
    pub fn num_vertices(&self) -> hsize {
        self.vertices.num_live()
    }

    pub fn num_edges(&self) -> hsize {
        self.edges.num_live()
    }

    /// The number of real (interior) faces. Boundary loops are not counted.
    pub fn num_faces(&self) -> hsize {
        self.faces.num_live()
    }

    pub fn num_boundary_loops(&self) -> hsize {
        self.boundary_loops.num_live()
    }

    /// The number of real halfedges.
    pub fn num_halfedges(&self) -> hsize {
        self.num_real
    }

    pub fn num_imaginary_halfedges(&self) -> hsize {
        self.num_imaginary
    }

    pub fn num_all_halfedges(&self) -> hsize {
        self.num_real + self.num_imaginary
    }

    /// The number of corners, which equals the number of real halfedges.
    pub fn num_corners(&self) -> hsize {
        self.num_real
    }

    pub fn num_interior_vertices(&self) -> hsize {
        self.vertices.iter().filter(|(_, v)| !v.is_boundary).count() as hsize
    }

    // ----- capacities --------------------------------------------------------------------------

    /// The vertex pool capacity: attribute maps for vertices always hold at
    /// least this many slots.
    pub fn vertex_capacity(&self) -> hsize {
        self.vertices.capacity()
    }

    pub fn edge_capacity(&self) -> hsize {
        self.edges.capacity()
    }

    pub fn face_capacity(&self) -> hsize {
        self.faces.capacity()
    }

    pub fn halfedge_capacity(&self) -> hsize {
        self.halfedges.capacity()
    }

    pub fn boundary_loop_capacity(&self) -> hsize {
        self.boundary_loops.capacity()
    }

    /// The capacity of the pool backing the given element kind.
    pub fn element_capacity(&self, kind: ElementKind) -> hsize {
        match kind {
            ElementKind::Vertex => self.vertex_capacity(),
            ElementKind::Halfedge => self.halfedge_capacity(),
            ElementKind::Edge => self.edge_capacity(),
            ElementKind::Face => self.face_capacity(),
            ElementKind::BoundaryLoop => self.boundary_loop_capacity(),
        }
    }

    // ----- flags -------------------------------------------------------------------------------

    /// Returns whether the pools contain no tombstones. True after
    /// construction and after [`compress`][HalfedgeMesh::compress]; any
    /// deletion clears it.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns whether the element order matches the deterministic order the
    /// builder produces. Any mutation except [`flip`][HalfedgeMesh::flip]
    /// clears it; [`canonicalize`][HalfedgeMesh::canonicalize] restores it.
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    // ----- element by index --------------------------------------------------------------------

    /// Returns the vertex in slot `index`. Only valid on a
    /// [compressed][HalfedgeMesh::is_compressed] mesh, where slots `0..n`
    /// are exactly the live elements; panics otherwise.
    pub fn vertex_at(&self, index: hsize) -> VertexHandle {
        self.assert_compressed("vertex_at");
        assert!(index < self.vertices.len(), "vertex index {} out of range", index);
        VertexHandle::new(index)
    }

    pub fn edge_at(&self, index: hsize) -> EdgeHandle {
        self.assert_compressed("edge_at");
        assert!(index < self.edges.len(), "edge index {} out of range", index);
        EdgeHandle::new(index)
    }

    pub fn face_at(&self, index: hsize) -> FaceHandle {
        self.assert_compressed("face_at");
        assert!(index < self.faces.len(), "face index {} out of range", index);
        FaceHandle::new(index)
    }

    pub fn halfedge_at(&self, index: hsize) -> HalfedgeHandle {
        self.assert_compressed("halfedge_at");
        assert!(index < self.halfedges.len(), "halfedge index {} out of range", index);
        HalfedgeHandle::new(index)
    }

    pub fn boundary_loop_at(&self, index: hsize) -> BoundaryLoopHandle {
        self.assert_compressed("boundary_loop_at");
        assert!(index < self.boundary_loops.len(), "boundary loop index {} out of range", index);
        BoundaryLoopHandle::new(index)
    }

    fn assert_compressed(&self, what: &str) {
        assert!(
            self.compressed,
            "`{}` requires a compressed mesh (call `compress()` first)",
            what,
        );
    }

    // ----- global queries ----------------------------------------------------------------------

    /// The Euler characteristic `V − E + F − B` of the represented surface,
    /// where `F` counts real faces and `B` boundary loops.
    pub fn euler_characteristic(&self) -> i64 {
        self.num_vertices() as i64 - self.num_edges() as i64 + self.num_faces() as i64
            - self.num_boundary_loops() as i64
    }

    /// The genus of the surface, derived from the Euler characteristic.
    /// Meaningful for connected meshes only.
    pub fn genus(&self) -> i64 {
        (2 - self.euler_characteristic()) / 2 - self.num_boundary_loops() as i64
    }

    /// Returns whether every real face is a triangle.
    pub fn is_simplicial(&self) -> bool {
        self.face_handles().all(|f| self.degree_of_face(f) == 3)
    }

    /// The number of triangles that triangulating every face (see
    /// [`triangulate`][HalfedgeMesh::triangulate]) would produce.
    pub fn num_faces_triangulation(&self) -> hsize {
        self.face_handles().map(|f| self.degree_of_face(f) - 2).sum()
    }

    /// The length (in edges) of the longest boundary loop, or 0 for a closed
    /// mesh.
    pub fn longest_boundary_loop(&self) -> hsize {
        self.boundary_loop_handles()
            .map(|b| self.degree_of_boundary_loop(b))
            .max()
            .unwrap_or(0)
    }

    /// The number of connected components of the surface.
    pub fn num_connected_components(&self) -> hsize {
        let mut visited = vec![false; self.vertices.len() as usize];
        let mut stack = Vec::new();
        let mut components = 0;

        for v in self.vertex_handles() {
            if visited[v.to_usize()] {
                continue;
            }

            components += 1;
            visited[v.to_usize()] = true;
            stack.push(v);
            while let Some(v) = stack.pop() {
                for neighbor in self.vertices_around_vertex(v) {
                    if !visited[neighbor.to_usize()] {
                        visited[neighbor.to_usize()] = true;
                        stack.push(neighbor);
                    }
                }
            }
        }

        components
    }

    /// Exports the faces as a polygon soup: one list of tail-vertex slot
    /// indices per real face, in face-traversal order.
    ///
    /// Feeding the result back into
    /// [`from_polygons`][HalfedgeMesh::from_polygons] reproduces the
    /// connectivity; this is only lossless on a compressed mesh (slot
    /// indices of a sparse mesh are not contiguous).
    pub fn polygon_soup_faces(&self) -> Vec<Vec<hsize>> {
        self.face_handles()
            .map(|f| {
                self.halfedges_around_face(f)
                    .map(|he| self.tail_of(he).idx())
                    .collect()
            })
            .collect()
    }
}


// ===============================================================================================
// ===== Element-set iterators
// ===============================================================================================

macro_rules! gen_element_iter {
    ($(#[$attr:meta])* $name:ident, $handle:ident, $record:ty, $field:ident, $method:ident) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub struct $name<'a> {
            inner: pool::Handles<'a, $handle, $record>,
        }

        impl Iterator for $name<'_> {
            type Item = $handle;

            fn next(&mut self) -> Option<Self::Item> {
                self.inner.next()
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        impl ExactSizeIterator for $name<'_> {}

        impl HalfedgeMesh {
            /// Iterates over the handles of all live elements of this kind,
            /// in slot order.
            pub fn $method(&self) -> $name<'_> {
                $name { inner: self.$field.handles() }
            }
        }
    };
}

gen_element_iter!(
    /// Iterator over all live vertices. See
    /// [`vertex_handles`][HalfedgeMesh::vertex_handles].
    VertexHandles, VertexHandle, Vertex, vertices, vertex_handles
);
gen_element_iter!(
    /// Iterator over all live edges. See
    /// [`edge_handles`][HalfedgeMesh::edge_handles].
    EdgeHandles, EdgeHandle, Edge, edges, edge_handles
);
gen_element_iter!(
    /// Iterator over all live real faces (boundary loops excluded). See
    /// [`face_handles`][HalfedgeMesh::face_handles].
    FaceHandles, FaceHandle, Face, faces, face_handles
);
gen_element_iter!(
    /// Iterator over all boundary loops. See
    /// [`boundary_loop_handles`][HalfedgeMesh::boundary_loop_handles].
    BoundaryLoopHandles, BoundaryLoopHandle, Face, boundary_loops, boundary_loop_handles
);

/// Which halfedges a [`HalfedgeHandles`] iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HalfedgeFilter {
    Real,
    Imaginary,
    All,
}

/// Iterator over live halfedges, optionally restricted to real or imaginary
/// ones. See [`halfedge_handles`][HalfedgeMesh::halfedge_handles],
/// [`imaginary_halfedge_handles`][HalfedgeMesh::imaginary_halfedge_handles]
/// and [`all_halfedge_handles`][HalfedgeMesh::all_halfedge_handles].
#[derive(Debug)]
pub struct HalfedgeHandles<'a> {
    mesh: &'a HalfedgeMesh,
    current: hsize,
    remaining: hsize,
    filter: HalfedgeFilter,
}

impl Iterator for HalfedgeHandles<'_> {
    type Item = HalfedgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let he = self.mesh.halfedges.next_handle_from(HalfedgeHandle::new(self.current))?;
            self.current = he.idx() + 1;

            let keep = match self.filter {
                HalfedgeFilter::All => true,
                HalfedgeFilter::Real => self.mesh.halfedges[he].is_real(),
                HalfedgeFilter::Imaginary => !self.mesh.halfedges[he].is_real(),
            };
            if keep {
                self.remaining -= 1;
                return Some(he);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl ExactSizeIterator for HalfedgeHandles<'_> {}

/// Iterator over all corners, i.e. all real halfedges viewed as corners. See
/// [`corner_handles`][HalfedgeMesh::corner_handles].
#[derive(Debug)]
pub struct CornerHandles<'a> {
    inner: HalfedgeHandles<'a>,
}

impl Iterator for CornerHandles<'_> {
    type Item = CornerHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|he| he.as_corner())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for CornerHandles<'_> {}

impl HalfedgeMesh {
    /// Iterates over all live real halfedges, in slot order.
    pub fn halfedge_handles(&self) -> HalfedgeHandles<'_> {
        HalfedgeHandles {
            mesh: self,
            current: 0,
            remaining: self.num_real,
            filter: HalfedgeFilter::Real,
        }
    }

    /// Iterates over all live imaginary halfedges, in slot order.
    pub fn imaginary_halfedge_handles(&self) -> HalfedgeHandles<'_> {
        HalfedgeHandles {
            mesh: self,
            current: 0,
            remaining: self.num_imaginary,
            filter: HalfedgeFilter::Imaginary,
        }
    }

    /// Iterates over all live halfedges, real and imaginary, in slot order.
    pub fn all_halfedge_handles(&self) -> HalfedgeHandles<'_> {
        HalfedgeHandles {
            mesh: self,
            current: 0,
            remaining: self.num_real + self.num_imaginary,
            filter: HalfedgeFilter::All,
        }
    }

    /// Iterates over all corners, in halfedge slot order.
    pub fn corner_handles(&self) -> CornerHandles<'_> {
        CornerHandles { inner: self.halfedge_handles() }
    }
}


// ===============================================================================================
// ===== Callback registration and deep copies
// ===============================================================================================

impl HalfedgeMesh {
    /// Registers a callback that fires whenever the pool of kind `K` grows,
    /// with the new capacity as argument. Returns the token needed to
    /// [deregister][HalfedgeMesh::remove_expand_callback] it.
    ///
    /// The callback must not touch the mesh; it runs while a mutation is in
    /// progress.
    pub fn on_expand<K: MeshElement>(
        &self,
        f: impl FnMut(hsize) + 'static,
    ) -> CallbackToken {
        self.callbacks.borrow_mut().add_expand(K::KIND, Box::new(f))
    }

    /// Registers a callback that fires when the pool of kind `K` is
    /// compacted. The argument is the permutation `p` with
    /// `new[i] = old[p[i]]`; its length is the new element count.
    pub fn on_permute<K: MeshElement>(
        &self,
        f: impl FnMut(&[hsize]) + 'static,
    ) -> CallbackToken {
        self.callbacks.borrow_mut().add_permute(K::KIND, Box::new(f))
    }

    /// Registers a callback that fires once when the mesh is dropped.
    pub fn on_mesh_delete(&self, f: impl FnMut() + 'static) -> CallbackToken {
        self.callbacks.borrow_mut().add_delete(Box::new(f))
    }

    pub fn remove_expand_callback<K: MeshElement>(&self, token: CallbackToken) {
        self.callbacks.borrow_mut().remove_expand(K::KIND, token);
    }

    pub fn remove_permute_callback<K: MeshElement>(&self, token: CallbackToken) {
        self.callbacks.borrow_mut().remove_permute(K::KIND, token);
    }

    pub fn remove_mesh_delete_callback(&self, token: CallbackToken) {
        self.callbacks.borrow_mut().remove_delete(token);
    }

    /// Returns a deep copy together with a [`DataTransfer`] that maps the
    /// ids of the original's live elements to handles of the copy, so
    /// external per-element data can be carried over.
    pub fn copy_with_transfer(&self) -> (HalfedgeMesh, DataTransfer) {
        let copy = self.clone();

        // The clone preserves slots, so the new handle of every element is
        // its old slot index.
        let transfer = DataTransfer {
            vertices: self.vertices.iter().map(|(h, v)| (v.id, h)).collect(),
            halfedges: self.halfedges.iter().map(|(h, he)| (he.id, h)).collect(),
            edges: self.edges.iter().map(|(h, e)| (e.id, h)).collect(),
            faces: self.faces.iter().map(|(h, f)| (f.id, h)).collect(),
            boundary_loops: self.boundary_loops.iter().map(|(h, b)| (b.id, h)).collect(),
        };

        (copy, transfer)
    }
}

/// Maps element ids of a source mesh to handles of its deep copy. Returned
/// by [`copy_with_transfer`][HalfedgeMesh::copy_with_transfer].
#[derive(Debug, Clone)]
pub struct DataTransfer {
    pub vertices: AHashMap<u64, VertexHandle>,
    pub halfedges: AHashMap<u64, HalfedgeHandle>,
    pub edges: AHashMap<u64, EdgeHandle>,
    pub faces: AHashMap<u64, FaceHandle>,
    pub boundary_loops: AHashMap<u64, BoundaryLoopHandle>,
}
