//! Internal circulators and all local-neighborhood iterators.
//!
//! Everything here is defined in terms of two orbits:
//!
//! - around a vertex: from an outgoing halfedge `h`, the next outgoing
//!   halfedge is `twin(h).next`;
//! - around a face (or boundary loop): from an inner halfedge `h`, the next
//!   one is `next(h)`.
//!
//! Both orbits are finite cycles on a valid mesh. All iterators are lazy and
//! single-pass; they borrow the mesh, so the borrow checker rules out
//! mutating while iterating.

use crate::handle::{
    BoundaryLoopHandle, CornerHandle, EdgeHandle, FaceHandle, HalfedgeHandle, VertexHandle,
};
use super::HalfedgeMesh;


// ===============================================================================================
// ===== Internal circulators
// ===============================================================================================

/// Circulates around a vertex, yielding all outgoing halfedges (imaginary
/// ones included).
#[derive(Debug)]
struct VertexCirculator<'a> {
    mesh: &'a HalfedgeMesh,
    current: HalfedgeHandle,
    start: HalfedgeHandle,
    done: bool,
}

impl<'a> VertexCirculator<'a> {
    fn new(mesh: &'a HalfedgeMesh, v: VertexHandle) -> Self {
        let start = mesh.outgoing_halfedge(v);
        Self { mesh, current: start, start, done: false }
    }
}

impl Iterator for VertexCirculator<'_> {
    type Item = HalfedgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let out = self.current;
        self.current = self.mesh.next(self.mesh.twin(out));
        if self.current == self.start {
            self.done = true;
        }

        Some(out)
    }
}

/// Circulates around a face or boundary loop, yielding the inner halfedges.
#[derive(Debug)]
struct CycleCirculator<'a> {
    mesh: &'a HalfedgeMesh,
    current: HalfedgeHandle,
    start: HalfedgeHandle,
    done: bool,
}

impl<'a> CycleCirculator<'a> {
    fn new(mesh: &'a HalfedgeMesh, start: HalfedgeHandle) -> Self {
        Self { mesh, current: start, start, done: false }
    }
}

impl Iterator for CycleCirculator<'_> {
    type Item = HalfedgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let out = self.current;
        self.current = self.mesh.next(out);
        if self.current == self.start {
            self.done = true;
        }

        Some(out)
    }
}


// ===============================================================================================
// ===== Public iterator types
// ===============================================================================================

macro_rules! gen_neighborhood_iter {
    ($(#[$attr:meta])* $name:ident($inner:ident) -> $item:ty, |$mesh:ident, $he:ident| $map:expr) => {
        $(#[$attr])*
        #[derive(Debug)]
        pub struct $name<'a> {
            it: $inner<'a>,
        }

        impl Iterator for $name<'_> {
            type Item = $item;

            fn next(&mut self) -> Option<Self::Item> {
                let $mesh = self.it.mesh;
                self.it.by_ref().filter_map(|$he| $map).next()
            }
        }
    };
}

gen_neighborhood_iter!(
    /// Iterator over the outgoing halfedges of a vertex. Returned by
    /// [`outgoing_halfedges`][HalfedgeMesh::outgoing_halfedges] (imaginary
    /// included) and
    /// [`outgoing_interior_halfedges`][HalfedgeMesh::outgoing_interior_halfedges]
    /// (real only).
    VertexOutgoingHalfedges(FilteredVertexCirculator) -> HalfedgeHandle,
    |_mesh, he| Some(he)
);
gen_neighborhood_iter!(
    /// Iterator over the incoming halfedges of a vertex (the twins of the
    /// outgoing ones). Returned by
    /// [`incoming_halfedges`][HalfedgeMesh::incoming_halfedges] and
    /// [`incoming_interior_halfedges`][HalfedgeMesh::incoming_interior_halfedges].
    VertexIncomingHalfedges(FilteredVertexCirculator) -> HalfedgeHandle,
    |_mesh, he| Some(he)
);
gen_neighborhood_iter!(
    /// Iterator over the neighbor vertices of a vertex. Returned by
    /// [`vertices_around_vertex`][HalfedgeMesh::vertices_around_vertex].
    VertexVertices(VertexCirculator) -> VertexHandle,
    |mesh, he| Some(mesh.tip_of(he))
);
gen_neighborhood_iter!(
    /// Iterator over the edges incident to a vertex. Returned by
    /// [`edges_around_vertex`][HalfedgeMesh::edges_around_vertex].
    VertexEdges(VertexCirculator) -> EdgeHandle,
    |mesh, he| Some(mesh.edge_of(he))
);
gen_neighborhood_iter!(
    /// Iterator over the real faces around a vertex (boundary loops are
    /// skipped). Returned by
    /// [`faces_around_vertex`][HalfedgeMesh::faces_around_vertex].
    VertexFaces(VertexCirculator) -> FaceHandle,
    |mesh, he| mesh.face_of(he)
);
gen_neighborhood_iter!(
    /// Iterator over the corners at a vertex, one per incident real face.
    /// Returned by
    /// [`corners_around_vertex`][HalfedgeMesh::corners_around_vertex].
    VertexCorners(VertexCirculator) -> CornerHandle,
    |mesh, he| mesh.corner_of(he)
);
gen_neighborhood_iter!(
    /// Iterator over the inner halfedges of a face. Returned by
    /// [`halfedges_around_face`][HalfedgeMesh::halfedges_around_face].
    FaceHalfedges(CycleCirculator) -> HalfedgeHandle,
    |_mesh, he| Some(he)
);
gen_neighborhood_iter!(
    /// Iterator over the vertices of a face, in cycle order. Returned by
    /// [`vertices_around_face`][HalfedgeMesh::vertices_around_face].
    FaceVertices(CycleCirculator) -> VertexHandle,
    |mesh, he| Some(mesh.tail_of(he))
);
gen_neighborhood_iter!(
    /// Iterator over the edges of a face. Returned by
    /// [`edges_around_face`][HalfedgeMesh::edges_around_face].
    FaceEdges(CycleCirculator) -> EdgeHandle,
    |mesh, he| Some(mesh.edge_of(he))
);
gen_neighborhood_iter!(
    /// Iterator over the real faces sharing an edge with a face (boundary
    /// loops are skipped; a face sharing several edges shows up several
    /// times). Returned by
    /// [`faces_around_face`][HalfedgeMesh::faces_around_face].
    FaceFaces(CycleCirculator) -> FaceHandle,
    |mesh, he| mesh.face_of(mesh.twin(he))
);
gen_neighborhood_iter!(
    /// Iterator over the corners of a face, in cycle order. Returned by
    /// [`corners_around_face`][HalfedgeMesh::corners_around_face].
    FaceCorners(CycleCirculator) -> CornerHandle,
    |mesh, he| mesh.corner_of(he)
);
gen_neighborhood_iter!(
    /// Iterator over the imaginary halfedges of a boundary loop. Returned by
    /// [`halfedges_around_boundary_loop`][HalfedgeMesh::halfedges_around_boundary_loop].
    LoopHalfedges(CycleCirculator) -> HalfedgeHandle,
    |_mesh, he| Some(he)
);
gen_neighborhood_iter!(
    /// Iterator over the vertices of a boundary loop, in cycle order.
    /// Returned by
    /// [`vertices_around_boundary_loop`][HalfedgeMesh::vertices_around_boundary_loop].
    LoopVertices(CycleCirculator) -> VertexHandle,
    |mesh, he| Some(mesh.tail_of(he))
);

/// Vertex circulator with an optional interior-only filter and an optional
/// twin projection (for incoming halfedges).
#[derive(Debug)]
struct FilteredVertexCirculator<'a> {
    mesh: &'a HalfedgeMesh,
    it: VertexCirculator<'a>,
    interior_only: bool,
    incoming: bool,
}

impl Iterator for FilteredVertexCirculator<'_> {
    type Item = HalfedgeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let out = self.it.next()?;
            let out = if self.incoming { self.mesh.twin(out) } else { out };
            if !self.interior_only || self.mesh.is_real(out) {
                return Some(out);
            }
        }
    }
}


// ===============================================================================================
// ===== The neighborhood methods
// ===============================================================================================

impl HalfedgeMesh {
    /// Iterates over all outgoing halfedges of `v`, starting at
    /// [`outgoing_halfedge`][Self::outgoing_halfedge]. Imaginary halfedges
    /// are included.
    pub fn outgoing_halfedges(&self, v: VertexHandle) -> VertexOutgoingHalfedges<'_> {
        VertexOutgoingHalfedges {
            it: FilteredVertexCirculator {
                mesh: self,
                it: VertexCirculator::new(self, v),
                interior_only: false,
                incoming: false,
            },
        }
    }

    /// Like [`outgoing_halfedges`][Self::outgoing_halfedges], but skips
    /// imaginary halfedges.
    pub fn outgoing_interior_halfedges(&self, v: VertexHandle) -> VertexOutgoingHalfedges<'_> {
        VertexOutgoingHalfedges {
            it: FilteredVertexCirculator {
                mesh: self,
                it: VertexCirculator::new(self, v),
                interior_only: true,
                incoming: false,
            },
        }
    }

    /// Iterates over all incoming halfedges of `v` (the twins of the
    /// outgoing ones). Imaginary halfedges are included.
    pub fn incoming_halfedges(&self, v: VertexHandle) -> VertexIncomingHalfedges<'_> {
        VertexIncomingHalfedges {
            it: FilteredVertexCirculator {
                mesh: self,
                it: VertexCirculator::new(self, v),
                interior_only: false,
                incoming: true,
            },
        }
    }

    /// Like [`incoming_halfedges`][Self::incoming_halfedges], but skips
    /// imaginary halfedges.
    pub fn incoming_interior_halfedges(&self, v: VertexHandle) -> VertexIncomingHalfedges<'_> {
        VertexIncomingHalfedges {
            it: FilteredVertexCirculator {
                mesh: self,
                it: VertexCirculator::new(self, v),
                interior_only: true,
                incoming: true,
            },
        }
    }

    /// Iterates over all vertices adjacent to `v`.
    pub fn vertices_around_vertex(&self, v: VertexHandle) -> VertexVertices<'_> {
        VertexVertices { it: VertexCirculator::new(self, v) }
    }

    /// Iterates over all edges incident to `v`.
    pub fn edges_around_vertex(&self, v: VertexHandle) -> VertexEdges<'_> {
        VertexEdges { it: VertexCirculator::new(self, v) }
    }

    /// Iterates over all real faces incident to `v`.
    pub fn faces_around_vertex(&self, v: VertexHandle) -> VertexFaces<'_> {
        VertexFaces { it: VertexCirculator::new(self, v) }
    }

    /// Iterates over all corners at `v`, one per incident real face.
    pub fn corners_around_vertex(&self, v: VertexHandle) -> VertexCorners<'_> {
        VertexCorners { it: VertexCirculator::new(self, v) }
    }

    /// Iterates over the halfedges of the face cycle, starting at
    /// [`halfedge_of_face`][Self::halfedge_of_face].
    pub fn halfedges_around_face(&self, f: FaceHandle) -> FaceHalfedges<'_> {
        FaceHalfedges { it: CycleCirculator::new(self, self.halfedge_of_face(f)) }
    }

    /// Iterates over the vertices of the face, in cycle order.
    pub fn vertices_around_face(&self, f: FaceHandle) -> FaceVertices<'_> {
        FaceVertices { it: CycleCirculator::new(self, self.halfedge_of_face(f)) }
    }

    /// Iterates over the edges of the face.
    pub fn edges_around_face(&self, f: FaceHandle) -> FaceEdges<'_> {
        FaceEdges { it: CycleCirculator::new(self, self.halfedge_of_face(f)) }
    }

    /// Iterates over the real faces sharing an edge with `f`.
    pub fn faces_around_face(&self, f: FaceHandle) -> FaceFaces<'_> {
        FaceFaces { it: CycleCirculator::new(self, self.halfedge_of_face(f)) }
    }

    /// Iterates over the corners of the face, in cycle order.
    pub fn corners_around_face(&self, f: FaceHandle) -> FaceCorners<'_> {
        FaceCorners { it: CycleCirculator::new(self, self.halfedge_of_face(f)) }
    }

    /// Iterates over the imaginary halfedges of the boundary loop.
    pub fn halfedges_around_boundary_loop(&self, b: BoundaryLoopHandle) -> LoopHalfedges<'_> {
        LoopHalfedges { it: CycleCirculator::new(self, self.halfedge_of_boundary_loop(b)) }
    }

    /// Iterates over the vertices of the boundary loop, in cycle order.
    pub fn vertices_around_boundary_loop(&self, b: BoundaryLoopHandle) -> LoopVertices<'_> {
        LoopVertices { it: CycleCirculator::new(self, self.halfedge_of_boundary_loop(b)) }
    }

    /// Tries to find the halfedge going from `from` to `to`. Returns `None`
    /// if the vertices are not adjacent.
    pub fn halfedge_between(&self, from: VertexHandle, to: VertexHandle) -> Option<HalfedgeHandle> {
        self.outgoing_halfedges(from).find(|&he| self.tip_of(he) == to)
    }

    /// Tries to find the edge between the two vertices.
    pub fn edge_between_vertices(&self, a: VertexHandle, b: VertexHandle) -> Option<EdgeHandle> {
        self.halfedge_between(a, b).map(|he| self.edge_of(he))
    }

    pub fn are_vertices_adjacent(&self, a: VertexHandle, b: VertexHandle) -> bool {
        self.halfedge_between(a, b).is_some()
    }

    pub fn are_faces_adjacent(&self, a: FaceHandle, b: FaceHandle) -> bool {
        self.faces_around_face(a).any(|f| f == b)
    }

    /// Rotates around the tail vertex of `start` until a real outgoing
    /// halfedge is found. On a manifold mesh this always terminates: every
    /// vertex has at least one incident real face.
    pub(crate) fn rotate_to_real(&self, start: HalfedgeHandle) -> HalfedgeHandle {
        let mut current = start;
        loop {
            if self.is_real(current) {
                return current;
            }
            current = self.next(self.twin(current));
            debug_assert_ne!(current, start, "no real outgoing halfedge found");
        }
    }
}
