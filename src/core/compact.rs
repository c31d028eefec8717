//! Tombstone removal and canonical reordering.
//!
//! Both operations reassign slots and therefore invalidate plain handles.
//! Registered permute callbacks fire once per affected pool, after the mesh
//! itself is fully rewired, so attribute maps and dynamic handles come out
//! the other side pointing at the same elements.

use optional::Optioned as Opt;

use crate::{
    callback::ElementKind,
    handle::{hsize, Handle, HalfedgeHandle, NONE_IDX},
};
use super::{FaceSlot, HalfedgeMesh};


/// Builds the old-slot → new-slot table from a permutation `p` with
/// `new[i] = old[p[i]]`. Slots of dead elements map to `NONE_IDX`.
fn invert(p: &[hsize], old_len: hsize) -> Vec<hsize> {
    let mut inv = vec![NONE_IDX; old_len as usize];
    for (new, &old) in p.iter().enumerate() {
        inv[old as usize] = new as hsize;
    }
    inv
}

#[inline(always)]
fn remap<H: Handle>(inv: &[hsize], handle: H) -> H {
    let new = inv[handle.to_usize()];
    debug_assert_ne!(new, NONE_IDX, "{:?} points at a dead element", handle);
    H::new(new)
}

impl HalfedgeMesh {
    /// Removes all tombstones: live elements are moved into a contiguous
    /// prefix (preserving their relative order), pool capacities shrink to
    /// the live counts, and every pool's permute callbacks fire.
    ///
    /// Afterwards [`is_compressed`][Self::is_compressed] is true and slot
    /// indices equal the `0..n` element indices. All handles obtained
    /// before the call are invalidated.
    pub fn compress(&mut self) {
        if self.compressed {
            return;
        }

        let p_v = self.vertices.live_permutation();
        let p_h = self.halfedges.live_permutation();
        let p_e = self.edges.live_permutation();
        let p_f = self.faces.live_permutation();
        let p_b = self.boundary_loops.live_permutation();

        let inv_v = invert(&p_v, self.vertices.len());
        let inv_h = invert(&p_h, self.halfedges.len());
        let inv_e = invert(&p_e, self.edges.len());
        let inv_f = invert(&p_f, self.faces.len());
        let inv_b = invert(&p_b, self.boundary_loops.len());

        // Rewire every reference of every live record through the new slot
        // assignment, then move the records.
        for (_, he) in self.halfedges.iter_mut() {
            he.twin = Opt::some(remap(&inv_h, he.twin.unpack()));
            he.next = remap(&inv_h, he.next);
            he.vertex = remap(&inv_v, he.vertex);
            he.edge = remap(&inv_e, he.edge);
            he.face = match he.face {
                FaceSlot::Real(f) => FaceSlot::Real(remap(&inv_f, f)),
                FaceSlot::Boundary(b) => FaceSlot::Boundary(remap(&inv_b, b)),
            };
        }
        for (_, v) in self.vertices.iter_mut() {
            v.halfedge = Opt::some(remap(&inv_h, v.halfedge.unpack()));
        }
        for (_, e) in self.edges.iter_mut() {
            e.halfedge = Opt::some(remap(&inv_h, e.halfedge.unpack()));
        }
        for (_, f) in self.faces.iter_mut() {
            f.halfedge = Opt::some(remap(&inv_h, f.halfedge.unpack()));
        }
        for (_, b) in self.boundary_loops.iter_mut() {
            b.halfedge = Opt::some(remap(&inv_h, b.halfedge.unpack()));
        }

        self.vertices.apply_permutation(&p_v);
        self.halfedges.apply_permutation(&p_h);
        self.edges.apply_permutation(&p_e);
        self.faces.apply_permutation(&p_f);
        self.boundary_loops.apply_permutation(&p_b);

        self.compressed = true;

        let mut cbs = self.callbacks.borrow_mut();
        cbs.fire_permute(ElementKind::Vertex, &p_v);
        cbs.fire_permute(ElementKind::Halfedge, &p_h);
        cbs.fire_permute(ElementKind::Edge, &p_e);
        cbs.fire_permute(ElementKind::Face, &p_f);
        cbs.fire_permute(ElementKind::BoundaryLoop, &p_b);
    }

    /// Restores the deterministic element order the builder produces:
    /// halfedges in face-traversal order (real faces in slot order, then
    /// boundary loops), edges in first-encounter order of that traversal.
    /// Vertices, faces and boundary loops keep their compacted slot order.
    ///
    /// Compresses first if necessary. Afterwards
    /// [`is_canonical`][Self::is_canonical] is true. All handles obtained
    /// before the call are invalidated.
    pub fn canonicalize(&mut self) {
        if self.canonical {
            return;
        }
        self.compress();

        // Target halfedge order: walk every real face cycle in face slot
        // order; then the imaginary halfedges, ordered like their (real)
        // twins. This is exactly the order in which the builder allocates:
        // one halfedge per polygon corner, then one imaginary twin per
        // unmatched real halfedge, in scan order.
        let mut p_h: Vec<hsize> = Vec::with_capacity(self.halfedges.len() as usize);
        let face_starts: Vec<HalfedgeHandle> = self
            .faces
            .handles()
            .map(|f| self.halfedge_of_face(f))
            .collect();
        for start in face_starts {
            let mut current = start;
            loop {
                p_h.push(current.idx());
                current = self.next(current);
                if current == start {
                    break;
                }
            }
        }
        let num_real = p_h.len();
        for i in 0..num_real {
            let twin = self.twin(HalfedgeHandle::new(p_h[i]));
            if !self.is_real(twin) {
                p_h.push(twin.idx());
            }
        }
        debug_assert_eq!(p_h.len(), self.halfedges.len() as usize);
        let inv_h = invert(&p_h, self.halfedges.len());

        // Target edge order: first encounter along the new halfedge order.
        let mut p_e: Vec<hsize> = Vec::with_capacity(self.edges.len() as usize);
        let mut seen = vec![false; self.edges.len() as usize];
        for &old_he in &p_h {
            let e = self.halfedges.raw(HalfedgeHandle::new(old_he)).edge;
            if !seen[e.to_usize()] {
                seen[e.to_usize()] = true;
                p_e.push(e.idx());
            }
        }
        let inv_e = invert(&p_e, self.edges.len());

        for (_, he) in self.halfedges.iter_mut() {
            he.twin = Opt::some(remap(&inv_h, he.twin.unpack()));
            he.next = remap(&inv_h, he.next);
            he.edge = remap(&inv_e, he.edge);
        }
        for (_, v) in self.vertices.iter_mut() {
            v.halfedge = Opt::some(remap(&inv_h, v.halfedge.unpack()));
        }
        for (_, e) in self.edges.iter_mut() {
            e.halfedge = Opt::some(remap(&inv_h, e.halfedge.unpack()));
        }
        for (_, f) in self.faces.iter_mut() {
            f.halfedge = Opt::some(remap(&inv_h, f.halfedge.unpack()));
        }
        for (_, b) in self.boundary_loops.iter_mut() {
            b.halfedge = Opt::some(remap(&inv_h, b.halfedge.unpack()));
        }

        self.halfedges.apply_permutation(&p_h);
        self.edges.apply_permutation(&p_e);

        // Canonical edge representative: the first-encountered (lower slot)
        // halfedge. Since all real halfedges now come before all imaginary
        // ones, this is also the real halfedge for boundary edges.
        let edge_handles: Vec<_> = self.edges.handles().collect();
        for e in edge_handles {
            let he = self.halfedge_of_edge(e);
            let twin = self.twin(he);
            if twin.idx() < he.idx() {
                self.edges.raw_mut(e).halfedge = Opt::some(twin);
            }
        }

        self.canonical = true;

        let mut cbs = self.callbacks.borrow_mut();
        cbs.fire_permute(ElementKind::Halfedge, &p_h);
        cbs.fire_permute(ElementKind::Edge, &p_e);
    }
}
