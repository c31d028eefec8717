//! The mutation engine: local topological operations.
//!
//! All operations rewire the structure in place and re-establish every
//! invariant before returning. Allocation can grow pools (firing expand
//! callbacks), deletion leaves tombstones. Except for
//! [`flip`][HalfedgeMesh::flip], every mutation clears the canonical flag;
//! deleting mutations also clear the compressed flag.
//!
//! Precondition failures come in two flavors, following the usual
//! conventions: `flip`, `try_connect_vertices` and `collapse_edge` signal
//! "didn't apply" through their return value, the other fallible operations
//! return an error.

use failure::Fail;
use optional::Optioned as Opt;
use smallvec::SmallVec;

use crate::handle::{
    EdgeHandle, FaceHandle, Handle, HalfedgeHandle, VertexHandle, NONE_IDX,
};
use super::{FaceSlot, HalfedgeMesh};


/// Precondition failures of the mutation operations that report errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum MutationError {
    /// The operation requires the real faces next to an edge to be
    /// triangles.
    #[fail(display = "a face adjacent to {:?} is not a triangle", edge)]
    NotTriangular { edge: EdgeHandle },

    /// The two vertices are identical, already adjacent, or share no face.
    #[fail(display = "{:?} and {:?} cannot be connected by a new edge", from, to)]
    NotConnectable { from: VertexHandle, to: VertexHandle },
}

/// What has to happen on one side of an edge that is being collapsed.
#[derive(Clone, Copy)]
enum CollapseSide {
    /// A real triangle: it degenerates to a 2-gon and is removed, its two
    /// remaining edges merged into one.
    Triangle {
        face: FaceHandle,
        /// `next` of the collapsed halfedge (deleted).
        n1: HalfedgeHandle,
        /// `prev` of the collapsed halfedge (deleted).
        p1: HalfedgeHandle,
        /// Outer twin of `n1` (survives, re-paired with `t_p`).
        t_n: HalfedgeHandle,
        /// Outer twin of `p1` (survives).
        t_p: HalfedgeHandle,
        /// The merged edge (incident to the surviving vertex).
        keep_edge: EdgeHandle,
        /// The duplicate edge (incident to the vanishing vertex, deleted).
        gone_edge: EdgeHandle,
        /// The vertex opposite the collapsed edge.
        opposite: VertexHandle,
    },
    /// A real face with more than three sides, or a boundary loop: the
    /// collapsed halfedge is simply unlinked from the cycle.
    Unlink {
        face: FaceSlot,
        n1: HalfedgeHandle,
        p1: HalfedgeHandle,
    },
}

impl HalfedgeMesh {
    /// Flips an interior edge between two triangles, so that it connects
    /// the two previously opposite vertices.
    ///
    /// Returns `false` (and changes nothing) if `e` is a boundary edge, an
    /// adjacent face is not a triangle, or the two opposite vertices
    /// coincide (two triangles glued along more than one edge). A flip
    /// neither allocates nor deletes: handles, the compressed flag and the
    /// canonical flag all stay intact.
    pub fn flip(&mut self, e: EdgeHandle) -> bool {
        //          Before             |            After
        //          ------             |            -----
        //                             |
        //             (C)             |             (C)
        //           ^/   \            |           ^/ ^|  \
        //          //     \           |          //  ||   \
        //      a2 //       \ a1       |      a2 //   ||    \ a1
        //        //   [A]   \         |        //    ||     \
        //       //           \v       |       //     ||      \v
        //      /      ha       \      |      /   [B] || [A]   \
        //    (U)  ---------->  (V)    |    (U)    hb || ha    (V)
        //      ^\ <----------  /      |      \       ||       /
        //        \     hb     //      |        \     ||      //
        //      b1 \   [B]    // b2    |      b1 \    ||     // b2
        //          \        //        |          \   |v    //
        //           \      //         |           \  |    //
        //            \    /v          |            \v|   /v
        //             (D)             |              (D)
        //
        let ha = self.halfedge_of_edge(e);
        let hb = self.twin(ha);
        if !self.is_real(ha) || !self.is_real(hb) {
            return false;
        }

        let fa = self.face_of(ha).unwrap();
        let fb = self.face_of(hb).unwrap();
        if self.degree_of_face(fa) != 3 || self.degree_of_face(fb) != 3 {
            return false;
        }

        let a1 = self.next(ha);
        let a2 = self.next(a1);
        let b1 = self.next(hb);
        let b2 = self.next(b1);

        let v_u = self.tail_of(ha);
        let v_v = self.tail_of(hb);
        let v_c = self.tail_of(a2);
        let v_d = self.tail_of(b2);

        // Two triangles sharing their opposite vertex form a pillow; the
        // flipped edge would be a self loop.
        if v_c == v_d {
            return false;
        }

        // The center halfedges now run between the opposite vertices.
        self[ha].vertex = v_d;
        self[hb].vertex = v_c;

        self[ha].next = a2;
        self[a2].next = b1;
        self[b1].next = ha;
        self[hb].next = b2;
        self[b2].next = a1;
        self[a1].next = hb;

        self[b1].face = FaceSlot::Real(fa);
        self[a1].face = FaceSlot::Real(fb);
        self[fa].halfedge = Opt::some(ha);
        self[fb].halfedge = Opt::some(hb);

        // `outgoing` of (U) and (V) may have been a center halfedge, which
        // now emanates from somewhere else. The replacements are real, so
        // the boundary-vertex guarantee is not endangered.
        if self[v_u].halfedge == Opt::some(ha) {
            self[v_u].halfedge = Opt::some(b1);
        }
        if self[v_v].halfedge == Opt::some(hb) {
            self[v_v].halfedge = Opt::some(a1);
        }

        true
    }

    /// Inserts a new vertex along `e`, splitting it into two edges. The
    /// degrees of both adjacent faces grow by one; no face is created.
    ///
    /// Returns the halfedge pointing away from the new vertex in the
    /// direction of `e.halfedge`; the returned halfedge is the
    /// representative halfedge of its (new) edge.
    pub fn insert_vertex_along_edge(&mut self, e: EdgeHandle) -> HalfedgeHandle {
        //             ha               |          ha            ha2
        //    (U) ------------> (V)     |   (U) -------> (M) ------------> (V)
        //        <------------         |       <------- (M) <------------
        //             hb               |          hb             hb2
        //
        // `ha` keeps its tail (U), `hb` is re-tailed to (M); the new pair
        // `ha2`/`hb2` forms the second edge. That way both halves keep the
        // direction of the original `e.halfedge`.
        let ha = self.halfedge_of_edge(e);
        let hb = self.twin(ha);
        let v_tip = self.tip_of(ha);
        let boundary = self.is_boundary_edge(e);

        let prev_b = self.prev(hb);
        let next_a = self.next(ha);
        let face_a = self[ha].face;
        let face_b = self[hb].face;

        let m = self.push_vertex(Opt::none(), boundary);

        let e2 = self.push_edge(Opt::none());
        let ha2 = self.push_halfedge(Opt::none(), next_a, m, e2, face_a);
        let hb2 = self.push_halfedge(Opt::some(ha2), hb, v_tip, e2, face_b);
        self.halfedges.raw_mut(ha2).twin = Opt::some(hb2);
        self.edges.raw_mut(e2).halfedge = Opt::some(ha2);

        self[ha].next = ha2;
        self[hb].vertex = m;
        self[prev_b].next = hb2;

        // (V) lost `hb` as outgoing halfedge; `hb2` is its drop-in
        // replacement (same reality).
        if self[v_tip].halfedge == Opt::some(hb) {
            self[v_tip].halfedge = Opt::some(hb2);
        }

        // (M) needs a real outgoing halfedge. `e.halfedge` is real whenever
        // the edge has a real side, so `ha2` only fails to qualify if `ha`
        // was imaginary, in which case `hb` is real.
        let m_out = if self.is_real(ha2) { ha2 } else { hb };
        self.vertices.raw_mut(m).halfedge = Opt::some(m_out);

        self.canonical = false;

        ha2
    }

    /// Splits `e` and its adjacent real faces, which must be triangles.
    /// The new vertex is connected to the vertices opposite `e`, producing
    /// four triangles (two if `e` is a boundary edge). Returns the new
    /// vertex.
    pub fn split_edge(&mut self, e: EdgeHandle) -> Result<VertexHandle, MutationError> {
        self.split_edge_return_halfedge(e).map(|he| self.tail_of(he))
    }

    /// Like [`split_edge`][Self::split_edge], but returns the halfedge that
    /// emanates from the new vertex in the direction of the original
    /// `e.halfedge`.
    pub fn split_edge_return_halfedge(
        &mut self,
        e: EdgeHandle,
    ) -> Result<HalfedgeHandle, MutationError> {
        let ha = self.halfedge_of_edge(e);
        let hb = self.twin(ha);
        for side in [ha, hb] {
            if let Some(f) = self.face_of(side) {
                if self.degree_of_face(f) != 3 {
                    return Err(MutationError::NotTriangular { edge: e });
                }
            }
        }

        // After the insert, each real side is a quad with the new vertex
        // (M) as one corner; cutting from (M) to the opposite quad corner
        // restores triangles.
        //
        //            (W)                      (W)
        //          ⟋    ↖                  ⟋  ^|  ↖
        //        ⟋        ⟍              ⟋    ||    ⟍
        //      ⟋            ⟍          ⟋      ||      ⟍
        //     ↙      [A]      ⟍       ↙       ||        ⟍
        //   (U) ----> (M) ----> (V)  (U) ---> (M) -----> (V)
        //        ha        he             ha   ||   he
        //
        let he = self.insert_vertex_along_edge(e);
        let m = self.tail_of(he);

        if let Some(f) = self.face_of(he) {
            let opposite = self.tail_of(self.next(self.next(he)));
            self.connect_vertices_in_face(f, m, opposite)
                .expect("internal hem error: quad corner not connectable after edge insert");
        }
        if let Some(f) = self.face_of(hb) {
            let opposite = self.tail_of(self.next(self.next(hb)));
            self.connect_vertices_in_face(f, m, opposite)
                .expect("internal hem error: quad corner not connectable after edge insert");
        }

        Ok(he)
    }

    /// Puts a new vertex inside `f` and replaces the face by a fan of
    /// triangles around it. Returns the new vertex.
    pub fn insert_vertex(&mut self, f: FaceHandle) -> VertexHandle {
        // For a face of degree N this adds N spoke edges (2N halfedges) and
        // N - 1 faces; the old face lives on as the last fan triangle.
        //
        //               (A)               |               (A)
        //              /   ^              |             / ^ | ^
        //             /     \             |            /  | |  \
        //            /       \            |           /   | |   \
        //           /         \           |          /    | v    \
        //          /           \          |         /     (M)     \
        //         /             \         |        /    ↗⟋   ↖⟍    \
        //        v               \        |       v   ⟋⟋       ⟍⟍   \
        //      (B) ------------> (C)      |      (B) ------------> (C)
        //
        let border: SmallVec<[HalfedgeHandle; 8]> = self.halfedges_around_face(f).collect();
        let deg = border.len();

        let m = self.push_vertex(Opt::none(), false);
        let dummy = HalfedgeHandle::new(NONE_IDX);

        // One spoke per corner: `spokes[i]` runs (M) -> tail of border[i].
        let mut spokes = SmallVec::<[HalfedgeHandle; 8]>::new();
        for &b in &border {
            let v = self.tail_of(b);
            let e = self.push_edge(Opt::none());
            let out = self.push_halfedge(Opt::none(), dummy, m, e, FaceSlot::Real(f));
            let back = self.push_halfedge(Opt::some(out), dummy, v, e, FaceSlot::Real(f));
            self.halfedges.raw_mut(out).twin = Opt::some(back);
            self.edges.raw_mut(e).halfedge = Opt::some(out);
            spokes.push(out);
        }

        // Build the fan triangles [spoke_i, border_i, twin(spoke_{i+1})].
        for i in 0..deg {
            let out = spokes[i];
            let b = border[i];
            let back = self.twin(spokes[(i + 1) % deg]);

            let face = if i + 1 < deg {
                self.push_face(Opt::some(b))
            } else {
                self[f].halfedge = Opt::some(b);
                f
            };

            self[out].next = b;
            self[b].next = back;
            self[back].next = out;
            self[out].face = FaceSlot::Real(face);
            self[b].face = FaceSlot::Real(face);
            self[back].face = FaceSlot::Real(face);
        }

        self.vertices.raw_mut(m).halfedge = Opt::some(spokes[0]);
        self.canonical = false;

        m
    }

    /// Connects two vertices of a common face by a new edge, splitting the
    /// face in two. The vertices must be distinct, not yet adjacent, and lie
    /// on the boundary of a common real face.
    ///
    /// Returns the new halfedge with `v_a` at its tail; the face of its twin
    /// is the new face.
    pub fn connect_vertices(
        &mut self,
        v_a: VertexHandle,
        v_b: VertexHandle,
    ) -> Result<HalfedgeHandle, MutationError> {
        let err = MutationError::NotConnectable { from: v_a, to: v_b };
        if v_a == v_b || self.are_vertices_adjacent(v_a, v_b) {
            return Err(err);
        }

        let face = self
            .faces_around_vertex(v_a)
            .find(|&f| self.vertices_around_face(f).any(|v| v == v_b))
            .ok_or(err)?;

        self.connect_vertices_in_face(face, v_a, v_b)
    }

    /// Like [`connect_vertices`][Self::connect_vertices] with the common
    /// face already known (saving the face search). Only membership of both
    /// vertices in `f` is checked.
    pub fn connect_vertices_in_face(
        &mut self,
        f: FaceHandle,
        v_a: VertexHandle,
        v_b: VertexHandle,
    ) -> Result<HalfedgeHandle, MutationError> {
        //           before                        after
        //
        //      ---> (A) --->                 ---> (A) --->
        //     pa    he_a                    pa   ^ | he_a
        //            [F]                         | |
        //                            =>     [F]  | |  [N]
        //     he_b    pb                    new  | | new twin
        //      <--- (B) <---                     | v  pb
        //                                    <--- (B) <---
        //
        // [F] keeps the cycle (new, he_b, …, pa), the split-off cycle
        // (new twin, he_a, …, pb) becomes the new face [N].
        let err = MutationError::NotConnectable { from: v_a, to: v_b };
        if v_a == v_b {
            return Err(err);
        }

        let he_a = self
            .halfedges_around_face(f)
            .find(|&he| self.tail_of(he) == v_a)
            .ok_or(err)?;
        let he_b = self
            .halfedges_around_face(f)
            .find(|&he| self.tail_of(he) == v_b)
            .ok_or(err)?;

        let p_a = self.prev(he_a);
        let p_b = self.prev(he_b);

        let e_new = self.push_edge(Opt::none());
        let he_new = self.push_halfedge(Opt::none(), he_b, v_a, e_new, FaceSlot::Real(f));
        let he_new_twin = self.push_halfedge(Opt::some(he_new), he_a, v_b, e_new, FaceSlot::Real(f));
        self.halfedges.raw_mut(he_new).twin = Opt::some(he_new_twin);
        self.edges.raw_mut(e_new).halfedge = Opt::some(he_new);

        self[p_a].next = he_new;
        self[p_b].next = he_new_twin;
        self[f].halfedge = Opt::some(he_new);

        let f_new = self.push_face(Opt::some(he_new_twin));
        let mut current = he_new_twin;
        loop {
            self[current].face = FaceSlot::Real(f_new);
            current = self[current].next;
            if current == he_new_twin {
                break;
            }
        }

        self.canonical = false;

        Ok(he_new)
    }

    /// Like [`connect_vertices`][Self::connect_vertices], but returns `None`
    /// instead of an error when the vertices cannot be connected.
    pub fn try_connect_vertices(
        &mut self,
        v_a: VertexHandle,
        v_b: VertexHandle,
    ) -> Option<HalfedgeHandle> {
        self.connect_vertices(v_a, v_b).ok()
    }

    /// Like
    /// [`connect_vertices_in_face`][Self::connect_vertices_in_face], but
    /// returns `None` instead of an error.
    pub fn try_connect_vertices_in_face(
        &mut self,
        f: FaceHandle,
        v_a: VertexHandle,
        v_b: VertexHandle,
    ) -> Option<HalfedgeHandle> {
        self.connect_vertices_in_face(f, v_a, v_b).ok()
    }

    /// Contracts `e` into a single vertex. Returns the surviving vertex
    /// (the tail of `e.halfedge`), or `None` (changing nothing) if the
    /// collapse would break manifoldness.
    ///
    /// The refusal predicate is the link condition: the common neighbors of
    /// the two endpoints must be exactly the vertices opposite `e` in its
    /// adjacent triangles. On top of that, a collapse that would merge two
    /// boundary components (both endpoints on a boundary, `e` interior) is
    /// refused.
    ///
    /// Adjacent triangles degenerate into 2-gons and are removed, with
    /// their two remaining edges merged; faces of higher degree and
    /// boundary loops just lose one side.
    pub fn collapse_edge(&mut self, e: EdgeHandle) -> Option<VertexHandle> {
        //             (W)                            (W)
        //           ↙ ^  ⟍                          ↙ ^
        //         ⟋ ⟋|\↖   ⟍ t_n                 ⟋ ⟋ |
        //    p1 ⟋ ⟋  | \ ⟍n1 ⟍              t_p⟋ ⟋   | t_n
        //     ⟋ ⟋t_p |  \  ⟍   ⟍              ⟋ ⟋    |
        //    v        |[A]v   ⟍   v           v v     |
        //   (K) =====(e)====> (G)      =>        (K/G)
        //        ha  [B]  hb
        //
        // (K) survives, (G) vanishes into it; the triangle [A] collapses to
        // a 2-gon whose duplicate edges merge (t_n and t_p become twins).
        let ha = self.halfedge_of_edge(e);
        let hb = self.twin(ha);
        let v_keep = self.tail_of(ha);
        let v_gone = self.tail_of(hb);
        if v_keep == v_gone {
            return None;
        }

        // Both sides inside the same cycle means `e` is a bridge inside one
        // face (or loop); contracting it is not a local operation.
        if self[ha].face == self[hb].face {
            return None;
        }

        // Collapsing an interior edge between two boundary vertices would
        // pinch the surface (or merge two boundary loops).
        let boundary_edge = self.is_boundary_edge(e);
        if !boundary_edge
            && self.is_boundary_vertex(v_keep)
            && self.is_boundary_vertex(v_gone)
        {
            return None;
        }

        // Gather what happens on each side, refusing degenerate setups.
        let mut sides = SmallVec::<[CollapseSide; 2]>::new();
        let mut opposite = SmallVec::<[VertexHandle; 2]>::new();
        for h in [ha, hb] {
            let n1 = self.next(h);
            let p1 = self.prev(h);
            match self[h].face {
                FaceSlot::Real(face) => {
                    let deg = self.degree_of_face(face);
                    if deg < 3 {
                        return None;
                    }
                    if deg > 3 {
                        sides.push(CollapseSide::Unlink { face: FaceSlot::Real(face), n1, p1 });
                        continue;
                    }

                    let t_n = self.twin(n1);
                    let t_p = self.twin(p1);
                    // Merging the side edges must leave a real halfedge for
                    // the merged edge (a lone boundary-to-boundary 2-gon has
                    // none).
                    if !self.is_real(t_n) && !self.is_real(t_p) {
                        return None;
                    }

                    // The edge incident to the vanishing vertex dies, the
                    // one incident to the survivor is kept.
                    let (keep_edge, gone_edge) = if self.tail_of(h) == v_keep {
                        (self.edge_of(p1), self.edge_of(n1))
                    } else {
                        (self.edge_of(n1), self.edge_of(p1))
                    };

                    opposite.push(self.tail_of(p1));
                    sides.push(CollapseSide::Triangle {
                        face,
                        n1,
                        p1,
                        t_n,
                        t_p,
                        keep_edge,
                        gone_edge,
                        opposite: self.tail_of(p1),
                    });
                }
                FaceSlot::Boundary(b) => {
                    sides.push(CollapseSide::Unlink { face: FaceSlot::Boundary(b), n1, p1 });
                }
            }
        }

        // Two triangles folded onto the same opposite vertex form a pillow;
        // collapsing it would not leave a surface.
        if opposite.len() == 2 && opposite[0] == opposite[1] {
            return None;
        }

        // The link condition: every vertex adjacent to both endpoints must
        // be one of the opposite vertices.
        let gone_neighbors: SmallVec<[VertexHandle; 8]> =
            self.vertices_around_vertex(v_gone).collect();
        for n in self.vertices_around_vertex(v_keep) {
            if gone_neighbors.contains(&n) && !opposite.contains(&n) {
                return None;
            }
        }

        // ===== Point of no return: rewire ======================================

        // Every halfedge leaving the vanishing vertex is re-tailed to the
        // survivor (including `hb`, which is deleted below anyway).
        let outgoing: SmallVec<[HalfedgeHandle; 8]> =
            self.outgoing_halfedges(v_gone).collect();
        for &out in &outgoing {
            self[out].vertex = v_keep;
        }

        let mut keep_out = None;
        for side in &sides {
            match *side {
                CollapseSide::Triangle {
                    face, n1, p1, t_n, t_p, keep_edge, gone_edge, opposite,
                } => {
                    // Merge the two side edges: the outer twins pair up on
                    // the kept edge.
                    self[t_n].twin = Opt::some(t_p);
                    self[t_p].twin = Opt::some(t_n);
                    self[t_n].edge = keep_edge;
                    self[t_p].edge = keep_edge;
                    let representative = if self.is_real(t_p) { t_p } else { t_n };
                    self[keep_edge].halfedge = Opt::some(representative);

                    self.kill_halfedge(n1);
                    self.kill_halfedge(p1);
                    self.kill_edge(gone_edge);
                    self.kill_face(face);

                    // `t_p` leaves the survivor, `t_n` leaves the opposite
                    // vertex; both had their outgoing halfedge inside the
                    // removed triangle potentially.
                    keep_out = Some(t_p);
                    let w_out = self.rotate_to_real(t_n);
                    self[opposite].halfedge = Opt::some(w_out);
                }
                CollapseSide::Unlink { face, n1, p1 } => {
                    self[p1].next = n1;
                    // The cycle's representative halfedge may have been the
                    // unlinked one; `n1` is always still in the cycle.
                    match face {
                        FaceSlot::Real(f) => self[f].halfedge = Opt::some(n1),
                        FaceSlot::Boundary(b) => self[b].halfedge = Opt::some(n1),
                    }
                    keep_out.get_or_insert(n1);
                }
            }
        }

        self.kill_halfedge(ha);
        self.kill_halfedge(hb);
        self.kill_edge(e);

        let gone_boundary = self[v_gone].is_boundary;
        self.kill_vertex(v_gone);
        if gone_boundary {
            self[v_keep].is_boundary = true;
        }

        let start = keep_out.expect("internal hem error: edge with no adjacent cycle");
        let keep_he = self.rotate_to_real(start);
        self[v_keep].halfedge = Opt::some(keep_he);

        self.canonical = false;

        Some(v_keep)
    }

    /// Cuts `f` into triangles by repeatedly connecting the corner at
    /// `f.halfedge` to the second-next corner. Returns all resulting faces
    /// (just `[f]` if it already is a triangle).
    pub fn triangulate(&mut self, f: FaceHandle) -> Vec<FaceHandle> {
        let mut out = Vec::new();

        while self.degree_of_face(f) > 3 {
            let anchor = self.halfedge_of_face(f);
            let v_a = self.tail_of(anchor);
            let v_b = self.tail_of(self.next(self.next(anchor)));

            let he = self
                .connect_vertices_in_face(f, v_a, v_b)
                .expect("internal hem error: face corners not connectable");
            let triangle = self
                .face_of(self.twin(he))
                .expect("internal hem error: new halfedge without face");
            out.push(triangle);
        }

        out.push(f);
        out
    }

    /// Makes `he` the representative halfedge of `e`. `he` must belong to
    /// `e`.
    pub fn set_edge_halfedge(&mut self, e: EdgeHandle, he: HalfedgeHandle) {
        assert!(
            self.edge_of(he) == e,
            "{:?} does not belong to {:?} in `set_edge_halfedge`",
            he,
            e,
        );
        self[e].halfedge = Opt::some(he);
        self.canonical = false;
    }
}
