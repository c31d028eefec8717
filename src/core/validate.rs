//! Exhaustive connectivity checking.
//!
//! [`validate_connectivity`][HalfedgeMesh::validate_connectivity] walks the
//! whole structure and verifies every invariant the mesh promises. A failure
//! always means a bug in this crate (or memory corruption), never a user
//! error, which is why the mutation operations don't run it themselves; the
//! test suite calls it after every operation.

use std::fmt;

use failure::Fail;

use crate::handle::Handle;
use super::HalfedgeMesh;


/// A violated connectivity invariant: which one, and the id of the first
/// offending element (if the violation is local to one element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub element_id: Option<u64>,
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.element_id {
            Some(id) => write!(f, "connectivity violation (element id {}): {}", id, self.reason),
            None => write!(f, "connectivity violation: {}", self.reason),
        }
    }
}

impl Fail for ValidationError {}

macro_rules! ensure {
    ($cond:expr, $id:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(ValidationError {
                element_id: $id,
                reason: format!($($msg)+),
            });
        }
    };
}

impl HalfedgeMesh {
    /// Checks every connectivity invariant and returns the first violation
    /// found, if any.
    pub fn validate_connectivity(&self) -> Result<(), ValidationError> {
        let num_all = self.num_all_halfedges();

        // ----- per-halfedge local invariants ---------------------------------------------------
        let mut real_count = 0;
        for (h, he) in self.halfedges.iter() {
            let id = Some(he.id);

            let twin = he.twin.unpack();
            ensure!(
                self.halfedges.contains(twin),
                id,
                "[{:?}].twin = {:?}, but that halfedge does not exist", h, twin
            );
            ensure!(twin != h, id, "[{:?}] is its own twin", h);
            ensure!(
                self.halfedges.raw(twin).twin.unpack() == h,
                id,
                "[{:?}].twin = {:?}, but [{:?}].twin = {:?}",
                h, twin, twin, self.halfedges.raw(twin).twin.unpack()
            );

            ensure!(
                self.halfedges.contains(he.next),
                id,
                "[{:?}].next = {:?}, but that halfedge does not exist", h, he.next
            );
            ensure!(
                self.vertices.contains(he.vertex),
                id,
                "[{:?}].vertex = {:?}, but that vertex does not exist", h, he.vertex
            );
            ensure!(
                self.edges.contains(he.edge),
                id,
                "[{:?}].edge = {:?}, but that edge does not exist", h, he.edge
            );
            match he.face {
                super::FaceSlot::Real(f) => {
                    real_count += 1;
                    ensure!(
                        self.faces.contains(f),
                        id,
                        "[{:?}].face = {:?}, but that face does not exist", h, f
                    );
                }
                super::FaceSlot::Boundary(b) => {
                    ensure!(
                        self.boundary_loops.contains(b),
                        id,
                        "[{:?}].face = {:?}, but that boundary loop does not exist", h, b
                    );
                }
            }

            ensure!(
                self.halfedges.raw(twin).edge == he.edge,
                id,
                "[{:?}].edge = {:?}, but [{:?}].edge = {:?}",
                h, he.edge, twin, self.halfedges.raw(twin).edge
            );
            ensure!(
                he.is_real() || self.halfedges.raw(twin).is_real(),
                id,
                "both halfedges of {:?} are imaginary", he.edge
            );
            // Neither the builder nor any mutation can produce a self loop;
            // one in the structure means a rewiring went wrong.
            ensure!(
                self.halfedges.raw(twin).vertex != he.vertex,
                id,
                "{:?} is a self loop (both halfedges start at {:?})", he.edge, he.vertex
            );

            // Tail of `next` equals head of `h`.
            ensure!(
                self.halfedges.raw(he.next).vertex == self.halfedges.raw(twin).vertex,
                id,
                "[{:?}].next.vertex = {:?}, but [{:?}].twin.vertex = {:?}",
                h,
                self.halfedges.raw(he.next).vertex,
                h,
                self.halfedges.raw(twin).vertex
            );
            ensure!(
                self.halfedges.raw(he.next).face == he.face,
                id,
                "[{:?}].next = {:?} lies in a different cycle", h, he.next
            );
        }

        ensure!(
            real_count == self.num_real,
            None,
            "{} real halfedges counted, but the mesh claims {}", real_count, self.num_real
        );
        ensure!(
            self.num_real + self.num_imaginary == self.halfedges.num_live(),
            None,
            "real + imaginary halfedge counts do not add up to the pool's live count"
        );

        // ----- back references and cycles ------------------------------------------------------
        for (e, record) in self.edges.iter() {
            let he = record.halfedge.unpack();
            ensure!(
                self.halfedges.contains(he),
                Some(record.id),
                "[{:?}].halfedge = {:?}, but that halfedge does not exist", e, he
            );
            ensure!(
                self.halfedges.raw(he).edge == e,
                Some(record.id),
                "[{:?}].halfedge = {:?}, but [{:?}].edge = {:?}",
                e, he, he, self.halfedges.raw(he).edge
            );
        }

        // Face cycles (real and boundary): each closes, stays in its face,
        // and together they must partition all live halfedges.
        let mut visited = vec![false; self.halfedges.len() as usize];
        for (f, record) in self.faces.iter() {
            let start = record.halfedge.unpack();
            ensure!(
                self.halfedges.contains(start),
                Some(record.id),
                "[{:?}].halfedge = {:?}, but that halfedge does not exist", f, start
            );

            let mut current = start;
            let mut steps = 0;
            loop {
                steps += 1;
                ensure!(
                    steps <= num_all,
                    Some(record.id),
                    "cycle of {:?} does not close", f
                );
                ensure!(
                    self.halfedges.raw(current).face == super::FaceSlot::Real(f),
                    Some(record.id),
                    "[{:?}].face != {:?} while walking the cycle of {:?}", current, f, f
                );
                ensure!(
                    !visited[current.to_usize()],
                    Some(record.id),
                    "{:?} is part of two face cycles", current
                );
                visited[current.to_usize()] = true;

                current = self.halfedges.raw(current).next;
                if current == start {
                    break;
                }
            }
        }
        for (b, record) in self.boundary_loops.iter() {
            let start = record.halfedge.unpack();
            ensure!(
                self.halfedges.contains(start),
                Some(record.id),
                "[{:?}].halfedge = {:?}, but that halfedge does not exist", b, start
            );

            let mut current = start;
            let mut steps = 0;
            loop {
                steps += 1;
                ensure!(
                    steps <= num_all,
                    Some(record.id),
                    "cycle of {:?} does not close", b
                );
                ensure!(
                    self.halfedges.raw(current).face == super::FaceSlot::Boundary(b),
                    Some(record.id),
                    "[{:?}].face != {:?} while walking the cycle of {:?}", current, b, b
                );
                ensure!(
                    !visited[current.to_usize()],
                    Some(record.id),
                    "{:?} is part of two cycles", current
                );
                visited[current.to_usize()] = true;

                current = self.halfedges.raw(current).next;
                if current == start {
                    break;
                }
            }
        }
        for (h, he) in self.halfedges.iter() {
            ensure!(
                visited[h.to_usize()],
                Some(he.id),
                "{:?} is part of no face or boundary loop cycle", h
            );
        }

        // Vertex orbits: the stored halfedge is a real outgoing one, the
        // orbit closes and covers each outgoing halfedge exactly once, and
        // the boundary flag matches the orbit.
        let mut visited = vec![false; self.halfedges.len() as usize];
        for (v, record) in self.vertices.iter() {
            let start = record.halfedge.unpack();
            ensure!(
                self.halfedges.contains(start),
                Some(record.id),
                "[{:?}].halfedge = {:?}, but that halfedge does not exist", v, start
            );
            ensure!(
                self.halfedges.raw(start).is_real(),
                Some(record.id),
                "[{:?}].halfedge = {:?} is imaginary", v, start
            );

            let mut on_boundary = false;
            let mut current = start;
            let mut steps = 0;
            loop {
                steps += 1;
                ensure!(
                    steps <= num_all,
                    Some(record.id),
                    "outgoing orbit of {:?} does not close", v
                );
                ensure!(
                    self.halfedges.raw(current).vertex == v,
                    Some(record.id),
                    "[{:?}].vertex = {:?} while walking the orbit of {:?}",
                    current, self.halfedges.raw(current).vertex, v
                );
                ensure!(
                    !visited[current.to_usize()],
                    Some(record.id),
                    "{:?} shows up in two vertex orbits", current
                );
                visited[current.to_usize()] = true;
                on_boundary |= !self.halfedges.raw(current).is_real();

                let twin = self.halfedges.raw(current).twin.unpack();
                current = self.halfedges.raw(twin).next;
                if current == start {
                    break;
                }
            }

            ensure!(
                record.is_boundary == on_boundary,
                Some(record.id),
                "[{:?}].is_boundary = {}, but its orbit says {}", v, record.is_boundary, on_boundary
            );
        }
        for (h, he) in self.halfedges.iter() {
            ensure!(
                visited[h.to_usize()],
                Some(he.id),
                "{:?} is part of no vertex orbit", h
            );
        }

        // ----- global consistency --------------------------------------------------------------
        // The total genus derived from the Euler characteristic must be a
        // non-negative integer.
        let chi = self.num_vertices() as i64 - self.num_edges() as i64 + self.num_faces() as i64;
        let components = self.num_connected_components() as i64;
        let b = self.num_boundary_loops() as i64;
        let genus_numerator = 2 * components - chi - b;
        ensure!(
            genus_numerator >= 0 && genus_numerator % 2 == 0,
            None,
            "V - E + F = {} is not consistent with a 2-manifold ({} components, {} boundary loops)",
            chi, components, b
        );

        Ok(())
    }
}
