//! Construction of a halfedge mesh from a polygon soup.
//!
//! The soup is purely combinatorial: a vertex count and one vertex-index
//! cycle per polygon. Whatever per-vertex data the caller has (positions,
//! usually) stays outside; slot indices of a freshly built mesh equal soup
//! indices, so moving that data into an attribute map afterwards is a
//! straight copy.

use ahash::AHashMap;
use failure::Fail;
use optional::Optioned as Opt;

use crate::handle::{
    hsize, BoundaryLoopHandle, EdgeHandle, Handle, HalfedgeHandle, VertexHandle, NONE_IDX,
};
use super::{FaceSlot, HalfedgeMesh};
use leer::Empty;


/// The ways a polygon soup can fail to describe a manifold surface.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum BuildError {
    /// The soup has no vertices or no polygons.
    #[fail(display = "polygon soup is empty")]
    EmptyInput,

    /// A directed edge occurs twice (inconsistent orientation or a doubled
    /// face), an edge is used by more than two polygons, or two boundary
    /// fans meet in one vertex.
    #[fail(
        display = "polygon soup is not an oriented manifold at edge ({}, {})",
        from, to
    )]
    NonManifoldInput { from: hsize, to: hsize },

    /// Two boundary fans meet in one vertex (a pinch point).
    #[fail(display = "polygon soup pinches the surface at vertex {}", vertex)]
    NonManifoldVertex { vertex: hsize },

    /// Walking a boundary loop did not return to its starting halfedge.
    #[fail(display = "boundary loop starting at vertex {} does not close", vertex)]
    NonClosedBoundary { vertex: hsize },

    /// A vertex is referenced by no polygon. Every vertex of a manifold
    /// surface has at least one incident face, so there is no way to
    /// represent such a vertex.
    #[fail(display = "vertex {} is not referenced by any polygon", vertex)]
    IsolatedVertex { vertex: hsize },

    /// A polygon has fewer than three sides, repeats a vertex or indexes
    /// past the vertex list.
    #[fail(display = "polygon {} is malformed", polygon)]
    BadPolygon { polygon: usize },
}

/// State of one directed vertex pair in the twin-resolution map.
enum DirectedEdge {
    /// Seen once; stores the halfedge waiting for its twin.
    Unpaired(HalfedgeHandle),
    /// Both directions seen, twins linked.
    Paired,
}

impl HalfedgeMesh {
    /// Builds a mesh from a polygon soup: `num_vertices` vertices and one
    /// counter-clockwise vertex-index cycle per polygon.
    ///
    /// The resulting mesh is [compressed][Self::is_compressed] and
    /// [canonical][Self::is_canonical]: vertices sit in soup order, faces in
    /// polygon order, halfedges in face-traversal order (imaginary ones
    /// after all real ones, in boundary-loop order) and edges in
    /// first-encounter order.
    ///
    /// Fails if the soup does not describe an oriented 2-manifold surface
    /// (with or without boundary); see [`BuildError`] for the individual
    /// conditions.
    pub fn from_polygons(
        num_vertices: hsize,
        polygons: &[Vec<hsize>],
    ) -> Result<Self, BuildError> {
        if num_vertices == 0 || polygons.is_empty() {
            return Err(BuildError::EmptyInput);
        }

        let mut mesh = HalfedgeMesh::empty();

        for _ in 0..num_vertices {
            mesh.push_vertex(Opt::none(), false);
        }

        // Dummies to wire freshly pushed halfedges with. Every one of these
        // is overwritten before construction finishes; `finish_edges` and the
        // boundary stage check the `edge` dummy to find unprocessed
        // halfedges.
        let dummy_he = HalfedgeHandle::new(NONE_IDX);
        let dummy_edge = EdgeHandle::new(NONE_IDX);

        // ===== Real faces and twin resolution ======================================

        let mut directed = AHashMap::<(hsize, hsize), DirectedEdge>::with_capacity(
            polygons.len() * 4,
        );

        for (pi, polygon) in polygons.iter().enumerate() {
            if polygon.len() < 3 {
                return Err(BuildError::BadPolygon { polygon: pi });
            }
            for (i, &vi) in polygon.iter().enumerate() {
                let out_of_range = vi >= num_vertices;
                let repeated = polygon[..i].contains(&vi);
                if out_of_range || repeated {
                    return Err(BuildError::BadPolygon { polygon: pi });
                }
            }

            let f = mesh.push_face(Opt::none());
            let first_he = HalfedgeHandle::new(mesh.halfedges.len());

            for (i, &vi) in polygon.iter().enumerate() {
                let from = vi;
                let to = polygon[(i + 1) % polygon.len()];

                let he = mesh.push_halfedge(
                    Opt::none(),
                    dummy_he,
                    VertexHandle::new(from),
                    dummy_edge,
                    FaceSlot::Real(f),
                );

                // Twin resolution. Seeing the same direction twice means the
                // soup is not an oriented manifold.
                if directed.contains_key(&(from, to)) {
                    return Err(BuildError::NonManifoldInput { from, to });
                }
                let waiting_twin = match directed.get(&(to, from)) {
                    Some(&DirectedEdge::Unpaired(other)) => Some(other),
                    Some(DirectedEdge::Paired) => {
                        return Err(BuildError::NonManifoldInput { from, to });
                    }
                    None => None,
                };
                match waiting_twin {
                    Some(other) => {
                        mesh.halfedges.raw_mut(he).twin = Opt::some(other);
                        mesh.halfedges.raw_mut(other).twin = Opt::some(he);
                        directed.insert((to, from), DirectedEdge::Paired);
                        directed.insert((from, to), DirectedEdge::Paired);
                    }
                    None => {
                        directed.insert((from, to), DirectedEdge::Unpaired(he));
                    }
                }

                let vh = VertexHandle::new(from);
                if mesh.vertices.raw(vh).halfedge.is_none() {
                    mesh.vertices.raw_mut(vh).halfedge = Opt::some(he);
                }
            }

            // Link `next` around the polygon.
            let deg = polygon.len() as hsize;
            for i in 0..deg {
                let he = HalfedgeHandle::new(first_he.idx() + i);
                let next = HalfedgeHandle::new(first_he.idx() + (i + 1) % deg);
                mesh.halfedges.raw_mut(he).next = next;
            }
            mesh.faces.raw_mut(f).halfedge = Opt::some(first_he);
        }

        for v in 0..num_vertices {
            if mesh.vertices.raw(VertexHandle::new(v)).halfedge.is_none() {
                return Err(BuildError::IsolatedVertex { vertex: v });
            }
        }

        // ===== Boundary loops ======================================================

        // Every halfedge still without a twin bounds the mesh; it gets an
        // imaginary twin. On a manifold surface each boundary vertex has
        // exactly one outgoing imaginary halfedge, which is what lets us
        // stitch the loops purely through this map.
        let num_real = mesh.halfedges.len();
        let mut boundary_out = AHashMap::<VertexHandle, HalfedgeHandle>::new();

        for i in 0..num_real {
            let he = HalfedgeHandle::new(i);
            if mesh.halfedges.raw(he).twin.is_some() {
                continue;
            }

            let from = mesh.halfedges.raw(he).vertex;
            let to = mesh.halfedges.raw(mesh.halfedges.raw(he).next).vertex;

            // The imaginary twin runs `to -> from`. Its `next` and loop are
            // stitched below; until then it carries dummies.
            let imaginary = mesh.push_halfedge(
                Opt::some(he),
                dummy_he,
                to,
                dummy_edge,
                FaceSlot::Boundary(BoundaryLoopHandle::new(NONE_IDX)),
            );
            mesh.halfedges.raw_mut(he).twin = Opt::some(imaginary);

            if boundary_out.insert(to, imaginary).is_some() {
                return Err(BuildError::NonManifoldVertex { vertex: to.idx() });
            }
            mesh.vertices.raw_mut(to).is_boundary = true;
        }

        // Stitch each loop: the successor of an imaginary halfedge is the
        // unique imaginary halfedge leaving its tip.
        let num_all = mesh.halfedges.len();
        for i in num_real..num_all {
            let start = HalfedgeHandle::new(i);
            if mesh.halfedges.raw(start).face.boundary().map(|b| b.idx()) != Some(NONE_IDX) {
                continue;
            }

            let b = mesh.push_boundary_loop(Opt::some(start));
            let mut current = start;
            let mut steps: hsize = 0;
            loop {
                steps += 1;
                if steps > num_all - num_real {
                    return Err(BuildError::NonClosedBoundary {
                        vertex: mesh.halfedges.raw(start).vertex.idx(),
                    });
                }

                mesh.halfedges.raw_mut(current).face = FaceSlot::Boundary(b);

                // Tip of the imaginary halfedge = tail of its real twin.
                let twin = mesh.halfedges.raw(current).twin.unpack();
                let tip = mesh.halfedges.raw(twin).vertex;
                let next = match boundary_out.get(&tip) {
                    Some(&next) => next,
                    None => {
                        return Err(BuildError::NonClosedBoundary { vertex: tip.idx() });
                    }
                };

                mesh.halfedges.raw_mut(current).next = next;
                if next == start {
                    break;
                }
                current = next;
            }
        }

        // ===== Edges ===============================================================

        // One pass in halfedge slot order: each edge is created at its first
        // seen halfedge, which makes edge order the face-traversal
        // first-encounter order (and picks the real halfedge as `e.halfedge`
        // for boundary edges, since all imaginary slots come last).
        for i in 0..num_all {
            let he = HalfedgeHandle::new(i);
            if mesh.halfedges.raw(he).edge != dummy_edge {
                continue;
            }

            let e = mesh.push_edge(Opt::some(he));
            let twin = mesh.halfedges.raw(he).twin.unpack();
            mesh.halfedges.raw_mut(he).edge = e;
            mesh.halfedges.raw_mut(twin).edge = e;
        }

        mesh.compressed = true;
        mesh.canonical = true;

        Ok(mesh)
    }
}
