//! The connectivity test suite.
//!
//! Every scenario validates the full invariant set after each operation, so
//! a broken rewiring shows up as a named violation instead of a wrong count
//! three assertions later.


use std::{cell::Cell, rc::Rc};

use leer::Empty as _;

use crate::{
    dynamic::DynVertexHandle,
    map::VertexAttr,
    prelude::*,
    BuildError, MutationError,
};


// ===============================================================================================
// ===== Fixture meshes
// ===============================================================================================

//
//         (C)
//        /   \
//       /     \
//      /       \
//    (A) ----- (B)
//
fn triangle() -> HalfedgeMesh {
    HalfedgeMesh::from_polygons(3, &[vec![0, 1, 2]]).unwrap()
}

//
//         (C) ----- (D)
//        /   \  Y  /
//       /  X  \   /
//      /       \ /
//    (A) ----- (B)
//
// X = [A, B, C], Y = [B, D, C]; the shared edge is B--C.
fn two_triangles() -> HalfedgeMesh {
    HalfedgeMesh::from_polygons(4, &[vec![0, 1, 2], vec![1, 3, 2]]).unwrap()
}

//
//    (D) ----- (C)
//     |         |
//     |         |
//    (A) ----- (B)
//
fn quad() -> HalfedgeMesh {
    HalfedgeMesh::from_polygons(4, &[vec![0, 1, 2, 3]]).unwrap()
}

//
//             (T)
//            / | \
//           /  |  \
//          /  (C)  \
//         / ⟋    ⟍ \
//       (A) ------- (B)
//
// Closed surface: bottom [A, C, B] plus three sides.
fn tetrahedron() -> HalfedgeMesh {
    HalfedgeMesh::from_polygons(
        4,
        &[vec![0, 2, 1], vec![0, 1, 3], vec![1, 2, 3], vec![2, 0, 3]],
    )
    .unwrap()
}

/// The 7-vertex triangulation of the torus: faces `[i, i+1, i+3]` and
/// `[i, i+3, i+2]` (indices mod 7). Every vertex has valence 6.
fn torus() -> HalfedgeMesh {
    let mut polygons = Vec::new();
    for i in 0..7u32 {
        polygons.push(vec![i, (i + 1) % 7, (i + 3) % 7]);
        polygons.push(vec![i, (i + 3) % 7, (i + 2) % 7]);
    }
    HalfedgeMesh::from_polygons(7, &polygons).unwrap()
}

/// The per-vertex neighbor sets, keyed by vertex id: a cheap fingerprint of
/// the connectivity that ignores slot order.
fn neighbor_fingerprint(mesh: &HalfedgeMesh) -> Vec<(u64, Vec<u64>)> {
    let mut out: Vec<_> = mesh
        .vertex_handles()
        .map(|v| {
            let mut neighbors: Vec<_> = mesh
                .vertices_around_vertex(v)
                .map(|n| mesh.vertex_id(n))
                .collect();
            neighbors.sort_unstable();
            (mesh.vertex_id(v), neighbors)
        })
        .collect();
    out.sort_unstable();
    out
}


// ===============================================================================================
// ===== Builder
// ===============================================================================================

#[test]
fn empty_mesh() {
    let mesh = HalfedgeMesh::empty();
    check_counts!(mesh; 0, 0, 0, 0);
    assert!(mesh.is_compressed());
    assert!(mesh.is_canonical());
    mesh.validate_connectivity().unwrap();
}

#[test]
fn single_triangle() {
    let mesh = triangle();
    check_counts!(mesh; 3, 3, 1, 1);
    assert_eq!(mesh.num_halfedges(), 3);
    assert_eq!(mesh.num_imaginary_halfedges(), 3);
    assert_eq!(mesh.num_corners(), 3);
    assert_eq!(mesh.euler_characteristic(), 0);
    assert_eq!(mesh.num_interior_vertices(), 0);
    assert!(mesh.is_compressed());
    assert!(mesh.is_canonical());
    mesh.validate_connectivity().unwrap();

    let [va, vb, vc] = [mesh.vertex_at(0), mesh.vertex_at(1), mesh.vertex_at(2)];
    for v in [va, vb, vc] {
        assert!(mesh.is_boundary_vertex(v));
        assert_eq!(mesh.valence(v), 2);
    }

    let f = mesh.face_at(0);
    assert_eq!(mesh.degree_of_face(f), 3);
    assert_eq_set!(mesh.vertices_around_face(f), [va, vb, vc]);
    assert_eq_set!(mesh.vertices_around_vertex(va), [vb, vc]);

    let bl = mesh.boundary_loop_at(0);
    assert_eq!(mesh.degree_of_boundary_loop(bl), 3);
    assert_eq_set!(mesh.vertices_around_boundary_loop(bl), [va, vb, vc]);
    for he in mesh.halfedges_around_boundary_loop(bl) {
        assert!(!mesh.is_real(he));
        assert_eq!(mesh.boundary_loop_of(he), Some(bl));
    }

    // All three edges are boundary edges and their representative halfedge
    // is the real one.
    for e in mesh.edge_handles() {
        assert!(mesh.is_boundary_edge(e));
        assert!(mesh.is_real(mesh.halfedge_of_edge(e)));
    }
}

#[test]
fn two_triangles_shared_edge() {
    let mesh = two_triangles();
    check_counts!(mesh; 4, 5, 2, 1);
    assert_eq!(mesh.euler_characteristic(), 0);
    mesh.validate_connectivity().unwrap();

    let [va, vb, vc, vd] = [
        mesh.vertex_at(0),
        mesh.vertex_at(1),
        mesh.vertex_at(2),
        mesh.vertex_at(3),
    ];

    assert_eq_set!(mesh.vertices_around_vertex(vb), [va, vc, vd]);
    assert_eq_set!(mesh.vertices_around_vertex(va), [vb, vc]);

    let shared = mesh.edge_between_vertices(vb, vc).unwrap();
    assert!(!mesh.is_boundary_edge(shared));
    for e in mesh.edge_handles().filter(|&e| e != shared) {
        assert!(mesh.is_boundary_edge(e));
    }

    let [fx, fy] = [mesh.face_at(0), mesh.face_at(1)];
    assert!(mesh.are_faces_adjacent(fx, fy));
    assert_eq_set!(mesh.faces_around_vertex(vb), [fx, fy]);
    assert_eq_set!(mesh.faces_around_vertex(va), [fx]);
}

#[test]
fn tetrahedron_is_closed() {
    let mesh = tetrahedron();
    check_counts!(mesh; 4, 6, 4, 0);
    assert_eq!(mesh.num_imaginary_halfedges(), 0);
    assert_eq!(mesh.euler_characteristic(), 2);
    assert_eq!(mesh.genus(), 0);
    assert_eq!(mesh.num_connected_components(), 1);
    assert_eq!(mesh.num_interior_vertices(), 4);
    assert_eq!(mesh.longest_boundary_loop(), 0);
    assert!(mesh.is_simplicial());
    mesh.validate_connectivity().unwrap();

    for v in mesh.vertex_handles() {
        assert!(!mesh.is_boundary_vertex(v));
        assert_eq!(mesh.valence(v), 3);
    }
}

#[test]
fn minimal_torus() {
    let mesh = torus();
    check_counts!(mesh; 7, 21, 14, 0);
    assert_eq!(mesh.euler_characteristic(), 0);
    assert_eq!(mesh.genus(), 1);
    assert_eq!(mesh.num_connected_components(), 1);
    mesh.validate_connectivity().unwrap();

    for v in mesh.vertex_handles() {
        assert_eq!(mesh.valence(v), 6);
    }
}

#[test]
fn two_components() {
    let mesh = HalfedgeMesh::from_polygons(6, &[vec![0, 1, 2], vec![3, 4, 5]]).unwrap();
    check_counts!(mesh; 6, 6, 2, 2);
    assert_eq!(mesh.num_connected_components(), 2);
    assert_eq!(mesh.euler_characteristic(), 0);
    mesh.validate_connectivity().unwrap();
}

#[test]
fn corners_are_halfedge_views() {
    let mesh = two_triangles();
    assert_eq!(mesh.num_corners(), 6);

    for c in mesh.corner_handles() {
        let he = mesh.halfedge_of_corner(c);
        assert!(mesh.is_real(he));
        assert_eq!(mesh.corner_of(he), Some(c));
        assert_eq!(mesh.vertex_of_corner(c), mesh.tail_of(he));
        assert_eq!(mesh.face_of_corner(c), mesh.face_of(he).unwrap());
        assert_eq!(mesh.next_corner(c).halfedge(), mesh.next(he));
    }

    for v in mesh.vertex_handles() {
        assert_eq!(
            mesh.corners_around_vertex(v).count(),
            mesh.faces_around_vertex(v).count(),
        );
    }
}

#[test]
fn polygon_soup_roundtrip() {
    let mesh = two_triangles();
    let soup = mesh.polygon_soup_faces();
    let rebuilt = HalfedgeMesh::from_polygons(mesh.num_vertices(), &soup).unwrap();
    assert_eq!(neighbor_fingerprint(&mesh), neighbor_fingerprint(&rebuilt));
}

// ----- builder failures ------------------------------------------------------------------------

#[test]
fn build_empty_input() {
    assert_eq!(
        HalfedgeMesh::from_polygons(0, &[]).unwrap_err(),
        BuildError::EmptyInput,
    );
    assert_eq!(
        HalfedgeMesh::from_polygons(3, &[]).unwrap_err(),
        BuildError::EmptyInput,
    );
}

#[test]
fn build_inconsistent_orientation() {
    // Both triangles traverse the edge (0, 1) in the same direction.
    let err = HalfedgeMesh::from_polygons(4, &[vec![0, 1, 2], vec![0, 1, 3]]).unwrap_err();
    assert_eq!(err, BuildError::NonManifoldInput { from: 0, to: 1 });
}

#[test]
fn build_triple_edge() {
    let polygons = [vec![0, 1, 2], vec![1, 0, 3], vec![1, 0, 4]];
    let err = HalfedgeMesh::from_polygons(5, &polygons).unwrap_err();
    assert_eq!(err, BuildError::NonManifoldInput { from: 1, to: 0 });
}

#[test]
fn build_pinch_vertex() {
    // Two triangles sharing only vertex 0: its boundary fan splits in two.
    let err = HalfedgeMesh::from_polygons(5, &[vec![0, 1, 2], vec![0, 3, 4]]).unwrap_err();
    assert_eq!(err, BuildError::NonManifoldVertex { vertex: 0 });
}

#[test]
fn build_isolated_vertex() {
    let err = HalfedgeMesh::from_polygons(4, &[vec![0, 1, 2]]).unwrap_err();
    assert_eq!(err, BuildError::IsolatedVertex { vertex: 3 });
}

#[test]
fn build_bad_polygons() {
    let degenerate = HalfedgeMesh::from_polygons(3, &[vec![0, 1]]).unwrap_err();
    assert_eq!(degenerate, BuildError::BadPolygon { polygon: 0 });

    let repeated = HalfedgeMesh::from_polygons(3, &[vec![0, 1, 1]]).unwrap_err();
    assert_eq!(repeated, BuildError::BadPolygon { polygon: 0 });

    let out_of_range = HalfedgeMesh::from_polygons(3, &[vec![0, 1, 2], vec![0, 2, 7]]).unwrap_err();
    assert_eq!(out_of_range, BuildError::BadPolygon { polygon: 1 });
}


// ===============================================================================================
// ===== Flip
// ===============================================================================================

#[test]
fn flip_refuses_boundary_edge() {
    let mut mesh = triangle();
    let before = neighbor_fingerprint(&mesh);

    for e in mesh.edge_handles().collect::<Vec<_>>() {
        assert!(!mesh.flip(e));
    }

    assert_eq!(neighbor_fingerprint(&mesh), before);
    mesh.validate_connectivity().unwrap();
}

#[test]
fn flip_interior_edge() {
    let mut mesh = two_triangles();
    let [va, vb, vc, vd] = [
        mesh.vertex_at(0),
        mesh.vertex_at(1),
        mesh.vertex_at(2),
        mesh.vertex_at(3),
    ];
    let shared = mesh.edge_between_vertices(vb, vc).unwrap();

    assert!(mesh.flip(shared));
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 4, 5, 2, 1);

    // The edge now connects the previously opposite vertices.
    assert_eq_set!(mesh.endpoints_of_edge(shared).into_iter(), [va, vd]);
    assert!(mesh.are_vertices_adjacent(va, vd));
    assert!(!mesh.are_vertices_adjacent(vb, vc));

    // No allocation, no deletion: the flags survive.
    assert!(mesh.is_compressed());
    assert!(mesh.is_canonical());
}

#[test]
fn flip_is_involutive() {
    let mut mesh = tetrahedron();
    let before = neighbor_fingerprint(&mesh);

    for e in mesh.edge_handles().collect::<Vec<_>>() {
        assert!(mesh.flip(e));
        mesh.validate_connectivity().unwrap();
        check_counts!(mesh; 4, 6, 4, 0);
        assert_eq!(mesh.euler_characteristic(), 2);

        assert!(mesh.flip(e));
        mesh.validate_connectivity().unwrap();
        assert_eq!(neighbor_fingerprint(&mesh), before);
    }
}

#[test]
fn flip_refuses_pillow() {
    // Two triangles glued along all three edges: every edge sees the same
    // opposite vertex on both sides, so flipping any of them would leave a
    // self-loop edge.
    let mut mesh = HalfedgeMesh::from_polygons(3, &[vec![0, 1, 2], vec![1, 0, 2]]).unwrap();
    check_counts!(mesh; 3, 3, 2, 0);
    assert_eq!(mesh.euler_characteristic(), 2);
    let before = neighbor_fingerprint(&mesh);

    for e in mesh.edge_handles().collect::<Vec<_>>() {
        assert!(!mesh.flip(e));
    }
    assert_eq!(neighbor_fingerprint(&mesh), before);
    mesh.validate_connectivity().unwrap();

    // The same configuration reached through a mutation is refused too.
    let mut mesh = tetrahedron();
    mesh.collapse_edge(mesh.edge_at(0)).unwrap();
    for e in mesh.edge_handles().collect::<Vec<_>>() {
        assert!(!mesh.flip(e));
    }
    mesh.validate_connectivity().unwrap();
}


// ===============================================================================================
// ===== Insert / split / connect
// ===============================================================================================

#[test]
fn insert_vertex_along_interior_edge() {
    let mut mesh = two_triangles();
    let [vb, vc] = [mesh.vertex_at(1), mesh.vertex_at(2)];
    let shared = mesh.edge_between_vertices(vb, vc).unwrap();
    let he_before = mesh.halfedge_of_edge(shared);
    let tail_before = mesh.tail_of(he_before);

    let he = mesh.insert_vertex_along_edge(shared);
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 5, 6, 2, 1);
    assert!(!mesh.is_canonical());
    assert!(mesh.is_compressed());

    // Both faces became quads.
    for f in mesh.face_handles() {
        assert_eq!(mesh.degree_of_face(f), 4);
    }

    let m = mesh.tail_of(he);
    assert_eq!(mesh.valence(m), 2);
    assert!(!mesh.is_boundary_vertex(m));
    assert_eq!(mesh.halfedge_of_edge(mesh.edge_of(he)), he);

    // Direction convention: the original representative still points the
    // same way, the new halfedge continues it through the new vertex.
    assert_eq!(mesh.halfedge_of_edge(shared), he_before);
    assert_eq!(mesh.tail_of(he_before), tail_before);
    assert_eq!(mesh.tip_of(he_before), m);
}

#[test]
fn insert_vertex_along_boundary_edge() {
    let mut mesh = triangle();
    let e = mesh.edge_at(0);

    let he = mesh.insert_vertex_along_edge(e);
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 4, 4, 1, 1);

    let m = mesh.tail_of(he);
    assert!(mesh.is_boundary_vertex(m));
    assert_eq!(mesh.valence(m), 2);
    assert_eq!(mesh.degree_of_face(mesh.face_at(0)), 4);
    assert_eq!(mesh.degree_of_boundary_loop(mesh.boundary_loop_at(0)), 4);
}

#[test]
fn insert_then_collapse_roundtrip() {
    let mut mesh = two_triangles();
    let before = neighbor_fingerprint(&mesh);
    let shared = {
        let [vb, vc] = [mesh.vertex_at(1), mesh.vertex_at(2)];
        mesh.edge_between_vertices(vb, vc).unwrap()
    };

    let he = mesh.insert_vertex_along_edge(shared);
    let m = mesh.tail_of(he);
    let survivor = mesh.collapse_edge(mesh.edge_of(he)).unwrap();
    assert_eq!(survivor, m);
    mesh.validate_connectivity().unwrap();

    check_counts!(mesh; 4, 5, 2, 1);

    // The surviving vertex took over the role of the collapsed endpoint:
    // the connectivity is isomorphic to the original.
    let mut after = neighbor_fingerprint(&mesh);
    let m_id = mesh.vertex_id(m);
    let gone_id = before
        .iter()
        .map(|(id, _)| *id)
        .find(|id| !after.iter().any(|(a, _)| a == id))
        .unwrap();
    for (id, neighbors) in &mut after {
        if *id == m_id {
            *id = gone_id;
        }
        for n in neighbors.iter_mut() {
            if *n == m_id {
                *n = gone_id;
            }
        }
        neighbors.sort_unstable();
    }
    after.sort_unstable();
    assert_eq!(after, before);
}

#[test]
fn split_interior_edge() {
    let mut mesh = two_triangles();
    let [vb, vc] = [mesh.vertex_at(1), mesh.vertex_at(2)];
    let shared = mesh.edge_between_vertices(vb, vc).unwrap();

    let m = mesh.split_edge(shared).unwrap();
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 5, 8, 4, 1);
    assert!(mesh.is_simplicial());
    assert_eq!(mesh.valence(m), 4);
    assert!(!mesh.is_boundary_vertex(m));
    assert_eq!(mesh.euler_characteristic(), 0);
    assert_eq_set!(mesh.vertices_around_vertex(m), [vb, vc, mesh.vertex_at(0), mesh.vertex_at(3)]);
}

#[test]
fn split_boundary_edge() {
    let mut mesh = two_triangles();
    let [va, vb] = [mesh.vertex_at(0), mesh.vertex_at(1)];
    let e = mesh.edge_between_vertices(va, vb).unwrap();

    let he = mesh.split_edge_return_halfedge(e).unwrap();
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 5, 7, 3, 1);

    let m = mesh.tail_of(he);
    assert!(mesh.is_boundary_vertex(m));
    assert_eq!(mesh.valence(m), 3);
    assert!(mesh.is_simplicial());
}

#[test]
fn split_requires_triangles() {
    let mut mesh = quad();
    let e = mesh.edge_at(0);
    assert_eq!(
        mesh.split_edge(e).unwrap_err(),
        MutationError::NotTriangular { edge: e },
    );
}

#[test]
fn insert_vertex_fan() {
    let mut mesh = quad();
    let f = mesh.face_at(0);

    let m = mesh.insert_vertex(f);
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 5, 8, 4, 1);
    assert!(mesh.is_simplicial());
    assert_eq!(mesh.valence(m), 4);
    assert!(!mesh.is_boundary_vertex(m));
    assert_eq_set!(
        mesh.vertices_around_vertex(m),
        [mesh.vertex_at(0), mesh.vertex_at(1), mesh.vertex_at(2), mesh.vertex_at(3)],
    );
    // The new vertex touches every face of the fan.
    assert_eq!(mesh.faces_around_vertex(m).count(), 4);
}

#[test]
fn connect_vertices_in_quad() {
    let mut mesh = quad();
    let [va, vc] = [mesh.vertex_at(0), mesh.vertex_at(2)];

    let he = mesh.connect_vertices(va, vc).unwrap();
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 4, 5, 2, 1);
    assert!(mesh.is_simplicial());
    assert_eq!(mesh.tail_of(he), va);
    assert_eq!(mesh.tip_of(he), vc);

    // The twin's face is the newly created one.
    let new_face = mesh.face_of(mesh.twin(he)).unwrap();
    assert_ne!(new_face, mesh.face_of(he).unwrap());
}

#[test]
fn connect_vertices_preconditions() {
    let mut mesh = two_triangles();
    let [va, vb, vd] = [mesh.vertex_at(0), mesh.vertex_at(1), mesh.vertex_at(3)];

    // Already adjacent.
    assert_eq!(
        mesh.connect_vertices(va, vb).unwrap_err(),
        MutationError::NotConnectable { from: va, to: vb },
    );
    // Identical.
    assert!(mesh.try_connect_vertices(va, va).is_none());
    // No shared face.
    assert!(mesh.try_connect_vertices(va, vd).is_none());

    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 4, 5, 2, 1);
}

#[test]
fn triangulate_quad() {
    let mut mesh = quad();
    let f = mesh.face_at(0);

    let faces = mesh.triangulate(f);
    mesh.validate_connectivity().unwrap();
    assert_eq!(faces.len(), 2);
    check_counts!(mesh; 4, 5, 2, 1);
    assert!(mesh.is_simplicial());

    // The two triangles share exactly the one new interior edge.
    let interior: Vec<_> = mesh
        .edge_handles()
        .filter(|&e| !mesh.is_boundary_edge(e))
        .collect();
    assert_eq!(interior.len(), 1);
}

#[test]
fn triangulate_pentagon() {
    let mut mesh = HalfedgeMesh::from_polygons(5, &[vec![0, 1, 2, 3, 4]]).unwrap();
    let faces = mesh.triangulate(mesh.face_at(0));
    mesh.validate_connectivity().unwrap();
    assert_eq!(faces.len(), 3);
    assert!(mesh.is_simplicial());
    check_counts!(mesh; 5, 7, 3, 1);
}

#[test]
fn triangulate_leaves_triangles_alone() {
    let mut mesh = triangle();
    let f = mesh.face_at(0);
    assert_eq!(mesh.triangulate(f), vec![f]);
    assert!(mesh.is_canonical());
}

#[test]
fn set_edge_halfedge() {
    let mut mesh = two_triangles();
    let e = mesh.edge_at(0);
    let he = mesh.halfedge_of_edge(e);
    let twin = mesh.twin(he);

    mesh.set_edge_halfedge(e, twin);
    assert_eq!(mesh.halfedge_of_edge(e), twin);
    assert!(!mesh.is_canonical());
    mesh.validate_connectivity().unwrap();
}


// ===============================================================================================
// ===== Collapse
// ===============================================================================================

#[test]
fn collapse_interior_edge_of_tetrahedron() {
    let mut mesh = tetrahedron();
    let e = mesh.edge_at(0);

    let v = mesh.collapse_edge(e).unwrap();
    mesh.validate_connectivity().unwrap();

    // Two triangles vanish with the edge; the degenerate "pillow" of two
    // faces over three vertices remains a valid closed surface.
    check_counts!(mesh; 3, 3, 2, 0);
    assert_eq!(mesh.euler_characteristic(), 2);
    assert!(!mesh.is_compressed());
    assert!(mesh.contains_vertex(v));
}

#[test]
fn collapse_refuses_boundary_merge() {
    // Both endpoints of the shared edge are boundary vertices, but the edge
    // itself is interior: collapsing would pinch the surface.
    let mut mesh = two_triangles();
    let shared = {
        let [vb, vc] = [mesh.vertex_at(1), mesh.vertex_at(2)];
        mesh.edge_between_vertices(vb, vc).unwrap()
    };
    let before = neighbor_fingerprint(&mesh);

    assert_eq!(mesh.collapse_edge(shared), None);
    assert_eq!(neighbor_fingerprint(&mesh), before);
    mesh.validate_connectivity().unwrap();
}

#[test]
fn collapse_refuses_lone_triangle_edge() {
    let mut mesh = triangle();
    for e in mesh.edge_handles().collect::<Vec<_>>() {
        assert_eq!(mesh.collapse_edge(e), None);
    }
    check_counts!(mesh; 3, 3, 1, 1);
    mesh.validate_connectivity().unwrap();
}

#[test]
fn collapse_boundary_edge_of_strip() {
    //
    //    (C) ----- (D)
    //     | ⟍       |        Two quads? No: a strip of four triangles.
    //     |    ⟍    |
    //    (A) ----- (B) ----- (E)
    //
    // Soup: [A,B,C] is 0,1,2; [B,D,C] is 1,3,2; [B,E,D] is 1,4,3.
    let mut mesh = HalfedgeMesh::from_polygons(
        5,
        &[vec![0, 1, 2], vec![1, 3, 2], vec![1, 4, 3]],
    )
    .unwrap();
    check_counts!(mesh; 5, 7, 3, 1);

    // Collapse the boundary edge A--B.
    let e = mesh
        .edge_between_vertices(mesh.vertex_at(0), mesh.vertex_at(1))
        .unwrap();
    let v = mesh.collapse_edge(e).unwrap();
    mesh.validate_connectivity().unwrap();

    check_counts!(mesh; 4, 5, 2, 1);
    assert!(mesh.is_boundary_vertex(v));
    assert_eq!(mesh.euler_characteristic(), 0);
}

#[test]
fn collapse_legal_boundary_edge_with_interior_vertex() {
    //
    //    (C) ------- (D)
    //     | ⟍       ⟋ |
    //     |   ⟍   ⟋   |     Four triangles around the interior vertex B.
    //     |     (B)    |     C--D is a boundary edge whose only adjacent
    //     |   ⟋   ⟍   |     triangle has opposite vertex B, and B is the
    //     | ⟋       ⟍ |     only common neighbor of C and D: legal.
    //    (A) ------- (E)
    //
    // Triangles: [A,B,C], [B,D,C], [A,E,B], [E,D,B].
    let mut mesh = HalfedgeMesh::from_polygons(
        5,
        &[vec![0, 1, 2], vec![1, 3, 2], vec![0, 4, 1], vec![4, 3, 1]],
    )
    .unwrap();
    mesh.validate_connectivity().unwrap();

    let [vc, vd] = [mesh.vertex_at(2), mesh.vertex_at(3)];
    let e = mesh.edge_between_vertices(vc, vd).unwrap();
    assert!(mesh.is_boundary_edge(e));

    assert!(mesh.collapse_edge(e).is_some());
    mesh.validate_connectivity().unwrap();
    check_counts!(mesh; 4, 6, 3, 1);
    assert_eq!(mesh.euler_characteristic(), 0);
}

#[test]
fn collapse_refuses_extra_common_neighbor() {
    //
    //        (D)
    //       / | \
    //      /  |  \           An open cone: triangles [A,B,D], [B,C,D],
    //    (A)--+--(C)         [C,A,D] with apex (D) and boundary rim
    //      \  |  /           A--B--C. The endpoints of the rim edge A--B
    //       \ | /            share the neighbor C (around the rim) on top
    //        (B)             of the opposite vertex D, so the one-ring
    //                        intersection is {C, D}, not {D}: refused.
    //
    let mut mesh = HalfedgeMesh::from_polygons(
        4,
        &[vec![0, 1, 3], vec![1, 2, 3], vec![2, 0, 3]],
    )
    .unwrap();
    mesh.validate_connectivity().unwrap();

    let e = mesh
        .edge_between_vertices(mesh.vertex_at(0), mesh.vertex_at(1))
        .unwrap();
    assert!(mesh.is_boundary_edge(e));
    assert_eq!(mesh.collapse_edge(e), None);
    mesh.validate_connectivity().unwrap();
}


// ===============================================================================================
// ===== Compaction, attributes, dynamic handles, callbacks
// ===============================================================================================

#[test]
fn compress_removes_tombstones() {
    let mut mesh = tetrahedron();
    mesh.collapse_edge(mesh.edge_at(0)).unwrap();
    assert!(!mesh.is_compressed());

    let counts = (
        mesh.num_vertices(),
        mesh.num_edges(),
        mesh.num_faces(),
        mesh.num_halfedges(),
    );
    let before = neighbor_fingerprint(&mesh);

    mesh.compress();
    assert!(mesh.is_compressed());
    mesh.validate_connectivity().unwrap();

    assert_eq!(
        counts,
        (mesh.num_vertices(), mesh.num_edges(), mesh.num_faces(), mesh.num_halfedges()),
    );
    assert_eq!(neighbor_fingerprint(&mesh), before);

    // Live counts now equal capacities; element-by-index is legal again.
    assert_eq!(mesh.num_vertices(), mesh.vertex_capacity());
    assert_eq!(mesh.num_edges(), mesh.edge_capacity());
    assert_eq!(mesh.num_faces(), mesh.face_capacity());
    assert_eq!(mesh.num_all_halfedges(), mesh.halfedge_capacity());
    for i in 0..mesh.num_vertices() {
        assert!(mesh.contains_vertex(mesh.vertex_at(i)));
    }
}

#[test]
fn attributes_survive_compaction() {
    // The triangle strip from `collapse_boundary_edge_of_strip`: collapsing
    // A--B deletes vertex slot 1, so compaction shifts every later slot.
    let mut mesh = HalfedgeMesh::from_polygons(
        5,
        &[vec![0, 1, 2], vec![1, 3, 2], vec![1, 4, 3]],
    )
    .unwrap();
    let attr = VertexAttr::with_default(&mesh, u64::MAX);
    for v in mesh.vertex_handles().collect::<Vec<_>>() {
        attr.set(v, mesh.vertex_id(v));
    }

    let e = mesh
        .edge_between_vertices(mesh.vertex_at(0), mesh.vertex_at(1))
        .unwrap();
    mesh.collapse_edge(e).unwrap();
    mesh.compress();
    mesh.validate_connectivity().unwrap();

    // Every surviving vertex still carries its own value, in the new order.
    assert_eq!(attr.len(), mesh.vertex_capacity());
    assert_eq!(mesh.num_vertices(), 4);
    for v in mesh.vertex_handles() {
        assert_eq!(*attr.get(v), mesh.vertex_id(v));
    }
}

#[test]
fn dynamic_handles_track_compaction() {
    let mut mesh = tetrahedron();

    // Track the last vertex (slot 3): it is not incident to edge 0, but
    // compaction will shift its slot after the collapse below.
    let target = mesh.vertex_at(3);
    let dynamic = DynVertexHandle::new(&mesh, target);
    let target_id = mesh.vertex_id(target);

    let e = mesh.edge_at(0);
    let gone = mesh.tip_of(mesh.halfedge_of_edge(e));
    let dead_dynamic = DynVertexHandle::new(&mesh, gone);

    let survivor = mesh.collapse_edge(e).unwrap();
    assert_ne!(survivor, gone);

    // Until the next compaction a handle to a deleted element still
    // resolves to its (stale) slot…
    assert!(dead_dynamic.resolve().is_some());

    mesh.compress();

    // …afterwards it is neutralized, while live handles followed their
    // element to its new slot.
    assert_eq!(dead_dynamic.resolve(), None);
    let resolved = dynamic.resolve().unwrap();
    assert_eq!(mesh.vertex_id(resolved), target_id);
    assert_eq!(dynamic.id(), target_id);

    drop(mesh);
    assert_eq!(dynamic.resolve(), None);
}

#[test]
fn manual_callbacks() {
    let mut mesh = quad();

    let expansions = Rc::new(Cell::new(0u32));
    let permutation_len = Rc::new(Cell::new(None::<usize>));

    let counter = Rc::clone(&expansions);
    let expand_token = mesh.on_expand::<VertexHandle>(move |new_capacity| {
        assert!(new_capacity > 0);
        counter.set(counter.get() + 1);
    });

    let len_cell = Rc::clone(&permutation_len);
    mesh.on_permute::<VertexHandle>(move |p| {
        len_cell.set(Some(p.len()));
    });

    // Grow the vertex pool well past its initial capacity.
    for _ in 0..2 {
        for e in mesh.edge_handles().collect::<Vec<_>>() {
            mesh.insert_vertex_along_edge(e);
        }
    }
    assert!(expansions.get() > 0);

    // Deregistered callbacks stay quiet, even though doubling the vertex
    // count again is guaranteed to outgrow the pool.
    let fired_before = expansions.get();
    mesh.remove_expand_callback::<VertexHandle>(expand_token);
    for e in mesh.edge_handles().collect::<Vec<_>>() {
        mesh.insert_vertex_along_edge(e);
    }
    assert_eq!(expansions.get(), fired_before);

    // A vertex inserted along an edge has exactly its two split ends as
    // neighbors, so collapsing one of its edges is always legal.
    let he = mesh.insert_vertex_along_edge(mesh.edge_handles().next().unwrap());
    mesh.collapse_edge(mesh.edge_of(he)).unwrap();
    mesh.compress();
    assert_eq!(permutation_len.get(), Some(mesh.num_vertices() as usize));
}

#[test]
fn canonicalize_restores_builder_order() {
    let mut mesh = two_triangles();
    let shared = {
        let [vb, vc] = [mesh.vertex_at(1), mesh.vertex_at(2)];
        mesh.edge_between_vertices(vb, vc).unwrap()
    };
    mesh.split_edge(shared).unwrap();
    assert!(!mesh.is_canonical());

    mesh.canonicalize();
    assert!(mesh.is_canonical());
    assert!(mesh.is_compressed());
    mesh.validate_connectivity().unwrap();

    // Halfedges of each face occupy consecutive slots, faces in slot
    // order; the imaginary halfedges follow, ordered like their twins.
    let mut expected = 0;
    for f in mesh.face_handles() {
        for he in mesh.halfedges_around_face(f) {
            assert_eq!(he.idx(), expected);
            expected += 1;
        }
    }
    let mut last_twin = None;
    for i in expected..mesh.num_all_halfedges() {
        let he = mesh.halfedge_at(i);
        assert!(!mesh.is_real(he));
        let twin = mesh.twin(he).idx();
        assert!(twin < expected);
        if let Some(last) = last_twin {
            assert!(twin > last);
        }
        last_twin = Some(twin);
    }

    // Edges are numbered by first encounter along that halfedge order and
    // point at their lower halfedge.
    let mut seen_edges = 0;
    for i in 0..mesh.num_all_halfedges() {
        let he = mesh.halfedge_at(i);
        let e = mesh.edge_of(he);
        if mesh.halfedge_of_edge(e) == he {
            assert_eq!(e.idx(), seen_edges);
            seen_edges += 1;
        }
    }
    assert_eq!(seen_edges, mesh.num_edges());
}

#[test]
fn canonical_is_builder_fixed_point() {
    let mesh = two_triangles();
    let mut copy = mesh.clone();
    copy.canonical = false;
    copy.canonicalize();

    // The builder output already is in canonical order: re-canonicalizing
    // must not move anything.
    for v in mesh.vertex_handles() {
        assert_eq!(mesh.vertex_id(v), copy.vertex_id(v));
    }
    for he in mesh.all_halfedge_handles() {
        assert_eq!(mesh.halfedge_id(he), copy.halfedge_id(he));
    }
    for e in mesh.edge_handles() {
        assert_eq!(mesh.edge_id(e), copy.edge_id(e));
        assert_eq!(mesh.halfedge_of_edge(e), copy.halfedge_of_edge(e));
    }
}

#[test]
fn deep_copy_with_transfer() {
    let mut mesh = two_triangles();
    mesh.collapse_edge(mesh.edge_at(4)).unwrap();

    let (copy, transfer) = mesh.copy_with_transfer();
    copy.validate_connectivity().unwrap();
    assert_ne!(mesh.mesh_id(), copy.mesh_id());
    assert_eq!(neighbor_fingerprint(&mesh), neighbor_fingerprint(&copy));

    for v in mesh.vertex_handles() {
        let mapped = transfer.vertices[&mesh.vertex_id(v)];
        assert_eq!(copy.vertex_id(mapped), mesh.vertex_id(v));
    }
    for f in mesh.face_handles() {
        let mapped = transfer.faces[&mesh.face_id(f)];
        assert_eq!(copy.face_id(mapped), mesh.face_id(f));
    }
}

#[test]
fn attribute_length_matches_capacity_throughout() {
    let mut mesh = two_triangles();
    let vertices = VertexAttr::with_default(&mesh, 0u8);
    let edges = crate::map::EdgeAttr::with_default(&mesh, 0u8);
    let faces = crate::map::FaceAttr::with_default(&mesh, 0u8);
    let halfedges = crate::map::HalfedgeAttr::with_default(&mesh, 0u8);

    let check = |mesh: &HalfedgeMesh,
                 vertices: &VertexAttr<u8>,
                 edges: &crate::map::EdgeAttr<u8>,
                 faces: &crate::map::FaceAttr<u8>,
                 halfedges: &crate::map::HalfedgeAttr<u8>| {
        assert_eq!(vertices.len(), mesh.vertex_capacity());
        assert_eq!(edges.len(), mesh.edge_capacity());
        assert_eq!(faces.len(), mesh.face_capacity());
        assert_eq!(halfedges.len(), mesh.halfedge_capacity());
    };

    check(&mesh, &vertices, &edges, &faces, &halfedges);

    let shared = mesh
        .edge_between_vertices(mesh.vertex_at(1), mesh.vertex_at(2))
        .unwrap();
    mesh.split_edge(shared).unwrap();
    check(&mesh, &vertices, &edges, &faces, &halfedges);

    mesh.collapse_edge(mesh.edge_handles().next().unwrap()).unwrap();
    check(&mesh, &vertices, &edges, &faces, &halfedges);

    mesh.compress();
    check(&mesh, &vertices, &edges, &faces, &halfedges);

    mesh.canonicalize();
    check(&mesh, &vertices, &edges, &faces, &halfedges);
}
