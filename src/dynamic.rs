//! Dynamic handles: element references that survive compaction.
//!
//! A plain handle is a bare slot index: fast, but meaningless after
//! [`compress`][crate::HalfedgeMesh::compress] or
//! [`canonicalize`][crate::HalfedgeMesh::canonicalize]. A dynamic handle
//! instead registers with the mesh's [callback
//! registry][crate::callback]: every compaction moves its slot index along
//! (via the fired permutation), deletion of its element or of the whole
//! mesh neutralizes it to null. The price is one registration per handle
//! and a `resolve` step before navigating, so dynamic handles are for the
//! few references an algorithm keeps across mutations, not for bulk
//! storage.
//!
//! Identity is `(mesh id, element id)`, both of which survive compaction,
//! which
//! makes dynamic handles usable as hash-map keys across mutations.

use std::{
    cell::{Cell, RefCell},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

use crate::{
    callback::{CallbackToken, MeshCallbacks, MeshElement},
    handle::{
        hsize, BoundaryLoopHandle, EdgeHandle, FaceHandle, Handle, HalfedgeHandle, VertexHandle,
        NONE_IDX,
    },
    HalfedgeMesh,
};


fn register_slot<K: MeshElement>(
    callbacks: &Rc<RefCell<MeshCallbacks>>,
    slot: &Rc<Cell<hsize>>,
) -> (CallbackToken, CallbackToken) {
    let mut callbacks_mut = callbacks.borrow_mut();

    let weak = Rc::downgrade(slot);
    let permute_token = callbacks_mut.add_permute(K::KIND, Box::new(move |permutation| {
        if let Some(slot) = weak.upgrade() {
            let old = slot.get();
            if old == NONE_IDX {
                return;
            }
            // `permutation[new] = old`, so the new slot is the position of
            // the old one. A missing old slot means the element was a
            // tombstone and is gone now.
            match permutation.iter().position(|&o| o == old) {
                Some(new) => slot.set(new as hsize),
                None => slot.set(NONE_IDX),
            }
        }
    }));

    let weak = Rc::downgrade(slot);
    let delete_token = callbacks_mut.add_delete(Box::new(move || {
        if let Some(slot) = weak.upgrade() {
            slot.set(NONE_IDX);
        }
    }));

    (permute_token, delete_token)
}

macro_rules! make_dynamic_handle {
    ($(#[$attr:meta])* $name:ident => $handle:ident, $id_method:ident, $contains:ident) => {
        $(#[$attr])*
        pub struct $name {
            slot: Rc<Cell<hsize>>,
            id: u64,
            mesh_id: u64,
            registry: Weak<RefCell<MeshCallbacks>>,
            permute_token: CallbackToken,
            delete_token: CallbackToken,
        }

        impl $name {
            /// Creates a dynamic handle for the given live element.
            pub fn new(mesh: &HalfedgeMesh, handle: $handle) -> Self {
                assert!(
                    mesh.$contains(handle),
                    "{:?} does not refer to a live element of this mesh",
                    handle,
                );

                let slot = Rc::new(Cell::new(handle.idx()));
                let (permute_token, delete_token) =
                    register_slot::<$handle>(&mesh.callbacks, &slot);

                Self {
                    slot,
                    id: mesh.$id_method(handle),
                    mesh_id: mesh.mesh_id(),
                    registry: Rc::downgrade(&mesh.callbacks),
                    permute_token,
                    delete_token,
                }
            }

            /// Resolves to a plain handle, or `None` if the element or its
            /// mesh no longer exists.
            ///
            /// The result is only as durable as any other plain handle:
            /// re-resolve after the next compaction.
            pub fn resolve(&self) -> Option<$handle> {
                let slot = self.slot.get();
                if slot == NONE_IDX {
                    None
                } else {
                    Some($handle::new(slot))
                }
            }

            /// The id of the referenced element.
            pub fn id(&self) -> u64 {
                self.id
            }

            /// The id of the mesh the element belongs to.
            pub fn mesh_id(&self) -> u64 {
                self.mesh_id
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                // Each clone needs its own registration; a handle whose
                // mesh is already gone stays permanently unregistered.
                let slot = Rc::new(Cell::new(self.slot.get()));
                let (registry, permute_token, delete_token) = match self.registry.upgrade() {
                    Some(callbacks) => {
                        let tokens = register_slot::<$handle>(&callbacks, &slot);
                        (self.registry.clone(), tokens.0, tokens.1)
                    }
                    None => (Weak::new(), CallbackToken(u64::MAX), CallbackToken(u64::MAX)),
                };

                Self {
                    slot,
                    id: self.id,
                    mesh_id: self.mesh_id,
                    registry,
                    permute_token,
                    delete_token,
                }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                if let Some(registry) = self.registry.upgrade() {
                    let mut registry = registry.borrow_mut();
                    registry.remove_permute(<$handle as MeshElement>::KIND, self.permute_token);
                    registry.remove_delete(self.delete_token);
                }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.mesh_id == other.mesh_id && self.id == other.id
            }
        }
        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.mesh_id.hash(state);
                self.id.hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "(mesh {}, id {}, slot {:?})"),
                    self.mesh_id,
                    self.id,
                    self.resolve(),
                )
            }
        }
    };
}

make_dynamic_handle!(
    /// A vertex reference that stays valid across compaction.
    DynVertexHandle => VertexHandle, vertex_id, contains_vertex
);
make_dynamic_handle!(
    /// An edge reference that stays valid across compaction.
    DynEdgeHandle => EdgeHandle, edge_id, contains_edge
);
make_dynamic_handle!(
    /// A face reference that stays valid across compaction.
    DynFaceHandle => FaceHandle, face_id, contains_face
);
make_dynamic_handle!(
    /// A halfedge reference that stays valid across compaction.
    DynHalfedgeHandle => HalfedgeHandle, halfedge_id, contains_halfedge
);
make_dynamic_handle!(
    /// A boundary-loop reference that stays valid across compaction.
    DynBoundaryLoopHandle => BoundaryLoopHandle, boundary_loop_id, contains_boundary_loop
);
