//! Dynamic topology: an editable triangle mesh paired with its operation log.
//!
//! [`DynTopo`] is the only way to hold a [`DynMesh`]: the mesh and the log
//! are created together on enable and dropped together on disable, so a
//! mesh without a log (or a log without a mesh) cannot be represented.
//!
//! Every topology edit goes through the methods here, which record a
//! [`LogOp`] in the open entry before mutating.

mod log;
mod mesh;
mod remesh;

use tracing::debug;

pub use log::{DynLog, LogEntry, LogOp};
pub use mesh::{DynFace, DynMesh};
pub use remesh::{RemeshSettings, RemeshStats};

use crate::error::{SculptError, SculptResult};
use crate::mesh::{Mesh, VertexAttributeStore, VertexData};

/// How dynamic topology is turned off.
#[derive(Debug, Clone)]
pub enum DisableMode {
    /// Put back the mesh captured when dynamic topology was enabled
    Restore(Mesh),
    /// Compact the current triangle mesh into a static mesh
    Bake,
}

/// Editable triangle mesh and the log of every edit made to it.
#[derive(Debug, Clone)]
pub struct DynTopo {
    mesh: DynMesh,
    log: DynLog,
}

impl DynTopo {
    /// Convert a static mesh, triangulating it if any face is not a
    /// triangle.
    pub fn from_mesh(mesh: &Mesh) -> SculptResult<Self> {
        let dyn_mesh = if mesh.is_triangulated() {
            DynMesh::from_mesh(mesh)
        } else {
            debug!(
                "Triangulating {} faces ({} corners) for dynamic topology",
                mesh.face_count(),
                mesh.corner_count()
            );
            DynMesh::from_mesh(&mesh.triangulated())
        };
        if !dyn_mesh.is_valid() {
            return Err(SculptError::Invariant("dynamic mesh built inconsistent"));
        }
        Ok(Self {
            mesh: dyn_mesh,
            log: DynLog::new(),
        })
    }

    pub fn mesh(&self) -> &DynMesh {
        &self.mesh
    }

    pub fn log(&self) -> &DynLog {
        &self.log
    }

    /// Attribute arrays for in-place brush writes. Callers record the
    /// touched vertices with [`DynTopo::log_modified`] first.
    pub fn attrs_mut(&mut self) -> &mut VertexAttributeStore {
        &mut self.mesh.verts
    }

    pub fn begin_entry(&mut self) {
        self.log.begin_entry();
    }

    pub fn end_entry(&mut self) -> Option<usize> {
        self.log.end_entry()
    }

    /// Record the current attributes of `verts` before they are modified.
    pub fn log_modified(&mut self, verts: &[u32]) {
        for &v in verts {
            if self.mesh.is_vert_alive(v) {
                self.log.vert_before_modified(&self.mesh, v);
            }
        }
    }

    /// Undo the most recent applied entry. Returns false when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        let undone = self.log.undo(&mut self.mesh);
        if undone {
            self.recalc_all_normals();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.log.redo(&mut self.mesh);
        if redone {
            self.recalc_all_normals();
        }
        redone
    }

    pub(crate) fn recalc_normals_for(&mut self, verts: &[u32]) {
        self.mesh.recalc_normals_for(verts);
    }

    pub(crate) fn recalc_all_normals(&mut self) {
        let verts: Vec<u32> = (0..self.mesh.vertex_slots() as u32).collect();
        self.mesh.recalc_normals_for(&verts);
    }

    /// Compact back into a static mesh, dropping the log.
    pub fn into_mesh(self) -> Mesh {
        self.mesh.to_mesh()
    }

    pub(crate) fn add_vert(&mut self, data: &VertexData) -> u32 {
        let id = self.mesh.add_vert(data);
        self.log.push(LogOp::AddVert { id, data: *data });
        id
    }

    pub(crate) fn kill_vert(&mut self, id: u32) {
        let data = self.mesh.kill_vert(id);
        self.log.push(LogOp::RemoveVert { id, data });
    }

    pub(crate) fn add_face(&mut self, face: DynFace) -> u32 {
        let id = self.mesh.add_face(face);
        self.log.push(LogOp::AddFace { id, face });
        id
    }

    pub(crate) fn remove_face(&mut self, id: u32) -> Option<DynFace> {
        let face = self.mesh.remove_face(id)?;
        self.log.push(LogOp::RemoveFace { id, face });
        Some(face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quads_are_triangulated_on_enable() {
        let topo = DynTopo::from_mesh(&Mesh::cube(1.0)).unwrap();
        assert_eq!(topo.mesh().face_count(), 12);
        assert_eq!(topo.mesh().vertex_count(), 8);
        assert_eq!(topo.log().entry_count(), 0);
    }

    #[test]
    fn test_logged_edits_undo_and_redo() {
        let mut topo = DynTopo::from_mesh(&Mesh::grid(1, 1, 1.0)).unwrap();
        topo.begin_entry();
        let data = topo.mesh().verts.interpolate(0, 3, 0.5);
        let center = topo.add_vert(&data);
        let face = topo.remove_face(0).unwrap();
        for replaced in face.verts {
            let mut new_face = face;
            new_face.verts = face.verts.map(|v| if v == replaced { center } else { v });
            topo.add_face(new_face);
        }
        topo.end_entry();
        assert_eq!(topo.mesh().face_count(), 4);
        assert_eq!(topo.mesh().vertex_count(), 5);

        assert!(topo.undo());
        assert_eq!(topo.mesh().face_count(), 2);
        assert_eq!(topo.mesh().vertex_count(), 4);
        assert!(topo.mesh().is_valid());

        assert!(topo.redo());
        assert_eq!(topo.mesh().face_count(), 4);
        assert!(topo.mesh().is_vert_alive(center));
        assert!(topo.mesh().is_valid());
        assert!(!topo.redo());
    }

    #[test]
    fn test_bake_compacts() {
        let topo = DynTopo::from_mesh(&Mesh::grid(2, 2, 1.0)).unwrap();
        let mesh = topo.into_mesh();
        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(mesh.face_count(), 8);
        assert!(mesh.is_triangulated());
    }
}
