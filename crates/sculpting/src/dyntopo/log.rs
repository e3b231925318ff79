//! Operation log for dynamic topology undo and redo.
//!
//! Every topology edit made through [`DynTopo`](super::DynTopo) is appended
//! to the open entry as a [`LogOp`]. An entry can be undone (ops replayed
//! backwards) and redone (ops replayed forwards) any number of times; each
//! op carries the data needed for both directions.

use std::collections::HashSet;

use super::mesh::{DynFace, DynMesh};
use crate::mesh::VertexData;

/// One recorded topology or attribute change.
#[derive(Debug, Clone, PartialEq)]
pub enum LogOp {
    AddVert { id: u32, data: VertexData },
    RemoveVert { id: u32, data: VertexData },
    AddFace { id: u32, face: DynFace },
    RemoveFace { id: u32, face: DynFace },
    /// `after` is filled in the first time the entry is undone.
    ModifyVert {
        id: u32,
        before: VertexData,
        after: Option<VertexData>,
    },
}

/// Ops recorded during one stroke step.
#[derive(Debug, Clone, Default)]
pub struct LogEntry {
    ops: Vec<LogOp>,
    modified: HashSet<u32>,
}

impl LogEntry {
    pub fn ops(&self) -> &[LogOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn undo(&mut self, mesh: &mut DynMesh) {
        for op in self.ops.iter_mut().rev() {
            match op {
                LogOp::AddVert { id, data } => {
                    *data = mesh.verts.vertex_data(*id);
                    mesh.kill_vert(*id);
                }
                LogOp::RemoveVert { id, data } => mesh.revive_vert(*id, data),
                LogOp::AddFace { id, .. } => {
                    mesh.remove_face(*id);
                }
                LogOp::RemoveFace { id, face } => mesh.restore_face(*id, *face),
                LogOp::ModifyVert { id, before, after } => {
                    *after = Some(mesh.verts.vertex_data(*id));
                    mesh.verts.set_vertex_data(*id, before);
                }
            }
        }
    }

    fn redo(&self, mesh: &mut DynMesh) {
        for op in &self.ops {
            match op {
                LogOp::AddVert { id, data } => mesh.revive_vert(*id, data),
                LogOp::RemoveVert { id, .. } => {
                    mesh.kill_vert(*id);
                }
                LogOp::AddFace { id, face } => mesh.restore_face(*id, *face),
                LogOp::RemoveFace { id, .. } => {
                    mesh.remove_face(*id);
                }
                LogOp::ModifyVert { id, after, .. } => {
                    if let Some(after) = after {
                        mesh.verts.set_vertex_data(*id, after);
                    }
                }
            }
        }
    }
}

/// Linear history of log entries with a redo cursor.
#[derive(Debug, Clone, Default)]
pub struct DynLog {
    entries: Vec<LogEntry>,
    /// Number of entries currently applied
    applied: usize,
    open: Option<LogEntry>,
}

impl DynLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording a new entry. An entry left open is closed first.
    pub fn begin_entry(&mut self) {
        self.end_entry();
        self.open = Some(LogEntry::default());
    }

    /// Close the open entry. Empty entries are dropped. Returns the index
    /// of the stored entry.
    pub fn end_entry(&mut self) -> Option<usize> {
        let entry = self.open.take()?;
        if entry.is_empty() {
            return None;
        }
        self.entries.truncate(self.applied);
        self.entries.push(entry);
        self.applied = self.entries.len();
        Some(self.applied - 1)
    }

    pub fn is_recording(&self) -> bool {
        self.open.is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn applied_count(&self) -> usize {
        self.applied
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&LogEntry> {
        self.entries.get(index)
    }

    pub(super) fn push(&mut self, op: LogOp) {
        if let Some(entry) = self.open.as_mut() {
            entry.ops.push(op);
        }
    }

    /// Record the pre-edit state of a vertex once per entry.
    pub(super) fn vert_before_modified(&mut self, mesh: &DynMesh, vert: u32) {
        let Some(entry) = self.open.as_mut() else {
            return;
        };
        if entry.modified.insert(vert) {
            entry.ops.push(LogOp::ModifyVert {
                id: vert,
                before: mesh.verts.vertex_data(vert),
                after: None,
            });
        }
    }

    pub(super) fn undo(&mut self, mesh: &mut DynMesh) -> bool {
        self.end_entry();
        if self.applied == 0 {
            return false;
        }
        self.applied -= 1;
        self.entries[self.applied].undo(mesh);
        true
    }

    pub(super) fn redo(&mut self, mesh: &mut DynMesh) -> bool {
        self.end_entry();
        if self.applied == self.entries.len() {
            return false;
        }
        self.entries[self.applied].redo(mesh);
        self.applied += 1;
        true
    }
}
