//! Undo protocol between the brush engine and the host's undo stack.
//!
//! An operation (stroke or filter) is bracketed by `push_begin`/`push_end`.
//! Inside, one [`UndoNode`] is pushed per touched leaf before that leaf's
//! first write, holding the values it had. [`UndoStack`] is an in-memory
//! sink that can put those values back.

use std::collections::HashSet;

use glam::{Vec3, Vec4};
use tracing::debug;

use crate::dyntopo::{DisableMode, DynTopo};
use crate::error::{SculptError, SculptResult};
use crate::host::ObjectId;
use crate::mesh::Mesh;
use crate::session::{BackingKind, SculptSession};
use crate::spatial::{LeafDirty, LeafId};

/// What an undo node captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoKind {
    Positions,
    Masks,
    Colors,
    DyntopoBegin,
    DyntopoEnd,
    DyntopoStep,
}

#[derive(Debug, Clone)]
pub enum UndoData {
    /// Positions of `UndoNode::verts`, in the same order
    Positions(Vec<Vec3>),
    Masks(Vec<f32>),
    Colors(Vec<Vec4>),
    /// Mesh as it was before dynamic topology was enabled
    DyntopoBegin(Box<Mesh>),
    /// Dynamic topology as it was right before being baked into a static
    /// mesh
    DyntopoEnd(Box<DynTopo>),
    /// One entry of the dynamic topology log
    DyntopoStep { entry: usize },
}

impl UndoData {
    pub fn kind(&self) -> UndoKind {
        match self {
            UndoData::Positions(_) => UndoKind::Positions,
            UndoData::Masks(_) => UndoKind::Masks,
            UndoData::Colors(_) => UndoKind::Colors,
            UndoData::DyntopoBegin(_) => UndoKind::DyntopoBegin,
            UndoData::DyntopoEnd(_) => UndoKind::DyntopoEnd,
            UndoData::DyntopoStep { .. } => UndoKind::DyntopoStep,
        }
    }
}

/// Captured pre-state of one leaf (or of the whole object for dynamic
/// topology nodes).
#[derive(Debug, Clone)]
pub struct UndoNode {
    pub object: ObjectId,
    pub leaf: Option<LeafId>,
    pub verts: Vec<u32>,
    pub data: UndoData,
}

impl UndoNode {
    /// Node covering the whole object.
    pub fn new(object: ObjectId, data: UndoData) -> Self {
        Self {
            object,
            leaf: None,
            verts: Vec::new(),
            data,
        }
    }

    /// Snapshot `kind` for the vertices owned by `leaf`.
    pub fn capture(session: &SculptSession, leaf: LeafId, kind: UndoKind) -> SculptResult<Self> {
        let verts = session.tree().leaf(leaf).verts().to_vec();
        let attrs = session.attrs();
        let data = match kind {
            UndoKind::Positions => {
                UndoData::Positions(verts.iter().map(|&v| attrs.positions[v as usize]).collect())
            }
            UndoKind::Masks => UndoData::Masks(verts.iter().map(|&v| attrs.masks[v as usize]).collect()),
            UndoKind::Colors => {
                let Some(colors) = attrs.colors.as_ref() else {
                    return Err(SculptError::MissingColorAttribute);
                };
                UndoData::Colors(verts.iter().map(|&v| colors[v as usize]).collect())
            }
            _ => return Err(SculptError::Invariant("leaf undo node of object-level kind")),
        };
        Ok(Self {
            object: session.object(),
            leaf: Some(leaf),
            verts,
            data,
        })
    }

    pub fn kind(&self) -> UndoKind {
        self.data.kind()
    }
}

/// Receiver of undo pushes, implemented by the host.
pub trait UndoSink {
    fn push_begin(&mut self, label: &str);
    fn push_node(&mut self, node: UndoNode);
    fn push_end(&mut self);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUndo;

impl UndoSink for NoUndo {
    fn push_begin(&mut self, _label: &str) {}
    fn push_node(&mut self, _node: UndoNode) {}
    fn push_end(&mut self) {}
}

/// Pushes one node per leaf the first time the leaf is touched during an
/// operation.
#[derive(Debug, Clone)]
pub struct LeafUndoTracker {
    kind: UndoKind,
    pushed: HashSet<LeafId>,
}

impl LeafUndoTracker {
    pub fn new(kind: UndoKind) -> Self {
        Self {
            kind,
            pushed: HashSet::new(),
        }
    }

    /// Push nodes for the leaves not seen yet. Dynamic topology sessions
    /// record into their own log instead.
    pub fn push_leaves(
        &mut self,
        sink: &mut dyn UndoSink,
        session: &SculptSession,
        leaves: &[LeafId],
    ) -> SculptResult<()> {
        if session.kind() == BackingKind::Dyntopo {
            return Ok(());
        }
        for &leaf in leaves {
            if self.pushed.insert(leaf) {
                sink.push_node(UndoNode::capture(session, leaf, self.kind)?);
            }
        }
        Ok(())
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.len()
    }
}

/// One begin/end bracket.
#[derive(Debug, Clone)]
pub struct UndoStep {
    pub label: String,
    pub nodes: Vec<UndoNode>,
}

/// In-memory undo stack.
#[derive(Debug, Default)]
pub struct UndoStack {
    steps: Vec<UndoStep>,
    open: Option<UndoStep>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&UndoStep> {
        self.steps.last()
    }

    /// Restore the most recent step into `session`. Returns false when the
    /// stack is empty.
    pub fn undo(&mut self, session: &mut SculptSession) -> SculptResult<bool> {
        let Some(step) = self.steps.pop() else {
            debug!("Undo: no steps available");
            return Ok(false);
        };
        debug!("Undoing '{}' ({} nodes)", step.label, step.nodes.len());

        for node in step.nodes.into_iter().rev() {
            match node.data {
                UndoData::Positions(values) => {
                    let attrs = session.write_attrs(&node.verts);
                    for (&v, value) in node.verts.iter().zip(values) {
                        attrs.positions[v as usize] = value;
                    }
                    if let Some(leaf) = node.leaf {
                        session.mark_dirty(leaf, LeafDirty::POSITIONS | LeafDirty::NORMALS);
                    }
                }
                UndoData::Masks(values) => {
                    let attrs = session.write_attrs(&node.verts);
                    for (&v, value) in node.verts.iter().zip(values) {
                        attrs.masks[v as usize] = value;
                    }
                    if let Some(leaf) = node.leaf {
                        session.mark_dirty(leaf, LeafDirty::MASK);
                    }
                }
                UndoData::Colors(values) => {
                    let attrs = session.write_attrs(&node.verts);
                    let Some(colors) = attrs.colors.as_mut() else {
                        return Err(SculptError::MissingColorAttribute);
                    };
                    for (&v, value) in node.verts.iter().zip(values) {
                        colors[v as usize] = value;
                    }
                    if let Some(leaf) = node.leaf {
                        session.mark_dirty(leaf, LeafDirty::COLOR);
                    }
                }
                UndoData::DyntopoBegin(mesh) => {
                    session.disable_dyntopo(DisableMode::Restore(*mesh), None)?;
                }
                UndoData::DyntopoEnd(topo) => session.restore_dyntopo(*topo)?,
                UndoData::DyntopoStep { .. } => {
                    let Some(topo) = session.dyntopo_mut() else {
                        return Err(SculptError::DyntopoNotEnabled);
                    };
                    topo.undo();
                    session.rebuild_tree();
                }
            }
        }
        session.flush_updates();
        Ok(true)
    }
}

impl UndoSink for UndoStack {
    fn push_begin(&mut self, label: &str) {
        self.open = Some(UndoStep {
            label: label.to_string(),
            nodes: Vec::new(),
        });
    }

    fn push_node(&mut self, node: UndoNode) {
        if let Some(step) = self.open.as_mut() {
            step.nodes.push(node);
        }
    }

    fn push_end(&mut self) {
        if let Some(step) = self.open.take() {
            self.steps.push(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Backing, FacesBacking};
    use crate::spatial::TreeConfig;
    use chisel_config::ToolSettings;

    fn session() -> SculptSession {
        SculptSession::with_tree_config(
            ObjectId(7),
            Backing::Faces(FacesBacking::new(Mesh::grid(4, 4, 1.0))),
            ToolSettings::default(),
            TreeConfig {
                max_elements_per_leaf: 4,
            },
        )
    }

    #[test]
    fn test_tracker_pushes_each_leaf_once() {
        let session = session();
        let mut stack = UndoStack::new();
        let mut tracker = LeafUndoTracker::new(UndoKind::Masks);
        let leaves = session.tree().all_leaves();

        stack.push_begin("Mask");
        tracker.push_leaves(&mut stack, &session, &leaves[..2]).unwrap();
        tracker.push_leaves(&mut stack, &session, &leaves[..3]).unwrap();
        stack.push_end();

        assert_eq!(tracker.pushed_count(), 3);
        assert_eq!(stack.last().unwrap().nodes.len(), 3);
        assert!(stack.last().unwrap().nodes.iter().all(|n| n.kind() == UndoKind::Masks));
    }

    #[test]
    fn test_undo_restores_masks() {
        let mut session = session();
        let mut stack = UndoStack::new();
        let mut tracker = LeafUndoTracker::new(UndoKind::Masks);
        let leaves = session.tree().all_leaves();

        stack.push_begin("Mask");
        tracker.push_leaves(&mut stack, &session, &leaves).unwrap();
        stack.push_end();
        for m in session.write_attrs(&[]).masks.iter_mut() {
            *m = 1.0;
        }

        assert!(stack.undo(&mut session).unwrap());
        assert!(session.attrs().masks.iter().all(|m| *m == 0.0));
        assert!(!stack.undo(&mut session).unwrap());
    }

    #[test]
    fn test_color_capture_requires_attribute() {
        let session = session();
        let result = UndoNode::capture(&session, LeafId(0), UndoKind::Colors);
        assert!(matches!(result, Err(SculptError::MissingColorAttribute)));
    }

    #[test]
    fn test_undo_dyntopo_enable_restores_mesh() {
        let mut session = session();
        let before = session.mesh().unwrap().clone();
        let mut stack = UndoStack::new();
        session.enable_dyntopo(&mut stack).unwrap();
        assert_eq!(session.kind(), BackingKind::Dyntopo);

        stack.undo(&mut session).unwrap();
        assert_eq!(session.kind(), BackingKind::Faces);
        assert_eq!(session.mesh().unwrap(), &before);
    }
}
