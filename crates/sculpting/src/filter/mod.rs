//! Whole-mesh filters: mask, mesh (deformation) and color.
//!
//! Filters act on every visible vertex instead of a brush volume. An
//! interactive filter is `start` → any number of `update(strength)` →
//! `finish`; each update is one step with one host notification. The mask
//! filter is a single operation.
//!
//! The fade of a vertex is `strength × (1 − mask) × automask`, using only
//! the tool-level automasking flags.

mod color;
mod mask;
mod mesh;

pub use color::{ColorFilter, ColorFilterSettings, ColorFilterType, hsv_to_rgb, rgb_to_hsv};
pub use mask::{MaskFilterSettings, MaskFilterType, apply_mask_filter};
pub use mesh::{FilterAxes, FilterOrientation, MeshFilter, MeshFilterSettings, MeshFilterType, OrientationFrame};

use glam::{Vec3, Vec4};
use tracing::debug;

use crate::automasking::{AutomaskingCache, AutomaskingSettings, automask_factor};
use crate::error::SculptResult;
use crate::neighbors::Topology;
use crate::session::SculptSession;
use crate::spatial::LeafId;
use crate::undo::{LeafUndoTracker, UndoData, UndoKind, UndoNode, UndoSink};

/// Transient state of one filter invocation. Side buffers are filled on
/// first use and dropped with the cache.
#[derive(Debug)]
pub struct FilterCache {
    pub leaves: Vec<LeafId>,
    /// Number of completed updates
    pub iteration: u32,
    automasking: Option<AutomaskingCache>,
    undo_tracker: LeafUndoTracker,
    original_positions: Option<Vec<Vec3>>,
    original_normals: Option<Vec<Vec3>>,
    original_colors: Option<Vec<Vec4>>,
}

impl FilterCache {
    pub fn new(session: &SculptSession, undo_kind: UndoKind) -> SculptResult<Self> {
        let settings = AutomaskingSettings::for_filter(&session.tool);
        Ok(Self {
            leaves: session.tree().all_leaves(),
            iteration: 0,
            automasking: AutomaskingCache::build(&settings, session)?,
            undo_tracker: LeafUndoTracker::new(undo_kind),
            original_positions: None,
            original_normals: None,
            original_colors: None,
        })
    }

    pub fn automasking(&self) -> Option<&AutomaskingCache> {
        self.automasking.as_ref()
    }

    /// Push undo nodes for every leaf not captured yet.
    pub fn push_undo(&mut self, session: &SculptSession, undo: &mut dyn UndoSink) -> SculptResult<()> {
        self.undo_tracker.push_leaves(undo, session, &self.leaves)
    }

    pub fn capture_positions(&mut self, session: &SculptSession) {
        let attrs = session.attrs();
        self.original_positions.get_or_insert_with(|| attrs.positions.clone());
        self.original_normals.get_or_insert_with(|| attrs.normals.clone());
    }

    pub fn capture_colors(&mut self, session: &SculptSession) {
        if let Some(colors) = &session.attrs().colors {
            self.original_colors.get_or_insert_with(|| colors.clone());
        }
    }

    pub fn original_positions(&self) -> &[Vec3] {
        self.original_positions.as_deref().unwrap_or_default()
    }

    pub fn original_normals(&self) -> &[Vec3] {
        self.original_normals.as_deref().unwrap_or_default()
    }

    pub fn original_colors(&self) -> &[Vec4] {
        self.original_colors.as_deref().unwrap_or_default()
    }

    /// `strength × (1 − mask) × automask` for `vert`.
    #[inline]
    pub fn fade<T: Topology + ?Sized>(&self, topology: &T, vert: u32, mask: f32, strength: f32) -> f32 {
        strength * (1.0 - mask) * automask_factor(self.automasking(), topology, vert)
    }
}

/// Gain and offset of a brightness/contrast adjustment about the midpoint.
/// Applied as `gain × value + offset`.
pub fn contrast_gain_offset(brightness: f32, contrast: f32) -> (f32, f32) {
    let delta = contrast / 2.0;
    if contrast > 0.0 {
        let gain = 1.0 / (1.0 - delta * 2.0).max(f32::EPSILON);
        (gain, gain * (brightness - delta))
    } else {
        let delta = -delta;
        let gain = (1.0 - delta * 2.0).max(0.0);
        (gain, gain * brightness + delta)
    }
}

/// Run `apply` as one step: under dynamic topology it records one log
/// entry and pushes the matching undo node. Normals and bounds are flushed
/// either way.
pub(crate) fn logged_step<R>(
    session: &mut SculptSession,
    undo: &mut dyn UndoSink,
    apply: impl FnOnce(&mut SculptSession) -> SculptResult<R>,
) -> SculptResult<R> {
    if let Some(topo) = session.dyntopo_mut() {
        topo.begin_entry();
    }
    let result = apply(session);
    let entry = session.dyntopo_mut().and_then(|topo| topo.end_entry());
    if let Some(entry) = entry {
        debug!("Filter step recorded as log entry {}", entry);
        undo.push_node(UndoNode::new(session.object(), UndoData::DyntopoStep { entry }));
    }
    session.flush_updates();
    result
}
