//! Interactive strokes: input samples, dab spacing and the per-step driver.
//!
//! A stroke is `begin` → any number of `update` → `end` (or `cancel`).
//! Every emitted dab is one step: it runs the brush once per symmetry pass,
//! flushes normals and bounds, and notifies the host once. Under dynamic
//! topology each step is also one entry of the operation log.
//!
//! Samples are plain-old-data so a finished stroke can be stored as bytes
//! and replayed with [`replay_stroke`].

use chisel_config::{BrushSettings, SculptTool, ToolSettings};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::automasking::{AutomaskingCache, AutomaskingSettings};
use crate::brushes::apply_brush_pass;
use crate::dyntopo::RemeshSettings;
use crate::error::{SculptError, SculptResult};
use crate::host::{ChangeKind, Host};
use crate::mesh::VertexAttributeStore;
use crate::session::{BackingKind, SculptSession};
use crate::symmetry::{SymmetryFrame, SymmetryPass, feather_factor, symmetry_passes};
use crate::undo::{LeafUndoTracker, UndoData, UndoKind, UndoNode, UndoSink};

/// One input event of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct StrokeSample {
    /// Object-space brush location
    pub location: [f32; 3],
    /// View direction used by tube falloff and as fallback normal
    pub view_normal: [f32; 3],
    /// Pen pressure 0-1
    pub pressure: f32,
}

impl StrokeSample {
    pub fn new(location: Vec3, view_normal: Vec3, pressure: f32) -> Self {
        Self {
            location: location.to_array(),
            view_normal: view_normal.to_array(),
            pressure,
        }
    }

    pub fn location(&self) -> Vec3 {
        Vec3::from_array(self.location)
    }

    pub fn view_normal(&self) -> Vec3 {
        Vec3::from_array(self.view_normal)
    }
}

/// Transient state of one stroke.
///
/// The first group of fields is fixed when the stroke starts; the second is
/// updated for every dab. Side buffers are allocated on first use and freed
/// with the cache.
#[derive(Debug)]
pub struct StrokeCache {
    pub brush: BrushSettings,
    pub tool: ToolSettings,
    pub initial_radius: f32,
    pub initial_location: Vec3,
    pub initial_active_vertex: Option<u32>,

    pub pressure: f32,
    pub radius: f32,
    /// Signed strength of the current dab, before feathering
    pub strength: f32,
    pub location: Vec3,
    pub last_location: Vec3,
    pub view_normal: Vec3,
    /// Pass currently being evaluated
    pub pass: SymmetryPass,
    /// Number of dabs applied so far
    pub step: u32,

    passes: Vec<SymmetryPass>,
    automasking: Option<AutomaskingCache>,
    original_positions: Option<Vec<Vec3>>,
}

impl StrokeCache {
    pub fn new(brush: &BrushSettings, session: &SculptSession, sample: &StrokeSample) -> SculptResult<Self> {
        let radius = brush.effective_radius(sample.pressure);
        let mut automask_settings = AutomaskingSettings::for_brush(brush, &session.tool);
        automask_settings.radius = radius;
        let automasking = AutomaskingCache::build(&automask_settings, session)?;
        let location = sample.location();
        Ok(Self {
            brush: brush.clone(),
            tool: session.tool.clone(),
            initial_radius: radius,
            initial_location: location,
            initial_active_vertex: session.active_vertex,
            pressure: sample.pressure,
            radius,
            strength: signed_strength(brush, sample.pressure),
            location,
            last_location: location,
            view_normal: sample.view_normal(),
            pass: SymmetryPass::IDENTITY,
            step: 0,
            passes: symmetry_passes(&session.tool),
            automasking,
            original_positions: None,
        })
    }

    /// Take the values of a new sample.
    pub fn update(&mut self, sample: &StrokeSample) {
        self.pressure = sample.pressure;
        self.radius = self.brush.effective_radius(sample.pressure);
        self.strength = signed_strength(&self.brush, sample.pressure);
        self.location = sample.location();
        self.view_normal = sample.view_normal();
    }

    pub fn passes(&self) -> &[SymmetryPass] {
        &self.passes
    }

    pub fn automasking(&self) -> Option<&AutomaskingCache> {
        self.automasking.as_ref()
    }

    /// Stroke-start positions, if a brush has asked for them.
    pub fn original_positions(&self) -> Option<&[Vec3]> {
        self.original_positions.as_deref()
    }

    /// Capture stroke-start positions the first time they are needed.
    pub fn ensure_original_positions(&mut self, attrs: &VertexAttributeStore) {
        if self.original_positions.is_none() {
            trace!("Capturing {} stroke-start positions", attrs.len());
            self.original_positions = Some(attrs.positions.clone());
        }
    }

    /// Unmirrored frame of the current dab.
    pub fn frame(&self) -> SymmetryFrame {
        SymmetryFrame {
            location: self.location,
            last_location: self.last_location,
            grab_delta: self.location - self.initial_location,
            view_normal: self.view_normal,
        }
    }
}

fn signed_strength(brush: &BrushSettings, pressure: f32) -> f32 {
    let strength = brush.effective_strength(pressure);
    match brush.tool {
        SculptTool::Smooth => strength,
        _ => strength * brush.direction.sign(),
    }
}

/// An interactive sculpt stroke.
#[derive(Debug)]
pub struct SculptStroke {
    cache: StrokeCache,
    undo_tracker: LeafUndoTracker,
    last_dab_location: Vec3,
    samples: Vec<StrokeSample>,
}

impl SculptStroke {
    /// Start a stroke and apply its first dab at `sample`.
    pub fn begin(
        session: &mut SculptSession,
        brush: &BrushSettings,
        sample: StrokeSample,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> SculptResult<Self> {
        session.cancel.reset();
        let radius = brush.effective_radius(sample.pressure);
        session.update_active_vertex(sample.location(), radius);
        let cache = StrokeCache::new(brush, session, &sample)?;
        let kind = if brush.tool == SculptTool::Mask {
            UndoKind::Masks
        } else {
            UndoKind::Positions
        };

        info!(
            "Stroke begin: {} ({:?}), radius {:.3}, {} symmetry passes",
            brush.name,
            brush.tool,
            radius,
            cache.passes().len()
        );
        undo.push_begin(&brush.name);

        let mut stroke = Self {
            cache,
            undo_tracker: LeafUndoTracker::new(kind),
            last_dab_location: sample.location(),
            samples: vec![sample],
        };
        stroke.step(session, undo, host)?;
        Ok(stroke)
    }

    pub fn cache(&self) -> &StrokeCache {
        &self.cache
    }

    /// Feed a new input sample. Returns the number of dabs applied.
    pub fn update(
        &mut self,
        session: &mut SculptSession,
        sample: StrokeSample,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> SculptResult<usize> {
        self.samples.push(sample);
        let target = sample.location();
        let spacing_distance = self.cache.brush.effective_radius(sample.pressure) * self.cache.brush.spacing;

        // No spacing: every sample is a dab
        if spacing_distance <= 0.0 {
            self.cache.update(&sample);
            self.step(session, undo, host)?;
            self.last_dab_location = target;
            return Ok(1);
        }

        let offset = target - self.last_dab_location;
        let mut remaining = offset.length();
        if remaining < spacing_distance {
            return Ok(0);
        }

        let direction = offset / remaining;
        let mut dabs = 0;
        while remaining >= spacing_distance {
            self.last_dab_location += direction * spacing_distance;
            remaining -= spacing_distance;
            let dab = StrokeSample {
                location: self.last_dab_location.to_array(),
                ..sample
            };
            self.cache.update(&dab);
            self.step(session, undo, host)?;
            dabs += 1;
        }
        Ok(dabs)
    }

    /// Finish the stroke and return its recorded samples.
    pub fn end(self, session: &mut SculptSession, undo: &mut dyn UndoSink) -> Vec<StrokeSample> {
        session.flush_updates();
        undo.push_end();
        info!(
            "Stroke end: {} dabs, {} leaves captured for undo",
            self.cache.step,
            self.undo_tracker.pushed_count()
        );
        self.samples
    }

    /// Stop the stroke early. Dabs already applied stay applied.
    pub fn cancel(self, session: &mut SculptSession, undo: &mut dyn UndoSink) {
        session.flush_updates();
        undo.push_end();
        debug!("Stroke cancelled after {} dabs", self.cache.step);
    }

    /// One dab: every symmetry pass, then flush and notify.
    fn step(&mut self, session: &mut SculptSession, undo: &mut dyn UndoSink, host: &dyn Host) -> SculptResult<()> {
        let is_dyntopo = session.kind() == BackingKind::Dyntopo;
        if is_dyntopo && let Some(topo) = session.dyntopo_mut() {
            topo.begin_entry();
        }

        let result = self.run_passes(session, undo);

        let mut topology_changed = false;
        if is_dyntopo {
            let entry = session.dyntopo_mut().and_then(|topo| topo.end_entry());
            if let Some(entry) = entry {
                undo.push_node(UndoNode::new(session.object(), UndoData::DyntopoStep { entry }));
            }
            topology_changed = matches!(result, Ok(true));
        }
        session.flush_updates();
        result?;

        self.cache.last_location = self.cache.location;
        self.cache.step += 1;
        let kind = if topology_changed {
            ChangeKind::Topology
        } else if self.cache.brush.tool == SculptTool::Mask {
            ChangeKind::Mask
        } else {
            ChangeKind::Geometry
        };
        host.notify(kind, session.object());
        Ok(())
    }

    /// Returns whether dynamic topology changed the mesh.
    fn run_passes(&mut self, session: &mut SculptSession, undo: &mut dyn UndoSink) -> SculptResult<bool> {
        if session.cancel.is_cancelled() {
            return Err(SculptError::Cancelled);
        }
        if self.cache.brush.tool.uses_original_positions() {
            self.cache.ensure_original_positions(session.attrs());
        }

        let frame = self.cache.frame();
        let feather = if self.cache.tool.symmetry_feather {
            feather_factor(self.cache.passes(), frame.location, self.cache.radius)
        } else {
            1.0
        };
        let remesh = (session.kind() == BackingKind::Dyntopo && self.cache.brush.tool.supports_dyntopo())
            .then(|| RemeshSettings::from_tool(&self.cache.tool.dyntopo, self.cache.radius));

        let mut topology_changed = false;
        let mut touched = 0;
        let passes = self.cache.passes().to_vec();
        for pass in passes {
            self.cache.pass = pass;
            let pass_frame = pass.apply(&frame);

            if let Some(settings) = &remesh
                && let Some(topo) = session.dyntopo_mut()
            {
                let stats = topo.remesh(pass_frame.location, self.cache.radius, settings);
                if stats.changed() {
                    topology_changed = true;
                    session.rebuild_tree();
                }
            }

            touched += apply_brush_pass(session, &self.cache, &pass_frame, feather, undo, &mut self.undo_tracker)?;
        }
        trace!("Dab {}: {} vertex writes", self.cache.step, touched);
        Ok(topology_changed)
    }
}

/// Apply a recorded stroke from scratch as one undo step.
pub fn replay_stroke(
    session: &mut SculptSession,
    brush: &BrushSettings,
    samples: &[StrokeSample],
    undo: &mut dyn UndoSink,
    host: &dyn Host,
) -> SculptResult<()> {
    let Some((first, rest)) = samples.split_first() else {
        return Ok(());
    };
    debug!("Replaying stroke of {} samples", samples.len());
    let mut stroke = SculptStroke::begin(session, brush, *first, undo, host)?;
    for &sample in rest {
        if let Err(err) = stroke.update(session, sample, undo, host) {
            stroke.cancel(session, undo);
            return Err(err);
        }
    }
    stroke.end(session, undo);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NullHost, ObjectId, RecordingHost};
    use crate::mesh::Mesh;
    use crate::session::{Backing, FacesBacking};
    use crate::spatial::TreeConfig;
    use crate::undo::UndoStack;
    use chisel_config::SymmetryFlags;

    fn grid_session(tool: ToolSettings) -> SculptSession {
        SculptSession::with_tree_config(
            ObjectId(3),
            Backing::Faces(FacesBacking::new(Mesh::grid(16, 16, 2.0))),
            tool,
            TreeConfig {
                max_elements_per_leaf: 16,
            },
        )
    }

    fn sample(x: f32, y: f32) -> StrokeSample {
        StrokeSample::new(Vec3::new(x, y, 0.0), Vec3::Z, 1.0)
    }

    #[test]
    fn test_sample_is_plain_bytes() {
        let s = sample(0.25, -0.5);
        let bytes: &[u8] = bytemuck::bytes_of(&s);
        assert_eq!(bytes.len(), 28);
        let back: StrokeSample = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, s);
    }

    #[test]
    fn test_spacing_emits_evenly_spaced_dabs() {
        let mut session = grid_session(ToolSettings::default());
        let brush = BrushSettings {
            radius: 0.2,
            spacing: 0.5,
            ..BrushSettings::draw()
        };
        let mut undo = UndoStack::new();
        let host = NullHost;
        let mut stroke = SculptStroke::begin(&mut session, &brush, sample(-0.5, 0.0), &mut undo, &host).unwrap();
        assert_eq!(stroke.cache().step, 1);

        // 0.05 is below the spacing of 0.1: no dab yet
        assert_eq!(stroke.update(&mut session, sample(-0.45, 0.0), &mut undo, &host).unwrap(), 0);
        assert_eq!(stroke.update(&mut session, sample(-0.15, 0.0), &mut undo, &host).unwrap(), 3);
        let samples = stroke.end(&mut session, &mut undo);
        assert_eq!(samples.len(), 3);
        assert_eq!(undo.len(), 1);
    }

    #[test]
    fn test_step_notifies_once_per_dab() {
        let tool = ToolSettings {
            symmetry: SymmetryFlags::X,
            ..Default::default()
        };
        let mut session = grid_session(tool);
        let brush = BrushSettings {
            spacing: 0.0,
            ..BrushSettings::draw()
        };
        let mut undo = UndoStack::new();
        let host = RecordingHost::new();
        let mut stroke = SculptStroke::begin(&mut session, &brush, sample(0.3, 0.0), &mut undo, &host).unwrap();
        stroke.update(&mut session, sample(0.35, 0.0), &mut undo, &host).unwrap();
        stroke.end(&mut session, &mut undo);

        let notes = host.notifications();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|&(kind, object)| kind == ChangeKind::Geometry && object == ObjectId(3)));
    }

    #[test]
    fn test_cancelled_step_writes_nothing() {
        let mut session = grid_session(ToolSettings::default());
        let brush = BrushSettings {
            spacing: 0.0,
            ..BrushSettings::draw()
        };
        let mut undo = UndoStack::new();
        let host = NullHost;
        let mut stroke = SculptStroke::begin(&mut session, &brush, sample(0.0, 0.0), &mut undo, &host).unwrap();
        let before = session.attrs().positions.clone();

        session.cancel.cancel();
        let err = stroke.update(&mut session, sample(0.1, 0.0), &mut undo, &host).unwrap_err();
        assert!(matches!(err, SculptError::Cancelled));
        assert_eq!(session.attrs().positions, before);
        stroke.cancel(&mut session, &mut undo);

        // The first dab is still there and can be undone
        assert!(undo.undo(&mut session).unwrap());
        assert!(session.attrs().positions.iter().all(|p| p.z.abs() < 1e-6));
    }

    #[test]
    fn test_replay_matches_live_stroke() {
        let brush = BrushSettings {
            spacing: 0.0,
            ..BrushSettings::inflate()
        };
        let inputs = [sample(0.0, 0.0), sample(0.1, 0.05), sample(0.2, 0.1)];

        let mut live = grid_session(ToolSettings::default());
        let mut undo = UndoStack::new();
        let mut stroke = SculptStroke::begin(&mut live, &brush, inputs[0], &mut undo, &NullHost).unwrap();
        for &s in &inputs[1..] {
            stroke.update(&mut live, s, &mut undo, &NullHost).unwrap();
        }
        let recorded = stroke.end(&mut live, &mut undo);

        let mut replayed = grid_session(ToolSettings::default());
        replay_stroke(&mut replayed, &brush, &recorded, &mut undo, &NullHost).unwrap();
        for (a, b) in live.attrs().positions.iter().zip(&replayed.attrs().positions) {
            assert!((*a - *b).length() < 1e-5);
        }
    }

    #[test]
    fn test_dyntopo_stroke_logs_one_entry_per_dab() {
        let mut session = grid_session(ToolSettings::default());
        let mut undo = UndoStack::new();
        session.enable_dyntopo(&mut undo).unwrap();
        let faces_before = session.dyntopo().unwrap().mesh().face_count();

        let mut tool = session.tool.clone();
        tool.dyntopo.detail_size = 0.05;
        session.tool = tool;
        let brush = BrushSettings {
            radius: 0.3,
            spacing: 0.0,
            ..BrushSettings::draw()
        };
        let mut stroke = SculptStroke::begin(&mut session, &brush, sample(0.0, 0.0), &mut undo, &NullHost).unwrap();
        stroke.update(&mut session, sample(0.05, 0.0), &mut undo, &NullHost).unwrap();
        stroke.end(&mut session, &mut undo);

        let topo = session.dyntopo().unwrap();
        assert!(topo.mesh().face_count() > faces_before);
        assert_eq!(topo.log().entry_count(), 2);
        let step = undo.last().unwrap();
        assert_eq!(step.nodes.len(), 2);
        assert!(step.nodes.iter().all(|n| n.kind() == UndoKind::DyntopoStep));

        undo.undo(&mut session).unwrap();
        assert_eq!(session.dyntopo().unwrap().mesh().face_count(), faces_before);
    }
}
