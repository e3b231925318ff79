//! Mask filter: smooth, sharpen, grow/shrink and contrast over the whole
//! mask.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SculptResult;
use crate::host::{ChangeKind, Host};
use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology};
use crate::parallel::{LeafWrites, map_leaves};
use crate::session::SculptSession;
use crate::smooth::neighbor_mask_average;
use crate::spatial::{LeafDirty, LeafId, SpatialTree};
use crate::undo::{UndoKind, UndoSink};

use super::{FilterCache, contrast_gain_offset, logged_step};

/// Vertices per automatic iteration (default: 50000)
pub const DEFAULT_VERTS_PER_AUTO_ITERATION: u32 = 50_000;

/// Step applied by sharpen away from the 0.5 midpoint
const SHARPEN_STEP: f32 = 0.05;

/// Contrast change per unit of strength
const CONTRAST_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskFilterType {
    #[default]
    Smooth = 0,
    Sharpen = 1,
    Grow = 2,
    Shrink = 3,
    ContrastIncrease = 4,
    ContrastDecrease = 5,
}

/// Mask filter operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskFilterSettings {
    pub filter_type: MaskFilterType,
    /// Passes per invocation (default: 1)
    pub iterations: u32,
    /// Derive the pass count from the vertex count instead (default: false)
    pub auto_iteration_count: bool,
    /// Vertex count per automatic pass (default: 50000)
    pub verts_per_auto_iteration: u32,
    /// Smooth blend factor and contrast scale (default: 1.0)
    pub strength: f32,
}

impl Default for MaskFilterSettings {
    fn default() -> Self {
        Self {
            filter_type: MaskFilterType::Smooth,
            iterations: 1,
            auto_iteration_count: false,
            verts_per_auto_iteration: DEFAULT_VERTS_PER_AUTO_ITERATION,
            strength: 1.0,
        }
    }
}

impl MaskFilterSettings {
    pub fn iteration_count(&self, vertex_count: usize) -> u32 {
        if self.auto_iteration_count {
            let per = self.verts_per_auto_iteration.max(1) as usize;
            (vertex_count / per) as u32 + 1
        } else {
            self.iterations
        }
    }
}

/// Apply the mask filter to every visible vertex as one undo step.
/// Returns the number of mask writes.
pub fn apply_mask_filter(
    session: &mut SculptSession,
    settings: &MaskFilterSettings,
    undo: &mut dyn UndoSink,
    host: &dyn Host,
) -> SculptResult<usize> {
    session.cancel.reset();
    let mut cache = FilterCache::new(session, UndoKind::Masks)?;
    let iterations = settings.iteration_count(session.attrs().len());
    info!(
        "Mask filter {:?}: {} iterations over {} leaves",
        settings.filter_type,
        iterations,
        cache.leaves.len()
    );

    undo.push_begin("Mask Filter");
    let result = run_iterations(session, &mut cache, settings, iterations, undo);
    undo.push_end();

    let written = result?;
    if written > 0 {
        host.notify(ChangeKind::Mask, session.object());
    }
    Ok(written)
}

fn run_iterations(
    session: &mut SculptSession,
    cache: &mut FilterCache,
    settings: &MaskFilterSettings,
    iterations: u32,
    undo: &mut dyn UndoSink,
) -> SculptResult<usize> {
    cache.push_undo(session, undo)?;
    logged_step(session, undo, |session| {
        let mut written = 0;
        for iteration in 0..iterations {
            // Kernels read the masks of the previous pass and scatter after
            let writes = {
                let (attrs, topology, tree) = session.parts();
                let settings_par = session.parallel();
                crate::with_topology!(topology, |t| {
                    map_leaves(&cache.leaves, settings_par, &session.cancel, |leaf| {
                        mask_filter_leaf(t, attrs, tree, leaf, settings.filter_type, settings.strength)
                    })
                })?
            };
            let count = session.scatter(&writes, LeafDirty::MASK, |attrs, v, mask| {
                attrs.masks[v as usize] = mask;
            });
            debug!("Mask filter iteration {}: {} writes", iteration, count);
            written += count;
        }
        Ok(written)
    })
}

fn mask_filter_leaf<T: Topology + ?Sized>(
    topology: &T,
    attrs: &VertexAttributeStore,
    tree: &SpatialTree,
    leaf: LeafId,
    filter: MaskFilterType,
    strength: f32,
) -> LeafWrites<f32> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let masks = &attrs.masks;

    let contrast = match filter {
        MaskFilterType::ContrastIncrease => CONTRAST_STEP * strength,
        MaskFilterType::ContrastDecrease => -CONTRAST_STEP * strength,
        _ => 0.0,
    };
    let is_contrast = matches!(filter, MaskFilterType::ContrastIncrease | MaskFilterType::ContrastDecrease);
    if is_contrast && contrast == 0.0 {
        return out;
    }
    let (gain, offset) = contrast_gain_offset(0.0, contrast);

    for &v in tree.leaf(leaf).verts() {
        if !attrs.is_visible(v) {
            continue;
        }
        let mask = masks[v as usize];
        let new_mask = match filter {
            MaskFilterType::Smooth => {
                let average = neighbor_mask_average(topology, masks, v, &mut neighbors);
                mask + (average - mask) * strength
            }
            MaskFilterType::Sharpen => {
                let average = neighbor_mask_average(topology, masks, v, &mut neighbors);
                let step = if mask > 0.5 { SHARPEN_STEP } else { -SHARPEN_STEP };
                mask + step + (average - mask) / 2.0
            }
            MaskFilterType::Grow | MaskFilterType::Shrink => {
                topology.neighbors(v, false, &mut neighbors);
                let grow = filter == MaskFilterType::Grow;
                neighbors.as_slice().iter().fold(mask, |acc, &n| {
                    let other = masks[n as usize];
                    if grow { acc.max(other) } else { acc.min(other) }
                })
            }
            MaskFilterType::ContrastIncrease | MaskFilterType::ContrastDecrease => gain * mask + offset,
        };
        let new_mask = new_mask.clamp(0.0, 1.0);
        if new_mask != mask {
            out.push(v, new_mask);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ObjectId, RecordingHost};
    use crate::mesh::Mesh;
    use crate::undo::UndoStack;
    use chisel_config::ToolSettings;

    fn session(mesh: Mesh) -> SculptSession {
        SculptSession::from_mesh(ObjectId(5), mesh, ToolSettings::default()).unwrap()
    }

    fn settings(filter_type: MaskFilterType) -> MaskFilterSettings {
        MaskFilterSettings {
            filter_type,
            ..Default::default()
        }
    }

    #[test]
    fn test_auto_iteration_count() {
        let mut s = MaskFilterSettings {
            iterations: 7,
            ..Default::default()
        };
        assert_eq!(s.iteration_count(120_000), 7);
        s.auto_iteration_count = true;
        assert_eq!(s.iteration_count(120_000), 3);
        assert_eq!(s.iteration_count(10), 1);
        s.verts_per_auto_iteration = 5;
        assert_eq!(s.iteration_count(10), 3);
    }

    #[test]
    fn test_shrink_erodes_island() {
        let mut session = session(Mesh::grid(6, 6, 1.0));
        let count = session.attrs().len();
        session.write_attrs(&[]).masks = vec![1.0; count];
        session.write_attrs(&[]).masks[0] = 0.0;

        let host = RecordingHost::new();
        let mut undo = UndoStack::new();
        apply_mask_filter(&mut session, &settings(MaskFilterType::Shrink), &mut undo, &host).unwrap();

        let masks = &session.attrs().masks;
        // Vertex 0 and its neighbors 1 and 7 are now unmasked
        assert_eq!(masks[0], 0.0);
        assert_eq!(masks[1], 0.0);
        assert_eq!(masks[7], 0.0);
        assert_eq!(masks[8], 1.0);
        assert_eq!(host.notifications(), vec![(ChangeKind::Mask, ObjectId(5))]);
    }

    #[test]
    fn test_sharpen_pushes_away_from_midpoint() {
        let mut session = session(Mesh::grid(4, 4, 1.0));
        let count = session.attrs().len();
        session.write_attrs(&[]).masks = vec![0.7; count];
        apply_mask_filter(
            &mut session,
            &settings(MaskFilterType::Sharpen),
            &mut UndoStack::new(),
            &RecordingHost::new(),
        )
        .unwrap();
        assert!(session.attrs().masks.iter().all(|&m| (m - 0.75).abs() < 0.001));
    }

    #[test]
    fn test_contrast_spreads_values() {
        let mut session = session(Mesh::grid(2, 1, 1.0));
        session.write_attrs(&[]).masks = vec![0.2, 0.5, 0.8, 0.2, 0.5, 0.8];
        apply_mask_filter(
            &mut session,
            &settings(MaskFilterType::ContrastIncrease),
            &mut UndoStack::new(),
            &RecordingHost::new(),
        )
        .unwrap();
        let masks = &session.attrs().masks;
        assert!(masks[0] < 0.2);
        assert!((masks[1] - 0.5).abs() < 0.001);
        assert!(masks[2] > 0.8);
    }

    #[test]
    fn test_filter_is_one_undo_step() {
        let mut session = session(Mesh::grid(4, 4, 1.0));
        session.write_attrs(&[]).masks[12] = 1.0;
        let before = session.attrs().masks.clone();
        let mut undo = UndoStack::new();
        let host = RecordingHost::new();
        let grow = MaskFilterSettings {
            filter_type: MaskFilterType::Grow,
            iterations: 3,
            ..Default::default()
        };
        apply_mask_filter(&mut session, &grow, &mut undo, &host).unwrap();
        assert_eq!(undo.len(), 1);
        assert_ne!(session.attrs().masks, before);

        undo.undo(&mut session).unwrap();
        assert_eq!(session.attrs().masks, before);
    }
}
