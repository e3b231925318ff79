//! Weight painting on the active vertex group.
//!
//! Same tools as vertex paint, on one weight per vertex. With X mirroring
//! every write is copied to the mirrored vertex in the mirrored group
//! (`hand.L` → `hand.R`), and leaf evaluation runs on the calling thread.

use chisel_config::{PaintSettings, PaintTool};
use glam::Vec3;
use tracing::{debug, info, warn};

use sculpting::brush::{BrushTest, brush_fade};
use sculpting::host::{ChangeKind, Host, ReportLevel, report};
use sculpting::mesh::VertexAttributeStore;
use sculpting::neighbors::{FacesTopology, Neighbors, Topology};
use sculpting::parallel::{LeafWrites, ParallelSettings, map_leaves};
use sculpting::session::SculptSession;
use sculpting::spatial::{LeafId, SpatialTree};
use sculpting::symmetry::flip_position;
use sculpting::StrokeSample;

use crate::blend::{blend_weight, clamp_monotonic};
use crate::error::{PaintError, PaintResult};
use crate::groups::{VertexGroups, WeightUndoEntry};
use crate::stroke::{PaintStrokeCache, faces_topology, require_faces, smear_source};

/// Largest distance between a vertex and the mirror of its counterpart
pub const MIRROR_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Clone)]
struct MirrorTarget {
    group: usize,
    /// Counterpart of every vertex across X
    verts: Vec<Option<u32>>,
}

/// An interactive weight paint stroke.
#[derive(Debug)]
pub struct WeightPaintStroke {
    cache: PaintStrokeCache,
    group: usize,
    mirror: Option<MirrorTarget>,
    start_weights: Vec<f32>,
    previous_weights: Option<Vec<f32>>,
    undo_entry: WeightUndoEntry,
}

impl WeightPaintStroke {
    /// Start a stroke on the active group and apply its first dab.
    ///
    /// Fails without writing when there is no active group or it is
    /// locked.
    pub fn begin(
        session: &mut SculptSession,
        groups: &mut VertexGroups,
        settings: &PaintSettings,
        sample: StrokeSample,
        host: &dyn Host,
    ) -> PaintResult<Self> {
        require_faces(session, host)?;
        if groups.vertex_count() != session.attrs().len() {
            return Err(PaintError::GroupSizeMismatch {
                expected: session.attrs().len(),
                actual: groups.vertex_count(),
            });
        }
        let Some(group) = groups.active() else {
            report(host, ReportLevel::Error, "No active vertex group");
            return Err(PaintError::NoActiveGroup);
        };
        if groups.is_locked(group) {
            report(host, ReportLevel::Error, "Active group is locked");
            return Err(PaintError::ActiveGroupLocked);
        }
        session.cancel.reset();

        let mirror = if settings.mirror_x {
            let mirror_group = groups.mirror_of(group);
            if groups.is_locked(mirror_group) {
                warn!("Mirror group {} is locked, painting without mirror", mirror_group);
                None
            } else {
                Some(MirrorTarget {
                    group: mirror_group,
                    verts: mirror_table(session),
                })
            }
        } else {
            None
        };

        let start_weights = groups
            .get(group)
            .map(|g| g.weights().to_vec())
            .ok_or(PaintError::GroupNotFound(group))?;
        let cache = PaintStrokeCache::new(settings, &session.tool, &sample);
        info!(
            "Weight paint stroke started on group {}: {:?}, mirror {}",
            group,
            settings.tool,
            mirror.is_some()
        );
        let mut stroke = Self {
            cache,
            group,
            mirror,
            previous_weights: (settings.tool == PaintTool::Smear).then(|| start_weights.clone()),
            start_weights,
            undo_entry: groups.snapshot("Weight Paint"),
        };
        stroke.step(session, groups, host)?;
        Ok(stroke)
    }

    pub fn cache(&self) -> &PaintStrokeCache {
        &self.cache
    }

    pub fn group(&self) -> usize {
        self.group
    }

    /// Apply one dab at `sample`. Returns the number of weight writes.
    pub fn update(
        &mut self,
        session: &mut SculptSession,
        groups: &mut VertexGroups,
        sample: StrokeSample,
        host: &dyn Host,
    ) -> PaintResult<usize> {
        self.cache.update(&sample);
        self.step(session, groups, host)
    }

    /// Finish the stroke, returning the weights it started from.
    pub fn end(self) -> WeightUndoEntry {
        info!("Weight paint stroke finished: {} dabs", self.cache.step);
        self.undo_entry
    }

    fn parallel(&self, session: &SculptSession) -> ParallelSettings {
        // Mirrored pairs can land in different leaves
        if self.mirror.is_some() {
            ParallelSettings::single_threaded()
        } else {
            session.parallel()
        }
    }

    fn step(&mut self, session: &mut SculptSession, groups: &mut VertexGroups, host: &dyn Host) -> PaintResult<usize> {
        let mut written = 0;
        let parallel = self.parallel(session);
        let passes = self.cache.passes().to_vec();
        for pass in &passes {
            let frame = self.cache.frame(pass);
            let test = self.cache.test(&frame);
            let leaves = test.gather(session.tree());
            if leaves.is_empty() {
                continue;
            }
            let motion = self.cache.motion(&frame);
            if self.cache.settings.tool == PaintTool::Smear && motion.is_none() {
                continue;
            }

            let writes = {
                let (attrs, _, tree) = session.parts();
                let topology = faces_topology(session)?;
                let weights = groups
                    .get(self.group)
                    .map(|g| g.weights())
                    .ok_or(PaintError::GroupNotFound(self.group))?;
                let paint = match self.cache.settings.tool {
                    PaintTool::Average => match average_weight(session, attrs, tree, weights, &test, &leaves, parallel)? {
                        Some(weight) => weight,
                        None => continue,
                    },
                    _ => self.cache.settings.weight,
                };
                let ctx = PassContext {
                    attrs,
                    tree,
                    topology,
                    weights,
                    test,
                    cache: &self.cache,
                    paint,
                    motion: motion.unwrap_or(Vec3::ZERO),
                    start_weights: &self.start_weights,
                    previous_weights: self.previous_weights.as_deref().unwrap_or(weights),
                };
                map_leaves(&leaves, parallel, &session.cancel, |leaf| weight_leaf(&ctx, leaf))?
            };
            written += self.scatter(groups, &writes);
        }

        if let Some(previous) = self.previous_weights.as_mut()
            && let Some(group) = groups.get(self.group)
        {
            previous.copy_from_slice(group.weights());
        }
        self.cache.step += 1;
        debug!("Weight paint dab {}: {} writes", self.cache.step, written);
        host.notify(ChangeKind::Weights, session.object());
        Ok(written)
    }

    /// Write the active group, copy to the mirror side, then normalize.
    fn scatter(&self, groups: &mut VertexGroups, writes: &[LeafWrites<f32>]) -> usize {
        let normalize = self.cache.settings.auto_normalize;
        let mut count = 0;
        for &(v, weight) in writes.iter().flat_map(|w| w.values.iter()) {
            groups.set_weight(self.group, v, weight);
            count += 1;

            let mirrored = self.mirror.as_ref().and_then(|m| {
                let target = m.verts[v as usize]?;
                // The center vertex painted into its own group needs no copy
                (target != v || m.group != self.group).then_some((m.group, target))
            });
            if let Some((mirror_group, target)) = mirrored {
                groups.set_weight(mirror_group, target, weight);
            }

            if !normalize {
                continue;
            }
            groups.normalize_vertex(v, Some(self.group));
            match mirrored {
                Some((mirror_group, target)) if target != v => {
                    groups.normalize_vertex(target, Some(mirror_group));
                }
                Some((mirror_group, target)) => {
                    // Both sides of a center vertex: balance them out
                    let shared = (groups.weight(self.group, v) + groups.weight(mirror_group, target)) * 0.5;
                    groups.set_weight(self.group, v, shared);
                    groups.set_weight(mirror_group, target, shared);
                }
                None => {}
            }
        }
        count
    }
}

/// Counterpart of every visible vertex across the X plane.
fn mirror_table(session: &SculptSession) -> Vec<Option<u32>> {
    let attrs = session.attrs();
    let tree = session.tree();
    let table: Vec<Option<u32>> = attrs
        .positions
        .iter()
        .map(|&co| tree.nearest_vertex(&attrs.positions, flip_position(co, 1), MIRROR_TOLERANCE, |v| attrs.is_visible(v)))
        .collect();
    debug!(
        "X mirror table: {} of {} vertices matched",
        table.iter().filter(|m| m.is_some()).count(),
        table.len()
    );
    table
}

struct PassContext<'a> {
    attrs: &'a VertexAttributeStore,
    tree: &'a SpatialTree,
    topology: FacesTopology<'a>,
    weights: &'a [f32],
    test: BrushTest,
    cache: &'a PaintStrokeCache,
    /// Brush weight, or the averaged weight for the average tool
    paint: f32,
    motion: Vec3,
    start_weights: &'a [f32],
    previous_weights: &'a [f32],
}

fn weight_leaf(ctx: &PassContext<'_>, leaf: LeafId) -> LeafWrites<f32> {
    let mut out = LeafWrites::new(leaf);
    let settings = &ctx.cache.settings;
    let mut neighbors = Neighbors::new();

    for &v in ctx.tree.leaf(leaf).verts() {
        let i = v as usize;
        if !ctx.attrs.is_visible(v) {
            continue;
        }
        let Some(distance) = ctx.test.distance(ctx.attrs.positions[i]) else {
            continue;
        };
        let fade = brush_fade(settings.falloff, distance, ctx.cache.radius, ctx.cache.strength, 0.0, 1.0);
        if fade <= 0.0 {
            continue;
        }

        let target = match settings.tool {
            PaintTool::Draw | PaintTool::Average => ctx.paint,
            PaintTool::Blur => {
                ctx.topology.neighbors(v, false, &mut neighbors);
                let around = neighbors.as_slice();
                if around.is_empty() {
                    continue;
                }
                around.iter().map(|&n| ctx.weights[n as usize]).sum::<f32>() / around.len() as f32
            }
            PaintTool::Smear => {
                let source = smear_source(&ctx.topology, &ctx.attrs.positions, v, ctx.motion, ctx.test.view_normal);
                match source {
                    Some(source) => ctx.previous_weights[source as usize],
                    None => continue,
                }
            }
        };

        let current = ctx.weights[i];
        let weight = if settings.accumulate {
            blend_weight(settings.blend, current, target, fade, settings.invert)
        } else {
            let start = ctx.start_weights[i];
            let blended = blend_weight(settings.blend, start, target, fade, settings.invert);
            clamp_monotonic(start, current, blended)
        };
        if weight != current {
            out.push(v, weight);
        }
    }
    out
}

/// Mean weight of every visible vertex under the brush.
fn average_weight(
    session: &SculptSession,
    attrs: &VertexAttributeStore,
    tree: &SpatialTree,
    weights: &[f32],
    test: &BrushTest,
    leaves: &[LeafId],
    parallel: ParallelSettings,
) -> PaintResult<Option<f32>> {
    let partials = map_leaves(leaves, parallel, &session.cancel, |leaf| {
        tree.leaf(leaf)
            .verts()
            .iter()
            .filter(|&&v| attrs.is_visible(v) && test.distance(attrs.positions[v as usize]).is_some())
            .fold((0.0f32, 0u32), |(sum, count), &v| (sum + weights[v as usize], count + 1))
    })?;
    let (sum, count) = partials
        .into_iter()
        .fold((0.0, 0), |(s, c), (ps, pc)| (s + ps, c + pc));
    Ok((count > 0).then(|| sum / count as f32))
}
