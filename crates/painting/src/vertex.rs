//! Vertex color painting: draw, blur, smear and average.
//!
//! Every dab runs once per symmetry pass. A pass gathers the leaves under
//! the brush, captures their colors for undo the first time they are seen,
//! computes new colors per leaf and writes them back. Without accumulation
//! a vertex never moves past what a single full-strength dab from its
//! stroke-start color would give.

use chisel_config::{PaintSettings, PaintTool};
use glam::{Vec3, Vec4, Vec4Swizzles};
use smallvec::SmallVec;
use tracing::{debug, info};

use sculpting::brush::{BrushTest, brush_fade};
use sculpting::host::{ChangeKind, Host, ReportLevel, report};
use sculpting::mesh::VertexAttributeStore;
use sculpting::neighbors::FacesTopology;
use sculpting::parallel::{LeafWrites, map_leaves};
use sculpting::session::SculptSession;
use sculpting::spatial::{LeafDirty, LeafId, SpatialTree};
use sculpting::undo::{LeafUndoTracker, UndoKind, UndoSink};
use sculpting::{SculptError, StrokeSample};

use crate::blend::{blend_color, clip_to_dab};
use crate::error::PaintResult;
use crate::stroke::{PaintStrokeCache, faces_topology, require_faces, smear_source};

/// An interactive vertex paint stroke.
#[derive(Debug)]
pub struct VertexPaintStroke {
    cache: PaintStrokeCache,
    undo_tracker: LeafUndoTracker,
    /// Colors when the stroke started, the reference for clipping
    start_colors: Vec<Vec4>,
    /// Colors after the previous dab, the smear source
    previous_colors: Option<Vec<Vec4>>,
}

impl VertexPaintStroke {
    /// Start a stroke and apply its first dab. Fails before touching
    /// anything when the mesh has no colors or is not a static mesh.
    pub fn begin(
        session: &mut SculptSession,
        settings: &PaintSettings,
        sample: StrokeSample,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> PaintResult<Self> {
        require_faces(session, host)?;
        let Some(colors) = session.attrs().colors.clone() else {
            report(host, ReportLevel::Warning, "Mesh has no color attribute");
            return Err(SculptError::MissingColorAttribute.into());
        };
        session.cancel.reset();

        let cache = PaintStrokeCache::new(settings, &session.tool, &sample);
        info!(
            "Vertex paint stroke started: {:?}, {:?} blend, radius {:.3}",
            settings.tool, settings.blend, cache.radius
        );
        let previous_colors = (settings.tool == PaintTool::Smear).then(|| colors.clone());
        let mut stroke = Self {
            cache,
            undo_tracker: LeafUndoTracker::new(UndoKind::Colors),
            start_colors: colors,
            previous_colors,
        };

        undo.push_begin("Vertex Paint");
        stroke.step(session, undo, host)?;
        Ok(stroke)
    }

    pub fn cache(&self) -> &PaintStrokeCache {
        &self.cache
    }

    /// Apply one dab at `sample`. Returns the number of color writes.
    pub fn update(
        &mut self,
        session: &mut SculptSession,
        sample: StrokeSample,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> PaintResult<usize> {
        self.cache.update(&sample);
        self.step(session, undo, host)
    }

    /// Close the undo step.
    pub fn end(self, session: &mut SculptSession, undo: &mut dyn UndoSink) {
        session.flush_updates();
        undo.push_end();
        info!(
            "Vertex paint stroke finished: {} dabs, {} leaves captured",
            self.cache.step,
            self.undo_tracker.pushed_count()
        );
    }

    fn step(&mut self, session: &mut SculptSession, undo: &mut dyn UndoSink, host: &dyn Host) -> PaintResult<usize> {
        let mut written = 0;
        let passes = self.cache.passes().to_vec();
        for pass in &passes {
            let frame = self.cache.frame(pass);
            let test = self.cache.test(&frame);
            let leaves = test.gather(session.tree());
            if leaves.is_empty() {
                continue;
            }
            self.undo_tracker.push_leaves(undo, session, &leaves)?;

            let writes = {
                let (attrs, _, tree) = session.parts();
                let topology = faces_topology(session)?;
                let Some(colors) = attrs.colors.as_deref() else {
                    return Err(SculptError::MissingColorAttribute.into());
                };
                let paint = match self.cache.settings.tool {
                    PaintTool::Average => {
                        match average_color(session, attrs, tree, colors, &test, &leaves)? {
                            Some(color) => color,
                            None => continue,
                        }
                    }
                    _ => Vec4::from_array(self.cache.settings.color),
                };
                let motion = self.cache.motion(&frame);
                if self.cache.settings.tool == PaintTool::Smear && motion.is_none() {
                    continue;
                }
                let ctx = PassContext {
                    attrs,
                    colors,
                    tree,
                    topology,
                    test,
                    cache: &self.cache,
                    paint,
                    motion: motion.unwrap_or(Vec3::ZERO),
                    start_colors: &self.start_colors,
                    previous_colors: self.previous_colors.as_deref().unwrap_or(colors),
                };
                map_leaves(&leaves, session.parallel(), &session.cancel, |leaf| paint_leaf(&ctx, leaf))?
            };
            written += session.scatter(&writes, LeafDirty::COLOR, |attrs, v, color| {
                if let Some(colors) = attrs.colors.as_mut() {
                    colors[v as usize] = color;
                }
            });
        }

        session.flush_updates();
        if let Some(previous) = self.previous_colors.as_mut()
            && let Some(colors) = session.attrs().colors.as_ref()
        {
            previous.clone_from(colors);
        }
        self.cache.step += 1;
        debug!("Vertex paint dab {}: {} writes", self.cache.step, written);
        host.notify(ChangeKind::Color, session.object());
        Ok(written)
    }
}

struct PassContext<'a> {
    attrs: &'a VertexAttributeStore,
    colors: &'a [Vec4],
    tree: &'a SpatialTree,
    topology: FacesTopology<'a>,
    test: BrushTest,
    cache: &'a PaintStrokeCache,
    /// Brush color, or the averaged color for the average tool
    paint: Vec4,
    motion: Vec3,
    start_colors: &'a [Vec4],
    previous_colors: &'a [Vec4],
}

fn paint_leaf(ctx: &PassContext<'_>, leaf: LeafId) -> LeafWrites<Vec4> {
    let mut out = LeafWrites::new(leaf);
    let settings = &ctx.cache.settings;
    let mut ring: SmallVec<[u32; 32]> = SmallVec::new();

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
                ctx.topology.face_ring(v, &mut ring);
                match rms_color(ring.iter().map(|&c| ctx.colors[c as usize])) {
                    Some(color) => color,
                    None => continue,
                }
            }
            PaintTool::Smear => {
                let source = smear_source(&ctx.topology, &ctx.attrs.positions, v, ctx.motion, ctx.test.view_normal);
                match source {
                    Some(source) => ctx.previous_colors[source as usize],
                    None => continue,
                }
            }
        };

        let current = ctx.colors[i];
        let mut color = blend_color(settings.blend, current, target, fade);
        if !settings.accumulate {
            let original = ctx.start_colors[i];
            let limit = blend_color(settings.blend, original, target, ctx.cache.strength);
            color = clip_to_dab(color, original, limit);
        }
        if color != current {
            out.push(v, color);
        }
    }
    out
}

/// Root mean square of the RGB channels, full alpha.
fn rms_color(colors: impl Iterator<Item = Vec4>) -> Option<Vec4> {
    let (sum, count) = colors.fold((Vec3::ZERO, 0u32), |(sum, count), c| {
        let rgb = c.xyz();
        (sum + rgb * rgb, count + 1)
    });
    (count > 0).then(|| (sum / count as f32).powf(0.5).extend(1.0))
}

/// RMS color of every visible vertex under the brush.
fn average_color(
    session: &SculptSession,
    attrs: &VertexAttributeStore,
    tree: &SpatialTree,
    colors: &[Vec4],
    test: &BrushTest,
    leaves: &[LeafId],
) -> PaintResult<Option<Vec4>> {
    let partials = map_leaves(leaves, session.parallel(), &session.cancel, |leaf| {
        let mut sum = Vec3::ZERO;
        let mut count = 0u32;
        for &v in tree.leaf(leaf).verts() {
            if attrs.is_visible(v) && test.distance(attrs.positions[v as usize]).is_some() {
                let rgb = colors[v as usize].xyz();
                sum += rgb * rgb;
                count += 1;
            }
        }
        (sum, count)
    })?;
    let (sum, count) = partials
        .into_iter()
        .fold((Vec3::ZERO, 0u32), |(s, c), (ps, pc)| (s + ps, c + pc));
    Ok((count > 0).then(|| (sum / count as f32).powf(0.5).extend(1.0)))
}
