//! Per-tool dab kernels.
//!
//! One call of [`apply_brush_pass`] evaluates the brush under one symmetry
//! transform:
//! - gather the leaves overlapping the brush volume
//! - push undo nodes for leaves touched for the first time this stroke
//! - compute new values per leaf, in parallel when allowed
//! - scatter the values into the attribute store and mark leaves dirty
//!
//! Leaves own disjoint vertex sets, so kernels only read shared state while
//! computing and never race on writes.

use chisel_config::{FalloffCurve, MaskTool, SculptTool};
use glam::Vec3;
use tracing::trace;

use crate::automasking::{AutomaskingCache, automask_factor};
use crate::brush::{AreaSample, BrushTest, brush_fade, sample_area};
use crate::error::SculptResult;
use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology};
use crate::parallel::{LeafWrites, map_leaves};
use crate::session::SculptSession;
use crate::smooth::{neighbor_coords_average_interior, neighbor_mask_average};
use crate::spatial::{LeafDirty, LeafId, SpatialTree};
use crate::stroke::StrokeCache;
use crate::symmetry::SymmetryFrame;
use crate::undo::{LeafUndoTracker, UndoSink};

/// Full-strength smoothing runs this many relaxation passes per dab
const SMOOTH_MAX_ITERATIONS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Draw,
    Inflate,
    Pinch,
    Flatten,
    Grab,
    Thumb,
    Smooth,
}

impl Kernel {
    fn for_tool(tool: SculptTool) -> Option<Self> {
        match tool {
            SculptTool::Draw => Some(Kernel::Draw),
            SculptTool::Inflate => Some(Kernel::Inflate),
            SculptTool::Pinch => Some(Kernel::Pinch),
            SculptTool::Flatten => Some(Kernel::Flatten),
            SculptTool::Grab => Some(Kernel::Grab),
            SculptTool::Thumb => Some(Kernel::Thumb),
            SculptTool::Smooth => Some(Kernel::Smooth),
            SculptTool::Mask => None,
        }
    }
}

/// Read-only state shared by every leaf of a pass.
struct PassContext<'a> {
    attrs: &'a VertexAttributeStore,
    tree: &'a SpatialTree,
    test: BrushTest,
    curve: FalloffCurve,
    strength: f32,
    automasking: Option<&'a AutomaskingCache>,
    /// Positions tested against the brush; stroke-start positions for grab
    test_positions: &'a [Vec3],
    area: AreaSample,
    frame: SymmetryFrame,
}

impl PassContext<'_> {
    /// Influence on `vert`, `None` when hidden, outside the brush or zero.
    #[inline]
    fn fade<T: Topology + ?Sized>(&self, topology: &T, vert: u32, mask: f32) -> Option<f32> {
        if !self.attrs.is_visible(vert) {
            return None;
        }
        let distance = self.test.distance(self.test_positions[vert as usize])?;
        let automask = automask_factor(self.automasking, topology, vert);
        let fade = brush_fade(self.curve, distance, self.test.radius, self.strength, mask, automask);
        (fade != 0.0).then_some(fade)
    }
}

/// Run the stroke's brush once under the current symmetry pass. Returns the
/// number of vertex writes.
pub(crate) fn apply_brush_pass(
    session: &mut SculptSession,
    cache: &StrokeCache,
    frame: &SymmetryFrame,
    feather: f32,
    undo: &mut dyn UndoSink,
    tracker: &mut LeafUndoTracker,
) -> SculptResult<usize> {
    let brush = &cache.brush;
    let strength = cache.strength * feather;

    let (test, gather_test) = if brush.tool.uses_original_positions() {
        let center = cache.pass.transform(cache.initial_location);
        let test = BrushTest::new(brush.falloff_shape, center, cache.radius, frame.view_normal);
        // Vertices tested at their start position may have moved this far
        let reach = cache.radius + frame.grab_delta.length() * strength.abs().max(1.0);
        (test, BrushTest { radius: reach, ..test })
    } else {
        let test = BrushTest::new(brush.falloff_shape, frame.location, cache.radius, frame.view_normal);
        (test, test)
    };

    let leaves = gather_test.gather(session.tree());
    if leaves.is_empty() {
        return Ok(0);
    }
    tracker.push_leaves(undo, session, &leaves)?;

    let mut written = match Kernel::for_tool(brush.tool) {
        None => run_mask_pass(session, cache, &leaves, &test, frame, strength)?,
        Some(Kernel::Smooth) => run_smooth(session, cache, &leaves, &test, frame, strength)?,
        Some(kernel) => run_deform_pass(session, cache, kernel, &leaves, &test, frame, strength)?,
    };

    if brush.tool.deforms() && brush.tool != SculptTool::Smooth && brush.autosmooth > 0.0 {
        written += run_smooth(session, cache, &leaves, &test, frame, brush.autosmooth * feather)?;
    }

    trace!(
        "Pass mirror={} radial={}: {} leaves, {} writes",
        cache.pass.mirror,
        cache.pass.radial_index,
        leaves.len(),
        written
    );
    Ok(written)
}

fn pass_context<'a>(
    session: &'a SculptSession,
    cache: &'a StrokeCache,
    kernel: Option<Kernel>,
    leaves: &[LeafId],
    test: &BrushTest,
    frame: &SymmetryFrame,
    strength: f32,
) -> PassContext<'a> {
    let (attrs, _, tree) = session.parts();
    let area = cache
        .brush
        .tool
        .needs_area_sample()
        .then(|| sample_area(attrs, tree, leaves, test))
        .flatten()
        .unwrap_or(AreaSample {
            center: test.location,
            normal: test.view_normal,
        });

    let test_positions = match (kernel, cache.original_positions()) {
        (Some(Kernel::Grab), Some(original)) if original.len() == attrs.len() => original,
        _ => attrs.positions.as_slice(),
    };

    PassContext {
        attrs,
        tree,
        test: *test,
        curve: cache.brush.falloff,
        strength,
        automasking: cache.automasking(),
        test_positions,
        area,
        frame: *frame,
    }
}

fn run_deform_pass(
    session: &mut SculptSession,
    cache: &StrokeCache,
    kernel: Kernel,
    leaves: &[LeafId],
    test: &BrushTest,
    frame: &SymmetryFrame,
    strength: f32,
) -> SculptResult<usize> {
    let writes = {
        let ctx = pass_context(session, cache, Some(kernel), leaves, test, frame, strength);
        let settings = session.parallel();
        let cancel = &session.cancel;
        crate::with_topology!(session.topology(), |t| {
            map_leaves(leaves, settings, cancel, |leaf| deform_leaf(&ctx, t, kernel, leaf))
        })?
    };
    Ok(session.scatter(&writes, LeafDirty::POSITIONS | LeafDirty::NORMALS, |attrs, v, co| {
        attrs.positions[v as usize] = co;
    }))
}

/// Whole smoothing passes for the integer part of
/// `strength * SMOOTH_MAX_ITERATIONS`, then one partial pass. Strength above
/// one keeps adding passes.
fn run_smooth(
    session: &mut SculptSession,
    cache: &StrokeCache,
    leaves: &[LeafId],
    test: &BrushTest,
    frame: &SymmetryFrame,
    strength: f32,
) -> SculptResult<usize> {
    let strength = strength.max(0.0);
    let max = SMOOTH_MAX_ITERATIONS as f32;
    let count = (strength * max) as u32;
    let last = max * (strength - count as f32 / max);

    let mut written = 0;
    for iteration in 0..=count {
        let iteration_strength = if iteration == count { last } else { 1.0 };
        if iteration_strength <= 0.0 {
            continue;
        }
        written += run_deform_pass(session, cache, Kernel::Smooth, leaves, test, frame, iteration_strength)?;
    }
    Ok(written)
}

fn run_mask_pass(
    session: &mut SculptSession,
    cache: &StrokeCache,
    leaves: &[LeafId],
    test: &BrushTest,
    frame: &SymmetryFrame,
    strength: f32,
) -> SculptResult<usize> {
    let mask_tool = cache.brush.mask_tool;
    let writes = {
        let ctx = pass_context(session, cache, None, leaves, test, frame, strength);
        let settings = session.parallel();
        let cancel = &session.cancel;
        crate::with_topology!(session.topology(), |t| {
            map_leaves(leaves, settings, cancel, |leaf| mask_leaf(&ctx, t, mask_tool, leaf))
        })?
    };
    Ok(session.scatter(&writes, LeafDirty::MASK, |attrs, v, mask| {
        attrs.masks[v as usize] = mask;
    }))
}

fn deform_leaf<T: Topology + ?Sized>(
    ctx: &PassContext<'_>,
    topology: &T,
    kernel: Kernel,
    leaf: LeafId,
) -> LeafWrites<Vec3> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let positions = &ctx.attrs.positions;
    let radius = ctx.test.radius;

    for &v in ctx.tree.leaf(leaf).verts() {
        let Some(fade) = ctx.fade(topology, v, ctx.attrs.masks[v as usize]) else {
            continue;
        };
        let co = positions[v as usize];
        let new_co = match kernel {
            Kernel::Draw => co + ctx.area.normal * radius * fade,
            Kernel::Inflate => co + ctx.attrs.normals[v as usize] * radius * fade,
            Kernel::Pinch => co + (ctx.test.location - co) * fade,
            Kernel::Flatten => {
                let normal = ctx.area.normal;
                co - normal * (co - ctx.area.center).dot(normal) * fade.min(1.0)
            }
            Kernel::Grab => ctx.test_positions[v as usize] + ctx.frame.grab_delta * fade,
            Kernel::Thumb => {
                let delta = ctx.frame.location - ctx.frame.last_location;
                let normal = ctx.area.normal;
                co + (delta - normal * delta.dot(normal)) * fade
            }
            Kernel::Smooth => {
                let average = neighbor_coords_average_interior(topology, positions, v, &mut neighbors);
                co.lerp(average, fade.clamp(0.0, 1.0))
            }
        };
        out.push(v, new_co);
    }
    out
}

/// The mask brush ignores the existing mask when computing its fade.
fn mask_leaf<T: Topology + ?Sized>(
    ctx: &PassContext<'_>,
    topology: &T,
    tool: MaskTool,
    leaf: LeafId,
) -> LeafWrites<f32> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let masks = &ctx.attrs.masks;

    for &v in ctx.tree.leaf(leaf).verts() {
        let Some(fade) = ctx.fade(topology, v, 0.0) else {
            continue;
        };
        let mask = masks[v as usize];
        let new_mask = match tool {
            MaskTool::Draw => (mask + fade).clamp(0.0, 1.0),
            MaskTool::Smooth => {
                let average = neighbor_mask_average(topology, masks, v, &mut neighbors);
                (mask + fade.clamp(0.0, 1.0) * (average - mask)).clamp(0.0, 1.0)
            }
        };
        if new_mask != mask {
            out.push(v, new_mask);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ObjectId;
    use crate::mesh::Mesh;
    use crate::session::{Backing, FacesBacking};
    use crate::spatial::TreeConfig;
    use crate::stroke::StrokeSample;
    use crate::undo::{NoUndo, UndoKind};
    use chisel_config::{BrushSettings, ToolSettings};

    // grid(8, 8, 2.0): vertex (x, y) is y * 9 + x, the center is 40
    const CENTER: usize = 40;
    const CORNER: usize = 0;

    fn session() -> SculptSession {
        SculptSession::with_tree_config(
            ObjectId(1),
            Backing::Faces(FacesBacking::new(Mesh::grid(8, 8, 2.0))),
            ToolSettings::default(),
            TreeConfig {
                max_elements_per_leaf: 8,
            },
        )
    }

    fn run(session: &mut SculptSession, cache: &StrokeCache, kind: UndoKind) -> usize {
        let mut tracker = LeafUndoTracker::new(kind);
        let frame = cache.frame();
        apply_brush_pass(session, cache, &frame, 1.0, &mut NoUndo, &mut tracker).unwrap()
    }

    fn origin() -> StrokeSample {
        StrokeSample::new(Vec3::ZERO, Vec3::Z, 1.0)
    }

    #[test]
    fn test_draw_moves_along_area_normal() {
        let mut session = session();
        let brush = BrushSettings {
            radius: 0.5,
            ..BrushSettings::draw()
        };
        let cache = StrokeCache::new(&brush, &session, &origin()).unwrap();
        assert!(run(&mut session, &cache, UndoKind::Positions) > 0);

        let attrs = session.attrs();
        let moved = attrs.positions[CENTER];
        assert!(moved.z.abs() > 0.01);
        assert!(moved.truncate().length() < 0.001);
        assert_eq!(attrs.positions[CORNER].z, 0.0);
    }

    #[test]
    fn test_fully_masked_vertices_stay() {
        let mut session = session();
        let count = session.attrs().len();
        session.write_attrs(&[]).masks = vec![1.0; count];
        let cache = StrokeCache::new(&BrushSettings::draw(), &session, &origin()).unwrap();
        assert_eq!(run(&mut session, &cache, UndoKind::Positions), 0);
        assert!(session.attrs().positions.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_hidden_vertices_stay() {
        let mut session = session();
        session.write_attrs(&[]).hidden[CENTER] = true;
        let cache = StrokeCache::new(&BrushSettings::inflate(), &session, &origin()).unwrap();
        run(&mut session, &cache, UndoKind::Positions);
        assert_eq!(session.attrs().positions[CENTER].z, 0.0);
    }

    #[test]
    fn test_grab_follows_delta_from_start_positions() {
        let mut session = session();
        let brush = BrushSettings {
            radius: 0.5,
            falloff: FalloffCurve::Constant,
            ..BrushSettings::grab()
        };
        let mut cache = StrokeCache::new(&brush, &session, &origin()).unwrap();
        cache.ensure_original_positions(session.attrs());

        // Two dabs with the same delta give the same result
        let lifted = StrokeSample::new(Vec3::new(0.0, 0.0, 0.2), Vec3::Z, 1.0);
        cache.update(&lifted);
        run(&mut session, &cache, UndoKind::Positions);
        run(&mut session, &cache, UndoKind::Positions);

        let center = session.attrs().positions[CENTER];
        assert!((center.z - 0.2).abs() < 0.001);
        assert_eq!(session.attrs().positions[CORNER].z, 0.0);
    }

    #[test]
    fn test_smooth_flattens_spike() {
        let mut session = session();
        session.write_attrs(&[]).positions[CENTER].z = 0.5;
        let brush = BrushSettings {
            radius: 0.6,
            strength: 1.0,
            falloff: FalloffCurve::Constant,
            ..BrushSettings::smooth()
        };
        let cache = StrokeCache::new(&brush, &session, &origin()).unwrap();
        run(&mut session, &cache, UndoKind::Positions);
        assert!(session.attrs().positions[CENTER].z < 0.25);
    }

    #[test]
    fn test_mask_draw_and_smooth() {
        let mut session = session();
        let brush = BrushSettings {
            radius: 0.1,
            falloff: FalloffCurve::Constant,
            ..BrushSettings::mask()
        };
        let cache = StrokeCache::new(&brush, &session, &origin()).unwrap();
        run(&mut session, &cache, UndoKind::Masks);
        run(&mut session, &cache, UndoKind::Masks);

        let attrs = session.attrs();
        assert!((attrs.masks[CENTER] - 1.0).abs() < 0.001);
        assert_eq!(attrs.masks[CORNER], 0.0);
        assert!(attrs.positions.iter().all(|p| p.z == 0.0));

        // Smoothing pulls the fully masked center toward its unmasked ring
        let smooth = BrushSettings {
            strength: 0.5,
            mask_tool: MaskTool::Smooth,
            ..brush
        };
        let cache = StrokeCache::new(&smooth, &session, &origin()).unwrap();
        run(&mut session, &cache, UndoKind::Masks);
        assert!((session.attrs().masks[CENTER] - 0.5).abs() < 0.001);
    }
}
