//! Mesh filter: whole-mesh deformations driven by a single strength value.
//!
//! Most filters displace from the positions captured at `start`, so
//! repeated updates with the same strength give the same result. The relax
//! variants, sharpen and surface smooth build on the current positions and
//! converge over updates instead.

use bitflags::bitflags;
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SculptResult;
use crate::host::{ChangeKind, Host};
use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology};
use crate::parallel::{LeafWrites, map_leaves};
use crate::session::SculptSession;
use crate::smooth::{
    detail_directions, neighbor_coords_average, neighbor_coords_average_interior, relax_vertex,
    sharpen_factors, surface_smooth_correction, surface_smooth_laplacian,
};
use crate::spatial::{LeafDirty, LeafId, SpatialTree};
use crate::undo::{UndoKind, UndoSink};

use super::{FilterCache, logged_step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MeshFilterType {
    #[default]
    Smooth = 0,
    Scale = 1,
    Inflate = 2,
    Sphere = 3,
    Random = 4,
    Relax = 5,
    RelaxFaceSets = 6,
    SurfaceSmooth = 7,
    Sharpen = 8,
    EnhanceDetails = 9,
}

impl MeshFilterType {
    /// Filters that build on the current positions rather than the
    /// positions at filter start.
    pub fn uses_current_positions(&self) -> bool {
        matches!(
            self,
            MeshFilterType::Relax
                | MeshFilterType::RelaxFaceSets
                | MeshFilterType::SurfaceSmooth
                | MeshFilterType::Sharpen
        )
    }
}

/// Space in which axis restrictions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterOrientation {
    #[default]
    Local = 0,
    World = 1,
    View = 2,
}

bitflags! {
    /// Displacement axes left enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FilterAxes: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

impl Default for FilterAxes {
    fn default() -> Self {
        FilterAxes::all()
    }
}

/// Mesh filter operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshFilterSettings {
    pub filter_type: MeshFilterType,
    /// Passes per update (default: 1)
    pub iterations: u32,
    pub axes: FilterAxes,
    pub orientation: FilterOrientation,
    /// How strongly surface smooth holds the start shape, 0-1 (default: 0.5)
    pub surface_smooth_shape_preservation: f32,
    /// Weight of a vertex's own laplacian in the surface smooth correction
    /// (default: 0.5)
    pub surface_smooth_current_vertex: f32,
    /// Smoothing mixed into sharpen (default: 0.35)
    pub sharpen_smooth_ratio: f32,
    /// Extra push along detail directions (default: 0.0)
    pub sharpen_intensify_detail_strength: f32,
    /// Smoothing passes over the sharpen factors (default: 0)
    pub sharpen_curvature_smooth_iterations: u32,
    /// Seed mixed into the random filter hash (default: 0)
    pub random_seed: u32,
}

impl Default for MeshFilterSettings {
    fn default() -> Self {
        Self {
            filter_type: MeshFilterType::Smooth,
            iterations: 1,
            axes: FilterAxes::all(),
            orientation: FilterOrientation::Local,
            surface_smooth_shape_preservation: 0.5,
            surface_smooth_current_vertex: 0.5,
            sharpen_smooth_ratio: 0.35,
            sharpen_intensify_detail_strength: 0.0,
            sharpen_curvature_smooth_iterations: 0,
            random_seed: 0,
        }
    }
}

/// Rotations supplied by the caller for the world and view orientations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationFrame {
    pub object_to_world: Mat3,
    pub world_to_view: Mat3,
}

impl Default for OrientationFrame {
    fn default() -> Self {
        Self {
            object_to_world: Mat3::IDENTITY,
            world_to_view: Mat3::IDENTITY,
        }
    }
}

impl OrientationFrame {
    /// Object space to the space of `orientation`.
    pub fn matrix(&self, orientation: FilterOrientation) -> Mat3 {
        match orientation {
            FilterOrientation::Local => Mat3::IDENTITY,
            FilterOrientation::World => self.object_to_world,
            FilterOrientation::View => self.world_to_view * self.object_to_world,
        }
    }
}

/// Jenkins lookup3 final mix of two keys.
fn hash_int_2d(kx: u32, ky: u32) -> u32 {
    let mut a = 0xdeadbeef_u32.wrapping_add((2 << 2) + 13);
    let mut b = a;
    let mut c = a;
    a = a.wrapping_add(kx);
    b = b.wrapping_add(ky);

    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(24));
    c
}

/// Random value in [-0.5, 0.5] from the bits of a position.
fn position_noise(position: Vec3, seed: u32) -> f32 {
    let hash = hash_int_2d(position.x.to_bits(), position.y.to_bits()) ^ hash_int_2d(position.z.to_bits(), seed);
    hash as f32 * (1.0 / u32::MAX as f32) - 0.5
}

/// An interactive mesh filter.
#[derive(Debug)]
pub struct MeshFilter {
    settings: MeshFilterSettings,
    cache: FilterCache,
    orientation: Mat3,
    orientation_inverse: Mat3,
    sharpen_factors: Option<Vec<f32>>,
    /// Offsets pointing away from the neighbor average, for sharpen
    sharpen_directions: Option<Vec<Vec3>>,
    /// Offsets pointing toward the neighbor average, for enhance details
    detail_directions: Option<Vec<Vec3>>,
    laplacians: Option<Vec<Vec3>>,
}

impl MeshFilter {
    /// Capture start positions and precompute per-filter data. Opens the
    /// undo step that `finish` closes.
    pub fn start(
        session: &mut SculptSession,
        settings: MeshFilterSettings,
        frame: &OrientationFrame,
        undo: &mut dyn UndoSink,
    ) -> SculptResult<Self> {
        session.cancel.reset();
        let mut cache = FilterCache::new(session, UndoKind::Positions)?;
        cache.capture_positions(session);

        let orientation = frame.matrix(settings.orientation);
        let orientation_inverse = if orientation.determinant().abs() > f32::EPSILON {
            orientation.inverse()
        } else {
            Mat3::IDENTITY
        };

        let mut filter = Self {
            settings,
            cache,
            orientation,
            orientation_inverse,
            sharpen_factors: None,
            sharpen_directions: None,
            detail_directions: None,
            laplacians: None,
        };

        let positions = &session.attrs().positions;
        match filter.settings.filter_type {
            MeshFilterType::Sharpen => {
                let iterations = filter.settings.sharpen_curvature_smooth_iterations;
                let (factors, directions) =
                    crate::with_topology!(session.topology(), |t| sharpen_factors(t, positions, iterations));
                filter.sharpen_factors = Some(factors);
                filter.sharpen_directions = Some(directions);
            }
            MeshFilterType::EnhanceDetails => {
                filter.detail_directions =
                    Some(crate::with_topology!(session.topology(), |t| detail_directions(t, positions)));
            }
            _ => {}
        }

        info!(
            "Mesh filter {:?} started over {} leaves",
            filter.settings.filter_type,
            filter.cache.leaves.len()
        );
        undo.push_begin("Mesh Filter");
        Ok(filter)
    }

    pub fn settings(&self) -> &MeshFilterSettings {
        &self.settings
    }

    pub fn cache(&self) -> &FilterCache {
        &self.cache
    }

    /// Evaluate the filter at `strength`. Returns the number of position
    /// writes.
    pub fn update(
        &mut self,
        session: &mut SculptSession,
        strength: f32,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> SculptResult<usize> {
        self.cache.push_undo(session, undo)?;
        let written = logged_step(session, undo, |session| {
            let mut written = 0;
            for _ in 0..self.settings.iterations {
                written += if self.settings.filter_type == MeshFilterType::SurfaceSmooth {
                    self.surface_smooth_pass(session, strength)?
                } else {
                    self.displace_pass(session, strength)?
                };
                self.cache.iteration += 1;
            }
            Ok(written)
        })?;
        debug!(
            "Mesh filter update at strength {:.3}: {} writes",
            strength, written
        );
        host.notify(ChangeKind::Geometry, session.object());
        Ok(written)
    }

    /// Close the undo step. Applied updates stay applied.
    pub fn finish(self, session: &mut SculptSession, undo: &mut dyn UndoSink) {
        session.flush_updates();
        undo.push_end();
        info!("Mesh filter finished after {} iterations", self.cache.iteration);
    }

    fn context<'a>(&'a self, attrs: &'a VertexAttributeStore, tree: &'a SpatialTree, strength: f32) -> PassContext<'a> {
        PassContext {
            attrs,
            tree,
            filter: self,
            strength,
            relax_face_sets: self.cache.iteration % 3 != 0,
        }
    }

    fn displace_pass(&self, session: &mut SculptSession, strength: f32) -> SculptResult<usize> {
        let writes = {
            let (attrs, topology, tree) = session.parts();
            let ctx = self.context(attrs, tree, strength);
            crate::with_topology!(topology, |t| {
                map_leaves(&self.cache.leaves, session.parallel(), &session.cancel, |leaf| {
                    displace_leaf(&ctx, t, leaf)
                })
            })?
        };
        Ok(session.scatter(&writes, LeafDirty::POSITIONS | LeafDirty::NORMALS, |attrs, v, co| {
            attrs.positions[v as usize] = co;
        }))
    }

    /// Laplacian step for every vertex, then the correction step reading the
    /// laplacians of the first.
    fn surface_smooth_pass(&mut self, session: &mut SculptSession, strength: f32) -> SculptResult<usize> {
        let count = session.attrs().len();
        let mut laplacians = self.laplacians.take().unwrap_or_default();
        laplacians.clear();
        laplacians.resize(count, Vec3::ZERO);

        let first = {
            let (attrs, topology, tree) = session.parts();
            let ctx = self.context(attrs, tree, strength);
            crate::with_topology!(topology, |t| {
                map_leaves(&self.cache.leaves, session.parallel(), &session.cancel, |leaf| {
                    surface_smooth_laplacian_leaf(&ctx, t, leaf)
                })
            })
        };
        let first = match first {
            Ok(first) => first,
            Err(err) => {
                self.laplacians = Some(laplacians);
                return Err(err);
            }
        };
        let mut written = session.scatter(
            &first,
            LeafDirty::POSITIONS | LeafDirty::NORMALS,
            |attrs, v, (co, laplacian)| {
                attrs.positions[v as usize] = co;
                laplacians[v as usize] = laplacian;
            },
        );

        let second = {
            let (attrs, topology, tree) = session.parts();
            let ctx = self.context(attrs, tree, strength);
            let beta = self.settings.surface_smooth_current_vertex;
            crate::with_topology!(topology, |t| {
                map_leaves(&self.cache.leaves, session.parallel(), &session.cancel, |leaf| {
                    surface_smooth_correction_leaf(&ctx, t, &laplacians, beta, leaf)
                })
            })
        };
        let result = second.map(|second| {
            session.scatter(&second, LeafDirty::POSITIONS | LeafDirty::NORMALS, |attrs, v, co| {
                attrs.positions[v as usize] = co;
            })
        });
        self.laplacians = Some(laplacians);
        written += result?;
        Ok(written)
    }
}

struct PassContext<'a> {
    attrs: &'a VertexAttributeStore,
    tree: &'a SpatialTree,
    filter: &'a MeshFilter,
    strength: f32,
    relax_face_sets: bool,
}

impl PassContext<'_> {
    /// Zero the displacement on disabled axes of the chosen orientation.
    #[inline]
    fn restrict_axes(&self, displacement: Vec3) -> Vec3 {
        let axes = self.filter.settings.axes;
        if axes.is_all() {
            return displacement;
        }
        let mut oriented = self.filter.orientation * displacement;
        for (i, axis) in [FilterAxes::X, FilterAxes::Y, FilterAxes::Z].into_iter().enumerate() {
            if !axes.contains(axis) {
                oriented[i] = 0.0;
            }
        }
        self.filter.orientation_inverse * oriented
    }
}

fn displace_leaf<T: Topology + ?Sized>(ctx: &PassContext<'_>, topology: &T, leaf: LeafId) -> LeafWrites<Vec3> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let filter = ctx.filter;
    let settings = &filter.settings;
    let filter_type = settings.filter_type;
    let positions = &ctx.attrs.positions;
    let original_positions = filter.cache.original_positions();
    let original_normals = filter.cache.original_normals();

    for &v in ctx.tree.leaf(leaf).verts() {
        let i = v as usize;
        if !ctx.attrs.is_visible(v) {
            continue;
        }
        let fade = filter.cache.fade(topology, v, ctx.attrs.masks[i], ctx.strength);
        if fade == 0.0 {
            continue;
        }
        if filter_type == MeshFilterType::RelaxFaceSets
            && ctx.relax_face_sets == topology.vert_has_unique_face_set(v)
        {
            continue;
        }

        let co = positions[i];
        let orig = original_positions.get(i).copied().unwrap_or(co);
        let orig_normal = original_normals.get(i).copied().unwrap_or(ctx.attrs.normals[i]);

        let displacement = match filter_type {
            MeshFilterType::Smooth => {
                let average = neighbor_coords_average_interior(topology, positions, v, &mut neighbors);
                (average - orig) * fade.clamp(-1.0, 1.0)
            }
            MeshFilterType::Inflate => orig_normal * fade,
            MeshFilterType::Scale => orig * fade,
            MeshFilterType::Sphere => {
                let to_sphere = orig.normalize_or_zero() * fade;
                let shrink = orig * -fade.abs();
                (to_sphere + shrink) * 0.5
            }
            MeshFilterType::Random => {
                orig_normal.normalize_or_zero() * position_noise(orig, settings.random_seed) * fade
            }
            MeshFilterType::Relax => {
                relax_vertex(topology, ctx.attrs, v, fade.clamp(0.0, 1.0), false, &mut neighbors) - co
            }
            MeshFilterType::RelaxFaceSets => {
                relax_vertex(topology, ctx.attrs, v, fade.clamp(0.0, 1.0), ctx.relax_face_sets, &mut neighbors)
                    - co
            }
            MeshFilterType::Sharpen => sharpen_displacement(ctx, topology, v, &mut neighbors) * fade.clamp(0.0, 0.5),
            MeshFilterType::EnhanceDetails => {
                let direction = filter.detail_directions.as_ref().map_or(Vec3::ZERO, |d| d[i]);
                direction * -fade.abs()
            }
            // Handled by its own two-pass kernel
            MeshFilterType::SurfaceSmooth => Vec3::ZERO,
        };

        let base = if filter_type.uses_current_positions() { co } else { orig };
        out.push(v, base + ctx.restrict_axes(displacement));
    }
    out
}

/// Pull neighbors in proportion to their sharpen factor, smooth flat areas
/// and optionally push along the detail direction.
fn sharpen_displacement<T: Topology + ?Sized>(
    ctx: &PassContext<'_>,
    topology: &T,
    vert: u32,
    neighbors: &mut Neighbors,
) -> Vec3 {
    let filter = ctx.filter;
    let (Some(factors), Some(directions)) = (&filter.sharpen_factors, &filter.sharpen_directions) else {
        return Vec3::ZERO;
    };
    let positions = &ctx.attrs.positions;
    let i = vert as usize;
    let co = positions[i];
    let factor = factors[i];

    topology.neighbors(vert, false, neighbors);
    let mut sharpen = Vec3::ZERO;
    for &n in neighbors.as_slice() {
        sharpen += (positions[n as usize] - co) * factors[n as usize];
    }
    sharpen *= 1.0 - factor;

    let average = neighbor_coords_average(topology, positions, vert, neighbors);
    let smooth = (average - co) * filter.settings.sharpen_smooth_ratio * factor * factor;

    let mut displacement = sharpen + smooth;
    let intensify = filter.settings.sharpen_intensify_detail_strength;
    if intensify > 0.0 {
        displacement += directions[i] * intensify * factor;
    }
    displacement
}

fn surface_smooth_laplacian_leaf<T: Topology + ?Sized>(
    ctx: &PassContext<'_>,
    topology: &T,
    leaf: LeafId,
) -> LeafWrites<(Vec3, Vec3)> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let filter = ctx.filter;
    let alpha = filter.settings.surface_smooth_shape_preservation;
    let positions = &ctx.attrs.positions;
    let original_positions = filter.cache.original_positions();

    // Every visible vertex gets a laplacian, even where the fade is zero
    for &v in ctx.tree.leaf(leaf).verts() {
        let i = v as usize;
        if !ctx.attrs.is_visible(v) {
            continue;
        }
        let co = positions[i];
        let orig = original_positions.get(i).copied().unwrap_or(co);
        let (displacement, laplacian) = surface_smooth_laplacian(topology, positions, orig, v, alpha, &mut neighbors);
        let fade = filter.cache.fade(topology, v, ctx.attrs.masks[i], ctx.strength);
        let new_co = co + ctx.restrict_axes(displacement) * fade.clamp(0.0, 1.0);
        out.push(v, (new_co, laplacian));
    }
    out
}

fn surface_smooth_correction_leaf<T: Topology + ?Sized>(
    ctx: &PassContext<'_>,
    topology: &T,
    laplacians: &[Vec3],
    beta: f32,
    leaf: LeafId,
) -> LeafWrites<Vec3> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    for &v in ctx.tree.leaf(leaf).verts() {
        let i = v as usize;
        if !ctx.attrs.is_visible(v) {
            continue;
        }
        let fade = ctx.filter.cache.fade(topology, v, ctx.attrs.masks[i], ctx.strength);
        if fade == 0.0 {
            continue;
        }
        let correction = surface_smooth_correction(topology, laplacians, v, beta, &mut neighbors);
        out.push(v, ctx.attrs.positions[i] - correction * fade.clamp(0.0, 1.0));
    }
    out
}
