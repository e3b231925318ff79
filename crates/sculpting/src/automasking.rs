//! Automasking: per-vertex factors in [0, 1] that gate brush influence.
//!
//! Enabled modes combine by multiplication, so turning on another mode can
//! only lower a factor:
//! - `TOPOLOGY`: 1 on the geometry connected to the active vertex, 0 elsewhere
//! - `FACE_SETS`: 0 outside the active face set
//! - `BOUNDARY_EDGES` / `BOUNDARY_FACE_SETS`: eased in over `N` layers away
//!   from open boundaries / face set borders, `1 - (1 - d/N)²`
//!
//! Most combinations are cheap to derive per vertex, so the cache only keeps
//! a factor array when a mode needs connectivity (topology, or boundary
//! easing over more than one layer).

use chisel_config::brush::DEFAULT_BOUNDARY_PROPAGATION_STEPS;
use chisel_config::{AutomaskingFlags, BrushSettings, FalloffShape, SymmetryFlags, ToolSettings};
use glam::Vec3;
use tracing::debug;

use crate::error::{SculptError, SculptResult};
use crate::floodfill::{FloodFill, layer_distances};
use crate::neighbors::{Topology, TopologyRef};
use crate::session::{BackingKind, SculptSession};
use crate::symmetry::{flip_position, mirror_passes};

/// Inputs that decide which automasking modes apply to an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomaskingSettings {
    /// Tool-level flags OR-ed with the brush flags
    pub flags: AutomaskingFlags,
    /// Layers over which boundary modes ease in (at least 1)
    pub propagation_steps: u32,
    /// Brush radius at stroke start, also the search radius for mirrored seeds
    pub radius: f32,
    /// Clip topology automasking to `radius` around the active vertex
    pub radius_constrained: bool,
    pub symmetry: SymmetryFlags,
}

impl AutomaskingSettings {
    pub fn for_brush(brush: &BrushSettings, tool: &ToolSettings) -> Self {
        let constrained =
            brush.tool.is_radius_constrained() && brush.falloff_shape == FalloffShape::Sphere;
        Self {
            flags: tool.automasking | brush.automasking,
            propagation_steps: brush.boundary_propagation_steps.max(1),
            radius: brush.radius,
            radius_constrained: constrained,
            symmetry: tool.symmetry,
        }
    }

    /// Filters only see the tool-level flags.
    pub fn for_filter(tool: &ToolSettings) -> Self {
        Self {
            flags: tool.automasking,
            propagation_steps: DEFAULT_BOUNDARY_PROPAGATION_STEPS,
            radius: f32::MAX,
            radius_constrained: false,
            symmetry: tool.symmetry,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Whether factors need connectivity and must be computed up front.
    pub fn needs_factors(&self) -> bool {
        self.flags.contains(AutomaskingFlags::TOPOLOGY)
            || (self.flags.has_boundary_mode() && self.propagation_steps != 1)
    }
}

/// Automasking state for one stroke or filter.
#[derive(Debug, Clone)]
pub struct AutomaskingCache {
    flags: AutomaskingFlags,
    active_face_set: i32,
    factors: Option<Vec<f32>>,
}

impl AutomaskingCache {
    /// Build the cache for the session's current active vertex and face
    /// set. Returns `None` when no mode is enabled, and under dynamic
    /// topology, where automasking does not apply.
    ///
    /// An active vertex that is not a vertex of the current mesh is an
    /// [`SculptError::Invariant`].
    pub fn build(settings: &AutomaskingSettings, session: &SculptSession) -> SculptResult<Option<Self>> {
        if !settings.is_enabled() {
            return Ok(None);
        }
        if session.kind() == BackingKind::Dyntopo {
            debug!("Automasking skipped under dynamic topology");
            return Ok(None);
        }

        let mut cache = Self {
            flags: settings.flags,
            active_face_set: session.active_face_set,
            factors: None,
        };
        if settings.needs_factors() {
            cache.factors = Some(cache.compute_factors(settings, session)?);
        }
        debug!(
            "Automasking {:?}, face set {}, precomputed: {}",
            cache.flags,
            cache.active_face_set,
            cache.factors.is_some()
        );
        Ok(Some(cache))
    }

    pub fn flags(&self) -> AutomaskingFlags {
        self.flags
    }

    pub fn is_precomputed(&self) -> bool {
        self.factors.is_some()
    }

    /// Factor for one vertex.
    pub fn factor<T: Topology + ?Sized>(&self, topology: &T, vert: u32) -> f32 {
        if let Some(factors) = &self.factors {
            return factors.get(vert as usize).copied().unwrap_or(1.0);
        }

        if self.flags.contains(AutomaskingFlags::FACE_SETS)
            && !topology.vert_has_face_set(vert, self.active_face_set)
        {
            return 0.0;
        }
        // One propagation layer: only the boundary itself is suppressed
        if self.flags.contains(AutomaskingFlags::BOUNDARY_EDGES) && topology.is_boundary(vert) {
            return 0.0;
        }
        if self.flags.contains(AutomaskingFlags::BOUNDARY_FACE_SETS)
            && !topology.vert_has_unique_face_set(vert)
        {
            return 0.0;
        }
        1.0
    }

    fn compute_factors(&self, settings: &AutomaskingSettings, session: &SculptSession) -> SculptResult<Vec<f32>> {
        let (attrs, topology, tree) = session.parts();
        let mut factors = vec![1.0f32; attrs.len()];

        if self.flags.contains(AutomaskingFlags::TOPOLOGY) {
            match session.active_vertex {
                Some(active) => {
                    let valid = crate::with_topology!(topology, |t| t.is_valid_vertex(active));
                    if active as usize >= attrs.len() || !valid {
                        return Err(SculptError::Invariant("active vertex is not part of the mesh"));
                    }
                    let location = attrs.positions[active as usize];
                    let mut fill = FloodFill::new(attrs.len());
                    fill.add_initial_with_symmetry(tree, attrs, active, settings.radius, settings.symmetry);
                    // Seeds count as reached; other vertices only when the step accepts them
                    let mut reached: Vec<bool> = (0..attrs.len() as u32).map(|v| fill.is_visited(v)).collect();
                    fill.execute_on(topology, attrs, |_, to, _| {
                        let accept = !settings.radius_constrained
                            || inside_radius_symmetric(
                                attrs.positions[to as usize],
                                location,
                                settings.radius,
                                settings.symmetry,
                            );
                        reached[to as usize] = accept;
                        accept
                    });
                    for (factor, reached) in factors.iter_mut().zip(&reached) {
                        if !reached {
                            *factor = 0.0;
                        }
                    }
                }
                None => debug!("Topology automasking without an active vertex, ignored"),
            }
        }

        crate::with_topology!(topology, |t| {
            if self.flags.contains(AutomaskingFlags::FACE_SETS) {
                for (v, factor) in factors.iter_mut().enumerate() {
                    if !t.vert_has_face_set(v as u32, self.active_face_set) {
                        *factor = 0.0;
                    }
                }
            }
        });

        if self.flags.contains(AutomaskingFlags::BOUNDARY_EDGES) {
            let seeds: Vec<u32> = crate::with_topology!(topology, |t| {
                (0..attrs.len() as u32).filter(|&v| t.is_boundary(v)).collect()
            });
            apply_boundary_easing(&mut factors, topology, session, seeds, settings.propagation_steps);
        }
        if self.flags.contains(AutomaskingFlags::BOUNDARY_FACE_SETS) {
            let seeds: Vec<u32> = crate::with_topology!(topology, |t| {
                (0..attrs.len() as u32)
                    .filter(|&v| !t.vert_has_unique_face_set(v))
                    .collect()
            });
            apply_boundary_easing(&mut factors, topology, session, seeds, settings.propagation_steps);
        }

        Ok(factors)
    }
}

/// Automasking factor of `vert`, 1.0 when there is no cache.
#[inline]
pub fn automask_factor<T: Topology + ?Sized>(
    cache: Option<&AutomaskingCache>,
    topology: &T,
    vert: u32,
) -> f32 {
    match cache {
        None => 1.0,
        Some(cache) => cache.factor(topology, vert),
    }
}

fn apply_boundary_easing(
    factors: &mut [f32],
    topology: TopologyRef<'_>,
    session: &SculptSession,
    seeds: Vec<u32>,
    steps: u32,
) {
    if seeds.is_empty() {
        return;
    }
    let steps = steps.max(1);
    let distances = layer_distances(topology, session.attrs(), seeds, steps);
    for (factor, &d) in factors.iter_mut().zip(&distances) {
        if d > steps {
            continue;
        }
        let p = 1.0 - d as f32 / steps as f32;
        *factor *= 1.0 - p * p;
    }
}

/// `point` lies within `radius` of `location` or of one of its mirrored
/// copies.
fn inside_radius_symmetric(point: Vec3, location: Vec3, radius: f32, symmetry: SymmetryFlags) -> bool {
    mirror_passes(symmetry).any(|pass| point.distance(flip_position(location, pass)) <= radius)
}
