//! Brush test volumes, falloff and area sampling.
//!
//! A [`BrushTest`] decides which vertices a dab touches and how far from
//! the center they are. Spheres measure 3D distance; tubes measure the
//! distance to the view axis through the brush center, so depth is ignored.

use chisel_config::{FalloffCurve, FalloffShape};
use glam::Vec3;

use crate::mesh::VertexAttributeStore;
use crate::spatial::{Aabb, LeafId, SpatialTree};

/// Test volume of one dab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushTest {
    pub shape: FalloffShape,
    pub location: Vec3,
    pub radius: f32,
    /// Tube axis, unit length
    pub view_normal: Vec3,
}

impl BrushTest {
    pub fn new(shape: FalloffShape, location: Vec3, radius: f32, view_normal: Vec3) -> Self {
        Self {
            shape,
            location,
            radius,
            view_normal: view_normal.normalize_or(Vec3::Z),
        }
    }

    pub fn sphere(location: Vec3, radius: f32) -> Self {
        Self::new(FalloffShape::Sphere, location, radius, Vec3::Z)
    }

    /// Distance of `point` from the brush center, or `None` outside the
    /// volume.
    #[inline]
    pub fn distance(&self, point: Vec3) -> Option<f32> {
        let offset = point - self.location;
        let distance_sq = match self.shape {
            FalloffShape::Sphere => offset.length_squared(),
            FalloffShape::Tube => {
                let lateral = offset - self.view_normal * offset.dot(self.view_normal);
                lateral.length_squared()
            }
        };
        (distance_sq <= self.radius * self.radius).then(|| distance_sq.sqrt())
    }

    pub fn intersects(&self, bounds: &Aabb) -> bool {
        match self.shape {
            FalloffShape::Sphere => bounds.intersects_sphere(self.location, self.radius),
            FalloffShape::Tube => bounds.intersects_tube(self.location, self.view_normal, self.radius),
        }
    }

    /// Leaves whose bounds overlap the volume.
    pub fn gather(&self, tree: &SpatialTree) -> Vec<LeafId> {
        tree.gather(|bounds| self.intersects(bounds))
    }
}

/// Brush influence on one vertex: falloff, strength, mask and automasking
/// multiplied together.
#[inline]
pub fn brush_fade(curve: FalloffCurve, distance: f32, radius: f32, strength: f32, mask: f32, automask: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    strength * curve.evaluate(distance / radius) * (1.0 - mask) * automask
}

/// Averaged center and normal of the vertices under a brush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaSample {
    pub center: Vec3,
    pub normal: Vec3,
}

/// Sample the visible vertices of `leaves` inside `test`. Falls back to
/// the view normal when the normals cancel out; `None` if nothing is under
/// the brush.
pub fn sample_area(
    attrs: &VertexAttributeStore,
    tree: &SpatialTree,
    leaves: &[LeafId],
    test: &BrushTest,
) -> Option<AreaSample> {
    let mut center = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut count = 0usize;
    for &leaf in leaves {
        for &v in tree.leaf(leaf).verts() {
            if !attrs.is_visible(v) {
                continue;
            }
            let position = attrs.positions[v as usize];
            if test.distance(position).is_none() {
                continue;
            }
            center += position;
            normal += attrs.normals[v as usize];
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(AreaSample {
        center: center / count as f32,
        normal: normal.try_normalize().unwrap_or(test.view_normal),
    })
}
