//! Spatial data structures for sculpting queries.
//!
//! This module provides a bounding-volume tree over mesh elements for:
//! - Gathering the leaves a brush volume touches
//! - Per-leaf dirty tracking for normals, masks, colors and visibility
//! - Nearest-vertex lookups (active vertex, symmetric seeds)
//!
//! Leaves are also the unit of parallel work: every vertex is owned by
//! exactly one leaf.

mod tree;

use glam::Vec3;

pub use tree::{Leaf, LeafDirty, LeafId, SpatialTree, TreeConfig};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn include_aabb(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Index of the longest axis (0 = X, 1 = Y, 2 = Z).
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Intersection with an infinite cylinder around `center` along
    /// `axis` (unit length), tested conservatively with the box's
    /// bounding sphere.
    pub fn intersects_tube(&self, center: Vec3, axis: Vec3, radius: f32) -> bool {
        let half = self.size().length() * 0.5;
        let offset = self.center() - center;
        let lateral = offset - axis * offset.dot(axis);
        lateral.length() <= radius + half
    }
}
