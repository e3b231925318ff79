//! Primitive mesh builders.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use super::faces::Mesh;

impl Mesh {
    /// Axis-aligned cube centered at the origin, one quad per side.
    ///
    /// Vertex 0 is the `(-, -, -)` corner; vertices 0..4 are the bottom ring
    /// and 4..8 the top ring.
    pub fn cube(size: f32) -> Mesh {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        let faces: [[u32; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [0, 4, 7, 3],
            [1, 2, 6, 5],
        ];
        Self::from_valid_polygons(positions, &faces)
    }

    /// Flat grid in the XY plane, centered at the origin, facing +Z.
    ///
    /// Vertex `(x, y)` has index `y * (x_segments + 1) + x`.
    pub fn grid(x_segments: u32, y_segments: u32, size: f32) -> Mesh {
        let x_segments = x_segments.max(1);
        let y_segments = y_segments.max(1);
        let row = x_segments + 1;

        let mut positions = Vec::with_capacity((row * (y_segments + 1)) as usize);
        for y in 0..=y_segments {
            for x in 0..=x_segments {
                positions.push(Vec3::new(
                    (x as f32 / x_segments as f32 - 0.5) * size,
                    (y as f32 / y_segments as f32 - 0.5) * size,
                    0.0,
                ));
            }
        }

        let mut faces = Vec::with_capacity((x_segments * y_segments) as usize);
        for y in 0..y_segments {
            for x in 0..x_segments {
                let i = y * row + x;
                faces.push([i, i + 1, i + row + 1, i + row]);
            }
        }
        Self::from_valid_polygons(positions, &faces)
    }

    /// UV sphere with single-vertex poles. Vertex 0 is the +Z pole.
    pub fn uv_sphere(segments: u32, rings: u32, radius: f32) -> Mesh {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut positions = vec![Vec3::new(0.0, 0.0, radius)];
        for ring in 1..rings {
            let phi = PI * ring as f32 / rings as f32;
            for seg in 0..segments {
                let theta = TAU * seg as f32 / segments as f32;
                positions.push(Vec3::new(
                    radius * phi.sin() * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                    radius * phi.cos(),
                ));
            }
        }
        let bottom = positions.len() as u32;
        positions.push(Vec3::new(0.0, 0.0, -radius));

        let ring_start = |ring: u32| 1 + (ring - 1) * segments;
        let mut faces: Vec<Vec<u32>> = Vec::new();
        for seg in 0..segments {
            let next = (seg + 1) % segments;
            faces.push(vec![0, ring_start(1) + seg, ring_start(1) + next]);
        }
        for ring in 1..rings - 1 {
            let a = ring_start(ring);
            let b = ring_start(ring + 1);
            for seg in 0..segments {
                let next = (seg + 1) % segments;
                faces.push(vec![a + seg, b + seg, b + next, a + next]);
            }
        }
        let last = ring_start(rings - 1);
        for seg in 0..segments {
            let next = (seg + 1) % segments;
            faces.push(vec![bottom, last + next, last + seg]);
        }
        Self::from_valid_polygons(positions, &faces)
    }
}
