//! Mirror and radial symmetry passes.
//!
//! Mirror pass `i` is a 3-bit mask over X/Y/Z; it is enabled when `i` is
//! zero or a subset of the enabled mirror axes. Each mirror pass is
//! followed by `count - 1` radial repeats around each axis with radial
//! symmetry, at angles `2π·k/count`.

use std::f32::consts::TAU;

use chisel_config::{SymmetryFlags, ToolSettings};
use glam::{Quat, Vec3};

/// Mirror passes enabled by `symmetry`, pass 0 first.
pub fn mirror_passes(symmetry: SymmetryFlags) -> impl Iterator<Item = u8> {
    let enabled = symmetry.bits();
    (0u8..8).filter(move |&pass| pass == 0 || pass & !enabled == 0)
}

/// Negate the components selected by a mirror pass.
pub fn flip_position(v: Vec3, pass: u8) -> Vec3 {
    Vec3::new(
        if pass & 1 != 0 { -v.x } else { v.x },
        if pass & 2 != 0 { -v.y } else { v.y },
        if pass & 4 != 0 { -v.z } else { v.z },
    )
}

/// One application of the brush under a mirror and rotation transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryPass {
    /// Mirror bits (0 = no mirroring)
    pub mirror: u8,
    /// Radial axis (0 = X, 1 = Y, 2 = Z), `None` for the unrotated pass
    pub radial_axis: Option<usize>,
    /// Index of the radial repeat (0 for the unrotated pass)
    pub radial_index: u8,
    pub rotation: Quat,
}

impl SymmetryPass {
    pub const IDENTITY: SymmetryPass = SymmetryPass {
        mirror: 0,
        radial_axis: None,
        radial_index: 0,
        rotation: Quat::IDENTITY,
    };

    /// The first pass of a step, whose result seeds the next step.
    pub fn is_primary(&self) -> bool {
        self.mirror == 0 && self.radial_index == 0
    }

    /// Flip, then rotate.
    pub fn transform(&self, v: Vec3) -> Vec3 {
        self.rotation * flip_position(v, self.mirror)
    }

    pub fn apply(&self, frame: &SymmetryFrame) -> SymmetryFrame {
        SymmetryFrame {
            location: self.transform(frame.location),
            last_location: self.transform(frame.last_location),
            grab_delta: self.transform(frame.grab_delta),
            view_normal: self.transform(frame.view_normal),
        }
    }
}

/// Brush-space values that are transformed per pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymmetryFrame {
    pub location: Vec3,
    pub last_location: Vec3,
    pub grab_delta: Vec3,
    pub view_normal: Vec3,
}

/// Every pass for the tool's mirror and radial settings, pass 0 first.
pub fn symmetry_passes(tool: &ToolSettings) -> Vec<SymmetryPass> {
    let mut passes = Vec::new();
    for mirror in mirror_passes(tool.symmetry) {
        passes.push(SymmetryPass {
            mirror,
            ..SymmetryPass::IDENTITY
        });
        for (axis, &count) in tool.radial_symmetry.iter().enumerate() {
            let axis_vec = [Vec3::X, Vec3::Y, Vec3::Z][axis];
            for index in 1..count.max(1) {
                let angle = TAU * index as f32 / count as f32;
                passes.push(SymmetryPass {
                    mirror,
                    radial_axis: Some(axis),
                    radial_index: index,
                    rotation: Quat::from_axis_angle(axis_vec, angle),
                });
            }
        }
    }
    passes
}

/// Strength multiplier that keeps overlapping symmetric dabs from adding
/// up: the reciprocal of the summed overlap of every pass with the
/// original dab.
pub fn feather_factor(passes: &[SymmetryPass], location: Vec3, radius: f32) -> f32 {
    if radius <= 0.0 {
        return 1.0;
    }
    let overlap: f32 = passes
        .iter()
        .map(|pass| {
            let distance = pass.transform(location).distance(location);
            (1.0 - distance / (2.0 * radius)).max(0.0)
        })
        .sum();
    if overlap > 0.0 { 1.0 / overlap } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_pass_enumeration() {
        let all: Vec<u8> = mirror_passes(SymmetryFlags::all()).collect();
        assert_eq!(all, (0..8).collect::<Vec<_>>());

        let xz: Vec<u8> = mirror_passes(SymmetryFlags::X | SymmetryFlags::Z).collect();
        assert_eq!(xz, vec![0, 1, 4, 5]);

        let none: Vec<u8> = mirror_passes(SymmetryFlags::empty()).collect();
        assert_eq!(none, vec![0]);
    }

    #[test]
    fn test_every_mirror_combination() {
        for bits in 0u8..8 {
            let flags = SymmetryFlags::from_bits_truncate(bits);
            let passes: Vec<u8> = mirror_passes(flags).collect();
            assert_eq!(passes.len(), 1 << bits.count_ones());
            assert!(passes.iter().all(|&p| p & !bits == 0));
        }
    }

    #[test]
    fn test_flip_then_rotate() {
        let mut tool = ToolSettings {
            symmetry: SymmetryFlags::X,
            ..Default::default()
        };
        tool.radial_symmetry = [1, 1, 4];
        let passes = symmetry_passes(&tool);
        // Two mirror passes, each with three extra radial repeats
        assert_eq!(passes.len(), 8);
        assert!(passes[0].is_primary());

        let p = Vec3::new(1.0, 0.0, 0.0);
        let quarter = passes[1].transform(p);
        assert!((quarter - Vec3::Y).length() < 0.001);

        let mirrored = passes[4].transform(p);
        assert_eq!(passes[4].mirror, 1);
        assert!((mirrored - Vec3::NEG_X).length() < 0.001);
    }

    #[test]
    fn test_frame_transform() {
        let pass = SymmetryPass {
            mirror: 1,
            ..SymmetryPass::IDENTITY
        };
        let frame = SymmetryFrame {
            location: Vec3::new(0.5, 0.1, 0.0),
            last_location: Vec3::new(0.4, 0.1, 0.0),
            grab_delta: Vec3::new(0.1, 0.0, 0.0),
            view_normal: Vec3::Z,
        };
        let mirrored = pass.apply(&frame);
        assert!((mirrored.location.x + 0.5).abs() < 0.001);
        assert!((mirrored.grab_delta.x + 0.1).abs() < 0.001);
        assert!((mirrored.view_normal - Vec3::Z).length() < 0.001);
    }

    #[test]
    fn test_feather_halves_strength_on_the_mirror_plane() {
        let tool = ToolSettings {
            symmetry: SymmetryFlags::X,
            ..Default::default()
        };
        let passes = symmetry_passes(&tool);
        let on_plane = feather_factor(&passes, Vec3::new(0.0, 0.3, 0.0), 0.1);
        assert!((on_plane - 0.5).abs() < 0.001);
        let far = feather_factor(&passes, Vec3::new(1.0, 0.0, 0.0), 0.1);
        assert!((far - 1.0).abs() < 0.001);
    }
}
