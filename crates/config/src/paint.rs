//! Vertex paint and weight paint brush settings.

use serde::{Deserialize, Serialize};

use crate::brush::{FalloffCurve, FalloffShape};

/// Paint tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaintTool {
    /// Blend the brush color/weight into the target
    #[default]
    Draw = 0,
    /// Average with surrounding values
    Blur = 1,
    /// Push existing values along the stroke direction
    Smear = 2,
    /// Paint the mean of everything under the brush
    Average = 3,
}

/// Blend mode used by the draw tool.
///
/// Weight paint only understands the first six modes; the rest fall back
/// to `Mix` there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaintBlend {
    #[default]
    Mix = 0,
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Lighten = 4,
    Darken = 5,
    EraseAlpha = 6,
    AddAlpha = 7,
    Screen = 8,
    Overlay = 9,
    Difference = 10,
}

/// Settings for vertex and weight paint strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintSettings {
    /// Active tool
    pub tool: PaintTool,
    /// Blend mode for the draw tool
    pub blend: PaintBlend,
    /// Brush color (linear RGBA)
    pub color: [f32; 4],
    /// Brush weight for weight paint (default: 1.0)
    pub weight: f32,
    /// Radius in object-space units
    pub radius: f32,
    /// Strength (default: 1.0)
    pub strength: f32,
    /// Falloff curve
    pub falloff: FalloffCurve,
    /// Test volume shape
    pub falloff_shape: FalloffShape,
    /// Keep accumulating past the single-dab limit ("spray")
    pub accumulate: bool,
    /// Flip the stroke: mix paints `1 - weight`, add/subtract and
    /// lighten/darken swap (weight paint only)
    pub invert: bool,
    /// Write the mirrored vertex in the mirrored group (weight paint only)
    pub mirror_x: bool,
    /// Rescale unlocked groups so each vertex's weights sum to one
    pub auto_normalize: bool,
    /// Whether pressure scales the strength
    pub pressure_affects_strength: bool,
}

impl Default for PaintSettings {
    fn default() -> Self {
        Self {
            tool: PaintTool::Draw,
            blend: PaintBlend::Mix,
            color: [1.0, 1.0, 1.0, 1.0],
            weight: 1.0,
            radius: crate::brush::DEFAULT_RADIUS,
            strength: 1.0,
            falloff: FalloffCurve::Smooth,
            falloff_shape: FalloffShape::Sphere,
            accumulate: false,
            invert: false,
            mirror_x: false,
            auto_normalize: false,
            pressure_affects_strength: true,
        }
    }
}

impl PaintSettings {
    pub fn effective_strength(&self, pressure: f32) -> f32 {
        if self.pressure_affects_strength {
            self.strength * pressure
        } else {
            self.strength
        }
    }
}
