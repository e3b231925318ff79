//! Sculpt brush settings and falloff curves.

use serde::{Deserialize, Serialize};

use crate::tool::AutomaskingFlags;

/// Default brush radius in object-space units
pub const DEFAULT_RADIUS: f32 = 0.25;

/// Default brush strength
pub const DEFAULT_STRENGTH: f32 = 0.5;

/// Default number of boundary automasking propagation steps
pub const DEFAULT_BOUNDARY_PROPAGATION_STEPS: u32 = 1;

/// Falloff curve for brush influence.
///
/// Determines how brush strength decreases from center to edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FalloffCurve {
    /// Linear falloff: strength = 1 - distance/radius
    Linear = 0,
    /// Smooth falloff: hermite interpolation
    #[default]
    Smooth = 1,
    /// Sharp falloff: quadratic decay
    Sharp = 2,
    /// Constant: full strength within radius
    Constant = 3,
    /// Sphere: spherical falloff (sqrt-based)
    Sphere = 4,
    /// Root: square root of the linear falloff
    Root = 5,
    /// Inverse square: fast rise near the edge, flat in the middle
    InverseSquare = 6,
}

impl FalloffCurve {
    /// Calculate falloff strength at a given normalized distance (0.0 = center, 1.0 = edge).
    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        let d = normalized_distance.clamp(0.0, 1.0);
        let t = 1.0 - d;
        match self {
            FalloffCurve::Linear => t,
            // Hermite smoothstep on the inverted distance
            FalloffCurve::Smooth => t * t * (3.0 - 2.0 * t),
            FalloffCurve::Sharp => t * t,
            FalloffCurve::Constant => 1.0,
            FalloffCurve::Sphere => (1.0 - d * d).max(0.0).sqrt(),
            FalloffCurve::Root => t.sqrt(),
            FalloffCurve::InverseSquare => t * (2.0 - t),
        }
    }
}

/// Shape of the brush test volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FalloffShape {
    /// Distance measured in 3D
    #[default]
    Sphere = 0,
    /// Distance measured in the view plane (infinite depth along the view normal)
    Tube = 1,
}

/// Sculpt tool driven by a brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SculptTool {
    /// Offset along the sampled area normal
    #[default]
    Draw = 0,
    /// Offset along each vertex normal
    Inflate = 1,
    /// Pull vertices toward the brush center
    Pinch = 2,
    /// Move vertices toward the sampled area plane
    Flatten = 3,
    /// Drag stroke-start geometry along with the cursor
    Grab = 4,
    /// Like grab, constrained to the surface plane
    Thumb = 5,
    /// Relax vertex positions toward their neighbor average
    Smooth = 6,
    /// Paint or smooth the mask attribute
    Mask = 7,
}

impl SculptTool {
    /// Tools whose topology automasking is clipped to the brush radius.
    pub fn is_radius_constrained(&self) -> bool {
        matches!(self, SculptTool::Grab | SculptTool::Thumb)
    }

    /// Tools that move vertex positions (as opposed to painting attributes).
    pub fn deforms(&self) -> bool {
        !matches!(self, SculptTool::Mask)
    }

    /// Tools that displace from the stroke-start snapshot rather than the live mesh.
    pub fn uses_original_positions(&self) -> bool {
        matches!(self, SculptTool::Grab)
    }

    /// Tools that need the averaged normal/center of the brushed area.
    pub fn needs_area_sample(&self) -> bool {
        matches!(
            self,
            SculptTool::Draw | SculptTool::Flatten | SculptTool::Thumb
        )
    }

    /// Tools that run dynamic topology remeshing under the brush.
    pub fn supports_dyntopo(&self) -> bool {
        !matches!(self, SculptTool::Grab | SculptTool::Thumb | SculptTool::Mask)
    }
}

/// Sub-mode of the mask tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskTool {
    #[default]
    Draw = 0,
    Smooth = 1,
}

/// Stroke direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BrushDirection {
    #[default]
    Add = 0,
    Subtract = 1,
}

impl BrushDirection {
    pub fn sign(&self) -> f32 {
        match self {
            BrushDirection::Add => 1.0,
            BrushDirection::Subtract => -1.0,
        }
    }
}

/// Sculpt brush settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    /// Display name
    pub name: String,
    /// Tool driven by this brush
    pub tool: SculptTool,
    /// Base radius in object-space units (default: 0.25)
    pub radius: f32,
    /// Strength multiplier (default: 0.5)
    pub strength: f32,
    /// Falloff curve (default: Smooth)
    pub falloff: FalloffCurve,
    /// Test volume shape (default: Sphere)
    pub falloff_shape: FalloffShape,
    /// Brush-level automasking, OR-ed with the tool-level flags
    pub automasking: AutomaskingFlags,
    /// Steps over which boundary automasking eases in (default: 1)
    pub boundary_propagation_steps: u32,
    /// Whether pressure scales the radius
    pub pressure_affects_radius: bool,
    /// Whether pressure scales the strength
    pub pressure_affects_strength: bool,
    /// Spacing between dabs as fraction of radius (0.0 = every sample)
    pub spacing: f32,
    /// Add or subtract
    pub direction: BrushDirection,
    /// Tangent-plane smoothing applied after each deforming dab (default: 0.0)
    pub autosmooth: f32,
    /// Mask tool sub-mode
    pub mask_tool: MaskTool,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            name: "Draw".to_string(),
            tool: SculptTool::Draw,
            radius: DEFAULT_RADIUS,
            strength: DEFAULT_STRENGTH,
            falloff: FalloffCurve::Smooth,
            falloff_shape: FalloffShape::Sphere,
            automasking: AutomaskingFlags::empty(),
            boundary_propagation_steps: DEFAULT_BOUNDARY_PROPAGATION_STEPS,
            pressure_affects_radius: false,
            pressure_affects_strength: true,
            spacing: 0.1,
            direction: BrushDirection::Add,
            autosmooth: 0.0,
            mask_tool: MaskTool::Draw,
        }
    }
}

impl BrushSettings {
    fn preset(name: &str, tool: SculptTool) -> Self {
        Self {
            name: name.to_string(),
            tool,
            ..Default::default()
        }
    }

    pub fn draw() -> Self {
        Self::preset("Draw", SculptTool::Draw)
    }

    pub fn inflate() -> Self {
        Self {
            strength: 0.3,
            ..Self::preset("Inflate", SculptTool::Inflate)
        }
    }

    pub fn pinch() -> Self {
        Self {
            strength: 0.4,
            falloff: FalloffCurve::Sharp,
            ..Self::preset("Pinch", SculptTool::Pinch)
        }
    }

    pub fn flatten() -> Self {
        Self {
            strength: 0.4,
            ..Self::preset("Flatten", SculptTool::Flatten)
        }
    }

    pub fn grab() -> Self {
        Self {
            strength: 1.0,
            spacing: 0.0,
            ..Self::preset("Grab", SculptTool::Grab)
        }
    }

    pub fn thumb() -> Self {
        Self {
            strength: 1.0,
            spacing: 0.0,
            ..Self::preset("Thumb", SculptTool::Thumb)
        }
    }

    pub fn smooth() -> Self {
        Self {
            strength: 0.5,
            ..Self::preset("Smooth", SculptTool::Smooth)
        }
    }

    pub fn mask() -> Self {
        Self {
            strength: 1.0,
            ..Self::preset("Mask", SculptTool::Mask)
        }
    }

    /// Get effective radius based on pressure.
    pub fn effective_radius(&self, pressure: f32) -> f32 {
        if self.pressure_affects_radius {
            self.radius * (0.5 + 0.5 * pressure)
        } else {
            self.radius
        }
    }

    /// Get effective strength based on pressure.
    pub fn effective_strength(&self, pressure: f32) -> f32 {
        if self.pressure_affects_strength {
            self.strength * pressure
        } else {
            self.strength
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falloff_curves() {
        let curves = [
            FalloffCurve::Linear,
            FalloffCurve::Smooth,
            FalloffCurve::Sharp,
            FalloffCurve::Constant,
            FalloffCurve::Sphere,
            FalloffCurve::Root,
            FalloffCurve::InverseSquare,
        ];
        for curve in curves {
            assert!((curve.evaluate(0.0) - 1.0).abs() < 0.001, "{curve:?} at center");
            let edge = curve.evaluate(1.0);
            if curve == FalloffCurve::Constant {
                assert!((edge - 1.0).abs() < 0.001);
            } else {
                assert!(edge.abs() < 0.001, "{curve:?} at edge");
            }
        }

        // Smooth should have gradient = 0 at endpoints
        assert!(FalloffCurve::Smooth.evaluate(0.01) > 0.99);
        assert!(FalloffCurve::Smooth.evaluate(0.99) < 0.01);
    }

    #[test]
    fn test_falloff_clamps_outside_range() {
        assert!((FalloffCurve::Linear.evaluate(-1.0) - 1.0).abs() < 0.001);
        assert!(FalloffCurve::Linear.evaluate(2.0).abs() < 0.001);
    }

    #[test]
    fn test_effective_radius_with_pressure() {
        let mut brush = BrushSettings::default();
        brush.radius = 1.0;
        brush.pressure_affects_radius = true;

        assert!((brush.effective_radius(0.0) - 0.5).abs() < 0.001);
        assert!((brush.effective_radius(1.0) - 1.0).abs() < 0.001);
        assert!((brush.effective_radius(0.5) - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_radius_constrained_tools() {
        assert!(SculptTool::Grab.is_radius_constrained());
        assert!(SculptTool::Thumb.is_radius_constrained());
        assert!(!SculptTool::Draw.is_radius_constrained());
        assert!(!SculptTool::Mask.deforms());
    }
}
