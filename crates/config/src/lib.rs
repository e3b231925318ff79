//! Shared configuration for the sculpt and paint cores
//!
//! This crate provides the single source of truth for brush, tool, symmetry,
//! automasking, dynamic topology and paint settings. Everything is serde
//! serializable so presets can be stored as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod brush;
pub mod paint;
pub mod tool;

pub use brush::{
    BrushDirection, BrushSettings, FalloffCurve, FalloffShape, MaskTool, SculptTool,
};
pub use paint::{PaintBlend, PaintSettings, PaintTool};
pub use tool::{
    AutomaskingFlags, DetailMode, DyntopoSettings, SymmetryFlags, ThreadingSettings,
    ToolSettings,
};

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Complete sculpt/paint configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SculptConfig {
    /// Tool-level settings shared by every brush
    pub tool: ToolSettings,
    /// Active sculpt brush
    pub brush: BrushSettings,
    /// Active vertex/weight paint brush
    pub paint: PaintSettings,
}

impl SculptConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SculptConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the brush engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.brush.radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "brush radius must be positive, got {}",
                self.brush.radius
            )));
        }
        if !(self.paint.radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "paint radius must be positive, got {}",
                self.paint.radius
            )));
        }
        for (axis, count) in ["x", "y", "z"].iter().zip(self.tool.radial_symmetry) {
            if count == 0 || count > tool::MAX_RADIAL_SYMMETRY {
                return Err(ConfigError::Invalid(format!(
                    "radial symmetry {axis} must be in 1..={}, got {count}",
                    tool::MAX_RADIAL_SYMMETRY
                )));
            }
        }
        if self.brush.boundary_propagation_steps == 0 {
            return Err(ConfigError::Invalid(
                "boundary propagation steps must be at least 1".to_string(),
            ));
        }
        if !(self.tool.dyntopo.detail_size > 0.0) || !(self.tool.dyntopo.detail_percent > 0.0) {
            return Err(ConfigError::Invalid(
                "dynamic topology detail must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SculptConfig::default();
        assert_eq!(config.tool.radial_symmetry, [1, 1, 1]);
        assert!(config.tool.symmetry.is_empty());
        assert_eq!(config.brush.tool, SculptTool::Draw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SculptConfig::from_json_str(r#"{ "brush": { "radius": 2.0 } }"#).unwrap();
        assert!((config.brush.radius - 2.0).abs() < 0.001);
        assert!((config.brush.strength - brush::DEFAULT_STRENGTH).abs() < 0.001);
    }

    #[test]
    fn test_json_round_trip_keeps_flags() {
        let mut config = SculptConfig::default();
        config.tool.symmetry = SymmetryFlags::X | SymmetryFlags::Z;
        config.brush.automasking = AutomaskingFlags::TOPOLOGY | AutomaskingFlags::BOUNDARY_EDGES;
        config.paint.blend = PaintBlend::Darken;

        let json = config.to_json_string().unwrap();
        let parsed = SculptConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_radial_symmetry_rejected() {
        let result = SculptConfig::from_json_str(r#"{ "tool": { "radial_symmetry": [0, 1, 1] } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = SculptConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
