//! Scene-level sculpt tool settings: symmetry, automasking, dynamic topology
//! and threading.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Maximum radial symmetry repeats per axis
pub const MAX_RADIAL_SYMMETRY: u8 = 64;

/// Default constant detail size for dynamic topology
pub const DEFAULT_DETAIL_SIZE: f32 = 0.05;

/// Default brush-relative detail, in percent of the brush radius
pub const DEFAULT_DETAIL_PERCENT: f32 = 25.0;

/// Edges shorter than `detail_size * DEFAULT_COLLAPSE_RATIO` are collapsed
pub const DEFAULT_COLLAPSE_RATIO: f32 = 0.4;

/// Minimum number of leaves before work is spread over threads
pub const DEFAULT_MIN_LEAVES_FOR_THREADING: usize = 2;

bitflags! {
    /// Mirror symmetry axes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SymmetryFlags: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

bitflags! {
    /// Automasking modes. Each enabled mode can only reduce brush influence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AutomaskingFlags: u8 {
        /// Only affect geometry connected to the active vertex
        const TOPOLOGY = 1 << 0;
        /// Only affect the active face set
        const FACE_SETS = 1 << 1;
        /// Fade out toward open mesh boundaries
        const BOUNDARY_EDGES = 1 << 2;
        /// Fade out toward face set borders
        const BOUNDARY_FACE_SETS = 1 << 3;
    }
}

impl AutomaskingFlags {
    /// Modes that measure a distance to some boundary.
    pub fn has_boundary_mode(&self) -> bool {
        self.intersects(Self::BOUNDARY_EDGES | Self::BOUNDARY_FACE_SETS)
    }
}

/// How the dynamic topology detail size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DetailMode {
    /// Fixed edge length in object space
    #[default]
    Constant = 0,
    /// Percentage of the current brush radius
    Brush = 1,
}

/// Dynamic topology settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DyntopoSettings {
    /// Detail mode (default: Constant)
    pub detail_mode: DetailMode,
    /// Target edge length for Constant mode (default: 0.05)
    pub detail_size: f32,
    /// Percent of brush radius for Brush mode (default: 25)
    pub detail_percent: f32,
    /// Collapse threshold as a fraction of the detail size (default: 0.4)
    pub collapse_ratio: f32,
    /// Split long edges
    pub subdivide: bool,
    /// Collapse short edges
    pub collapse: bool,
    /// Hard cap on edge splits per stroke step (default: 10000)
    pub max_splits_per_step: usize,
}

impl Default for DyntopoSettings {
    fn default() -> Self {
        Self {
            detail_mode: DetailMode::Constant,
            detail_size: DEFAULT_DETAIL_SIZE,
            detail_percent: DEFAULT_DETAIL_PERCENT,
            collapse_ratio: DEFAULT_COLLAPSE_RATIO,
            subdivide: true,
            collapse: true,
            max_splits_per_step: 10000,
        }
    }
}

impl DyntopoSettings {
    /// Edge length above which edges are split, for the given brush radius.
    pub fn max_edge_length(&self, brush_radius: f32) -> f32 {
        match self.detail_mode {
            DetailMode::Constant => self.detail_size,
            DetailMode::Brush => brush_radius * self.detail_percent / 100.0,
        }
    }

    /// Edge length below which edges are collapsed.
    pub fn min_edge_length(&self, brush_radius: f32) -> f32 {
        self.max_edge_length(brush_radius) * self.collapse_ratio
    }
}

/// Parallel evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadingSettings {
    /// Allow leaves to be processed on the thread pool
    pub enabled: bool,
    /// Below this many leaves, evaluation stays on the calling thread (default: 2)
    pub min_leaves: usize,
}

impl Default for ThreadingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_leaves: DEFAULT_MIN_LEAVES_FOR_THREADING,
        }
    }
}

/// Sculpt tool settings shared by every brush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Mirror symmetry axes
    pub symmetry: SymmetryFlags,
    /// Radial repeats around X, Y, Z (1 = off)
    pub radial_symmetry: [u8; 3],
    /// Reduce strength where mirrored dabs overlap
    pub symmetry_feather: bool,
    /// Tool-level automasking, OR-ed with each brush's flags
    pub automasking: AutomaskingFlags,
    /// Dynamic topology detail settings
    pub dyntopo: DyntopoSettings,
    /// Threading settings
    pub threading: ThreadingSettings,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            symmetry: SymmetryFlags::empty(),
            radial_symmetry: [1, 1, 1],
            symmetry_feather: false,
            automasking: AutomaskingFlags::empty(),
            dyntopo: DyntopoSettings::default(),
            threading: ThreadingSettings::default(),
        }
    }
}
