//! Vertex color and weight painting
//!
//! This crate paints per-vertex data of a [`sculpting::SculptSession`]:
//! - [`vertex`] - vertex color strokes (draw, blur, smear, average)
//! - [`weight`] - vertex group weight strokes with X mirroring and
//!   auto-normalize
//! - [`groups`] - vertex group storage
//! - [`blend`] - color and weight blend modes
//!
//! Strokes reuse the sculpt core's spatial tree, symmetry passes, leaf
//! scheduling and undo capture. Only static polygon meshes can be painted.

pub mod blend;
pub mod error;
pub mod groups;
pub mod stroke;
pub mod vertex;
pub mod weight;

pub use blend::{blend_color, blend_weight, clamp_monotonic, clip_to_dab};
pub use error::{PaintError, PaintResult};
pub use groups::{VertexGroup, VertexGroups, WeightUndoEntry, flip_side_name};
pub use stroke::PaintStrokeCache;
pub use vertex::VertexPaintStroke;
pub use weight::WeightPaintStroke;
