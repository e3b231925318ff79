//! Mesh data the brush engine operates on.
//!
//! - [`VertexAttributeStore`]: per-vertex positions, normals, masks, colors
//!   and visibility
//! - [`Mesh`]: static polygon mesh (the FACES backing)
//! - [`MultiresGrids`]: per-corner subdivision grids (the GRIDS backing)
//!
//! The dynamic topology backing lives in [`crate::dyntopo`].

mod attributes;
mod faces;
mod grids;
mod primitives;

pub use attributes::{VertexAttributeStore, VertexData};
pub use faces::{DEFAULT_FACE_SET, Mesh, VertToFaceMap};
pub use grids::{MAX_GRID_LEVEL, MultiresGrids};

pub(crate) use faces::{face_corners, polygon_normal};
