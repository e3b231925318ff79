//! Sculpt brush evaluation, automasking, filters and dynamic topology.
//!
//! The crate edits per-vertex attributes of one mesh at a time through a
//! [`SculptSession`]. The mesh can be backed by a polygon mesh, by
//! multiresolution grids or by a dynamic-topology triangle mesh; brush and
//! filter code is written once against the [`Topology`] trait and
//! dispatched per backing with [`with_topology!`].
//!
//! # Architecture
//!
//! A stroke step runs the brush once per symmetry pass. Each pass gathers
//! the spatial tree leaves under the brush, captures undo state for leaves
//! seen for the first time, evaluates the brush kernel per leaf (on the
//! rayon pool when allowed) and writes the results back. Normals and bounds
//! of dirty leaves are refreshed once per step, then the host is notified.
//!
//! ## Key Components
//!
//! - **Mesh / Spatial**: attribute store, backings and the leaf hierarchy
//! - **Neighbors / FloodFill**: adjacency queries and breadth-first traversal
//! - **Automasking**: per-vertex factors limiting brush influence
//! - **Stroke / Brushes / Symmetry**: interactive strokes and tool kernels
//! - **Filter**: whole-mesh mask, mesh and color filters
//! - **Dyntopo**: local remeshing with an undoable operation log
//! - **Undo / Host**: the narrow interfaces to the embedding application

pub mod automasking;
pub mod brush;
mod brushes;
pub mod dyntopo;
pub mod error;
pub mod filter;
pub mod floodfill;
pub mod host;
pub mod mesh;
pub mod neighbors;
pub mod parallel;
pub mod session;
pub mod smooth;
pub mod spatial;
pub mod stroke;
pub mod symmetry;
pub mod undo;

pub use automasking::{AutomaskingCache, AutomaskingSettings, automask_factor};
pub use brush::{AreaSample, BrushTest, brush_fade};
pub use dyntopo::{DisableMode, DynLog, DynMesh, DynTopo, RemeshSettings, RemeshStats};
pub use error::{SculptError, SculptResult};
pub use filter::{
    ColorFilter, ColorFilterSettings, ColorFilterType, FilterCache, MaskFilterSettings, MaskFilterType, MeshFilter,
    MeshFilterSettings, MeshFilterType, apply_mask_filter,
};
pub use floodfill::FloodFill;
pub use host::{ChangeKind, Host, NullHost, ObjectId, RecordingHost, ReportLevel};
pub use mesh::{Mesh, MultiresGrids, VertexAttributeStore};
pub use neighbors::{FacesTopology, NEIGHBOR_INLINE_CAPACITY, Neighbors, Topology, TopologyRef};
pub use parallel::{CancelToken, LeafWrites, ParallelSettings, map_leaves};
pub use session::{Backing, BackingKind, FacesBacking, SculptSession};
pub use spatial::{Aabb, LeafDirty, LeafId, SpatialTree, TreeConfig};
pub use stroke::{SculptStroke, StrokeCache, StrokeSample, replay_stroke};
pub use symmetry::{SymmetryFrame, SymmetryPass, symmetry_passes};
pub use undo::{LeafUndoTracker, NoUndo, UndoData, UndoKind, UndoNode, UndoSink, UndoStack, UndoStep};
