//! Sculpt session: the mesh being edited, its spatial tree and tool state.
//!
//! A session holds exactly one backing flavor at a time:
//! - [`Backing::Faces`]: static polygon mesh plus derived adjacency
//! - [`Backing::Grids`]: multiresolution grids
//! - [`Backing::Dyntopo`]: dynamic topology mesh with its operation log
//!
//! Brush code borrows the session through [`SculptSession::parts`] to read,
//! and writes back through [`SculptSession::write_attrs`] after each
//! parallel pass.

use chisel_config::{DetailMode, ToolSettings};
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::dyntopo::{DisableMode, DynTopo, RemeshSettings, RemeshStats};
use crate::error::{SculptError, SculptResult};
use crate::host::{ChangeKind, Host, ObjectId, ReportLevel, report};
use crate::mesh::{Mesh, MultiresGrids, VertToFaceMap, VertexAttributeStore, polygon_normal};
use crate::neighbors::{FacesTopology, TopologyRef};
use crate::parallel::{CancelToken, LeafWrites, ParallelSettings};
use crate::spatial::{Aabb, LeafDirty, LeafId, SpatialTree, TreeConfig};
use crate::undo::{UndoData, UndoNode, UndoSink};

/// Detail flood fill stops after this many whole-mesh remesh passes even
/// if edges are still changing
const MAX_DETAIL_FLOOD_FILL_PASSES: usize = 100;

/// Which backing flavor a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackingKind {
    Faces,
    Grids,
    Dyntopo,
}

/// Static mesh with the adjacency derived from it.
#[derive(Debug, Clone)]
pub struct FacesBacking {
    mesh: Mesh,
    vert_to_face: VertToFaceMap,
    boundary: Vec<bool>,
}

impl FacesBacking {
    pub fn new(mesh: Mesh) -> Self {
        let vert_to_face =
            VertToFaceMap::build(mesh.vertex_count(), &mesh.face_offsets, &mesh.corner_verts);
        let boundary = mesh.boundary_verts();
        Self {
            mesh,
            vert_to_face,
            boundary,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn topology(&self) -> FacesTopology<'_> {
        FacesTopology {
            face_offsets: &self.mesh.face_offsets,
            corner_verts: &self.mesh.corner_verts,
            face_sets: &self.mesh.face_sets,
            vert_to_face: &self.vert_to_face,
            boundary: &self.boundary,
        }
    }

    fn into_mesh(self) -> Mesh {
        self.mesh
    }

    fn recalc_normals_for(&mut self, verts: &[u32]) {
        for &v in verts {
            let normal: Vec3 = self
                .vert_to_face
                .faces(v)
                .iter()
                .map(|&f| polygon_normal(&self.mesh.verts.positions, self.mesh.face_verts(f)))
                .sum();
            self.mesh.verts.normals[v as usize] = normal.normalize_or_zero();
        }
    }
}

/// Mesh storage a session edits.
#[derive(Debug, Clone)]
pub enum Backing {
    Faces(FacesBacking),
    Grids(MultiresGrids),
    Dyntopo(DynTopo),
}

impl Backing {
    pub fn kind(&self) -> BackingKind {
        match self {
            Backing::Faces(_) => BackingKind::Faces,
            Backing::Grids(_) => BackingKind::Grids,
            Backing::Dyntopo(_) => BackingKind::Dyntopo,
        }
    }

    pub fn attrs(&self) -> &VertexAttributeStore {
        match self {
            Backing::Faces(faces) => &faces.mesh.verts,
            Backing::Grids(grids) => &grids.verts,
            Backing::Dyntopo(topo) => &topo.mesh().verts,
        }
    }

    pub fn topology(&self) -> TopologyRef<'_> {
        match self {
            Backing::Faces(faces) => TopologyRef::Faces(faces.topology()),
            Backing::Grids(grids) => TopologyRef::Grids(grids),
            Backing::Dyntopo(topo) => TopologyRef::Dyntopo(topo.mesh()),
        }
    }

    fn build_tree(&self, config: &TreeConfig) -> SpatialTree {
        let positions = &self.attrs().positions;
        match self {
            Backing::Faces(faces) => {
                let elements: Vec<u32> = (0..faces.mesh.face_count() as u32).collect();
                SpatialTree::build(
                    &elements,
                    |f| faces.mesh.face_verts(f).to_vec(),
                    positions,
                    config,
                )
            }
            Backing::Grids(grids) => {
                let elements: Vec<u32> = (0..grids.grid_count() as u32).collect();
                SpatialTree::build(&elements, |g| grids.grid_verts(g), positions, config)
            }
            Backing::Dyntopo(topo) => {
                let mesh = topo.mesh();
                let elements: Vec<u32> = mesh.faces().map(|(id, _)| id).collect();
                SpatialTree::build(
                    &elements,
                    |f| mesh.face(f).map(|face| face.verts).unwrap_or_default(),
                    positions,
                    config,
                )
            }
        }
    }
}

/// Editing state of one object in sculpt mode.
#[derive(Debug)]
pub struct SculptSession {
    object: ObjectId,
    backing: Backing,
    tree: SpatialTree,
    tree_config: TreeConfig,
    /// Scene-level tool settings
    pub tool: ToolSettings,
    /// Vertex under the cursor, seeds topology automasking
    pub active_vertex: Option<u32>,
    /// Face set under the cursor
    pub active_face_set: i32,
    /// Checked at the start of every leaf
    pub cancel: CancelToken,
    /// Forces single-threaded evaluation when set
    pub force_single_thread: bool,
}

impl SculptSession {
    pub fn new(object: ObjectId, backing: Backing, tool: ToolSettings) -> Self {
        Self::with_tree_config(object, backing, tool, TreeConfig::default())
    }

    pub fn with_tree_config(
        object: ObjectId,
        backing: Backing,
        tool: ToolSettings,
        tree_config: TreeConfig,
    ) -> Self {
        let tree = backing.build_tree(&tree_config);
        debug!(
            "Sculpt session for {:?}: {:?} backing, {} vertices, {} leaves",
            object,
            backing.kind(),
            backing.attrs().len(),
            tree.leaf_count()
        );
        Self {
            object,
            backing,
            tree,
            tree_config,
            tool,
            active_vertex: None,
            active_face_set: crate::mesh::DEFAULT_FACE_SET,
            cancel: CancelToken::new(),
            force_single_thread: false,
        }
    }

    /// Session over a static mesh. A mesh flagged as dynamic topology
    /// comes back up in that mode.
    pub fn from_mesh(object: ObjectId, mesh: Mesh, tool: ToolSettings) -> SculptResult<Self> {
        let backing = if mesh.dyntopo_active {
            Backing::Dyntopo(DynTopo::from_mesh(&mesh)?)
        } else {
            Backing::Faces(FacesBacking::new(mesh))
        };
        Ok(Self::new(object, backing, tool))
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    pub fn kind(&self) -> BackingKind {
        self.backing.kind()
    }

    pub fn attrs(&self) -> &VertexAttributeStore {
        self.backing.attrs()
    }

    pub fn topology(&self) -> TopologyRef<'_> {
        self.backing.topology()
    }

    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    /// Read-only view used by brush kernels.
    pub fn parts(&self) -> (&VertexAttributeStore, TopologyRef<'_>, &SpatialTree) {
        (self.backing.attrs(), self.backing.topology(), &self.tree)
    }

    /// Static mesh, when the backing is FACES.
    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.backing {
            Backing::Faces(faces) => Some(&faces.mesh),
            _ => None,
        }
    }

    pub fn grids(&self) -> Option<&MultiresGrids> {
        match &self.backing {
            Backing::Grids(grids) => Some(grids),
            _ => None,
        }
    }

    pub fn dyntopo(&self) -> Option<&DynTopo> {
        match &self.backing {
            Backing::Dyntopo(topo) => Some(topo),
            _ => None,
        }
    }

    pub fn dyntopo_mut(&mut self) -> Option<&mut DynTopo> {
        match &mut self.backing {
            Backing::Dyntopo(topo) => Some(topo),
            _ => None,
        }
    }

    /// Fail unless the backing is `expected`.
    pub fn require(&self, expected: BackingKind) -> SculptResult<()> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(SculptError::UnsupportedBacking { expected, actual })
        }
    }

    pub fn parallel(&self) -> ParallelSettings {
        if self.force_single_thread {
            ParallelSettings::single_threaded()
        } else {
            ParallelSettings::from(&self.tool.threading)
        }
    }

    /// Mutable attributes for the vertices in `touched`. Under dynamic
    /// topology their previous state is logged first.
    pub fn write_attrs(&mut self, touched: &[u32]) -> &mut VertexAttributeStore {
        match &mut self.backing {
            Backing::Faces(faces) => &mut faces.mesh.verts,
            Backing::Grids(grids) => &mut grids.verts,
            Backing::Dyntopo(topo) => {
                topo.log_modified(touched);
                topo.attrs_mut()
            }
        }
    }

    pub fn mark_dirty(&mut self, leaf: LeafId, flags: LeafDirty) {
        self.tree.mark_dirty(leaf, flags);
    }

    /// Apply per-leaf kernel results with `set` and mark the leaves that
    /// wrote anything dirty with `flags`. Returns the number of writes.
    pub fn scatter<T: Copy>(
        &mut self,
        writes: &[LeafWrites<T>],
        flags: LeafDirty,
        mut set: impl FnMut(&mut VertexAttributeStore, u32, T),
    ) -> usize {
        let touched: Vec<u32> = writes
            .iter()
            .flat_map(|w| w.values.iter().map(|&(v, _)| v))
            .collect();
        if touched.is_empty() {
            return 0;
        }
        let attrs = self.write_attrs(&touched);
        for write in writes {
            for &(v, value) in &write.values {
                set(attrs, v, value);
            }
        }
        for write in writes.iter().filter(|w| !w.is_empty()) {
            self.tree.mark_dirty(write.leaf, flags);
        }
        touched.len()
    }

    /// Rebuild the spatial tree from the current topology. An active
    /// vertex the topology no longer has is dropped.
    pub fn rebuild_tree(&mut self) {
        self.tree = self.backing.build_tree(&self.tree_config);
        if let Some(active) = self.active_vertex {
            let topology = self.backing.topology();
            let valid = crate::with_topology!(topology, |t| {
                crate::neighbors::Topology::is_valid_vertex(t, active)
            });
            if !valid || active as usize >= self.backing.attrs().len() {
                debug!("Active vertex {} no longer exists, cleared", active);
                self.clear_active();
            }
        }
    }

    /// Swap in a new backing. Vertex indices of the old backing mean
    /// nothing in the new one, so the active vertex is cleared.
    fn replace_backing(&mut self, backing: Backing) {
        self.backing = backing;
        self.clear_active();
        self.rebuild_tree();
    }

    fn clear_active(&mut self) {
        self.active_vertex = None;
        self.active_face_set = crate::mesh::DEFAULT_FACE_SET;
    }

    /// Recompute derived data of dirty leaves: grid seams, normals and
    /// bounds. Returns what was dirty.
    pub fn flush_updates(&mut self) -> LeafDirty {
        let dirty = self.tree.dirty_leaves(LeafDirty::all());
        if dirty.is_empty() {
            return LeafDirty::empty();
        }

        let mut verts = Vec::new();
        let mut geometry = Vec::new();
        for &leaf in &dirty {
            let data = self.tree.leaf(leaf);
            verts.extend_from_slice(data.verts());
            if data.dirty().intersects(LeafDirty::POSITIONS | LeafDirty::NORMALS) {
                geometry.extend_from_slice(data.all_verts());
            }
        }
        geometry.sort_unstable();
        geometry.dedup();

        match &mut self.backing {
            Backing::Faces(faces) => faces.recalc_normals_for(&geometry),
            Backing::Grids(grids) => {
                let stitched = grids.stitch(&verts);
                grids.recalc_normals_for(&geometry);
                if stitched > 0 {
                    debug!("Stitched {} grid seam vertices", stitched);
                }
            }
            Backing::Dyntopo(topo) => topo.recalc_normals_for(&geometry),
        }

        self.tree.update_bounds(&self.backing.attrs().positions);
        self.tree.clear_dirty()
    }

    /// Closest visible vertex within `max_distance`, stored as the active
    /// vertex along with its face set.
    pub fn update_active_vertex(&mut self, point: Vec3, max_distance: f32) -> Option<u32> {
        let attrs = self.backing.attrs();
        let vert = self
            .tree
            .nearest_vertex(&attrs.positions, point, max_distance, |v| attrs.is_visible(v));
        self.active_vertex = vert;
        if let Some(v) = vert {
            let topology = self.backing.topology();
            self.active_face_set = crate::with_topology!(topology, |t| {
                crate::neighbors::Topology::vert_face_set(t, v)
            });
        }
        vert
    }

    /// Switch a static mesh to dynamic topology, pushing the pre-enable
    /// mesh as an undo node.
    pub fn enable_dyntopo(&mut self, undo: &mut dyn UndoSink) -> SculptResult<()> {
        match self.kind() {
            BackingKind::Faces => {}
            BackingKind::Dyntopo => return Err(SculptError::DyntopoAlreadyEnabled),
            BackingKind::Grids => {
                return Err(SculptError::UnsupportedBacking {
                    expected: BackingKind::Faces,
                    actual: BackingKind::Grids,
                });
            }
        }
        let Some(mesh) = self.mesh() else {
            return Err(SculptError::Invariant("faces backing without mesh"));
        };

        undo.push_begin("Dynamic Topology Toggle");
        undo.push_node(UndoNode::new(
            self.object,
            UndoData::DyntopoBegin(Box::new(mesh.clone())),
        ));
        undo.push_end();

        self.enter_dyntopo()?;
        info!(
            "Dynamic topology enabled: {} vertices, {} triangles",
            self.attrs().len(),
            self.dyntopo().map_or(0, |t| t.mesh().face_count())
        );
        Ok(())
    }

    /// Convert the current static mesh to dynamic topology without
    /// touching the undo stack.
    pub(crate) fn enter_dyntopo(&mut self) -> SculptResult<()> {
        let Backing::Faces(faces) = &self.backing else {
            return Err(SculptError::Invariant("dynamic topology entered from non-faces backing"));
        };
        let mut mesh = faces.mesh.clone();
        mesh.dyntopo_active = true;
        let topo = DynTopo::from_mesh(&mesh)?;
        self.replace_backing(Backing::Dyntopo(topo));
        Ok(())
    }

    /// Leave dynamic topology, either restoring the snapshot taken on
    /// enable or baking the current triangles into a static mesh.
    pub fn disable_dyntopo(&mut self, mode: DisableMode, undo: Option<&mut dyn UndoSink>) -> SculptResult<()> {
        if self.kind() != BackingKind::Dyntopo {
            return Err(SculptError::DyntopoNotEnabled);
        }
        let placeholder = Backing::Faces(FacesBacking::new(Mesh::default()));
        let Backing::Dyntopo(topo) = std::mem::replace(&mut self.backing, placeholder) else {
            return Err(SculptError::Invariant("dynamic topology backing vanished"));
        };

        let mesh = match mode {
            DisableMode::Restore(snapshot) => {
                debug!("Dynamic topology disabled, restoring entry snapshot");
                snapshot
            }
            DisableMode::Bake => {
                if let Some(undo) = undo {
                    undo.push_begin("Dynamic Topology Toggle");
                    undo.push_node(UndoNode::new(self.object, UndoData::DyntopoEnd(Box::new(topo.clone()))));
                    undo.push_end();
                }
                let mut mesh = topo.into_mesh();
                mesh.dyntopo_active = false;
                info!(
                    "Dynamic topology baked: {} vertices, {} faces",
                    mesh.vertex_count(),
                    mesh.face_count()
                );
                mesh
            }
        };

        self.replace_backing(Backing::Faces(FacesBacking::new(mesh)));
        Ok(())
    }

    /// Put back dynamic topology exactly as it was before a bake, slots and
    /// log included, so earlier log entries stay undoable.
    pub(crate) fn restore_dyntopo(&mut self, topo: DynTopo) -> SculptResult<()> {
        if self.kind() != BackingKind::Faces {
            return Err(SculptError::Invariant("dynamic topology restored over non-faces backing"));
        }
        self.replace_backing(Backing::Dyntopo(topo));
        debug!("Dynamic topology restored from bake");
        Ok(())
    }

    /// Remesh the whole mesh at the constant detail size until no edge is
    /// split or collapsed any more. The passes form one undo step.
    pub fn detail_flood_fill(&mut self, undo: &mut dyn UndoSink, host: &dyn Host) -> SculptResult<RemeshStats> {
        let precondition = if self.kind() != BackingKind::Dyntopo {
            Some(SculptError::DyntopoNotEnabled)
        } else if self.tool.dyntopo.detail_mode != DetailMode::Constant {
            Some(SculptError::ConstantDetailRequired)
        } else {
            None
        };
        if let Some(err) = precondition {
            report(host, ReportLevel::Error, &err.to_string());
            return Err(err);
        }
        self.cancel.reset();

        let settings = RemeshSettings::from_tool(&self.tool.dyntopo, 0.0);
        let object = self.object;
        let cancel = self.cancel.clone();
        let Some(topo) = self.dyntopo_mut() else {
            return Err(SculptError::Invariant("dynamic topology backing vanished"));
        };

        let mut bounds = Aabb::empty();
        for (_, face) in topo.mesh().faces() {
            for v in face.verts {
                bounds.include_point(topo.mesh().verts.positions[v as usize]);
            }
        }
        if bounds.is_empty() {
            return Ok(RemeshStats::default());
        }
        let center = bounds.center();
        let radius = bounds.size().max_element();

        undo.push_begin("Dynamic Topology Flood Fill");
        topo.begin_entry();
        let mut total = RemeshStats::default();
        let mut passes = 0;
        let mut cancelled = false;
        while passes < MAX_DETAIL_FLOOD_FILL_PASSES {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let stats = topo.remesh(center, radius, &settings);
            passes += 1;
            total.edges_split += stats.edges_split;
            total.edges_collapsed += stats.edges_collapsed;
            if !stats.changed() {
                break;
            }
        }
        if passes == MAX_DETAIL_FLOOD_FILL_PASSES {
            warn!("Detail flood fill stopped after {} passes", passes);
        }
        topo.recalc_all_normals();
        if let Some(entry) = topo.end_entry() {
            undo.push_node(UndoNode::new(object, UndoData::DyntopoStep { entry }));
        }
        undo.push_end();

        self.rebuild_tree();
        info!(
            "Detail flood fill: {} passes, {} splits, {} collapses",
            passes, total.edges_split, total.edges_collapsed
        );
        if total.changed() {
            host.notify(ChangeKind::Topology, object);
        }
        if cancelled {
            return Err(SculptError::Cancelled);
        }
        Ok(total)
    }

    /// Give up the session and return its static mesh. Grids have no
    /// static mesh of their own.
    pub fn into_mesh(self) -> Option<Mesh> {
        match self.backing {
            Backing::Faces(faces) => Some(faces.into_mesh()),
            Backing::Dyntopo(topo) => {
                let mut mesh = topo.into_mesh();
                mesh.dyntopo_active = true;
                Some(mesh)
            }
            Backing::Grids(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{MaskFilterSettings, apply_mask_filter};
    use crate::host::{NullHost, RecordingHost};
    use crate::undo::UndoStack;
    use chisel_config::AutomaskingFlags;

    fn small_tree() -> TreeConfig {
        TreeConfig {
            max_elements_per_leaf: 4,
        }
    }

    fn cube_session() -> SculptSession {
        SculptSession::with_tree_config(
            ObjectId(1),
            Backing::Faces(FacesBacking::new(Mesh::cube(1.0))),
            ToolSettings::default(),
            small_tree(),
        )
    }

    #[test]
    fn test_parts_agree_on_vertex_count() {
        let session = cube_session();
        let (attrs, topology, tree) = session.parts();
        assert_eq!(attrs.len(), 8);
        let count = crate::with_topology!(topology, |t| crate::neighbors::Topology::vertex_count(t));
        assert_eq!(count, 8);
        assert!(tree.leaf_count() >= 2);
    }

    #[test]
    fn test_flush_updates_recomputes_normals() {
        let mut session = cube_session();
        let leaf = session.tree().vertex_leaf(0).unwrap();
        session.write_attrs(&[0]).normals[0] = Vec3::ZERO;
        session.mark_dirty(leaf, LeafDirty::NORMALS);

        let flushed = session.flush_updates();
        assert!(flushed.contains(LeafDirty::NORMALS));
        let normal = session.attrs().normals[0];
        assert!((normal.length() - 1.0).abs() < 0.001);
        assert!(normal.x < 0.0 && normal.y < 0.0 && normal.z < 0.0);
    }

    #[test]
    fn test_dyntopo_toggle_rejects_grids() {
        let grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 1);
        let mut session = SculptSession::new(ObjectId(2), Backing::Grids(grids), ToolSettings::default());
        let mut undo = UndoStack::new();
        let err = session.enable_dyntopo(&mut undo).unwrap_err();
        assert!(matches!(err, SculptError::UnsupportedBacking { .. }));
        assert!(undo.is_empty());
    }

    #[test]
    fn test_dyntopo_enable_and_bake() {
        let mut session = cube_session();
        let mut undo = UndoStack::new();
        session.enable_dyntopo(&mut undo).unwrap();
        assert_eq!(session.kind(), BackingKind::Dyntopo);
        assert!(matches!(session.enable_dyntopo(&mut undo), Err(SculptError::DyntopoAlreadyEnabled)));

        session.disable_dyntopo(DisableMode::Bake, Some(&mut undo)).unwrap();
        let mesh = session.mesh().unwrap();
        assert_eq!(mesh.face_count(), 12);
        assert!(!mesh.dyntopo_active);
        assert_eq!(undo.len(), 2);
    }

    #[test]
    fn test_active_vertex_lookup() {
        let mut session = cube_session();
        let vert = session.update_active_vertex(Vec3::splat(-0.5), 0.1);
        assert_eq!(vert, Some(0));
        assert_eq!(session.active_face_set, crate::mesh::DEFAULT_FACE_SET);
    }

    fn dyntopo_grid(detail: f32) -> (SculptSession, UndoStack) {
        let mut session = SculptSession::with_tree_config(
            ObjectId(3),
            Backing::Faces(FacesBacking::new(Mesh::grid(2, 2, 2.0))),
            ToolSettings::default(),
            small_tree(),
        );
        session.tool.dyntopo.detail_size = detail;
        let mut undo = UndoStack::new();
        session.enable_dyntopo(&mut undo).unwrap();
        (session, undo)
    }

    fn longest_edge(topo: &DynTopo) -> f32 {
        let positions = &topo.mesh().verts.positions;
        topo.mesh()
            .faces()
            .flat_map(|(_, face)| {
                (0..3).map(move |i| {
                    positions[face.verts[i] as usize].distance(positions[face.verts[(i + 1) % 3] as usize])
                })
            })
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_detail_flood_fill_reaches_constant_detail() {
        let (mut session, mut undo) = dyntopo_grid(0.6);
        let faces_before = session.dyntopo().unwrap().mesh().face_count();
        let host = RecordingHost::new();

        let stats = session.detail_flood_fill(&mut undo, &host).unwrap();
        assert!(stats.edges_split > 0);
        let topo = session.dyntopo().unwrap();
        assert!(topo.mesh().is_valid());
        assert!(longest_edge(topo) <= 0.6 + 1e-5);
        assert_eq!(host.notifications(), vec![(ChangeKind::Topology, ObjectId(3))]);

        // All passes land in one undo step holding one log entry
        assert_eq!(undo.len(), 2);
        let step = undo.last().unwrap();
        assert_eq!(step.label, "Dynamic Topology Flood Fill");
        assert_eq!(step.nodes.len(), 1);

        let again = session.detail_flood_fill(&mut undo, &NullHost).unwrap();
        assert!(!again.changed());

        undo.undo(&mut session).unwrap();
        undo.undo(&mut session).unwrap();
        assert_eq!(session.dyntopo().unwrap().mesh().face_count(), faces_before);
    }

    #[test]
    fn test_detail_flood_fill_preconditions() {
        let mut session = cube_session();
        let mut undo = UndoStack::new();
        let host = RecordingHost::new();
        let result = session.detail_flood_fill(&mut undo, &host);
        assert!(matches!(result, Err(SculptError::DyntopoNotEnabled)));

        let (mut session, mut undo) = dyntopo_grid(0.6);
        session.tool.dyntopo.detail_mode = DetailMode::Brush;
        let result = session.detail_flood_fill(&mut undo, &host);
        assert!(matches!(result, Err(SculptError::ConstantDetailRequired)));
        assert_eq!(host.reports().len(), 2);
        assert_eq!(undo.len(), 1);
        assert_eq!(session.dyntopo().unwrap().mesh().face_count(), 8);
    }

    #[test]
    fn test_active_vertex_cleared_when_topology_changes() {
        let (mut session, mut undo) = dyntopo_grid(0.6);
        session.detail_flood_fill(&mut undo, &NullHost).unwrap();
        let mesh = session.dyntopo().unwrap().mesh();
        let created = (9..mesh.vertex_slots() as u32)
            .rev()
            .find(|&v| mesh.is_vert_alive(v))
            .unwrap();
        let point = session.attrs().positions[created as usize];
        assert_eq!(session.update_active_vertex(point, 0.01), Some(created));

        // Undoing the flood fill removes the vertex from the log-backed mesh
        undo.undo(&mut session).unwrap();
        assert_eq!(session.kind(), BackingKind::Dyntopo);
        assert_eq!(session.active_vertex, None);

        session.update_active_vertex(Vec3::new(1.0, 1.0, 0.0), 0.01);
        assert!(session.active_vertex.is_some());
        undo.undo(&mut session).unwrap();
        assert_eq!(session.kind(), BackingKind::Faces);
        assert_eq!(session.active_vertex, None);

        session.tool.automasking = AutomaskingFlags::TOPOLOGY;
        let written = apply_mask_filter(&mut session, &MaskFilterSettings::default(), &mut undo, &NullHost);
        assert!(written.is_ok());
    }

    #[test]
    fn test_undo_bake_restores_log_and_slots() {
        let (mut session, mut undo) = dyntopo_grid(0.6);
        session.detail_flood_fill(&mut undo, &NullHost).unwrap();
        let slots = session.dyntopo().unwrap().mesh().vertex_slots();
        let faces = session.dyntopo().unwrap().mesh().face_count();

        session.disable_dyntopo(DisableMode::Bake, Some(&mut undo)).unwrap();
        assert_eq!(session.kind(), BackingKind::Faces);
        assert_eq!(session.mesh().unwrap().face_count(), faces);

        undo.undo(&mut session).unwrap();
        let topo = session.dyntopo().unwrap();
        assert_eq!(topo.mesh().vertex_slots(), slots);
        assert_eq!(topo.log().entry_count(), 1);

        // The flood fill entry from before the bake still applies
        undo.undo(&mut session).unwrap();
        let topo = session.dyntopo().unwrap();
        assert_eq!(topo.mesh().face_count(), 8);
        assert!(topo.mesh().is_valid());

        undo.undo(&mut session).unwrap();
        assert_eq!(session.kind(), BackingKind::Faces);
    }
}
