//! Local remeshing under the brush.
//!
//! Edges longer than the detail size are split at their midpoint, longest
//! first. Edges shorter than the collapse threshold are merged into their
//! first endpoint, shortest first. Candidates are sorted by length with
//! vertex indices as tie-break, so replaying the same dabs gives the same
//! topology.
//!
//! ```text
//!     split a-b:              collapse a-b:
//!        r                       r
//!       / \                     / \
//!      a-m-b        ->         /   \
//!       \|/                   a-----+
//!        s                     \   /
//!                               \ /
//!                                s
//! ```

use chisel_config::DyntopoSettings;
use glam::Vec3;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::DynTopo;

/// Thresholds for one remesh pass.
#[derive(Debug, Clone)]
pub struct RemeshSettings {
    /// Edges longer than this are split
    pub max_edge_length: f32,
    /// Edges shorter than this are collapsed
    pub min_edge_length: f32,
    pub subdivide: bool,
    pub collapse: bool,
    /// Cap on splits (and on collapses) per pass
    pub max_edits: usize,
}

impl RemeshSettings {
    /// Thresholds for a dab of the given radius.
    pub fn from_tool(settings: &DyntopoSettings, brush_radius: f32) -> Self {
        Self {
            max_edge_length: settings.max_edge_length(brush_radius),
            min_edge_length: settings.min_edge_length(brush_radius),
            subdivide: settings.subdivide,
            collapse: settings.collapse,
            max_edits: settings.max_splits_per_step,
        }
    }
}

/// What one remesh pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemeshStats {
    pub edges_split: usize,
    pub edges_collapsed: usize,
}

impl RemeshStats {
    pub fn changed(&self) -> bool {
        self.edges_split > 0 || self.edges_collapsed > 0
    }
}

impl DynTopo {
    /// Split and collapse edges touching the sphere at `center`.
    pub fn remesh(&mut self, center: Vec3, radius: f32, settings: &RemeshSettings) -> RemeshStats {
        let mut stats = RemeshStats::default();
        if settings.subdivide && settings.max_edge_length > 0.0 {
            stats.edges_split = self.split_long_edges(center, radius, settings);
        }
        if settings.collapse && settings.min_edge_length > 0.0 {
            stats.edges_collapsed = self.collapse_short_edges(center, radius, settings);
        }
        if stats.changed() {
            debug!(
                "Remesh: {} splits, {} collapses, {} faces",
                stats.edges_split,
                stats.edges_collapsed,
                self.mesh.face_count()
            );
        }
        stats
    }

    /// Unique edges `(a, b)` with `a < b` of faces with a corner in range,
    /// whose squared length passes `keep`.
    fn edges_in_range(
        &self,
        center: Vec3,
        radius: f32,
        keep: impl Fn(f32) -> bool,
    ) -> Vec<(f32, u32, u32)> {
        let positions = &self.mesh.verts.positions;
        let radius_sq = radius * radius;
        let mut edges = Vec::new();
        for (_, face) in self.mesh.faces() {
            let in_range = face
                .verts
                .iter()
                .any(|&v| positions[v as usize].distance_squared(center) <= radius_sq);
            if !in_range {
                continue;
            }
            for i in 0..3 {
                let (a, b) = (face.verts[i], face.verts[(i + 1) % 3]);
                let (a, b) = if a < b { (a, b) } else { (b, a) };
                let len_sq = positions[a as usize].distance_squared(positions[b as usize]);
                if keep(len_sq) {
                    edges.push((len_sq, a, b));
                }
            }
        }
        edges.sort_by(|x, y| (x.1, x.2).cmp(&(y.1, y.2)));
        edges.dedup_by(|x, y| x.1 == y.1 && x.2 == y.2);
        edges
    }

    fn split_long_edges(&mut self, center: Vec3, radius: f32, settings: &RemeshSettings) -> usize {
        let max_sq = settings.max_edge_length * settings.max_edge_length;
        let mut edges = self.edges_in_range(center, radius, |len_sq| len_sq > max_sq);
        edges.sort_by(|x, y| y.0.total_cmp(&x.0).then((x.1, x.2).cmp(&(y.1, y.2))));

        let mut splits = 0;
        for (_, a, b) in edges {
            if splits >= settings.max_edits {
                trace!("Remesh: split cap {} reached", settings.max_edits);
                break;
            }
            let faces = self.mesh.edge_faces(a, b);
            if faces.is_empty() {
                continue;
            }
            let data = self.mesh.verts.interpolate(a, b, 0.5);
            let mid = self.add_vert(&data);
            for f in faces {
                let Some(face) = self.remove_face(f) else {
                    continue;
                };
                self.add_face(face.with_replaced(b, mid));
                self.add_face(face.with_replaced(a, mid));
            }
            let mut touched: SmallVec<[u32; 8]> = SmallVec::new();
            touched.push(mid);
            self.mesh.vert_neighbors(mid, &mut touched);
            self.mesh.recalc_normals_for(&touched);
            splits += 1;
        }
        splits
    }

    fn collapse_short_edges(&mut self, center: Vec3, radius: f32, settings: &RemeshSettings) -> usize {
        let min_sq = settings.min_edge_length * settings.min_edge_length;
        let mut edges = self.edges_in_range(center, radius, |len_sq| len_sq < min_sq);
        edges.sort_by(|x, y| x.0.total_cmp(&y.0).then((x.1, x.2).cmp(&(y.1, y.2))));

        let mut collapses = 0;
        for (_, a, b) in edges {
            if collapses >= settings.max_edits {
                break;
            }
            if !self.mesh.is_vert_alive(a) || !self.mesh.is_vert_alive(b) {
                continue;
            }
            // Earlier collapses may have moved the endpoints
            let positions = &self.mesh.verts.positions;
            if positions[a as usize].distance_squared(positions[b as usize]) >= min_sq {
                continue;
            }
            if self.can_collapse(a, b) {
                self.collapse_edge(a, b);
                collapses += 1;
            }
        }
        collapses
    }

    /// Link condition, boundary and normal-flip checks for merging `b`
    /// into `a` at the edge midpoint.
    fn can_collapse(&self, a: u32, b: u32) -> bool {
        let mesh = &self.mesh;
        let edge_faces = mesh.edge_faces(a, b);
        if edge_faces.len() != 2 || mesh.is_boundary_vert(a) || mesh.is_boundary_vert(b) {
            return false;
        }

        let mut ring_a: SmallVec<[u32; 16]> = SmallVec::new();
        let mut ring_b: SmallVec<[u32; 16]> = SmallVec::new();
        mesh.vert_neighbors(a, &mut ring_a);
        mesh.vert_neighbors(b, &mut ring_b);
        // Merging into a valence-3 vertex leaves a doubled triangle
        if ring_a.len() <= 3 || ring_b.len() <= 3 {
            return false;
        }
        let common = ring_a.iter().filter(|v| ring_b.contains(v)).count();
        if common != 2 {
            return false;
        }

        let positions = &mesh.verts.positions;
        let mid = (positions[a as usize] + positions[b as usize]) * 0.5;
        for &vert in &[a, b] {
            for &f in mesh.vert_faces(vert) {
                let Some(face) = mesh.face(f) else {
                    continue;
                };
                if face.contains(a) && face.contains(b) {
                    continue;
                }
                let before = mesh.face_normal(f);
                let corners = face
                    .verts
                    .map(|v| if v == a || v == b { mid } else { positions[v as usize] });
                let after = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
                if before.dot(after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn collapse_edge(&mut self, a: u32, b: u32) {
        let mid = self.mesh.verts.interpolate(a, b, 0.5);
        self.log.vert_before_modified(&self.mesh, a);
        self.mesh.verts.positions[a as usize] = mid.position;
        self.mesh.verts.masks[a as usize] = mid.mask;
        if let (Some(colors), Some(color)) = (self.mesh.verts.colors.as_mut(), mid.color) {
            colors[a as usize] = color;
        }

        for f in self.mesh.edge_faces(a, b) {
            self.remove_face(f);
        }
        let b_faces: SmallVec<[u32; 8]> = self.mesh.vert_faces(b).iter().copied().collect();
        for f in b_faces {
            let Some(face) = self.remove_face(f) else {
                continue;
            };
            self.add_face(face.with_replaced(b, a));
        }
        self.kill_vert(b);

        let mut touched: SmallVec<[u32; 16]> = SmallVec::new();
        touched.push(a);
        self.mesh.vert_neighbors(a, &mut touched);
        self.mesh.recalc_normals_for(&touched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn settings(max: f32) -> RemeshSettings {
        RemeshSettings {
            max_edge_length: max,
            min_edge_length: max * 0.4,
            subdivide: true,
            collapse: true,
            max_edits: 10000,
        }
    }

    #[test]
    fn test_split_refines_long_edges() {
        let mut topo = DynTopo::from_mesh(&Mesh::grid(2, 2, 1.0)).unwrap();
        topo.begin_entry();
        let stats = topo.remesh(Vec3::ZERO, 2.0, &settings(0.3));
        topo.end_entry();

        assert!(stats.edges_split > 0);
        assert!(topo.mesh().face_count() > 8);
        assert!(topo.mesh().is_valid());
        // Split vertices stay in the plane
        for (_, face) in topo.mesh().faces() {
            for v in face.verts {
                assert!(topo.mesh().verts.positions[v as usize].z.abs() < 0.001);
            }
        }
    }

    #[test]
    fn test_split_cap_is_respected() {
        let mut topo = DynTopo::from_mesh(&Mesh::grid(4, 4, 1.0)).unwrap();
        let mut capped = settings(0.01);
        capped.max_edits = 3;
        capped.collapse = false;
        let stats = topo.remesh(Vec3::ZERO, 2.0, &capped);
        assert_eq!(stats.edges_split, 3);
    }

    #[test]
    fn test_collapse_keeps_mesh_valid() {
        let mut topo = DynTopo::from_mesh(&Mesh::uv_sphere(16, 8, 1.0)).unwrap();
        let faces_before = topo.mesh().face_count();
        let mut coarse = settings(2.0);
        coarse.subdivide = false;
        topo.begin_entry();
        let stats = topo.remesh(Vec3::new(0.0, 0.0, 1.0), 0.6, &coarse);
        topo.end_entry();

        assert!(stats.edges_collapsed > 0);
        assert!(topo.mesh().face_count() < faces_before);
        assert!(topo.mesh().is_valid());
    }

    #[test]
    fn test_remesh_undo_restores_counts() {
        let mut topo = DynTopo::from_mesh(&Mesh::uv_sphere(12, 6, 1.0)).unwrap();
        let verts = topo.mesh().vertex_count();
        let faces = topo.mesh().face_count();
        let positions = topo.mesh().verts.positions.clone();

        topo.begin_entry();
        topo.remesh(Vec3::new(1.0, 0.0, 0.0), 0.8, &settings(0.2));
        topo.end_entry();
        assert_ne!(topo.mesh().face_count(), faces);

        assert!(topo.undo());
        assert_eq!(topo.mesh().vertex_count(), verts);
        assert_eq!(topo.mesh().face_count(), faces);
        for (v, p) in positions.iter().enumerate() {
            assert!((topo.mesh().verts.positions[v] - *p).length() < 0.0001);
        }
    }
}
