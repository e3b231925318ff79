//! Multiresolution grids.
//!
//! Every base polygon is split into one grid per corner, spanning the
//! corner, the midpoint of the next edge, the face center and the midpoint
//! of the previous edge. Grid vertices on a grid border are co-located
//! with vertices of other grids; those copies are *duplicates*. Each
//! duplicate group has one canonical representative (the lowest index).
//!
//! Grid vertex `(x, y)` of grid `g` has index
//! `g * grid_size² + y * grid_size + x`.

use std::collections::HashMap;

use glam::Vec3;
use tracing::debug;

use super::attributes::VertexAttributeStore;
use super::faces::Mesh;

/// Highest supported subdivision level
pub const MAX_GRID_LEVEL: u32 = 8;

#[derive(Debug, Clone)]
pub struct MultiresGrids {
    pub verts: VertexAttributeStore,
    /// Face set per grid, copied from the base face
    pub face_sets: Vec<i32>,
    grid_size: u32,
    grid_faces: Vec<u32>,
    canonical: Vec<u32>,
    dup_offsets: Vec<u32>,
    dup_verts: Vec<u32>,
    boundary: Vec<bool>,
}

impl MultiresGrids {
    /// Build grids over a base mesh at the given subdivision level.
    pub fn from_mesh(base: &Mesh, level: u32) -> Self {
        let level = level.min(MAX_GRID_LEVEL);
        let grid_size = (1u32 << level) + 1;
        let grid_area = (grid_size * grid_size) as usize;
        let base_boundary = base_boundary_edges(base);
        let last = (grid_size - 1) as f32;

        let mut positions = Vec::with_capacity(base.corner_count() * grid_area);
        let mut boundary = Vec::with_capacity(base.corner_count() * grid_area);
        let mut grid_faces = Vec::with_capacity(base.corner_count());
        let mut face_sets = Vec::with_capacity(base.corner_count());

        for face in 0..base.face_count() as u32 {
            let corners = base.face_verts(face);
            let n = corners.len();
            let center = base.face_center(face);
            for i in 0..n {
                let prev = corners[(i + n - 1) % n];
                let cur = corners[i];
                let next = corners[(i + 1) % n];
                let p_cur = base.verts.positions[cur as usize];
                let mid_next = (p_cur + base.verts.positions[next as usize]) * 0.5;
                let mid_prev = (base.verts.positions[prev as usize] + p_cur) * 0.5;
                let next_edge_open = base_boundary.contains(&edge_key(cur, next));
                let prev_edge_open = base_boundary.contains(&edge_key(prev, cur));

                for y in 0..grid_size {
                    for x in 0..grid_size {
                        let u = x as f32 / last;
                        let w = y as f32 / last;
                        let p = (1.0 - u) * (1.0 - w) * p_cur
                            + u * (1.0 - w) * mid_next
                            + u * w * center
                            + (1.0 - u) * w * mid_prev;
                        positions.push(p);
                        boundary.push((y == 0 && next_edge_open) || (x == 0 && prev_edge_open));
                    }
                }
                grid_faces.push(face);
                face_sets.push(base.face_sets[face as usize]);
            }
        }

        let mut grids = Self {
            verts: VertexAttributeStore::from_positions(positions),
            face_sets,
            grid_size,
            grid_faces,
            canonical: Vec::new(),
            dup_offsets: Vec::new(),
            dup_verts: Vec::new(),
            boundary,
        };
        grids.build_duplicates();
        grids.recalc_normals();

        debug!(
            "Built {} grids of size {} ({} vertices)",
            grids.grid_count(),
            grid_size,
            grids.verts.len()
        );
        grids
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn grid_area(&self) -> u32 {
        self.grid_size * self.grid_size
    }

    pub fn grid_count(&self) -> usize {
        self.grid_faces.len()
    }

    /// Base face a grid was built from.
    pub fn grid_face(&self, grid: u32) -> u32 {
        self.grid_faces[grid as usize]
    }

    /// Index of grid vertex `(x, y)`.
    pub fn vertex_index(&self, grid: u32, x: u32, y: u32) -> u32 {
        grid * self.grid_area() + y * self.grid_size + x
    }

    /// `(grid, x, y)` of a vertex index.
    pub fn vertex_coord(&self, vert: u32) -> (u32, u32, u32) {
        let area = self.grid_area();
        let grid = vert / area;
        let local = vert % area;
        (grid, local % self.grid_size, local / self.grid_size)
    }

    /// Vertex index range of one grid.
    pub fn grid_verts(&self, grid: u32) -> std::ops::Range<u32> {
        let start = grid * self.grid_area();
        start..start + self.grid_area()
    }

    /// Co-located copies of a vertex, not including itself.
    pub fn duplicates(&self, vert: u32) -> &[u32] {
        let start = self.dup_offsets[vert as usize] as usize;
        let end = self.dup_offsets[vert as usize + 1] as usize;
        &self.dup_verts[start..end]
    }

    pub fn canonical(&self, vert: u32) -> u32 {
        self.canonical[vert as usize]
    }

    pub fn is_boundary(&self, vert: u32) -> bool {
        self.boundary[vert as usize]
    }

    /// In-grid 4-neighborhood of a vertex.
    pub fn grid_neighbors(&self, vert: u32) -> impl Iterator<Item = u32> + '_ {
        let (grid, x, y) = self.vertex_coord(vert);
        let last = self.grid_size - 1;
        let candidates = [
            (x > 0).then(|| (x - 1, y)),
            (x < last).then(|| (x + 1, y)),
            (y > 0).then(|| (x, y - 1)),
            (y < last).then(|| (x, y + 1)),
        ];
        candidates
            .into_iter()
            .flatten()
            .map(move |(nx, ny)| self.vertex_index(grid, nx, ny))
    }

    fn build_duplicates(&mut self) {
        let vertex_count = self.verts.len();
        let last = self.grid_size - 1;
        let mut groups: HashMap<[u32; 3], Vec<u32>> = HashMap::new();

        for vert in 0..vertex_count as u32 {
            let (_, x, y) = self.vertex_coord(vert);
            if x != 0 && y != 0 && x != last && y != last {
                continue;
            }
            // Adding 0.0 folds -0.0 into 0.0 so both hash alike
            let p = self.verts.positions[vert as usize] + Vec3::ZERO;
            groups
                .entry([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
                .or_default()
                .push(vert);
        }

        let mut canonical: Vec<u32> = (0..vertex_count as u32).collect();
        let mut dups: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
        for members in groups.values() {
            if members.len() < 2 {
                continue;
            }
            let rep = members.iter().copied().min().unwrap_or(members[0]);
            let any_boundary = members.iter().any(|&m| self.boundary[m as usize]);
            for &m in members {
                canonical[m as usize] = rep;
                dups[m as usize] = members.iter().copied().filter(|&o| o != m).collect();
                self.boundary[m as usize] = any_boundary;
            }
        }

        let mut offsets = Vec::with_capacity(vertex_count + 1);
        let mut flat = Vec::new();
        offsets.push(0);
        for list in dups {
            flat.extend(list);
            offsets.push(flat.len() as u32);
        }
        self.canonical = canonical;
        self.dup_offsets = offsets;
        self.dup_verts = flat;
    }

    /// Recompute normals from in-grid central differences, averaged over
    /// duplicate groups.
    pub fn recalc_normals(&mut self) {
        let verts: Vec<u32> = (0..self.verts.len() as u32).collect();
        self.recalc_normals_for(&verts);
    }

    /// Recompute normals of the given vertices (and their duplicates).
    pub fn recalc_normals_for(&mut self, verts: &[u32]) {
        let last = self.grid_size - 1;
        let mut raw: HashMap<u32, Vec3> = HashMap::with_capacity(verts.len());
        let mut raw_normal = |vert: u32| -> Vec3 {
            *raw.entry(vert).or_insert_with(|| {
                let (grid, x, y) = self.vertex_coord(vert);
                let pos = |x: u32, y: u32| self.verts.positions[self.vertex_index(grid, x, y) as usize];
                let du = pos((x + 1).min(last), y) - pos(x.saturating_sub(1), y);
                let dw = pos(x, (y + 1).min(last)) - pos(x, y.saturating_sub(1));
                du.cross(dw)
            })
        };

        let mut updates = Vec::with_capacity(verts.len());
        for &vert in verts {
            let mut normal = raw_normal(vert);
            for &dup in self.duplicates(vert) {
                normal += raw_normal(dup);
            }
            updates.push((vert, normal.normalize_or_zero()));
        }
        for (vert, normal) in updates {
            self.verts.normals[vert as usize] = normal;
        }
    }

    /// Make every duplicate group agree again by averaging its members.
    ///
    /// Only groups touching `verts` are visited.
    pub fn stitch(&mut self, verts: &[u32]) -> usize {
        let mut stitched = 0;
        let mut seen = std::collections::HashSet::new();
        for &vert in verts {
            let dups = self.duplicates(vert);
            if dups.is_empty() || !seen.insert(self.canonical(vert)) {
                continue;
            }
            let members: Vec<u32> = std::iter::once(vert).chain(dups.iter().copied()).collect();
            let count = members.len() as f32;

            let position = members.iter().map(|&m| self.verts.positions[m as usize]).sum::<Vec3>() / count;
            let mask = members.iter().map(|&m| self.verts.masks[m as usize]).sum::<f32>() / count;
            let color = self.verts.colors.as_ref().map(|colors| {
                members.iter().map(|&m| colors[m as usize]).sum::<glam::Vec4>() / count
            });
            for &m in &members {
                self.verts.positions[m as usize] = position;
                self.verts.masks[m as usize] = mask;
                if let (Some(colors), Some(color)) = (self.verts.colors.as_mut(), color) {
                    colors[m as usize] = color;
                }
            }
            stitched += 1;
        }
        stitched
    }
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

fn base_boundary_edges(base: &Mesh) -> std::collections::HashSet<(u32, u32)> {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for face in 0..base.face_count() as u32 {
        let verts = base.face_verts(face);
        for i in 0..verts.len() {
            *counts.entry(edge_key(verts[i], verts[(i + 1) % verts.len()])).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, count)| count == 1)
        .map(|(key, _)| key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_layout() {
        let base = Mesh::cube(1.0);
        let grids = MultiresGrids::from_mesh(&base, 2);
        assert_eq!(grids.grid_size(), 5);
        assert_eq!(grids.grid_count(), 24);
        assert_eq!(grids.verts.len(), 24 * 25);

        let v = grids.vertex_index(3, 2, 4);
        assert_eq!(grids.vertex_coord(v), (3, 2, 4));
    }

    #[test]
    fn test_corner_duplicates() {
        let base = Mesh::cube(1.0);
        let grids = MultiresGrids::from_mesh(&base, 1);
        // Grid 0 is corner 0 of face 0, its (0, 0) vertex is cube vertex 0,
        // shared by the corner grids of the three faces around it.
        let corner = grids.vertex_index(0, 0, 0);
        assert_eq!(grids.duplicates(corner).len(), 2);
        // Face center is shared by the four grids of the face
        let center = grids.vertex_index(0, 2, 2);
        assert_eq!(grids.duplicates(center).len(), 3);
        // Interior vertices have no duplicates
        let interior = grids.vertex_index(0, 1, 1);
        assert!(grids.duplicates(interior).is_empty());
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 2);
        assert!((0..grids.verts.len() as u32).all(|v| !grids.is_boundary(v)));

        let open = MultiresGrids::from_mesh(&Mesh::grid(1, 1, 1.0), 2);
        assert!((0..open.verts.len() as u32).any(|v| open.is_boundary(v)));
    }

    #[test]
    fn test_stitch_averages_duplicates() {
        let mut grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 1);
        let corner = grids.vertex_index(0, 0, 0);
        grids.verts.masks[corner as usize] = 0.9;
        assert_eq!(grids.stitch(&[corner]), 1);

        let expected = 0.3;
        assert!((grids.verts.masks[corner as usize] - expected).abs() < 0.001);
        for &dup in grids.duplicates(corner) {
            assert!((grids.verts.masks[dup as usize] - expected).abs() < 0.001);
        }
    }

    #[test]
    fn test_normals_point_outward() {
        let grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 2);
        for (pos, normal) in grids.verts.positions.iter().zip(&grids.verts.normals) {
            assert!(pos.dot(*normal) > 0.0);
        }
    }
}
