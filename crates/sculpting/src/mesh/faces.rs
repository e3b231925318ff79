//! Static polygon mesh and its derived vertex→face map.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use super::attributes::VertexAttributeStore;
use crate::error::SculptError;

/// Default face set id assigned to new faces
pub const DEFAULT_FACE_SET: i32 = 1;

/// A polygon mesh with per-vertex attributes.
///
/// Faces are stored as `face_offsets` into `corner_verts`; face `f` uses
/// corners `face_offsets[f]..face_offsets[f + 1]`. Face sets are stored per
/// face.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub verts: VertexAttributeStore,
    pub edges: Vec<[u32; 2]>,
    pub face_offsets: Vec<u32>,
    pub corner_verts: Vec<u32>,
    pub face_sets: Vec<i32>,
    /// Set while the mesh is being edited through dynamic topology
    pub dyntopo_active: bool,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::from_valid_polygons::<[u32; 3]>(Vec::new(), &[])
    }
}

impl Mesh {
    /// Build a mesh from positions and polygon corner lists.
    ///
    /// Returns an error if a polygon has fewer than three corners or
    /// references a vertex that does not exist.
    pub fn from_polygons<P: AsRef<[u32]>>(
        positions: Vec<Vec3>,
        polygons: &[P],
    ) -> Result<Self, SculptError> {
        let vertex_count = positions.len() as u32;
        for (face, polygon) in polygons.iter().enumerate() {
            let polygon = polygon.as_ref();
            if polygon.len() < 3 {
                return Err(SculptError::InvalidTopology(format!(
                    "face {face} has {} corners",
                    polygon.len()
                )));
            }
            if let Some(&bad) = polygon.iter().find(|&&v| v >= vertex_count) {
                return Err(SculptError::InvalidTopology(format!(
                    "face {face} references missing vertex {bad}"
                )));
            }
        }
        Ok(Self::from_valid_polygons(positions, polygons))
    }

    /// Build from polygons already known to be valid.
    pub(crate) fn from_valid_polygons<P: AsRef<[u32]>>(positions: Vec<Vec3>, polygons: &[P]) -> Self {
        let mut face_offsets = Vec::with_capacity(polygons.len() + 1);
        let mut corner_verts = Vec::new();
        face_offsets.push(0);
        for polygon in polygons {
            corner_verts.extend_from_slice(polygon.as_ref());
            face_offsets.push(corner_verts.len() as u32);
        }

        let mut mesh = Self {
            verts: VertexAttributeStore::from_positions(positions),
            edges: Vec::new(),
            face_sets: vec![DEFAULT_FACE_SET; polygons.len()],
            face_offsets,
            corner_verts,
            dyntopo_active: false,
        };
        mesh.edges = mesh.build_edges();
        mesh.recalc_normals();
        mesh
    }

    pub fn from_triangles(positions: Vec<Vec3>, triangles: &[[u32; 3]]) -> Result<Self, SculptError> {
        Self::from_polygons(positions, triangles)
    }

    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    pub fn face_count(&self) -> usize {
        self.face_offsets.len().saturating_sub(1)
    }

    pub fn corner_count(&self) -> usize {
        self.corner_verts.len()
    }

    pub fn face_verts(&self, face: u32) -> &[u32] {
        face_corners(&self.face_offsets, &self.corner_verts, face)
    }

    /// Area-weighted face normal (Newell's method).
    pub fn face_normal(&self, face: u32) -> Vec3 {
        polygon_normal(&self.verts.positions, self.face_verts(face))
    }

    pub fn face_center(&self, face: u32) -> Vec3 {
        let verts = self.face_verts(face);
        let sum: Vec3 = verts.iter().map(|&v| self.verts.positions[v as usize]).sum();
        sum / verts.len() as f32
    }

    /// True when every face is a triangle.
    pub fn is_triangulated(&self) -> bool {
        self.corner_count() == 3 * self.face_count()
    }

    /// Recompute all vertex normals from face normals.
    pub fn recalc_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertex_count()];
        for face in 0..self.face_count() as u32 {
            let normal = self.face_normal(face);
            for &v in self.face_verts(face) {
                normals[v as usize] += normal;
            }
        }
        for n in &mut normals {
            *n = n.normalize_or_zero();
        }
        self.verts.normals = normals;
    }

    /// Fan-triangulate every polygon with more than three corners.
    /// Face sets are carried over to the new triangles.
    pub fn triangulated(&self) -> Mesh {
        let mut face_offsets = vec![0];
        let mut corner_verts = Vec::with_capacity(self.corner_count() * 3);
        let mut face_sets = Vec::with_capacity(self.face_count());

        for face in 0..self.face_count() as u32 {
            let verts = self.face_verts(face);
            for i in 1..verts.len() - 1 {
                corner_verts.extend_from_slice(&[verts[0], verts[i], verts[i + 1]]);
                face_offsets.push(corner_verts.len() as u32);
                face_sets.push(self.face_sets[face as usize]);
            }
        }

        let mut mesh = Mesh {
            verts: self.verts.clone(),
            edges: Vec::new(),
            face_offsets,
            corner_verts,
            face_sets,
            dyntopo_active: self.dyntopo_active,
        };
        mesh.edges = mesh.build_edges();
        mesh
    }

    /// Unique undirected edges in order of first appearance.
    fn build_edges(&self) -> Vec<[u32; 2]> {
        let mut seen: HashSet<(u32, u32)> = HashSet::new();
        let mut edges = Vec::new();
        for face in 0..self.face_count() as u32 {
            let verts = self.face_verts(face);
            for i in 0..verts.len() {
                let a = verts[i];
                let b = verts[(i + 1) % verts.len()];
                let key = (a.min(b), a.max(b));
                if seen.insert(key) {
                    edges.push([key.0, key.1]);
                }
            }
        }
        edges
    }

    /// Vertices on an edge used by exactly one face.
    pub fn boundary_verts(&self) -> Vec<bool> {
        let mut edge_faces: HashMap<(u32, u32), u32> = HashMap::new();
        for face in 0..self.face_count() as u32 {
            let verts = self.face_verts(face);
            for i in 0..verts.len() {
                let a = verts[i];
                let b = verts[(i + 1) % verts.len()];
                *edge_faces.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let mut boundary = vec![false; self.vertex_count()];
        for ((a, b), count) in edge_faces {
            if count == 1 {
                boundary[a as usize] = true;
                boundary[b as usize] = true;
            }
        }
        boundary
    }
}

pub(crate) fn face_corners<'a>(offsets: &[u32], corners: &'a [u32], face: u32) -> &'a [u32] {
    let start = offsets[face as usize] as usize;
    let end = offsets[face as usize + 1] as usize;
    &corners[start..end]
}

pub(crate) fn polygon_normal(positions: &[Vec3], verts: &[u32]) -> Vec3 {
    let mut normal = Vec3::ZERO;
    for i in 0..verts.len() {
        let a = positions[verts[i] as usize];
        let b = positions[verts[(i + 1) % verts.len()] as usize];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal * 0.5
}

/// Grouped vertex→face map (offsets into a flat face list).
#[derive(Debug, Clone, Default)]
pub struct VertToFaceMap {
    offsets: Vec<u32>,
    faces: Vec<u32>,
}

impl VertToFaceMap {
    pub fn build(vertex_count: usize, face_offsets: &[u32], corner_verts: &[u32]) -> Self {
        let face_count = face_offsets.len().saturating_sub(1);
        let mut counts = vec![0u32; vertex_count + 1];
        for &v in corner_verts {
            counts[v as usize + 1] += 1;
        }
        for i in 1..counts.len() {
            counts[i] += counts[i - 1];
        }
        let offsets = counts.clone();
        let mut cursor = counts;
        let mut faces = vec![0u32; corner_verts.len()];
        for face in 0..face_count as u32 {
            for &v in face_corners(face_offsets, corner_verts, face) {
                let slot = &mut cursor[v as usize];
                faces[*slot as usize] = face;
                *slot += 1;
            }
        }
        Self { offsets, faces }
    }

    pub fn faces(&self, vert: u32) -> &[u32] {
        let start = self.offsets[vert as usize] as usize;
        let end = self.offsets[vert as usize + 1] as usize;
        &self.faces[start..end]
    }
}
