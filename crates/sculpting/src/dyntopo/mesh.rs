//! Editable triangle mesh for dynamic topology.
//!
//! Vertices and faces live in slots that are never reused, so the
//! operation log can refer to them by index across undo and redo. Dead
//! vertices stay in the attribute store flagged hidden.

use glam::Vec3;
use smallvec::SmallVec;

use crate::mesh::{Mesh, VertexAttributeStore, VertexData, polygon_normal};

/// A triangle with its face set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynFace {
    pub verts: [u32; 3],
    pub face_set: i32,
}

impl DynFace {
    pub fn contains(&self, vert: u32) -> bool {
        self.verts.contains(&vert)
    }

    /// The corner that is neither `a` nor `b`.
    pub fn opposite(&self, a: u32, b: u32) -> Option<u32> {
        self.verts.iter().copied().find(|&v| v != a && v != b)
    }

    /// Same face with `from` replaced by `to`.
    pub fn with_replaced(&self, from: u32, to: u32) -> DynFace {
        let mut face = *self;
        for v in &mut face.verts {
            if *v == from {
                *v = to;
            }
        }
        face
    }
}

#[derive(Debug, Clone)]
pub struct DynMesh {
    pub verts: VertexAttributeStore,
    alive: Vec<bool>,
    faces: Vec<Option<DynFace>>,
    vert_faces: Vec<SmallVec<[u32; 8]>>,
    live_verts: usize,
    live_faces: usize,
}

impl DynMesh {
    /// Build from a triangulated mesh. Callers triangulate first.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        debug_assert!(mesh.is_triangulated());
        let vertex_count = mesh.vertex_count();
        let mut dyn_mesh = Self {
            verts: mesh.verts.clone(),
            alive: vec![true; vertex_count],
            faces: Vec::with_capacity(mesh.face_count()),
            vert_faces: vec![SmallVec::new(); vertex_count],
            live_verts: vertex_count,
            live_faces: 0,
        };
        for face in 0..mesh.face_count() as u32 {
            let corners = mesh.face_verts(face);
            if corners.len() != 3 {
                continue;
            }
            dyn_mesh.add_face(DynFace {
                verts: [corners[0], corners[1], corners[2]],
                face_set: mesh.face_sets[face as usize],
            });
        }
        dyn_mesh
    }

    /// Compact live vertices and faces back into a static mesh.
    pub fn to_mesh(&self) -> Mesh {
        let mut remap = vec![u32::MAX; self.alive.len()];
        let mut kept = Vec::with_capacity(self.live_verts);
        for (v, &alive) in self.alive.iter().enumerate() {
            if alive {
                remap[v] = kept.len() as u32;
                kept.push(v as u32);
            }
        }

        let mut triangles = Vec::with_capacity(self.live_faces);
        let mut face_sets = Vec::with_capacity(self.live_faces);
        for (_, face) in self.faces() {
            triangles.push(face.verts.map(|v| remap[v as usize]));
            face_sets.push(face.face_set);
        }

        let positions = kept.iter().map(|&v| self.verts.positions[v as usize]).collect();
        let mut mesh = Mesh::from_valid_polygons(positions, &triangles);
        mesh.verts = self.verts.gather(&kept);
        mesh.face_sets = face_sets;
        mesh.recalc_normals();
        mesh
    }

    /// Number of vertex slots, dead ones included.
    pub fn vertex_slots(&self) -> usize {
        self.alive.len()
    }

    pub fn face_slots(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.live_verts
    }

    pub fn face_count(&self) -> usize {
        self.live_faces
    }

    pub fn is_vert_alive(&self, vert: u32) -> bool {
        self.alive.get(vert as usize).copied().unwrap_or(false)
    }

    pub fn face(&self, face: u32) -> Option<&DynFace> {
        self.faces.get(face as usize).and_then(Option::as_ref)
    }

    /// Live faces with their slot index.
    pub fn faces(&self) -> impl Iterator<Item = (u32, &DynFace)> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (i as u32, f)))
    }

    pub fn vert_faces(&self, vert: u32) -> &[u32] {
        &self.vert_faces[vert as usize]
    }

    pub fn add_vert(&mut self, data: &VertexData) -> u32 {
        let vert = self.verts.push(data);
        self.alive.push(true);
        self.vert_faces.push(SmallVec::new());
        self.live_verts += 1;
        vert
    }

    /// Mark a vertex dead. Its faces must already be removed.
    pub fn kill_vert(&mut self, vert: u32) -> VertexData {
        debug_assert!(self.vert_faces[vert as usize].is_empty());
        let data = self.verts.vertex_data(vert);
        if self.alive[vert as usize] {
            self.alive[vert as usize] = false;
            self.live_verts -= 1;
        }
        self.verts.hidden[vert as usize] = true;
        data
    }

    /// Bring a dead vertex back with the given attributes.
    pub fn revive_vert(&mut self, vert: u32, data: &VertexData) {
        if !self.alive[vert as usize] {
            self.alive[vert as usize] = true;
            self.live_verts += 1;
        }
        self.verts.set_vertex_data(vert, data);
    }

    pub fn add_face(&mut self, face: DynFace) -> u32 {
        let id = self.faces.len() as u32;
        self.faces.push(None);
        self.restore_face(id, face);
        id
    }

    /// Put a face back into a specific slot.
    pub fn restore_face(&mut self, id: u32, face: DynFace) {
        debug_assert!(self.faces[id as usize].is_none());
        for v in face.verts {
            self.vert_faces[v as usize].push(id);
        }
        self.faces[id as usize] = Some(face);
        self.live_faces += 1;
    }

    pub fn remove_face(&mut self, id: u32) -> Option<DynFace> {
        let face = self.faces.get_mut(id as usize)?.take()?;
        for v in face.verts {
            self.vert_faces[v as usize].retain(|f| *f != id);
        }
        self.live_faces -= 1;
        Some(face)
    }

    /// Faces using the edge `a-b`.
    pub fn edge_faces(&self, a: u32, b: u32) -> SmallVec<[u32; 2]> {
        self.vert_faces[a as usize]
            .iter()
            .copied()
            .filter(|&f| self.face(f).is_some_and(|face| face.contains(b)))
            .collect()
    }

    pub fn is_boundary_edge(&self, a: u32, b: u32) -> bool {
        self.edge_faces(a, b).len() == 1
    }

    /// A vertex on an edge used by a single face.
    pub fn is_boundary_vert(&self, vert: u32) -> bool {
        let mut ring: SmallVec<[u32; 16]> = SmallVec::new();
        self.vert_neighbors(vert, &mut ring);
        ring.iter().any(|&n| self.is_boundary_edge(vert, n))
    }

    /// Other corners of the incident faces, deduplicated.
    pub fn vert_neighbors<A: smallvec::Array<Item = u32>>(&self, vert: u32, out: &mut SmallVec<A>) {
        for &f in &self.vert_faces[vert as usize] {
            let Some(face) = self.face(f) else {
                continue;
            };
            for v in face.verts {
                if v != vert && !out.contains(&v) {
                    out.push(v);
                }
            }
        }
    }

    pub fn face_normal(&self, face: u32) -> Vec3 {
        self.face(face)
            .map(|f| polygon_normal(&self.verts.positions, &f.verts))
            .unwrap_or(Vec3::ZERO)
    }

    /// Recompute normals of the given vertices from their incident faces.
    pub fn recalc_normals_for(&mut self, verts: &[u32]) {
        for &v in verts {
            if !self.is_vert_alive(v) {
                continue;
            }
            let normal: Vec3 = self.vert_faces[v as usize]
                .iter()
                .map(|&f| self.face_normal(f))
                .sum();
            self.verts.normals[v as usize] = normal.normalize_or_zero();
        }
    }

    /// Structural self-check used by tests and debug assertions.
    pub fn is_valid(&self) -> bool {
        let mut live_faces = 0;
        for (id, face) in self.faces() {
            live_faces += 1;
            for v in face.verts {
                if !self.is_vert_alive(v) || !self.vert_faces[v as usize].contains(&id) {
                    return false;
                }
            }
        }
        live_faces == self.live_faces
            && self.alive.iter().filter(|a| **a).count() == self.live_verts
            && self.verts.is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_static_mesh() {
        let mesh = Mesh::cube(1.0).triangulated();
        let dyn_mesh = DynMesh::from_mesh(&mesh);
        assert_eq!(dyn_mesh.vertex_count(), 8);
        assert_eq!(dyn_mesh.face_count(), 12);
        assert!(dyn_mesh.is_valid());

        let back = dyn_mesh.to_mesh();
        assert_eq!(back.vertex_count(), 8);
        assert_eq!(back.face_count(), 12);
        assert_eq!(back.corner_verts, mesh.corner_verts);
    }

    #[test]
    fn test_remove_and_restore_face() {
        let mut dyn_mesh = DynMesh::from_mesh(&Mesh::grid(1, 1, 1.0).triangulated());
        let face = dyn_mesh.remove_face(0).unwrap();
        assert_eq!(dyn_mesh.face_count(), 1);
        assert!(dyn_mesh.remove_face(0).is_none());

        dyn_mesh.restore_face(0, face);
        assert_eq!(dyn_mesh.face_count(), 2);
        assert!(dyn_mesh.is_valid());
    }

    #[test]
    fn test_compaction_skips_dead_vertices() {
        let mut dyn_mesh = DynMesh::from_mesh(&Mesh::grid(1, 1, 1.0).triangulated());
        let extra = dyn_mesh.add_vert(&dyn_mesh.verts.vertex_data(0));
        dyn_mesh.kill_vert(extra);
        let mesh = dyn_mesh.to_mesh();
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_boundary_queries() {
        let dyn_mesh = DynMesh::from_mesh(&Mesh::grid(2, 2, 1.0).triangulated());
        assert!(dyn_mesh.is_boundary_vert(0));
        assert!(!dyn_mesh.is_boundary_vert(4));

        let closed = DynMesh::from_mesh(&Mesh::cube(1.0).triangulated());
        assert!((0..8).all(|v| !closed.is_boundary_vert(v)));
    }
}
