//! Vertex neighbor queries over every mesh backing.
//!
//! The [`Topology`] trait is implemented once per backing. Hot loops are
//! written generically over `T: Topology` and dispatched once per call with
//! [`with_topology!`](crate::with_topology), so there is no per-vertex
//! dynamic dispatch.

use smallvec::SmallVec;

use crate::dyntopo::DynMesh;
use crate::mesh::{DEFAULT_FACE_SET, MultiresGrids, VertToFaceMap, face_corners};

/// Inline capacity of a neighbor list before it spills to the heap
pub const NEIGHBOR_INLINE_CAPACITY: usize = 256;

/// Neighbors of one vertex.
///
/// Co-located duplicates (grid seams) are stored first, then topological
/// neighbors. Lists longer than [`NEIGHBOR_INLINE_CAPACITY`] move to the
/// heap transparently and are freed on drop.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    verts: SmallVec<[u32; NEIGHBOR_INLINE_CAPACITY]>,
    duplicates: usize,
}

impl Neighbors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.verts.clear();
        self.duplicates = 0;
    }

    /// Add a co-located duplicate. Must come before any [`Neighbors::push`].
    pub fn push_duplicate(&mut self, vert: u32) {
        debug_assert_eq!(self.duplicates, self.verts.len());
        if !self.verts.contains(&vert) {
            self.verts.push(vert);
            self.duplicates += 1;
        }
    }

    /// Add a topological neighbor, ignoring repeats.
    pub fn push(&mut self, vert: u32) {
        if !self.verts.contains(&vert) {
            self.verts.push(vert);
        }
    }

    pub fn len(&self) -> usize {
        self.verts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    /// All entries, duplicates first.
    pub fn as_slice(&self) -> &[u32] {
        &self.verts
    }

    pub fn duplicates(&self) -> &[u32] {
        &self.verts[..self.duplicates]
    }

    /// Neighbors excluding duplicates.
    pub fn topological(&self) -> &[u32] {
        &self.verts[self.duplicates..]
    }

    /// `(vertex, is_duplicate)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        let duplicates = self.duplicates;
        self.verts
            .iter()
            .enumerate()
            .map(move |(i, &v)| (v, i < duplicates))
    }

    /// Whether the list outgrew the inline buffer.
    pub fn spilled(&self) -> bool {
        self.verts.spilled()
    }
}

/// Connectivity queries a brush kernel needs.
pub trait Topology: Sync {
    /// Number of vertex indices (including dead dynamic topology slots).
    fn vertex_count(&self) -> usize;

    fn is_valid_vertex(&self, vert: u32) -> bool {
        (vert as usize) < self.vertex_count()
    }

    /// Fill `out` with the neighbors of `vert`. Duplicates are only
    /// reported when `include_duplicates` is set.
    fn neighbors(&self, vert: u32, include_duplicates: bool, out: &mut Neighbors);

    /// Vertex lies on an open mesh boundary.
    fn is_boundary(&self, vert: u32) -> bool;

    /// Face set of one of the faces around the vertex.
    fn vert_face_set(&self, vert: u32) -> i32;

    /// Some face around the vertex belongs to `face_set`.
    fn vert_has_face_set(&self, vert: u32, face_set: i32) -> bool;

    /// Every face around the vertex has the same face set.
    fn vert_has_unique_face_set(&self, vert: u32) -> bool;
}

/// Borrowed topology of a static polygon mesh.
#[derive(Debug, Clone, Copy)]
pub struct FacesTopology<'a> {
    pub face_offsets: &'a [u32],
    pub corner_verts: &'a [u32],
    pub face_sets: &'a [i32],
    pub vert_to_face: &'a VertToFaceMap,
    pub boundary: &'a [bool],
}

impl FacesTopology<'_> {
    /// Faces around a vertex.
    pub fn vert_faces(&self, vert: u32) -> &[u32] {
        self.vert_to_face.faces(vert)
    }

    pub fn face_verts(&self, face: u32) -> &[u32] {
        face_corners(self.face_offsets, self.corner_verts, face)
    }

    /// Every corner of every face around a vertex, the vertex itself
    /// included once per face.
    pub fn face_ring<A: smallvec::Array<Item = u32>>(&self, vert: u32, out: &mut SmallVec<A>) {
        out.clear();
        for &face in self.vert_faces(vert) {
            out.extend_from_slice(self.face_verts(face));
        }
    }
}

impl Topology for FacesTopology<'_> {
    fn vertex_count(&self) -> usize {
        self.boundary.len()
    }

    fn neighbors(&self, vert: u32, _include_duplicates: bool, out: &mut Neighbors) {
        out.clear();
        for &face in self.vert_faces(vert) {
            let corners = self.face_verts(face);
            let Some(i) = corners.iter().position(|&v| v == vert) else {
                continue;
            };
            let n = corners.len();
            out.push(corners[(i + n - 1) % n]);
            out.push(corners[(i + 1) % n]);
        }
    }

    fn is_boundary(&self, vert: u32) -> bool {
        self.boundary[vert as usize]
    }

    fn vert_face_set(&self, vert: u32) -> i32 {
        self.vert_faces(vert)
            .first()
            .map(|&f| self.face_sets[f as usize])
            .unwrap_or(DEFAULT_FACE_SET)
    }

    fn vert_has_face_set(&self, vert: u32, face_set: i32) -> bool {
        self.vert_faces(vert)
            .iter()
            .any(|&f| self.face_sets[f as usize] == face_set)
    }

    fn vert_has_unique_face_set(&self, vert: u32) -> bool {
        let mut faces = self.vert_faces(vert).iter();
        let Some(&first) = faces.next() else {
            return true;
        };
        let face_set = self.face_sets[first as usize];
        faces.all(|&f| self.face_sets[f as usize] == face_set)
    }
}

impl MultiresGrids {
    fn grids_of(&self, vert: u32) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(vert)
            .chain(self.duplicates(vert).iter().copied())
            .map(|v| self.vertex_coord(v).0)
    }
}

impl Topology for MultiresGrids {
    fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    fn neighbors(&self, vert: u32, include_duplicates: bool, out: &mut Neighbors) {
        out.clear();
        let duplicates = self.duplicates(vert);
        if include_duplicates {
            for &dup in duplicates {
                out.push_duplicate(dup);
            }
        }

        // Neighbors across seams are reported once, through the canonical
        // copy of their duplicate group.
        let own = self.canonical(vert);
        let mut seen: SmallVec<[u32; 16]> = SmallVec::new();
        for source in std::iter::once(vert).chain(duplicates.iter().copied()) {
            for n in self.grid_neighbors(source) {
                let key = self.canonical(n);
                if key == own || seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                out.push(n);
            }
        }
    }

    fn is_boundary(&self, vert: u32) -> bool {
        MultiresGrids::is_boundary(self, vert)
    }

    fn vert_face_set(&self, vert: u32) -> i32 {
        let (grid, _, _) = self.vertex_coord(vert);
        self.face_sets[grid as usize]
    }

    fn vert_has_face_set(&self, vert: u32, face_set: i32) -> bool {
        self.grids_of(vert)
            .any(|g| self.face_sets[g as usize] == face_set)
    }

    fn vert_has_unique_face_set(&self, vert: u32) -> bool {
        let face_set = self.vert_face_set(vert);
        self.grids_of(vert)
            .all(|g| self.face_sets[g as usize] == face_set)
    }
}

impl Topology for DynMesh {
    fn vertex_count(&self) -> usize {
        self.vertex_slots()
    }

    fn is_valid_vertex(&self, vert: u32) -> bool {
        self.is_vert_alive(vert)
    }

    fn neighbors(&self, vert: u32, _include_duplicates: bool, out: &mut Neighbors) {
        out.clear();
        for &f in self.vert_faces(vert) {
            let Some(face) = self.face(f) else {
                continue;
            };
            for v in face.verts {
                if v != vert {
                    out.push(v);
                }
            }
        }
    }

    fn is_boundary(&self, vert: u32) -> bool {
        self.is_boundary_vert(vert)
    }

    fn vert_face_set(&self, vert: u32) -> i32 {
        self.vert_faces(vert)
            .first()
            .and_then(|&f| self.face(f))
            .map(|f| f.face_set)
            .unwrap_or(DEFAULT_FACE_SET)
    }

    fn vert_has_face_set(&self, vert: u32, face_set: i32) -> bool {
        self.vert_faces(vert)
            .iter()
            .filter_map(|&f| self.face(f))
            .any(|f| f.face_set == face_set)
    }

    fn vert_has_unique_face_set(&self, vert: u32) -> bool {
        let face_set = self.vert_face_set(vert);
        self.vert_faces(vert)
            .iter()
            .filter_map(|&f| self.face(f))
            .all(|f| f.face_set == face_set)
    }
}

/// Topology of whichever backing the session currently uses.
#[derive(Debug, Clone, Copy)]
pub enum TopologyRef<'a> {
    Faces(FacesTopology<'a>),
    Grids(&'a MultiresGrids),
    Dyntopo(&'a DynMesh),
}

/// Run `$body` with `$t` bound to the concrete topology of a
/// [`TopologyRef`]. Generic code inside the body is monomorphized per
/// backing.
#[macro_export]
macro_rules! with_topology {
    ($topology:expr, |$t:ident| $body:expr) => {
        match $topology {
            $crate::neighbors::TopologyRef::Faces(ref $t) => $body,
            $crate::neighbors::TopologyRef::Grids($t) => $body,
            $crate::neighbors::TopologyRef::Dyntopo($t) => $body,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn faces_topology(mesh: &Mesh, map: &VertToFaceMap, boundary: &[bool]) -> Vec<Vec<u32>> {
        let topo = FacesTopology {
            face_offsets: &mesh.face_offsets,
            corner_verts: &mesh.corner_verts,
            face_sets: &mesh.face_sets,
            vert_to_face: map,
            boundary,
        };
        let mut out = Neighbors::new();
        (0..mesh.vertex_count() as u32)
            .map(|v| {
                topo.neighbors(v, true, &mut out);
                let mut list = out.as_slice().to_vec();
                list.sort();
                list
            })
            .collect()
    }

    #[test]
    fn test_cube_edge_neighbors() {
        let mesh = Mesh::cube(1.0);
        let map = VertToFaceMap::build(8, &mesh.face_offsets, &mesh.corner_verts);
        let boundary = mesh.boundary_verts();
        let neighbors = faces_topology(&mesh, &map, &boundary);
        // Edge neighbors only, never face diagonals
        assert_eq!(neighbors[0], vec![1, 3, 4]);
        assert_eq!(neighbors[6], vec![2, 5, 7]);
    }

    #[test]
    fn test_neighbors_spill_to_heap() {
        let mut out = Neighbors::new();
        for v in 0..(NEIGHBOR_INLINE_CAPACITY as u32 + 10) {
            out.push(v);
        }
        assert!(out.spilled());
        assert_eq!(out.len(), NEIGHBOR_INLINE_CAPACITY + 10);
        out.clear();
        assert!(out.is_empty());
    }

    #[test]
    fn test_grid_duplicates_come_first() {
        let grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 1);
        let corner = grids.vertex_index(0, 0, 0);
        let mut out = Neighbors::new();

        grids.neighbors(corner, true, &mut out);
        assert_eq!(out.duplicates().len(), 2);
        assert!(out.iter().take(2).all(|(_, dup)| dup));
        // A cube corner has three edge directions, one per adjacent grid pair
        assert_eq!(out.topological().len(), 3);

        grids.neighbors(corner, false, &mut out);
        assert!(out.duplicates().is_empty());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_grid_interior_neighbors() {
        let grids = MultiresGrids::from_mesh(&Mesh::cube(1.0), 2);
        let v = grids.vertex_index(0, 2, 2);
        let mut out = Neighbors::new();
        grids.neighbors(v, true, &mut out);
        assert_eq!(out.len(), 4);
        assert!(out.duplicates().is_empty());
    }

    #[test]
    fn test_face_set_queries() {
        let mut mesh = Mesh::grid(2, 1, 1.0);
        mesh.face_sets[1] = 7;
        let map = VertToFaceMap::build(mesh.vertex_count(), &mesh.face_offsets, &mesh.corner_verts);
        let boundary = mesh.boundary_verts();
        let topo = FacesTopology {
            face_offsets: &mesh.face_offsets,
            corner_verts: &mesh.corner_verts,
            face_sets: &mesh.face_sets,
            vert_to_face: &map,
            boundary: &boundary,
        };
        // Vertex 1 sits between the two faces
        assert!(!topo.vert_has_unique_face_set(1));
        assert!(topo.vert_has_face_set(1, 7));
        assert!(topo.vert_has_unique_face_set(0));
        assert!(!topo.vert_has_face_set(0, 7));
    }

    #[test]
    fn test_dispatch_macro() {
        let mesh = Mesh::cube(1.0).triangulated();
        let dyn_mesh = DynMesh::from_mesh(&mesh);
        let topology = TopologyRef::Dyntopo(&dyn_mesh);
        let count = with_topology!(topology, |t| t.vertex_count());
        assert_eq!(count, 8);
    }
}
