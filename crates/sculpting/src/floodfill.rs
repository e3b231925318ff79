//! Breadth-first traversal over vertex adjacency.
//!
//! The step callback sees every edge `from -> to` leading to a vertex not
//! visited yet, in BFS layer order. Returning false stops expansion past
//! `to` without ending the traversal. Co-located grid duplicates are
//! reported before topological neighbors, so they are expanded first.

use std::collections::VecDeque;

use chisel_config::SymmetryFlags;
use tracing::trace;

use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology, TopologyRef};
use crate::spatial::SpatialTree;
use crate::symmetry::{flip_position, mirror_passes};

#[derive(Debug, Clone)]
pub struct FloodFill {
    queue: VecDeque<u32>,
    visited: Vec<bool>,
}

impl FloodFill {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: vec![false; vertex_count],
        }
    }

    /// Seed the traversal. Adding a vertex twice is a no-op.
    pub fn add_initial(&mut self, vert: u32) {
        let Some(visited) = self.visited.get_mut(vert as usize) else {
            return;
        };
        if !*visited {
            *visited = true;
            self.queue.push_back(vert);
        }
    }

    /// Seed `vert` and the vertices nearest to its mirrored positions,
    /// for every enabled mirror combination.
    pub fn add_initial_with_symmetry(
        &mut self,
        tree: &SpatialTree,
        attrs: &VertexAttributeStore,
        vert: u32,
        radius: f32,
        symmetry: SymmetryFlags,
    ) {
        self.add_initial(vert);
        let location = attrs.positions[vert as usize];
        for pass in mirror_passes(symmetry).skip(1) {
            let mirrored = flip_position(location, pass);
            if let Some(v) = tree.nearest_vertex(&attrs.positions, mirrored, radius, |v| attrs.is_visible(v)) {
                self.add_initial(v);
            }
        }
    }

    pub fn is_visited(&self, vert: u32) -> bool {
        self.visited.get(vert as usize).copied().unwrap_or(false)
    }

    /// Run the traversal to completion.
    pub fn execute<T, F>(&mut self, topology: &T, attrs: &VertexAttributeStore, mut step: F)
    where
        T: Topology + ?Sized,
        F: FnMut(u32, u32, bool) -> bool,
    {
        let mut neighbors = Neighbors::new();
        let mut expanded = 0usize;
        while let Some(from) = self.queue.pop_front() {
            expanded += 1;
            neighbors.clear();
            topology.neighbors(from, true, &mut neighbors);
            for (to, is_duplicate) in neighbors.iter() {
                let index = to as usize;
                if !topology.is_valid_vertex(to) || self.visited[index] || !attrs.is_visible(to) {
                    continue;
                }
                self.visited[index] = true;
                if step(from, to, is_duplicate) {
                    self.queue.push_back(to);
                }
            }
        }
        trace!("Flood fill expanded {} vertices", expanded);
    }

    /// [`FloodFill::execute`] over whichever backing is active.
    pub fn execute_on<F>(&mut self, topology: TopologyRef<'_>, attrs: &VertexAttributeStore, step: F)
    where
        F: FnMut(u32, u32, bool) -> bool,
    {
        crate::with_topology!(topology, |t| self.execute(t, attrs, step))
    }
}

/// BFS layer index of every vertex reachable from `seeds` (u32::MAX if
/// unreachable), stopping after `max_steps` layers.
pub fn layer_distances(
    topology: TopologyRef<'_>,
    attrs: &VertexAttributeStore,
    seeds: impl IntoIterator<Item = u32>,
    max_steps: u32,
) -> Vec<u32> {
    let mut distance = vec![u32::MAX; attrs.len()];
    let mut fill = FloodFill::new(attrs.len());
    for seed in seeds {
        distance[seed as usize] = 0;
        fill.add_initial(seed);
    }
    fill.execute_on(topology, attrs, |from, to, is_duplicate| {
        let d = if is_duplicate {
            distance[from as usize]
        } else {
            distance[from as usize].saturating_add(1)
        };
        distance[to as usize] = d;
        d < max_steps
    });
    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, VertToFaceMap};
    use crate::neighbors::FacesTopology;
    use crate::spatial::TreeConfig;

    fn with_grid_topology<R>(mesh: &Mesh, f: impl FnOnce(TopologyRef<'_>) -> R) -> R {
        let map = VertToFaceMap::build(mesh.vertex_count(), &mesh.face_offsets, &mesh.corner_verts);
        let boundary = mesh.boundary_verts();
        f(TopologyRef::Faces(FacesTopology {
            face_offsets: &mesh.face_offsets,
            corner_verts: &mesh.corner_verts,
            face_sets: &mesh.face_sets,
            vert_to_face: &map,
            boundary: &boundary,
        }))
    }

    #[test]
    fn test_visits_each_vertex_once_in_layer_order() {
        let mesh = Mesh::grid(4, 4, 1.0);
        with_grid_topology(&mesh, |topology| {
            let mut fill = FloodFill::new(mesh.vertex_count());
            fill.add_initial(0);
            fill.add_initial(0);

            let mut layer = vec![u32::MAX; mesh.vertex_count()];
            layer[0] = 0;
            let mut order = Vec::new();
            let mut seen = vec![0u32; mesh.vertex_count()];
            fill.execute_on(topology, &mesh.verts, |from, to, _| {
                layer[to as usize] = layer[from as usize] + 1;
                order.push(layer[to as usize]);
                seen[to as usize] += 1;
                true
            });

            assert!(order.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(seen[0], 0);
            assert!(seen[1..].iter().all(|&c| c == 1));
            // Manhattan distance on the grid
            assert_eq!(layer[24], 8);
        });
    }

    #[test]
    fn test_false_prunes_without_stopping() {
        let mesh = Mesh::grid(4, 1, 1.0);
        with_grid_topology(&mesh, |topology| {
            let mut fill = FloodFill::new(mesh.vertex_count());
            fill.add_initial(0);
            // Only expand along the bottom row
            fill.execute_on(topology, &mesh.verts, |_, to, _| to < 5);
            assert!((0..5).all(|v| fill.is_visited(v)));
            // The top row is still reached once, from the bottom row
            assert!(fill.is_visited(5) && fill.is_visited(9));
        });
    }

    #[test]
    fn test_hidden_vertices_block_traversal() {
        let mut mesh = Mesh::grid(2, 2, 1.0);
        // Hide the middle column
        for v in [1, 4, 7] {
            mesh.verts.hidden[v] = true;
        }
        with_grid_topology(&mesh, |topology| {
            let mut fill = FloodFill::new(mesh.vertex_count());
            fill.add_initial(0);
            fill.execute_on(topology, &mesh.verts, |_, _, _| true);
            assert!(fill.is_visited(3) && fill.is_visited(6));
            assert!(!fill.is_visited(2) && !fill.is_visited(5) && !fill.is_visited(8));
        });
    }

    #[test]
    fn test_layer_distances_are_capped() {
        let mesh = Mesh::grid(4, 1, 1.0);
        with_grid_topology(&mesh, |topology| {
            let d = layer_distances(topology, &mesh.verts, [0], 2);
            assert_eq!(d[0], 0);
            assert_eq!(d[1], 1);
            assert_eq!(d[2], 2);
            assert_eq!(d[3], u32::MAX);
        });
    }

    #[test]
    fn test_symmetric_seeds() {
        let mesh = Mesh::grid(4, 4, 1.0);
        let elements: Vec<u32> = (0..mesh.face_count() as u32).collect();
        let tree = SpatialTree::build(
            &elements,
            |f| mesh.face_verts(f).to_vec(),
            &mesh.verts.positions,
            &TreeConfig::default(),
        );
        let mut fill = FloodFill::new(mesh.vertex_count());
        fill.add_initial_with_symmetry(&tree, &mesh.verts, 0, 0.01, SymmetryFlags::X);
        assert!(fill.is_visited(0));
        assert!(fill.is_visited(4));
        assert!(!fill.is_visited(20));
    }
}
