//! Bounding-volume tree over mesh elements.
//!
//! Elements (polygons, grids or triangles) are split recursively along the
//! longest axis of their centroid bounds until a node holds at most
//! `max_elements_per_leaf` elements. Each vertex is owned by the first leaf
//! that references it; leaves are the unit of parallel brush work.

use bitflags::bitflags;
use glam::Vec3;
use tracing::trace;

use super::Aabb;

/// Identifier of a leaf in a [`SpatialTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(pub u32);

bitflags! {
    /// Derived data a leaf needs to recompute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LeafDirty: u16 {
        const POSITIONS = 1 << 0;
        const NORMALS = 1 << 1;
        const MASK = 1 << 2;
        const COLOR = 1 << 3;
        const VISIBILITY = 1 << 4;
        const FACE_SETS = 1 << 5;
        const TOPOLOGY = 1 << 6;
    }
}

/// Configuration for tree construction.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Maximum elements per leaf before splitting (default: 2500)
    pub max_elements_per_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_elements_per_leaf: 2500,
        }
    }
}

/// A leaf of the tree.
#[derive(Debug, Clone)]
pub struct Leaf {
    bounds: Aabb,
    elements: Vec<u32>,
    unique_verts: Vec<u32>,
    all_verts: Vec<u32>,
    dirty: LeafDirty,
}

impl Leaf {
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Elements (faces, grids or triangles) referenced by this leaf.
    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    /// Vertices owned by this leaf, in storage order.
    pub fn verts(&self) -> &[u32] {
        &self.unique_verts
    }

    /// Every vertex referenced by the leaf's elements.
    pub fn all_verts(&self) -> &[u32] {
        &self.all_verts
    }

    pub fn dirty(&self) -> LeafDirty {
        self.dirty
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Internal { bounds: Aabb, children: [u32; 2] },
    Leaf { leaf: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct SpatialTree {
    nodes: Vec<TreeNode>,
    leaves: Vec<Leaf>,
    vert_leaf: Vec<u32>,
}

const NO_LEAF: u32 = u32::MAX;

impl SpatialTree {
    /// Build a tree over `elements`, where `element_verts` lists the
    /// vertices of one element and `positions` covers every vertex index.
    pub fn build<F, I>(
        elements: &[u32],
        element_verts: F,
        positions: &[Vec3],
        config: &TreeConfig,
    ) -> Self
    where
        F: Fn(u32) -> I,
        I: IntoIterator<Item = u32>,
    {
        let mut items: Vec<(u32, Vec3)> = elements
            .iter()
            .map(|&e| {
                let mut sum = Vec3::ZERO;
                let mut count = 0;
                for v in element_verts(e) {
                    sum += positions[v as usize];
                    count += 1;
                }
                (e, if count > 0 { sum / count as f32 } else { Vec3::ZERO })
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::new(),
            leaves: Vec::new(),
            vert_leaf: vec![NO_LEAF; positions.len()],
        };
        let max = config.max_elements_per_leaf.max(1);
        if !items.is_empty() {
            tree.build_node(&mut items, max, &element_verts, positions);
        }

        trace!(
            "Built spatial tree: {} elements, {} leaves",
            elements.len(),
            tree.leaves.len()
        );
        tree
    }

    fn build_node<F, I>(
        &mut self,
        items: &mut [(u32, Vec3)],
        max: usize,
        element_verts: &F,
        positions: &[Vec3],
    ) -> u32
    where
        F: Fn(u32) -> I,
        I: IntoIterator<Item = u32>,
    {
        let index = self.nodes.len() as u32;
        if items.len() <= max {
            let leaf = self.make_leaf(items, element_verts, positions);
            self.nodes.push(TreeNode::Leaf { leaf });
            return index;
        }

        // Placeholder, patched once the children exist
        self.nodes.push(TreeNode::Leaf { leaf: NO_LEAF });

        let mut centroid_bounds = Aabb::empty();
        for (_, c) in items.iter() {
            centroid_bounds.include_point(*c);
        }
        let axis = centroid_bounds.longest_axis();
        let split = centroid_bounds.center()[axis];

        // Partition in place; fall back to a split by index when every
        // centroid lands on one side.
        let mut mid = partition_in_place(items, |(_, c)| c[axis] < split);
        if mid == 0 || mid == items.len() {
            mid = items.len() / 2;
        }

        let (left, right) = items.split_at_mut(mid);
        let a = self.build_node(left, max, element_verts, positions);
        let b = self.build_node(right, max, element_verts, positions);

        let mut bounds = self.node_bounds(a);
        bounds.include_aabb(&self.node_bounds(b));
        self.nodes[index as usize] = TreeNode::Internal {
            bounds,
            children: [a, b],
        };
        index
    }

    fn make_leaf<F, I>(&mut self, items: &[(u32, Vec3)], element_verts: &F, positions: &[Vec3]) -> u32
    where
        F: Fn(u32) -> I,
        I: IntoIterator<Item = u32>,
    {
        let leaf_index = self.leaves.len() as u32;
        let mut bounds = Aabb::empty();
        let mut elements = Vec::with_capacity(items.len());
        let mut unique_verts = Vec::new();
        let mut all_verts = Vec::new();

        for &(element, _) in items {
            elements.push(element);
            for v in element_verts(element) {
                bounds.include_point(positions[v as usize]);
                let owner = &mut self.vert_leaf[v as usize];
                if *owner == NO_LEAF {
                    *owner = leaf_index;
                    unique_verts.push(v);
                }
                all_verts.push(v);
            }
        }
        unique_verts.sort_unstable();
        all_verts.sort_unstable();
        all_verts.dedup();

        self.leaves.push(Leaf {
            bounds,
            elements,
            unique_verts,
            all_verts,
            dirty: LeafDirty::empty(),
        });
        leaf_index
    }

    fn node_bounds(&self, node: u32) -> Aabb {
        match &self.nodes[node as usize] {
            TreeNode::Internal { bounds, .. } => *bounds,
            TreeNode::Leaf { leaf } => self.leaves[*leaf as usize].bounds,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, id: LeafId) -> &Leaf {
        &self.leaves[id.0 as usize]
    }

    /// Every leaf in build order.
    pub fn all_leaves(&self) -> Vec<LeafId> {
        (0..self.leaves.len() as u32).map(LeafId).collect()
    }

    /// Leaf owning a vertex, if any element references it.
    pub fn vertex_leaf(&self, vert: u32) -> Option<LeafId> {
        match self.vert_leaf.get(vert as usize) {
            Some(&leaf) if leaf != NO_LEAF => Some(LeafId(leaf)),
            _ => None,
        }
    }

    /// Leaves whose bounds pass `test`. Internal nodes failing the test
    /// prune their subtree.
    pub fn gather(&self, test: impl Fn(&Aabb) -> bool) -> Vec<LeafId> {
        let mut result = Vec::new();
        if self.nodes.is_empty() {
            return result;
        }
        let mut stack = vec![0u32];
        while let Some(node) = stack.pop() {
            match &self.nodes[node as usize] {
                TreeNode::Internal { bounds, children } => {
                    if test(bounds) {
                        stack.push(children[1]);
                        stack.push(children[0]);
                    }
                }
                TreeNode::Leaf { leaf } => {
                    let leaf_data = &self.leaves[*leaf as usize];
                    if !leaf_data.unique_verts.is_empty() && test(&leaf_data.bounds) {
                        result.push(LeafId(*leaf));
                    }
                }
            }
        }
        result
    }

    pub fn mark_dirty(&mut self, id: LeafId, flags: LeafDirty) {
        self.leaves[id.0 as usize].dirty |= flags;
    }

    /// Leaves with any of `flags` set.
    pub fn dirty_leaves(&self, flags: LeafDirty) -> Vec<LeafId> {
        self.leaves
            .iter()
            .enumerate()
            .filter(|(_, leaf)| leaf.dirty.intersects(flags))
            .map(|(i, _)| LeafId(i as u32))
            .collect()
    }

    /// Clear dirty flags and return the union of what was set.
    pub fn clear_dirty(&mut self) -> LeafDirty {
        let mut all = LeafDirty::empty();
        for leaf in &mut self.leaves {
            all |= leaf.dirty;
            leaf.dirty = LeafDirty::empty();
        }
        all
    }

    /// Refit bounds of leaves whose positions changed, then of every
    /// internal node.
    pub fn update_bounds(&mut self, positions: &[Vec3]) {
        let mut changed = false;
        for leaf in &mut self.leaves {
            if !leaf.dirty.contains(LeafDirty::POSITIONS) {
                continue;
            }
            let mut bounds = Aabb::empty();
            for &v in &leaf.all_verts {
                bounds.include_point(positions[v as usize]);
            }
            leaf.bounds = bounds;
            changed = true;
        }
        if !changed {
            return;
        }
        // Children always come after their parent
        for node in (0..self.nodes.len()).rev() {
            if let TreeNode::Internal { children, .. } = self.nodes[node] {
                let mut bounds = self.node_bounds(children[0]);
                bounds.include_aabb(&self.node_bounds(children[1]));
                if let TreeNode::Internal { bounds: b, .. } = &mut self.nodes[node] {
                    *b = bounds;
                }
            }
        }
    }

    /// Closest vertex within `max_distance` of `point` for which `accept`
    /// returns true.
    pub fn nearest_vertex(
        &self,
        positions: &[Vec3],
        point: Vec3,
        max_distance: f32,
        accept: impl Fn(u32) -> bool,
    ) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        let max_sq = max_distance * max_distance;
        for id in self.gather(|b| b.intersects_sphere(point, max_distance)) {
            for &v in self.leaf(id).verts() {
                let d = positions[v as usize].distance_squared(point);
                if d <= max_sq && best.is_none_or(|(_, bd)| d < bd) && accept(v) {
                    best = Some((v, d));
                }
            }
        }
        best.map(|(v, _)| v)
    }
}

/// Stable-order-agnostic in-place partition; returns the number of items
/// for which `pred` holds (they end up first).
fn partition_in_place<T>(items: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut next = 0;
    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(i, next);
            next += 1;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn build_grid_tree(segments: u32, max: usize) -> (Mesh, SpatialTree) {
        let mesh = Mesh::grid(segments, segments, 1.0);
        let faces: Vec<u32> = (0..mesh.face_count() as u32).collect();
        let tree = SpatialTree::build(
            &faces,
            |f| mesh.face_verts(f).iter().copied().collect::<Vec<_>>(),
            &mesh.verts.positions,
            &TreeConfig {
                max_elements_per_leaf: max,
            },
        );
        (mesh, tree)
    }

    #[test]
    fn test_leaves_partition_vertices() {
        let (mesh, tree) = build_grid_tree(8, 4);
        assert!(tree.leaf_count() >= 16);

        let mut owned = vec![0u32; mesh.vertex_count()];
        for id in tree.all_leaves() {
            assert!(tree.leaf(id).elements().len() <= 4);
            for &v in tree.leaf(id).verts() {
                owned[v as usize] += 1;
                assert_eq!(tree.vertex_leaf(v), Some(id));
            }
        }
        assert!(owned.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_gather_sphere() {
        let (_, tree) = build_grid_tree(8, 4);
        let all = tree.gather(|_| true);
        assert_eq!(all.len(), tree.leaf_count());

        let near_corner = tree.gather(|b| b.intersects_sphere(Vec3::new(-0.5, -0.5, 0.0), 0.05));
        assert!(!near_corner.is_empty());
        assert!(near_corner.len() < tree.leaf_count());

        let far = tree.gather(|b| b.intersects_sphere(Vec3::new(10.0, 0.0, 0.0), 0.5));
        assert!(far.is_empty());
    }

    #[test]
    fn test_dirty_flags_and_bounds_refit() {
        let (mut mesh, mut tree) = build_grid_tree(4, 2);
        let id = LeafId(0);
        let vert = tree.leaf(id).verts()[0];
        mesh.verts.positions[vert as usize].z = 5.0;

        tree.mark_dirty(id, LeafDirty::POSITIONS | LeafDirty::NORMALS);
        assert_eq!(tree.dirty_leaves(LeafDirty::NORMALS), vec![id]);
        tree.update_bounds(&mesh.verts.positions);
        assert!((tree.leaf(id).bounds().max.z - 5.0).abs() < 0.001);
        assert_eq!(
            tree.gather(|b| b.intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0)).len() >= 1,
            true
        );

        let cleared = tree.clear_dirty();
        assert!(cleared.contains(LeafDirty::POSITIONS));
        assert!(tree.dirty_leaves(LeafDirty::all()).is_empty());
    }

    #[test]
    fn test_nearest_vertex() {
        let (mesh, tree) = build_grid_tree(4, 2);
        let nearest = tree.nearest_vertex(&mesh.verts.positions, Vec3::new(-0.49, -0.49, 0.0), 0.1, |_| true);
        assert_eq!(nearest, Some(0));
        let none = tree.nearest_vertex(&mesh.verts.positions, Vec3::new(3.0, 3.0, 0.0), 0.1, |_| true);
        assert_eq!(none, None);
    }
}
