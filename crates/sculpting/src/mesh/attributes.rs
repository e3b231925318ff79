//! Per-vertex attribute storage.

use glam::{Vec3, Vec4};

/// Per-vertex arrays with stable indices.
///
/// All arrays have the same length. The store owns no topology; the mesh
/// backing decides which indices are neighbors. Colors are only present
/// when the mesh has an active color attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexAttributeStore {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// 0.0 = free, 1.0 = fully protected
    pub masks: Vec<f32>,
    pub colors: Option<Vec<Vec4>>,
    pub hidden: Vec<bool>,
}

/// All attributes of one vertex, used when vertices are removed and
/// restored by the dynamic topology log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexData {
    pub position: Vec3,
    pub normal: Vec3,
    pub mask: f32,
    pub color: Option<Vec4>,
    pub hidden: bool,
}

impl VertexAttributeStore {
    /// Create a store from positions; normals start at zero, masks at 0.0.
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        let len = positions.len();
        Self {
            positions,
            normals: vec![Vec3::ZERO; len],
            masks: vec![0.0; len],
            colors: None,
            hidden: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_visible(&self, vert: u32) -> bool {
        !self.hidden[vert as usize]
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    /// Add a color attribute filled with `fill` if the mesh has none.
    pub fn ensure_colors(&mut self, fill: Vec4) -> &mut Vec<Vec4> {
        let len = self.len();
        self.colors.get_or_insert_with(|| vec![fill; len])
    }

    pub fn vertex_data(&self, vert: u32) -> VertexData {
        let i = vert as usize;
        VertexData {
            position: self.positions[i],
            normal: self.normals[i],
            mask: self.masks[i],
            color: self.colors.as_ref().map(|c| c[i]),
            hidden: self.hidden[i],
        }
    }

    pub fn set_vertex_data(&mut self, vert: u32, data: &VertexData) {
        let i = vert as usize;
        self.positions[i] = data.position;
        self.normals[i] = data.normal;
        self.masks[i] = data.mask;
        if let (Some(colors), Some(color)) = (self.colors.as_mut(), data.color) {
            colors[i] = color;
        }
        self.hidden[i] = data.hidden;
    }

    /// Append a vertex and return its index.
    pub fn push(&mut self, data: &VertexData) -> u32 {
        let index = self.len() as u32;
        self.positions.push(data.position);
        self.normals.push(data.normal);
        self.masks.push(data.mask);
        if let Some(colors) = self.colors.as_mut() {
            colors.push(data.color.unwrap_or(Vec4::ONE));
        }
        self.hidden.push(data.hidden);
        index
    }

    /// Interpolate every attribute of two vertices.
    pub fn interpolate(&self, a: u32, b: u32, t: f32) -> VertexData {
        let da = self.vertex_data(a);
        let db = self.vertex_data(b);
        VertexData {
            position: da.position.lerp(db.position, t),
            normal: da.normal.lerp(db.normal, t).normalize_or_zero(),
            mask: da.mask + (db.mask - da.mask) * t,
            color: match (da.color, db.color) {
                (Some(ca), Some(cb)) => Some(ca.lerp(cb, t)),
                _ => None,
            },
            hidden: da.hidden && db.hidden,
        }
    }

    /// Select a subset of vertices, in the given order.
    pub fn gather(&self, verts: &[u32]) -> Self {
        Self {
            positions: verts.iter().map(|&v| self.positions[v as usize]).collect(),
            normals: verts.iter().map(|&v| self.normals[v as usize]).collect(),
            masks: verts.iter().map(|&v| self.masks[v as usize]).collect(),
            colors: self
                .colors
                .as_ref()
                .map(|c| verts.iter().map(|&v| c[v as usize]).collect()),
            hidden: verts.iter().map(|&v| self.hidden[v as usize]).collect(),
        }
    }

    /// Check that every array has the same length.
    pub fn is_consistent(&self) -> bool {
        let len = self.len();
        self.normals.len() == len
            && self.masks.len() == len
            && self.hidden.len() == len
            && self.colors.as_ref().is_none_or(|c| c.len() == len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_arrays_aligned() {
        let mut store = VertexAttributeStore::from_positions(vec![Vec3::ZERO, Vec3::X]);
        store.ensure_colors(Vec4::ONE);
        let data = store.interpolate(0, 1, 0.5);
        let index = store.push(&data);

        assert_eq!(index, 2);
        assert!(store.is_consistent());
        assert!((store.positions[2] - Vec3::new(0.5, 0.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_vertex_data_round_trip() {
        let mut store = VertexAttributeStore::from_positions(vec![Vec3::ZERO; 3]);
        let data = VertexData {
            position: Vec3::ONE,
            normal: Vec3::Z,
            mask: 0.75,
            color: None,
            hidden: true,
        };
        store.set_vertex_data(1, &data);
        assert_eq!(store.vertex_data(1), data);
        assert!(!store.is_visible(1));
    }
}
