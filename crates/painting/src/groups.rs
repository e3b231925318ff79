//! Vertex groups: named per-vertex weight layers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PaintError, PaintResult};

/// Locked weight sums at or above this count as fully locked
pub const LOCK_EPSILON: f32 = 1e-6;

/// One named weight layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexGroup {
    pub name: String,
    /// Locked groups are never painted or normalized
    pub locked: bool,
    weights: Vec<f32>,
}

impl VertexGroup {
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn weight(&self, vert: u32) -> f32 {
        self.weights.get(vert as usize).copied().unwrap_or(0.0)
    }
}

/// Every vertex group of one mesh, dense per vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexGroups {
    vertex_count: usize,
    groups: Vec<VertexGroup>,
    active: Option<usize>,
}

impl VertexGroups {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            groups: Vec::new(),
            active: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add an empty group and make it active. Returns its index.
    pub fn add(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        debug!("Adding vertex group '{}'", name);
        self.groups.push(VertexGroup {
            name,
            locked: false,
            weights: vec![0.0; self.vertex_count],
        });
        let index = self.groups.len() - 1;
        self.active = Some(index);
        index
    }

    /// Add a group with the given weights.
    pub fn add_with_weights(&mut self, name: impl Into<String>, weights: Vec<f32>) -> PaintResult<usize> {
        if weights.len() != self.vertex_count {
            return Err(PaintError::GroupSizeMismatch {
                expected: self.vertex_count,
                actual: weights.len(),
            });
        }
        let index = self.add(name);
        self.groups[index].weights = weights;
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&VertexGroup> {
        self.groups.get(index)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn set_active(&mut self, index: usize) -> PaintResult<()> {
        if index >= self.groups.len() {
            return Err(PaintError::GroupNotFound(index));
        }
        self.active = Some(index);
        Ok(())
    }

    pub fn set_locked(&mut self, index: usize, locked: bool) -> PaintResult<()> {
        let group = self.groups.get_mut(index).ok_or(PaintError::GroupNotFound(index))?;
        group.locked = locked;
        Ok(())
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.groups.get(index).is_some_and(|g| g.locked)
    }

    pub fn weight(&self, group: usize, vert: u32) -> f32 {
        self.groups.get(group).map_or(0.0, |g| g.weight(vert))
    }

    pub fn set_weight(&mut self, group: usize, vert: u32, weight: f32) {
        if let Some(slot) = self
            .groups
            .get_mut(group)
            .and_then(|g| g.weights.get_mut(vert as usize))
        {
            *slot = weight;
        }
    }

    /// The group named like `group` with its side swapped, or `group`
    /// itself when the name has no side or the other side doesn't exist.
    pub fn mirror_of(&self, group: usize) -> usize {
        self.groups
            .get(group)
            .and_then(|g| flip_side_name(&g.name))
            .and_then(|name| self.find(&name))
            .unwrap_or(group)
    }

    /// Rescale the unlocked weights of `vert` so all weights sum to one.
    ///
    /// `keep` is left untouched when the other unlocked groups can absorb
    /// the difference; otherwise it is scaled along with them.
    pub fn normalize_vertex(&mut self, vert: u32, keep: Option<usize>) {
        let i = vert as usize;
        if i >= self.vertex_count {
            return;
        }
        let mut locked_sum = 0.0;
        let mut unlocked_sum = 0.0;
        let mut others_sum = 0.0;
        for (index, group) in self.groups.iter().enumerate() {
            let w = group.weights[i];
            if group.locked {
                locked_sum += w;
            } else {
                unlocked_sum += w;
                if Some(index) != keep {
                    others_sum += w;
                }
            }
        }
        if unlocked_sum <= 0.0 {
            return;
        }

        let free = (1.0 - locked_sum).max(0.0);
        if free < LOCK_EPSILON {
            for group in self.groups.iter_mut().filter(|g| !g.locked) {
                group.weights[i] = 0.0;
            }
            return;
        }

        let kept = keep
            .and_then(|k| self.groups.get(k))
            .filter(|g| !g.locked)
            .map_or(0.0, |g| g.weights[i]);
        let (scale, skip) = if others_sum > 0.0 && kept <= free {
            ((free - kept) / others_sum, keep)
        } else {
            (free / unlocked_sum, None)
        };
        for (index, group) in self.groups.iter_mut().enumerate() {
            if group.locked || Some(index) == skip {
                continue;
            }
            group.weights[i] = (group.weights[i] * scale).clamp(0.0, 1.0);
        }
    }

    /// Snapshot of every group's weights for [`VertexGroups::restore`].
    pub fn snapshot(&self, label: &str) -> WeightUndoEntry {
        WeightUndoEntry {
            label: label.to_string(),
            weights: self.groups.iter().map(|g| g.weights.clone()).collect(),
        }
    }

    /// Put back the weights captured in `entry`. Groups added since are
    /// left alone.
    pub fn restore(&mut self, entry: &WeightUndoEntry) {
        for (group, weights) in self.groups.iter_mut().zip(&entry.weights) {
            group.weights.clone_from(weights);
        }
        debug!("Restored {} vertex groups for '{}'", entry.weights.len(), entry.label);
    }
}

/// Weights of every group before a weight paint operation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightUndoEntry {
    pub label: String,
    weights: Vec<Vec<f32>>,
}

/// Swap the side marker of a group name: `.L`/`.R`, `_L`/`_R`, `-l`/`-r`
/// suffixes and `Left`/`Right` words (title, lower or upper case). Returns `None` when
/// there is nothing to swap.
pub fn flip_side_name(name: &str) -> Option<String> {
    const SUFFIXES: [(&str, &str); 6] = [
        (".L", ".R"),
        ("_L", "_R"),
        ("-L", "-R"),
        (".l", ".r"),
        ("_l", "_r"),
        ("-l", "-r"),
    ];
    for (left, right) in SUFFIXES {
        if let Some(stem) = name.strip_suffix(left) {
            return Some(format!("{stem}{right}"));
        }
        if let Some(stem) = name.strip_suffix(right) {
            return Some(format!("{stem}{left}"));
        }
    }

    const WORDS: [(&str, &str); 3] = [("Left", "Right"), ("left", "right"), ("LEFT", "RIGHT")];
    for (left, right) in WORDS {
        if name.contains(left) {
            return Some(name.replacen(left, right, 1));
        }
        if name.contains(right) {
            return Some(name.replacen(right, left, 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_side_name() {
        assert_eq!(flip_side_name("arm.L").as_deref(), Some("arm.R"));
        assert_eq!(flip_side_name("leg_r").as_deref(), Some("leg_l"));
        assert_eq!(flip_side_name("LeftHand").as_deref(), Some("RightHand"));
        assert_eq!(flip_side_name("spine"), None);
    }

    #[test]
    fn test_mirror_group_lookup() {
        let mut groups = VertexGroups::new(4);
        let left = groups.add("hand.L");
        let right = groups.add("hand.R");
        let spine = groups.add("spine");
        assert_eq!(groups.mirror_of(left), right);
        assert_eq!(groups.mirror_of(right), left);
        assert_eq!(groups.mirror_of(spine), spine);
        assert_eq!(groups.active(), Some(spine));
    }

    #[test]
    fn test_add_with_wrong_size_rejected() {
        let mut groups = VertexGroups::new(3);
        let result = groups.add_with_weights("a", vec![0.0; 2]);
        assert!(matches!(result, Err(PaintError::GroupSizeMismatch { expected: 3, actual: 2 })));
    }

    #[test]
    fn test_normalize_keeps_active_and_locked() {
        let mut groups = VertexGroups::new(1);
        let a = groups.add_with_weights("a", vec![0.6]).unwrap();
        let b = groups.add_with_weights("b", vec![0.6]).unwrap();
        let c = groups.add_with_weights("c", vec![0.2]).unwrap();
        groups.set_locked(c, true).unwrap();

        groups.normalize_vertex(0, Some(a));
        assert!((groups.weight(a, 0) - 0.6).abs() < 1e-6);
        assert!((groups.weight(b, 0) - 0.2).abs() < 1e-6);
        assert!((groups.weight(c, 0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_scales_active_when_needed() {
        let mut groups = VertexGroups::new(1);
        let a = groups.add_with_weights("a", vec![1.0]).unwrap();
        let b = groups.add_with_weights("b", vec![0.0]).unwrap();
        let c = groups.add_with_weights("c", vec![0.5]).unwrap();
        groups.set_locked(c, true).unwrap();

        groups.normalize_vertex(0, Some(a));
        assert!((groups.weight(a, 0) - 0.5).abs() < 1e-6);
        assert_eq!(groups.weight(b, 0), 0.0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut groups = VertexGroups::new(2);
        let a = groups.add("a");
        let entry = groups.snapshot("Weight Paint");
        groups.set_weight(a, 1, 0.7);
        groups.restore(&entry);
        assert_eq!(groups.weight(a, 1), 0.0);
    }
}
