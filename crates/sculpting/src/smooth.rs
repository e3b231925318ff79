//! Neighbor-average primitives shared by the smooth brush, the filters and
//! autosmooth.
//!
//! Every function reads from the attribute store it is given and returns a
//! value; nothing here writes. A vertex without usable neighbors averages to
//! its own value.

use glam::{Vec3, Vec4};

use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology};

/// Mean position of the neighbors of `vert`.
pub fn neighbor_coords_average<T: Topology + ?Sized>(
    topology: &T,
    positions: &[Vec3],
    vert: u32,
    neighbors: &mut Neighbors,
) -> Vec3 {
    topology.neighbors(vert, false, neighbors);
    average(neighbors.as_slice(), |v| positions[v as usize]).unwrap_or(positions[vert as usize])
}

/// Mean neighbor position that keeps open borders in place: a boundary
/// vertex only averages its boundary neighbors.
pub fn neighbor_coords_average_interior<T: Topology + ?Sized>(
    topology: &T,
    positions: &[Vec3],
    vert: u32,
    neighbors: &mut Neighbors,
) -> Vec3 {
    topology.neighbors(vert, false, neighbors);
    let is_boundary = topology.is_boundary(vert);
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for &n in neighbors.as_slice() {
        if is_boundary && !topology.is_boundary(n) {
            continue;
        }
        sum += positions[n as usize];
        count += 1;
    }
    if count > 0 {
        sum / count as f32
    } else {
        positions[vert as usize]
    }
}

pub fn neighbor_mask_average<T: Topology + ?Sized>(
    topology: &T,
    masks: &[f32],
    vert: u32,
    neighbors: &mut Neighbors,
) -> f32 {
    topology.neighbors(vert, false, neighbors);
    average(neighbors.as_slice(), |v| masks[v as usize]).unwrap_or(masks[vert as usize])
}

pub fn neighbor_color_average<T: Topology + ?Sized>(
    topology: &T,
    colors: &[Vec4],
    vert: u32,
    neighbors: &mut Neighbors,
) -> Vec4 {
    topology.neighbors(vert, false, neighbors);
    average(neighbors.as_slice(), |v| colors[v as usize]).unwrap_or(colors[vert as usize])
}

fn average<V>(verts: &[u32], value: impl Fn(u32) -> V) -> Option<V>
where
    V: std::ops::Add<Output = V> + std::ops::Div<f32, Output = V>,
{
    let mut iter = verts.iter();
    let first = value(*iter.next()?);
    let sum = iter.fold(first, |acc, &v| acc + value(v));
    Some(sum / verts.len() as f32)
}

/// Move `vert` toward its neighbor average inside its tangent plane, by
/// `factor`. Returns the new position.
///
/// With `filter_face_set_borders`, only neighbors on a face set border
/// contribute. Corners (two or fewer neighbors) and sharp boundary corners
/// stay put.
pub fn relax_vertex<T: Topology + ?Sized>(
    topology: &T,
    attrs: &VertexAttributeStore,
    vert: u32,
    factor: f32,
    filter_face_set_borders: bool,
    neighbors: &mut Neighbors,
) -> Vec3 {
    let co = attrs.positions[vert as usize];
    topology.neighbors(vert, false, neighbors);
    if neighbors.len() <= 2 {
        return co;
    }

    let is_boundary = topology.is_boundary(vert);
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    let mut boundary_dirs = [Vec3::ZERO; 2];
    for &n in neighbors.as_slice() {
        if filter_face_set_borders && topology.vert_has_unique_face_set(n) {
            continue;
        }
        if is_boundary && !topology.is_boundary(n) {
            continue;
        }
        let p = attrs.positions[n as usize];
        if is_boundary && count < 2 {
            boundary_dirs[count] = (p - co).normalize_or_zero();
        }
        sum += p;
        count += 1;
    }
    if count == 0 {
        return co;
    }
    // A boundary vertex whose two border edges are not close to a straight
    // line is a corner of the outline
    if is_boundary && count == 2 && boundary_dirs[0].dot(boundary_dirs[1]) > -0.7 {
        return co;
    }

    let normal = attrs.normals[vert as usize];
    if normal == Vec3::ZERO {
        return co;
    }
    let target = sum / count as f32;
    let offset = target - co;
    let tangent = offset - normal * offset.dot(normal);
    co + tangent * factor
}

/// First surface-smooth pass for one vertex.
///
/// Returns `(displacement, laplacian)`: the displacement toward the
/// neighbor average, and how far the displaced point drifts from the blend
/// of the original and current positions. With `alpha = 1` the
/// displacement is zero and the drift is measured against the original
/// position.
pub fn surface_smooth_laplacian<T: Topology + ?Sized>(
    topology: &T,
    positions: &[Vec3],
    original: Vec3,
    vert: u32,
    alpha: f32,
    neighbors: &mut Neighbors,
) -> (Vec3, Vec3) {
    let co = positions[vert as usize];
    let average = neighbor_coords_average(topology, positions, vert, neighbors);
    let displacement = (average - co) * (1.0 - alpha);
    let moved = co + displacement;
    let laplacian = moved - (original * alpha + co * (1.0 - alpha));
    (displacement, laplacian)
}

/// Second surface-smooth pass: the correction to subtract from the
/// position of `vert`, mixing its own laplacian (weight `beta`) with the
/// mean laplacian of its neighbors.
pub fn surface_smooth_correction<T: Topology + ?Sized>(
    topology: &T,
    laplacians: &[Vec3],
    vert: u32,
    beta: f32,
    neighbors: &mut Neighbors,
) -> Vec3 {
    let own = laplacians[vert as usize];
    topology.neighbors(vert, false, neighbors);
    let around = average(neighbors.as_slice(), |v| laplacians[v as usize]).unwrap_or(own);
    own * beta + around * (1.0 - beta)
}

/// Per-vertex sharpen strength and detail direction.
///
/// The detail direction is the offset of each vertex from its neighbor
/// average. Factors are the lengths of those offsets normalized by the
/// largest one and eased with `1 - (1 - x)²`. `smooth_iterations` passes of
/// neighbor averaging are then applied to both.
pub fn sharpen_factors<T: Topology + ?Sized>(
    topology: &T,
    positions: &[Vec3],
    smooth_iterations: u32,
) -> (Vec<f32>, Vec<Vec3>) {
    let mut neighbors = Neighbors::new();
    let count = positions.len();
    let mut directions = Vec::with_capacity(count);
    let mut factors = Vec::with_capacity(count);
    for v in 0..count as u32 {
        if !topology.is_valid_vertex(v) {
            directions.push(Vec3::ZERO);
            factors.push(0.0);
            continue;
        }
        let average = neighbor_coords_average(topology, positions, v, &mut neighbors);
        let detail = positions[v as usize] - average;
        directions.push(detail);
        factors.push(detail.length());
    }

    let max = factors.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for factor in &mut factors {
            let x = *factor / max;
            *factor = 1.0 - (1.0 - x) * (1.0 - x);
        }
    }

    for _ in 0..smooth_iterations {
        let mut next_factors = factors.clone();
        let mut next_directions = directions.clone();
        for v in 0..count as u32 {
            if !topology.is_valid_vertex(v) {
                continue;
            }
            next_factors[v as usize] = neighbor_mask_average(topology, &factors, v, &mut neighbors);
            next_directions[v as usize] = average(neighbors.as_slice(), |n| directions[n as usize])
                .unwrap_or(directions[v as usize]);
        }
        factors = next_factors;
        directions = next_directions;
    }

    (factors, directions)
}

/// Offset of every vertex's neighbor average from its position, used to
/// push details outward.
pub fn detail_directions<T: Topology + ?Sized>(topology: &T, positions: &[Vec3]) -> Vec<Vec3> {
    let mut neighbors = Neighbors::new();
    (0..positions.len() as u32)
        .map(|v| {
            if topology.is_valid_vertex(v) {
                neighbor_coords_average(topology, positions, v, &mut neighbors) - positions[v as usize]
            } else {
                Vec3::ZERO
            }
        })
        .collect()
}
