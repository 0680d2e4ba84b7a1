//! Orientation field smoothing and singularity detection.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use tracing::{debug, trace};

use super::engine::collect_vertices;
use super::hierarchy::{Hierarchy, Level};
use super::rosy::{compat_orientation, compat_orientation_index, normalize_tangent, project_tangent};
use crate::mesh::adjacency::endpoints;

// Keeps a vertex's previous value in its own average.
const SELF_WEIGHT: f64 = 1.0;

/// Smooth the orientation field coarse to fine. When `sharp` is set, vertices
/// on feature edges are snapped to the edge direction on the finest level.
pub(super) fn optimize(hierarchy: &mut Hierarchy, sharp: bool, iterations: usize, parallel: bool) {
    let features = if sharp {
        sharp_directions(hierarchy)
    } else {
        Vec::new()
    };

    let top = hierarchy.num_levels();
    for l in (0..top).rev() {
        if l + 1 < top {
            hierarchy.prolong_orientation(l);
        }
        let level = &mut hierarchy.levels[l];
        let features: &[Option<Vector3<f64>>] = if l == 0 { &features } else { &[] };
        for _ in 0..iterations {
            let current: &Level = level;
            let next = collect_vertices(current.len(), parallel, |i| {
                smooth_vertex(current, i, features.get(i).copied().flatten())
            });
            level.orientation = next;
        }
        trace!(level = l, "smoothed orientation field");
    }
}

fn smooth_vertex(level: &Level, i: usize, feature: Option<Vector3<f64>>) -> Vector3<f64> {
    let n_i = level.normals[i];
    let mut sum = level.orientation[i];
    let mut weight_sum = SELF_WEIGHT;

    for link in &level.adjacency[i] {
        let j = link.target;
        let (a, b) = compat_orientation(&sum, &n_i, &level.orientation[j], &level.normals[j]);
        sum = project_tangent(&(a * weight_sum + b * link.weight), &n_i);
        weight_sum += link.weight;
        let norm = sum.norm();
        if norm > 0.0 {
            sum /= norm;
        }
    }

    let (target, weight) = match feature {
        Some(dir) => (dir, 1.0),
        None => (
            level.constraints.direction[i],
            level.constraints.direction_weight[i],
        ),
    };
    if weight > 0.0 {
        let (a, b) = compat_orientation(&sum, &n_i, &target, &n_i);
        sum = a * (1.0 - weight) + b * weight;
    }

    normalize_tangent(&sum, &n_i)
}

/// Per finest-level vertex, the direction of a sharp edge through it.
fn sharp_directions(hierarchy: &Hierarchy) -> Vec<Option<Vector3<f64>>> {
    let finest = hierarchy.finest();
    let mut directions = vec![None; finest.len()];
    for e in (0..hierarchy.sharp.len()).filter(|&e| hierarchy.sharp[e]) {
        let (u, v) = endpoints(&hierarchy.faces, e);
        let d = finest.positions[v] - finest.positions[u];
        directions[u] = Some(d);
        directions[v] = Some(d);
    }
    let count = directions.iter().filter(|d| d.is_some()).count();
    debug!("{} vertices follow sharp edges", count);
    directions
}

/// Faces of the finest level around which the orientation field turns,
/// mapped to the turn in quarter rotations.
pub(super) fn singularities(hierarchy: &Hierarchy) -> BTreeMap<usize, u32> {
    let level = hierarchy.finest();
    let mut result = BTreeMap::new();
    for (f, face) in hierarchy.faces.iter().enumerate() {
        if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
            continue;
        }
        let mut index = 0;
        for k in 0..3 {
            let (i, j) = (face[k], face[(k + 1) % 3]);
            let (a, b) = compat_orientation_index(
                &level.orientation[i],
                &level.normals[i],
                &level.orientation[j],
                &level.normals[j],
            );
            index += b - a;
        }
        let index = index.rem_euclid(4);
        if index != 0 {
            result.insert(f, index as u32);
        }
    }
    debug!("{} orientation singularities", result.len());
    result
}
