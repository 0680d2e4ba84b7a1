//! Position (lattice) field smoothing and singularity detection.

use std::collections::BTreeMap;

use nalgebra::{Vector2, Vector3};
use tracing::{debug, trace};

use super::engine::collect_vertices;
use super::hierarchy::{Hierarchy, Level};
use super::rosy::{
    compat_orientation, compat_position, compat_position_index, position_round, project_tangent,
    LatticeSample,
};

const SELF_WEIGHT: f64 = 1.0;

/// Smooth the lattice origins coarse to fine. Without `adaptive` every vertex
/// uses the global spacing instead of its own scale field entry.
pub(super) fn optimize(hierarchy: &mut Hierarchy, adaptive: bool, iterations: usize, parallel: bool) {
    let base = hierarchy.scale;
    let top = hierarchy.num_levels();
    for l in (0..top).rev() {
        if l + 1 < top {
            hierarchy.prolong_lattice(l);
        }
        let level = &mut hierarchy.levels[l];
        for _ in 0..iterations {
            let current: &Level = level;
            let next = collect_vertices(current.len(), parallel, |i| {
                smooth_vertex(current, i, adaptive, base)
            });
            level.lattice = next;
        }
        trace!(level = l, "smoothed position field");
    }
}

fn sample(level: &Level, i: usize, adaptive: bool, base: f64) -> LatticeSample {
    LatticeSample {
        p: level.positions[i],
        n: level.normals[i],
        q: level.orientation[i],
        o: level.lattice[i],
        scale: if adaptive { level.scale[i] } else { base },
    }
}

fn smooth_vertex(level: &Level, i: usize, adaptive: bool, base: f64) -> Vector3<f64> {
    let mut me = sample(level, i, adaptive, base);
    let mut weight_sum = SELF_WEIGHT;

    for link in &level.adjacency[i] {
        let other = sample(level, link.target, adaptive, base);
        let (a, b) = compat_position(&me, &other);
        let sum = (a * weight_sum + b * link.weight) / (weight_sum + link.weight);
        weight_sum += link.weight;
        me.o = me.p + project_tangent(&(sum - me.p), &me.n);
    }

    let weight = level.constraints.position_weight[i];
    if weight > 0.0 {
        let anchor = position_round(&level.constraints.position[i], &me.q, &me.n, &me.o, me.scale);
        me.o = me.o * (1.0 - weight) + anchor * weight;
    }

    position_round(&me.o, &me.q, &me.n, &me.p, me.scale)
}

/// Faces of the finest level around which the lattice offsets do not sum to
/// zero, mapped to the residual offset.
pub(super) fn singularities(hierarchy: &Hierarchy) -> BTreeMap<usize, Vector2<i32>> {
    let level = hierarchy.finest();
    let mut result = BTreeMap::new();
    for (f, face) in hierarchy.faces.iter().enumerate() {
        if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
            continue;
        }

        let mut samples = face.map(|v| sample(level, v, true, hierarchy.scale));
        let (q0, n0) = (samples[0].q, samples[0].n);
        for s in &mut samples[1..] {
            s.q = compat_orientation(&q0, &n0, &s.q, &s.n).1;
        }

        let mut index = Vector2::zeros();
        for k in 0..3 {
            let (a, b) = compat_position_index(&samples[k], &samples[(k + 1) % 3]);
            index += b - a;
        }
        if index != Vector2::zeros() {
            result.insert(f, index);
        }
    }
    debug!("{} position singularities", result.len());
    result
}
