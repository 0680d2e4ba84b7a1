//! Slope estimation and the scale field.
//!
//! The slope of a vertex is how fast the surface normal turns per unit length
//! around it. Adaptive scaling shrinks the lattice where the slope is high and
//! then rescales the whole field so the expected quad count stays put.

use tracing::debug;

use super::engine::collect_vertices;
use super::hierarchy::Hierarchy;

const MIN_FACTOR: f64 = 0.25;
const MAX_FACTOR: f64 = 2.0;

/// Per finest-level vertex, the largest normal turn per unit length over its
/// neighbors.
pub(super) fn estimate_slope(hierarchy: &Hierarchy, parallel: bool) -> Vec<f64> {
    let level = hierarchy.finest();
    collect_vertices(level.len(), parallel, |i| {
        level.adjacency[i]
            .iter()
            .filter_map(|link| {
                let j = link.target;
                let length = (level.positions[j] - level.positions[i]).norm();
                if length > 0.0 {
                    let cos = level.normals[i].dot(&level.normals[j]).clamp(-1.0, 1.0);
                    Some(cos.acos() / length)
                } else {
                    None
                }
            })
            .fold(0.0, f64::max)
    })
}

/// Fill the scale field of every level. Without `adaptive`, or without a
/// slope estimate, every vertex gets the global spacing.
pub(super) fn optimize(hierarchy: &mut Hierarchy, slope: &[f64], adaptive: bool, iterations: usize) {
    let base = hierarchy.scale;
    let level = hierarchy.finest_mut();

    if !adaptive || slope.len() != level.len() {
        level.scale.fill(base);
    } else {
        let mut scale: Vec<f64> = slope
            .iter()
            .map(|&rho| (base / (1.0 + base * rho)).clamp(base * MIN_FACTOR, base * MAX_FACTOR))
            .collect();

        for _ in 0..iterations {
            scale = (0..level.len())
                .map(|i| {
                    let (sum, weight) = level.adjacency[i].iter().fold(
                        (scale[i], 1.0),
                        |(s, w), link| (s + scale[link.target] * link.weight, w + link.weight),
                    );
                    sum / weight
                })
                .collect();
        }

        // Keep the expected face count: sum(area / s^2) == total_area / base^2
        let total_area: f64 = level.areas.iter().sum();
        let density: f64 = level
            .areas
            .iter()
            .zip(&scale)
            .map(|(a, s)| a / (s * s))
            .sum();
        if density > 0.0 && total_area > 0.0 {
            let k = (density * base * base / total_area).sqrt();
            for s in &mut scale {
                *s *= k;
            }
        }

        let (lo, hi) = scale
            .iter()
            .fold((f64::INFINITY, 0.0f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        debug!("Adaptive scale in [{:.4}, {:.4}], base {:.4}", lo, hi, base);
        level.scale = scale;
    }

    hierarchy.propagate_scale();
}
