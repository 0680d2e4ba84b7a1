//! Extrinsic 4-RoSy and 4-PoSy helpers.
//!
//! An orientation is a unit tangent vector `q` that stands for the four
//! directions `±q, ±(n × q)`. A position is a lattice origin `o` that stands
//! for the grid `o + scale * (i q + j (n × q))`.

use nalgebra::{Vector2, Vector3};

const EPSILON: f64 = 1e-12;

/// Project `v` onto the tangent plane of `n`.
#[inline]
pub fn project_tangent(v: &Vector3<f64>, n: &Vector3<f64>) -> Vector3<f64> {
    v - n * n.dot(v)
}

/// Any unit vector orthogonal to `n`.
pub fn any_tangent(n: &Vector3<f64>) -> Vector3<f64> {
    let axis = if n.x.abs() > 0.9 {
        Vector3::y()
    } else {
        Vector3::x()
    };
    let t = n.cross(&axis);
    let norm = t.norm();
    if norm > EPSILON {
        t / norm
    } else {
        Vector3::x()
    }
}

/// Normalize a tangent vector, falling back to an arbitrary tangent of `n`.
pub fn normalize_tangent(v: &Vector3<f64>, n: &Vector3<f64>) -> Vector3<f64> {
    let t = project_tangent(v, n);
    let norm = t.norm();
    if norm > EPSILON {
        t / norm
    } else {
        any_tangent(n)
    }
}

/// Pick the representatives of two 4-RoSy orientations that agree best.
pub fn compat_orientation(
    q0: &Vector3<f64>,
    n0: &Vector3<f64>,
    q1: &Vector3<f64>,
    n1: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>) {
    let (i, j, sign) = best_orientation_pair(q0, n0, q1, n1);
    let a = [*q0, n0.cross(q0)];
    let b = [*q1, n1.cross(q1)];
    (a[i], b[j] * sign)
}

/// Rotation indices (in quarter turns) of the best-agreeing representatives.
pub fn compat_orientation_index(
    q0: &Vector3<f64>,
    n0: &Vector3<f64>,
    q1: &Vector3<f64>,
    n1: &Vector3<f64>,
) -> (i32, i32) {
    let (i, j, sign) = best_orientation_pair(q0, n0, q1, n1);
    let j = if sign < 0.0 { j + 2 } else { j };
    (i as i32, j as i32)
}

fn best_orientation_pair(
    q0: &Vector3<f64>,
    n0: &Vector3<f64>,
    q1: &Vector3<f64>,
    n1: &Vector3<f64>,
) -> (usize, usize, f64) {
    let a = [*q0, n0.cross(q0)];
    let b = [*q1, n1.cross(q1)];

    let mut best = f64::NEG_INFINITY;
    let mut best_i = 0;
    let mut best_j = 0;
    for (i, ai) in a.iter().enumerate() {
        for (j, bj) in b.iter().enumerate() {
            let score = ai.dot(bj).abs();
            if score > best {
                best = score;
                best_i = i;
                best_j = j;
            }
        }
    }

    let sign = if a[best_i].dot(&b[best_j]) < 0.0 {
        -1.0
    } else {
        1.0
    };
    (best_i, best_j, sign)
}

/// Point on the intersection of two tangent planes closest to the edge midpoint.
pub fn middle_point(
    p0: &Vector3<f64>,
    n0: &Vector3<f64>,
    p1: &Vector3<f64>,
    n1: &Vector3<f64>,
) -> Vector3<f64> {
    let n0p0 = n0.dot(p0);
    let n0p1 = n0.dot(p1);
    let n1p0 = n1.dot(p0);
    let n1p1 = n1.dot(p1);
    let n0n1 = n0.dot(n1);
    let denom = 1.0 / (1.0 - n0n1 * n0n1 + 1e-4);
    let lambda0 = 2.0 * (n0p1 - n0p0 - n0n1 * (n1p0 - n1p1)) * denom;
    let lambda1 = 2.0 * (n1p0 - n1p1 - n0n1 * (n0p1 - n0p0)) * denom;

    (p0 + p1) * 0.5 - (n0 * lambda0 + n1 * lambda1) * 0.25
}

/// Lattice point of `(o, q, n, scale)` nearest to `p`.
pub fn position_round(
    o: &Vector3<f64>,
    q: &Vector3<f64>,
    n: &Vector3<f64>,
    p: &Vector3<f64>,
    scale: f64,
) -> Vector3<f64> {
    let t = n.cross(q);
    let d = p - o;
    o + q * ((q.dot(&d) / scale).round() * scale) + t * ((t.dot(&d) / scale).round() * scale)
}

/// Integer lattice coordinates of the cell corner below `p`.
pub fn position_floor_index(
    o: &Vector3<f64>,
    q: &Vector3<f64>,
    n: &Vector3<f64>,
    p: &Vector3<f64>,
    scale: f64,
) -> Vector2<i32> {
    let t = n.cross(q);
    let d = p - o;
    Vector2::new(
        (q.dot(&d) / scale).floor() as i32,
        (t.dot(&d) / scale).floor() as i32,
    )
}

/// A vertex sample of a 4-PoSy field.
#[derive(Debug, Clone, Copy)]
pub struct LatticeSample {
    /// Surface position.
    pub p: Vector3<f64>,
    /// Unit normal.
    pub n: Vector3<f64>,
    /// Orientation representative.
    pub q: Vector3<f64>,
    /// Lattice origin.
    pub o: Vector3<f64>,
    /// Lattice spacing.
    pub scale: f64,
}

impl LatticeSample {
    fn lattice_point(&self, index: Vector2<i32>) -> Vector3<f64> {
        let t = self.n.cross(&self.q);
        self.o + (self.q * index.x as f64 + t * index.y as f64) * self.scale
    }
}

/// Integer coordinates of the closest lattice points of two samples around
/// their shared midpoint, each in its own lattice frame.
pub fn compat_position_index(a: &LatticeSample, b: &LatticeSample) -> (Vector2<i32>, Vector2<i32>) {
    let middle = middle_point(&a.p, &a.n, &b.p, &b.n);
    let base_a = position_floor_index(&a.o, &a.q, &a.n, &middle, a.scale);
    let base_b = position_floor_index(&b.o, &b.q, &b.n, &middle, b.scale);

    let mut best = f64::INFINITY;
    let mut best_pair = (base_a, base_b);
    for i in 0..4 {
        let ia = base_a + Vector2::new(i & 1, (i & 2) >> 1);
        let pa = a.lattice_point(ia);
        for j in 0..4 {
            let ib = base_b + Vector2::new(j & 1, (j & 2) >> 1);
            let cost = (pa - b.lattice_point(ib)).norm_squared();
            if cost < best {
                best = cost;
                best_pair = (ia, ib);
            }
        }
    }
    best_pair
}

/// World positions of the closest lattice points of two samples.
pub fn compat_position(a: &LatticeSample, b: &LatticeSample) -> (Vector3<f64>, Vector3<f64>) {
    let (ia, ib) = compat_position_index(a, b);
    (a.lattice_point(ia), b.lattice_point(ib))
}
