//! Turn the solved fields into a quad-dominant mesh.
//!
//! 1. Endpoints of every edge whose lattice offset is zero snap to the same
//!    lattice point and are merged.
//! 2. Each merged cluster becomes one output vertex at the mean of its lattice
//!    origins.
//! 3. Triangles are mapped onto clusters; collapsed and duplicate ones vanish.
//! 4. Adjacent triangles are paired into quads, best corners first.
//! 5. Unpaired triangles are kept as quads with a repeated last index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::FRAC_PI_2;

use nalgebra::{Point3, Vector2, Vector3};
use tracing::debug;

use super::hierarchy::{Hierarchy, Level};
use super::rosy::{compat_orientation, compat_position_index, LatticeSample};
use super::CompactQuadMesh;
use crate::mesh::adjacency::endpoints;

/// Union-find over vertex indices. The root of a set is always its smallest
/// member.
#[derive(Debug, Clone)]
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut v: usize) -> usize {
        let mut root = v;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[v] != root {
            let next = self.parent[v];
            self.parent[v] = root;
            v = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        true
    }
}

fn sample(level: &Level, i: usize) -> LatticeSample {
    LatticeSample {
        p: level.positions[i],
        n: level.normals[i],
        q: level.orientation[i],
        o: level.lattice[i],
        scale: level.scale[i],
    }
}

/// Extract the quad mesh. Faces listed in `resolve` have their vertices merged
/// outright. Triangle pairs whose worst corner deviates from a right angle by
/// more than `tolerance` radians stay unpaired.
pub(super) fn extract(
    hierarchy: &Hierarchy,
    resolve: Option<&BTreeMap<usize, Vector2<i32>>>,
    tolerance: f64,
) -> CompactQuadMesh {
    let level = hierarchy.finest();
    let faces = &hierarchy.faces;
    let mut sets = DisjointSets::new(level.len());

    let mut merged = 0;
    for e in 0..hierarchy.adjacency.num_halfedges() {
        if hierarchy.adjacency.opposite(e).is_some_and(|twin| twin < e) {
            continue;
        }
        let (u, v) = endpoints(faces, e);
        if u == v {
            continue;
        }
        let a = sample(level, u);
        let mut b = sample(level, v);
        b.q = compat_orientation(&a.q, &a.n, &b.q, &b.n).1;
        let (ia, ib) = compat_position_index(&a, &b);
        if ia == ib && (a.o - b.o).norm() < 0.5 * a.scale.min(b.scale) && sets.union(u, v) {
            merged += 1;
        }
    }

    if let Some(singular) = resolve {
        for &f in singular.keys() {
            let [a, b, c] = faces[f];
            sets.union(a, b);
            sets.union(b, c);
        }
    }

    // Cluster ids in order of each cluster's smallest vertex
    let mut cluster_of_root = vec![usize::MAX; level.len()];
    let mut cluster = vec![0; level.len()];
    let mut sums: Vec<(Vector3<f64>, usize)> = Vec::new();
    for v in 0..level.len() {
        let root = sets.find(v);
        if cluster_of_root[root] == usize::MAX {
            cluster_of_root[root] = sums.len();
            sums.push((Vector3::zeros(), 0));
        }
        let c = cluster_of_root[root];
        cluster[v] = c;
        sums[c].0 += level.lattice[v];
        sums[c].1 += 1;
    }
    let positions: Vec<Vector3<f64>> = sums.iter().map(|(s, k)| s / *k as f64).collect();

    let mut seen = BTreeSet::new();
    let mut triangles = Vec::new();
    for face in faces {
        let tri = face.map(|v| cluster[v]);
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
            continue;
        }
        let mut key = tri;
        key.sort_unstable();
        if seen.insert(key) {
            triangles.push(tri);
        }
    }

    let quads = pair_triangles(&positions, &triangles, tolerance);
    debug!(
        "Merged {} edges into {} clusters, {} triangles -> {} faces",
        merged,
        positions.len(),
        triangles.len(),
        quads.len()
    );
    compact(&positions, quads)
}

/// Greedily pair triangles sharing an edge with opposite orientation. Returns
/// quads and leftover triangles (last index repeated) in triangle order.
fn pair_triangles(
    positions: &[Vector3<f64>],
    triangles: &[[usize; 3]],
    tolerance: f64,
) -> Vec<[usize; 4]> {
    let mut directed: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (t, tri) in triangles.iter().enumerate() {
        for k in 0..3 {
            directed.entry((tri[k], tri[(k + 1) % 3])).or_default().push(t);
        }
    }
    let manifold = |u: usize, v: usize| directed.get(&(u, v)).map_or(0, Vec::len) == 1;

    let mut candidates: Vec<(f64, usize, usize, [usize; 4])> = Vec::new();
    for (t, tri) in triangles.iter().enumerate() {
        for k in 0..3 {
            let (u, v, w) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
            if !manifold(u, v) || !manifold(v, u) {
                continue;
            }
            let Some(&p) = directed.get(&(v, u)).and_then(|list| list.first()) else {
                continue;
            };
            if p <= t {
                continue;
            }
            let Some(&x) = triangles[p].iter().find(|&&c| c != u && c != v) else {
                continue;
            };
            if x == w {
                continue;
            }
            let quad = [u, x, v, w];
            let score = worst_corner(positions, &quad);
            if folded(positions, &quad) || score > tolerance {
                continue;
            }
            candidates.push((score, t, p, quad));
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut partner: Vec<Option<(usize, [usize; 4])>> = vec![None; triangles.len()];
    for &(_, t, p, quad) in &candidates {
        if partner[t].is_none() && partner[p].is_none() {
            partner[t] = Some((p, quad));
            partner[p] = Some((t, quad));
        }
    }

    let mut faces = Vec::with_capacity(triangles.len());
    for (t, tri) in triangles.iter().enumerate() {
        match partner[t] {
            Some((p, quad)) if p > t => faces.push(quad),
            Some(_) => {}
            None => faces.push([tri[0], tri[1], tri[2], tri[2]]),
        }
    }
    faces
}

/// Largest deviation of a quad corner from a right angle. Infinite when an
/// edge has zero length.
fn worst_corner(positions: &[Vector3<f64>], quad: &[usize; 4]) -> f64 {
    let mut worst: f64 = 0.0;
    for k in 0..4 {
        let cur = positions[quad[k]];
        let prev = positions[quad[(k + 3) % 4]] - cur;
        let next = positions[quad[(k + 1) % 4]] - cur;
        let (lp, ln) = (prev.norm(), next.norm());
        if lp <= 0.0 || ln <= 0.0 {
            return f64::INFINITY;
        }
        let angle = (prev.dot(&next) / (lp * ln)).clamp(-1.0, 1.0).acos();
        worst = worst.max((angle - FRAC_PI_2).abs());
    }
    worst
}

/// Whether the two triangles `(u, v, w)` and `(v, u, x)` of a quad
/// `[u, x, v, w]` face away from each other.
fn folded(positions: &[Vector3<f64>], quad: &[usize; 4]) -> bool {
    let [u, x, v, w] = quad.map(|i| positions[i]);
    let n0 = (v - u).cross(&(w - u));
    let n1 = (u - v).cross(&(x - v));
    n0.dot(&n1) <= 0.0
}

/// Drop unreferenced vertices, numbering the rest by first reference.
fn compact(positions: &[Vector3<f64>], mut faces: Vec<[usize; 4]>) -> CompactQuadMesh {
    let mut remap = vec![usize::MAX; positions.len()];
    let mut kept: Vec<Point3<f64>> = Vec::new();
    for face in &mut faces {
        for index in face.iter_mut() {
            if remap[*index] == usize::MAX {
                remap[*index] = kept.len();
                kept.push(Point3::from(positions[*index]));
            }
            *index = remap[*index];
        }
    }
    CompactQuadMesh {
        positions: kept,
        faces,
    }
}
