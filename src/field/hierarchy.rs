//! Multi-resolution vertex graph carrying the orientation, lattice and scale
//! fields.
//!
//! Level 0 is the refined input surface. Each coarser level is produced by
//! greedily merging pairs of adjacent vertices with similar normals and
//! similar areas, so every coarse vertex has one or two children. Fields are
//! solved coarse to fine; constraints travel the other way.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::rosy::{compat_orientation, normalize_tangent, project_tangent};
use crate::mesh::EdgeAdjacency;

/// Weighted edge of a level's vertex graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// Neighbor vertex.
    pub target: usize,
    /// Coupling weight.
    pub weight: f64,
}

/// Per-vertex constraint fields of one level.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Constrained position.
    pub position: Vec<Vector3<f64>>,
    /// Constrained direction.
    pub direction: Vec<Vector3<f64>>,
    /// Confidence of the position constraint, 0 when unconstrained.
    pub position_weight: Vec<f64>,
    /// Confidence of the direction constraint, 0 when unconstrained.
    pub direction_weight: Vec<f64>,
}

impl Constraints {
    /// Unconstrained fields for `n` vertices.
    pub fn new(n: usize) -> Self {
        Self {
            position: vec![Vector3::zeros(); n],
            direction: vec![Vector3::zeros(); n],
            position_weight: vec![0.0; n],
            direction_weight: vec![0.0; n],
        }
    }

    /// Reset every vertex to unconstrained.
    pub fn clear(&mut self) {
        self.position.fill(Vector3::zeros());
        self.direction.fill(Vector3::zeros());
        self.position_weight.fill(0.0);
        self.direction_weight.fill(0.0);
    }

    /// Whether any vertex carries a constraint.
    pub fn any(&self) -> bool {
        self.position_weight.iter().any(|&w| w > 0.0)
            || self.direction_weight.iter().any(|&w| w > 0.0)
    }
}

/// One resolution level.
#[derive(Debug, Clone, Default)]
pub struct Level {
    /// Vertex positions.
    pub positions: Vec<Vector3<f64>>,
    /// Unit vertex normals.
    pub normals: Vec<Vector3<f64>>,
    /// Surface area represented by each vertex.
    pub areas: Vec<f64>,
    /// Vertex graph, links sorted by target.
    pub adjacency: Vec<Vec<Link>>,
    /// 4-RoSy orientation representative per vertex.
    pub orientation: Vec<Vector3<f64>>,
    /// 4-PoSy lattice origin per vertex.
    pub lattice: Vec<Vector3<f64>>,
    /// Lattice spacing per vertex.
    pub scale: Vec<f64>,
    /// Constraint fields.
    pub constraints: Constraints,
    /// Parent of each vertex in the next coarser level (empty on the coarsest).
    pub to_coarse: Vec<usize>,
    /// Children of each vertex in the next finer level (empty on level 0).
    pub to_fine: Vec<[Option<usize>; 2]>,
}

impl Level {
    fn with_geometry(
        positions: Vec<Vector3<f64>>,
        normals: Vec<Vector3<f64>>,
        areas: Vec<f64>,
        adjacency: Vec<Vec<Link>>,
        scale: f64,
    ) -> Self {
        let n = positions.len();
        Self {
            lattice: positions.clone(),
            positions,
            normals,
            areas,
            adjacency,
            orientation: vec![Vector3::zeros(); n],
            scale: vec![scale; n],
            constraints: Constraints::new(n),
            to_coarse: Vec::new(),
            to_fine: Vec::new(),
        }
    }

    /// Number of vertices on this level.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the level has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The multi-resolution structure shared by all field stages.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    /// Levels, finest first.
    pub levels: Vec<Level>,
    /// Triangles of the finest level.
    pub faces: Vec<[usize; 3]>,
    /// Opposite half-edge lookup for `faces`.
    pub adjacency: EdgeAdjacency,
    /// Per half-edge flag marking feature edges.
    pub sharp: Vec<bool>,
    /// Global target lattice spacing.
    pub scale: f64,
    /// Seed for the random field initialization.
    pub seed: u64,
}

impl Hierarchy {
    /// An empty hierarchy that remembers `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Build all levels from a refined triangle mesh.
    pub fn build(&mut self, positions: &[Point3<f64>], faces: Vec<[usize; 3]>, scale: f64) {
        let finest = finest_level(positions, &faces, scale);
        self.adjacency = EdgeAdjacency::from_faces(&faces);
        self.sharp = vec![false; faces.len() * 3];
        self.faces = faces;
        self.scale = scale;
        self.levels = vec![finest];

        while self.levels[self.levels.len() - 1].len() > 1 {
            let last = self.levels.len() - 1;
            let Some((coarse, to_coarse)) = coarsen(&self.levels[last], scale) else {
                break;
            };
            trace!(level = last + 1, vertices = coarse.len(), "coarsened hierarchy level");
            self.levels[last].to_coarse = to_coarse;
            self.levels.push(coarse);
        }
    }

    /// Number of levels.
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// The finest level.
    ///
    /// # Panics
    ///
    /// Panics if the hierarchy has not been built.
    #[inline]
    pub fn finest(&self) -> &Level {
        &self.levels[0]
    }

    /// Mutable access to the finest level.
    #[inline]
    pub fn finest_mut(&mut self) -> &mut Level {
        &mut self.levels[0]
    }

    /// Fill every level with seeded random orientations and reset lattice
    /// origins onto the vertices.
    pub fn randomize_fields(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        for level in &mut self.levels {
            for i in 0..level.len() {
                let v = Vector3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                level.orientation[i] = normalize_tangent(&v, &level.normals[i]);
                level.lattice[i] = level.positions[i];
            }
        }
    }

    /// Remove every constraint on every level.
    pub fn clear_constraints(&mut self) {
        for level in &mut self.levels {
            level.constraints.clear();
        }
    }

    /// Restrict finest-level constraints to all coarser levels.
    pub fn propagate_constraints(&mut self) {
        for l in 0..self.levels.len().saturating_sub(1) {
            let (fine, coarse) = self.levels.split_at_mut(l + 1);
            restrict_constraints(&fine[l], &mut coarse[0]);
        }
    }

    /// Restrict the finest scale field to all coarser levels.
    pub fn propagate_scale(&mut self) {
        for l in 0..self.levels.len().saturating_sub(1) {
            let (fine, coarse) = self.levels.split_at_mut(l + 1);
            let fine = &fine[l];
            let coarse = &mut coarse[0];
            for (c, children) in coarse.to_fine.iter().enumerate() {
                let (sum, count) = children
                    .iter()
                    .flatten()
                    .fold((0.0, 0usize), |(s, k), &i| (s + fine.scale[i], k + 1));
                if count > 0 {
                    coarse.scale[c] = sum / count as f64;
                }
            }
        }
    }

    /// Copy orientations from level `l + 1` down to level `l`.
    pub fn prolong_orientation(&mut self, l: usize) {
        let (fine, coarse) = self.levels.split_at_mut(l + 1);
        let fine = &mut fine[l];
        let coarse = &coarse[0];
        for i in 0..fine.len() {
            let q = coarse.orientation[fine.to_coarse[i]];
            fine.orientation[i] = normalize_tangent(&q, &fine.normals[i]);
        }
    }

    /// Copy lattice origins from level `l + 1` down to level `l`.
    pub fn prolong_lattice(&mut self, l: usize) {
        let (fine, coarse) = self.levels.split_at_mut(l + 1);
        let fine = &mut fine[l];
        let coarse = &coarse[0];
        for i in 0..fine.len() {
            let o = coarse.lattice[fine.to_coarse[i]];
            let p = fine.positions[i];
            fine.lattice[i] = p + project_tangent(&(o - p), &fine.normals[i]);
        }
    }
}

fn finest_level(positions: &[Point3<f64>], faces: &[[usize; 3]], scale: f64) -> Level {
    let n = positions.len();
    let mut normals = vec![Vector3::zeros(); n];
    let mut areas = vec![0.0; n];
    let mut neighbors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for face in faces {
        let [a, b, c] = *face;
        let cross = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
        let third = cross.norm() / 6.0;
        for &v in face {
            // Area-weighted (not normalized)
            normals[v] += cross;
            areas[v] += third;
        }
        for i in 0..3 {
            let (u, v) = (face[i], face[(i + 1) % 3]);
            if u != v {
                neighbors[u].insert(v);
                neighbors[v].insert(u);
            }
        }
    }

    for normal in &mut normals {
        let norm = normal.norm();
        *normal = if norm > 0.0 { *normal / norm } else { Vector3::z() };
    }

    let min_area = scale * scale * 1e-8;
    for area in &mut areas {
        *area = area.max(min_area);
    }

    let adjacency = neighbors
        .into_iter()
        .map(|set| {
            set.into_iter()
                .map(|target| Link {
                    target,
                    weight: 1.0,
                })
                .collect()
        })
        .collect();

    Level::with_geometry(
        positions.iter().map(|p| p.coords).collect(),
        normals,
        areas,
        adjacency,
        scale,
    )
}

/// Merge matched vertex pairs into a coarser level. Returns `None` when no pair
/// can be merged.
fn coarsen(fine: &Level, scale: f64) -> Option<(Level, Vec<usize>)> {
    let n = fine.len();

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for i in 0..n {
        for link in &fine.adjacency[i] {
            let j = link.target;
            if j <= i {
                continue;
            }
            let dp = fine.normals[i].dot(&fine.normals[j]);
            if dp <= 0.0 {
                continue;
            }
            let (ai, aj) = (fine.areas[i], fine.areas[j]);
            candidates.push((dp * ai.min(aj) / ai.max(aj), i, j));
        }
    }
    candidates.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    let mut to_coarse = vec![usize::MAX; n];
    let mut to_fine: Vec<[Option<usize>; 2]> = Vec::with_capacity(n / 2 + 1);
    for &(_, i, j) in &candidates {
        if to_coarse[i] != usize::MAX || to_coarse[j] != usize::MAX {
            continue;
        }
        to_coarse[i] = to_fine.len();
        to_coarse[j] = to_fine.len();
        to_fine.push([Some(i), Some(j)]);
    }
    if to_fine.is_empty() {
        return None;
    }
    for i in 0..n {
        if to_coarse[i] == usize::MAX {
            to_coarse[i] = to_fine.len();
            to_fine.push([Some(i), None]);
        }
    }

    let m = to_fine.len();
    let mut positions = Vec::with_capacity(m);
    let mut normals = Vec::with_capacity(m);
    let mut areas = Vec::with_capacity(m);
    for children in &to_fine {
        let mut area = 0.0;
        let mut position = Vector3::zeros();
        let mut normal = Vector3::zeros();
        for &i in children.iter().flatten() {
            area += fine.areas[i];
            position += fine.positions[i] * fine.areas[i];
            normal += fine.normals[i] * fine.areas[i];
        }
        let norm = normal.norm();
        let first = children[0].unwrap_or_default();
        normals.push(if norm > 0.0 { normal / norm } else { fine.normals[first] });
        positions.push(position / area);
        areas.push(area);
    }

    let mut adjacency = Vec::with_capacity(m);
    for children in &to_fine {
        let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
        let parent = to_coarse[children[0].unwrap_or_default()];
        for &i in children.iter().flatten() {
            for link in &fine.adjacency[i] {
                let target = to_coarse[link.target];
                if target != parent {
                    *weights.entry(target).or_insert(0.0) += link.weight;
                }
            }
        }
        adjacency.push(
            weights
                .into_iter()
                .map(|(target, weight)| Link { target, weight })
                .collect(),
        );
    }

    let mut coarse = Level::with_geometry(positions, normals, areas, adjacency, scale);
    coarse.to_fine = to_fine;
    Some((coarse, to_coarse))
}

fn restrict_constraints(fine: &Level, coarse: &mut Level) {
    let fc = &fine.constraints;
    for (c, children) in coarse.to_fine.iter().enumerate() {
        let mut direction: Option<(Vector3<f64>, Vector3<f64>, f64)> = None;
        let mut position_sum = Vector3::zeros();
        let mut position_weight_sum = 0.0;
        let mut position_weight: f64 = 0.0;

        for &i in children.iter().flatten() {
            let dw = fc.direction_weight[i];
            if dw > 0.0 {
                let dir = fc.direction[i];
                let n = fine.normals[i];
                direction = Some(match direction {
                    None => (dir * dw, n, dw),
                    Some((acc, acc_n, acc_w)) => {
                        let (a, b) = compat_orientation(&acc, &acc_n, &dir, &n);
                        (a + b * dw, acc_n, acc_w.max(dw))
                    }
                });
            }

            let pw = fc.position_weight[i];
            if pw > 0.0 {
                position_sum += fc.position[i] * pw;
                position_weight_sum += pw;
                position_weight = position_weight.max(pw);
            }
        }

        let cc = &mut coarse.constraints;
        match direction {
            Some((dir, _, weight)) => {
                cc.direction[c] = normalize_tangent(&dir, &coarse.normals[c]);
                cc.direction_weight[c] = weight;
            }
            None => {
                cc.direction[c] = Vector3::zeros();
                cc.direction_weight[c] = 0.0;
            }
        }
        if position_weight_sum > 0.0 {
            cc.position[c] = position_sum / position_weight_sum;
            cc.position_weight[c] = position_weight;
        } else {
            cc.position[c] = Vector3::zeros();
            cc.position_weight[c] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
        let mut faces = Vec::with_capacity(n * n * 2);
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                faces.push([v00, v10, v11]);
                faces.push([v00, v11, v01]);
            }
        }
        (vertices, faces)
    }

    fn built(n: usize) -> Hierarchy {
        let (vertices, faces) = grid(n);
        let mut h = Hierarchy::with_seed(7);
        h.build(&vertices, faces, 1.0);
        h
    }

    #[test]
    fn test_levels_shrink_to_single_vertex() {
        let h = built(4);
        assert!(h.num_levels() > 2);
        assert_eq!(h.levels.last().unwrap().len(), 1);
        for pair in h.levels.windows(2) {
            assert!(pair[1].len() < pair[0].len());
        }
    }

    #[test]
    fn test_parent_child_maps_agree() {
        let h = built(4);
        for l in 0..h.num_levels() - 1 {
            let fine = &h.levels[l];
            let coarse = &h.levels[l + 1];
            assert_eq!(fine.to_coarse.len(), fine.len());
            for (i, &c) in fine.to_coarse.iter().enumerate() {
                assert!(coarse.to_fine[c].contains(&Some(i)));
            }
        }
    }

    #[test]
    fn test_area_is_conserved() {
        let h = built(3);
        let total: f64 = h.finest().areas.iter().sum();
        assert_relative_eq!(total, 9.0, epsilon = 1e-9);
        for level in &h.levels {
            let level_total: f64 = level.areas.iter().sum();
            assert_relative_eq!(level_total, total, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_randomize_is_seeded() {
        let mut a = built(3);
        let mut b = built(3);
        a.randomize_fields();
        b.randomize_fields();
        assert_eq!(a.finest().orientation, b.finest().orientation);

        for (q, n) in a.finest().orientation.iter().zip(&a.finest().normals) {
            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
            assert!(q.dot(n).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constraints_reach_coarsest_level() {
        let mut h = built(3);
        let finest = h.finest_mut();
        finest.constraints.direction[0] = Vector3::x();
        finest.constraints.direction_weight[0] = 1.0;
        finest.constraints.position[0] = finest.positions[0];
        finest.constraints.position_weight[0] = 1.0;

        h.propagate_constraints();

        let coarsest = h.levels.last().unwrap();
        assert_relative_eq!(coarsest.constraints.direction_weight[0], 1.0);
        assert_relative_eq!(coarsest.constraints.position_weight[0], 1.0);
        assert_relative_eq!(coarsest.constraints.direction[0], Vector3::x(), epsilon = 1e-12);

        h.clear_constraints();
        assert!(h.levels.iter().all(|level| !level.constraints.any()));
    }

    #[test]
    fn test_prolong_lattice_stays_on_tangent_plane() {
        let mut h = built(2);
        let top = h.num_levels() - 1;
        h.levels[top].lattice[0] = Vector3::new(0.3, 0.4, 5.0);
        for l in (0..top).rev() {
            h.prolong_lattice(l);
        }
        for o in &h.finest().lattice {
            assert_relative_eq!(o.z, 0.0, epsilon = 1e-12);
        }
    }
}
