//! Midpoint refinement of the input before field sampling.
//!
//! The fields are sampled at vertices, so the finest level needs edges that are
//! short compared to the lattice spacing. Each round splits every triangle into
//! four through its edge midpoints; positions are never smoothed, so the
//! surface is unchanged.

use std::collections::HashMap;

use nalgebra::Point3;

/// Refine until no edge is longer than `max_length` or the next round would
/// exceed `face_budget` faces. Returns the number of rounds performed.
pub fn refine_to_length(
    positions: &mut Vec<Point3<f64>>,
    faces: &mut Vec<[usize; 3]>,
    max_length: f64,
    face_budget: usize,
) -> usize {
    let mut rounds = 0;
    while max_length > 0.0
        && longest_edge(positions, faces) > max_length
        && faces.len().saturating_mul(4) <= face_budget
    {
        midpoint_subdivide_once(positions, faces);
        rounds += 1;
    }
    rounds
}

/// Length of the longest edge in the mesh.
pub fn longest_edge(positions: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
    faces
        .iter()
        .flat_map(|f| (0..3).map(move |i| (f[i], f[(i + 1) % 3])))
        .map(|(a, b)| (positions[b] - positions[a]).norm())
        .fold(0.0, f64::max)
}

/// Mean edge length, counting each half-edge once.
pub fn mean_edge_length(positions: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
    if faces.is_empty() {
        return 0.0;
    }
    let total: f64 = faces
        .iter()
        .flat_map(|f| (0..3).map(move |i| (f[i], f[(i + 1) % 3])))
        .map(|(a, b)| (positions[b] - positions[a]).norm())
        .sum();
    total / (faces.len() * 3) as f64
}

/// Split every triangle into four through its edge midpoints.
pub fn midpoint_subdivide_once(positions: &mut Vec<Point3<f64>>, faces: &mut Vec<[usize; 3]>) {
    // Canonical edge key (smaller index first) -> midpoint vertex
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::with_capacity(faces.len() * 3 / 2);
    let mut new_faces: Vec<[usize; 3]> = Vec::with_capacity(faces.len() * 4);

    for face in faces.iter() {
        let mut mids = [0usize; 3];
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];
            let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            mids[i] = *midpoints.entry(key).or_insert_with(|| {
                let mid = Point3::from((positions[v0].coords + positions[v1].coords) * 0.5);
                positions.push(mid);
                positions.len() - 1
            });
        }

        let [v0, v1, v2] = *face;
        let [e01, e12, e20] = mids;
        new_faces.push([v0, e01, e20]);
        new_faces.push([v1, e12, e01]);
        new_faces.push([v2, e20, e12]);
        new_faces.push([e01, e12, e20]);
    }

    *faces = new_faces;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_subdivide_once_counts() {
        let (mut vertices, mut faces) = two_triangles();
        midpoint_subdivide_once(&mut vertices, &mut faces);

        // 2 triangles -> 8 triangles, 4 original + 5 edge vertices
        assert_eq!(faces.len(), 8);
        assert_eq!(vertices.len(), 9);
    }

    #[test]
    fn test_midpoints_are_exact() {
        let (mut vertices, mut faces) = two_triangles();
        midpoint_subdivide_once(&mut vertices, &mut faces);
        // The first edge visited is (0, 1)
        assert_relative_eq!(vertices[4], Point3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_refine_halves_longest_edge() {
        let (mut vertices, mut faces) = two_triangles();
        let before = longest_edge(&vertices, &faces);
        let rounds = refine_to_length(&mut vertices, &mut faces, before * 0.3, usize::MAX);

        assert_eq!(rounds, 2);
        assert_relative_eq!(longest_edge(&vertices, &faces), before / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_refine_respects_budget() {
        let (mut vertices, mut faces) = two_triangles();
        let rounds = refine_to_length(&mut vertices, &mut faces, 1e-6, 32);
        assert_eq!(rounds, 2);
        assert_eq!(faces.len(), 32);
    }

    #[test]
    fn test_mean_edge_length() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mean = mean_edge_length(&vertices, &[[0, 1, 2]]);
        assert_relative_eq!(mean, (2.0 + 2f64.sqrt()) / 3.0, epsilon = 1e-12);
    }
}
