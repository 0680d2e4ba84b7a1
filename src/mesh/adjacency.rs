//! Directed half-edge adjacency for indexed triangle meshes.
//!
//! Half-edge `e` of a triangle list is the edge of face `e / 3` that runs from
//! local corner `e % 3` to local corner `(e + 1) % 3`. Two half-edges are
//! opposite when they join the same vertices in reverse order.

use std::collections::HashMap;

/// Face that owns half-edge `e`.
#[inline]
pub fn face_of(e: usize) -> usize {
    e / 3
}

/// Local corner at which half-edge `e` starts.
#[inline]
pub fn local_corner(e: usize) -> usize {
    e % 3
}

/// Start and end vertex of half-edge `e`.
#[inline]
pub fn endpoints(faces: &[[usize; 3]], e: usize) -> (usize, usize) {
    let face = &faces[face_of(e)];
    let corner = local_corner(e);
    (face[corner], face[(corner + 1) % 3])
}

/// Opposite-half-edge table for a triangle list.
#[derive(Debug, Clone, Default)]
pub struct EdgeAdjacency {
    opposite: Vec<Option<usize>>,
}

impl EdgeAdjacency {
    /// Build the table by hashing directed endpoint pairs.
    ///
    /// Collapsed half-edges (both ends on the same vertex) never get an
    /// opposite. When a directed edge occurs more than once, as on
    /// non-manifold input, only the first occurrence is linked and the pairing
    /// stays symmetric.
    pub fn from_faces(faces: &[[usize; 3]]) -> Self {
        let num_halfedges = faces.len() * 3;

        // Map from directed edge (v0, v1) to the first half-edge running that way
        let mut edge_map: HashMap<(usize, usize), usize> = HashMap::with_capacity(num_halfedges);
        for e in 0..num_halfedges {
            edge_map.entry(endpoints(faces, e)).or_insert(e);
        }

        let mut opposite = vec![None; num_halfedges];
        for e in 0..num_halfedges {
            if opposite[e].is_some() {
                continue;
            }
            let (v0, v1) = endpoints(faces, e);
            if v0 == v1 || edge_map.get(&(v0, v1)) != Some(&e) {
                continue;
            }
            if let Some(&twin) = edge_map.get(&(v1, v0)) {
                if opposite[twin].is_none() {
                    opposite[e] = Some(twin);
                    opposite[twin] = Some(e);
                }
            }
        }

        Self { opposite }
    }

    /// Number of half-edges (three per face).
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.opposite.len()
    }

    /// The opposite half-edge, if any.
    #[inline]
    pub fn opposite(&self, e: usize) -> Option<usize> {
        self.opposite[e]
    }

    /// Whether half-edge `e` lies on an open boundary.
    #[inline]
    pub fn is_boundary(&self, e: usize) -> bool {
        self.opposite[e].is_none()
    }

    /// Iterate boundary half-edges in index order.
    pub fn boundary_halfedges(&self) -> impl Iterator<Item = usize> + '_ {
        self.opposite
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_none())
            .map(|(e, _)| e)
    }

    /// Whether every half-edge has an opposite.
    pub fn is_closed(&self) -> bool {
        self.opposite.iter().all(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<[usize; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let faces = tetrahedron();
        let adj = EdgeAdjacency::from_faces(&faces);

        assert_eq!(adj.num_halfedges(), 12);
        assert!(adj.is_closed());
        for e in 0..adj.num_halfedges() {
            let twin = adj.opposite(e).unwrap();
            assert_eq!(adj.opposite(twin), Some(e));
            let (a, b) = endpoints(&faces, e);
            assert_eq!(endpoints(&faces, twin), (b, a));
        }
    }

    #[test]
    fn test_single_triangle_all_boundary() {
        let faces = vec![[0, 1, 2]];
        let adj = EdgeAdjacency::from_faces(&faces);
        assert_eq!(adj.boundary_halfedges().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(endpoints(&faces, 2), (2, 0));
    }

    #[test]
    fn test_two_triangles_share_one_edge() {
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        let adj = EdgeAdjacency::from_faces(&faces);

        assert_eq!(adj.opposite(0), Some(3));
        assert_eq!(adj.opposite(3), Some(0));
        assert_eq!(adj.boundary_halfedges().count(), 4);
        assert_eq!(face_of(3), 1);
        assert_eq!(local_corner(3), 0);
    }

    #[test]
    fn test_collapsed_edge_is_boundary() {
        let faces = vec![[0, 0, 1]];
        let adj = EdgeAdjacency::from_faces(&faces);
        assert!(adj.is_boundary(0));
    }

    #[test]
    fn test_non_manifold_pairing_is_symmetric() {
        // Three faces on edge (0, 1): two run 0 -> 1, one runs 1 -> 0.
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let adj = EdgeAdjacency::from_faces(&faces);
        for e in 0..adj.num_halfedges() {
            if let Some(twin) = adj.opposite(e) {
                assert_eq!(adj.opposite(twin), Some(e));
            }
        }
        assert!(adj.is_boundary(6));
    }
}
