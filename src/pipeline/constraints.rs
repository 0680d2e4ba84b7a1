//! Boundary constraints.

use crate::field::Hierarchy;
use crate::mesh::adjacency::endpoints;

/// Pin both endpoints of every open half-edge of the finest level.
///
/// All constraints on all levels are cleared first. Each half-edge without an
/// opposite sets, on both of its endpoints, the position constraint to the
/// endpoint itself and the direction constraint to the unit edge vector, with
/// weight 1 for both. A corner on several open edges keeps the direction of
/// the last one visited. Zero-length edges are skipped.
///
/// Returns the number of half-edges that produced a constraint. Propagation to
/// coarser levels is left to the caller.
pub fn derive_boundary_constraints(hierarchy: &mut Hierarchy) -> usize {
    hierarchy.clear_constraints();

    let Hierarchy {
        levels,
        faces,
        adjacency,
        ..
    } = hierarchy;
    let Some(finest) = levels.first_mut() else {
        return 0;
    };

    let mut count = 0;
    for e in 0..faces.len() * 3 {
        if adjacency.opposite(e).is_some() {
            continue;
        }
        let (u, v) = endpoints(faces, e);
        let edge = finest.positions[v] - finest.positions[u];
        let length = edge.norm();
        if length == 0.0 {
            continue;
        }
        let direction = edge / length;

        let constraints = &mut finest.constraints;
        for w in [u, v] {
            constraints.position[w] = finest.positions[w];
            constraints.direction[w] = direction;
            constraints.position_weight[w] = 1.0;
            constraints.direction_weight[w] = 1.0;
        }
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn strip() -> Hierarchy {
        // Two triangles sharing the edge 1-2
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
        ];
        let mut h = Hierarchy::with_seed(0);
        h.build(&vertices, vec![[0, 1, 2], [1, 3, 2]], 0.5);
        h
    }

    #[test]
    fn test_open_edges_pin_both_endpoints() {
        let mut h = strip();
        let count = derive_boundary_constraints(&mut h);
        assert_eq!(count, 4);

        let c = &h.finest().constraints;
        for v in 0..4 {
            assert_relative_eq!(c.position_weight[v], 1.0);
            assert_relative_eq!(c.direction_weight[v], 1.0);
            assert_relative_eq!(c.position[v], h.finest().positions[v]);
            assert_relative_eq!(c.direction[v].norm(), 1.0, epsilon = 1e-12);
        }
        // Vertex 4 is referenced by no face
        assert_relative_eq!(c.position_weight[4], 0.0);
    }

    #[test]
    fn test_last_open_edge_wins() {
        let mut h = strip();
        derive_boundary_constraints(&mut h);
        let c = &h.finest().constraints;

        // Vertex 0 sees 0->1 first and 2->0 last
        assert_relative_eq!(c.direction[0], -Vector3::y(), epsilon = 1e-12);
        // Vertex 1 sees 0->1 first and 1->3 last
        assert_relative_eq!(c.direction[1], Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_previous_constraints_are_cleared() {
        let mut h = strip();
        let top = h.num_levels() - 1;
        h.levels[top].constraints.direction_weight[0] = 0.5;
        h.finest_mut().constraints.position_weight[4] = 1.0;

        derive_boundary_constraints(&mut h);
        assert_relative_eq!(h.levels[top].constraints.direction_weight[0], 0.0);
        assert_relative_eq!(h.finest().constraints.position_weight[4], 0.0);
    }

    #[test]
    fn test_closed_mesh_has_no_constraints() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        let mut h = Hierarchy::with_seed(0);
        h.build(&vertices, vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]], 0.5);
        assert_eq!(derive_boundary_constraints(&mut h), 0);
        assert!(!h.finest().constraints.any());
    }
}
