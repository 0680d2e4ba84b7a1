//! The bundled [`FieldEngine`] implementation.

use nalgebra::Point3;
use rayon::prelude::*;
use tracing::debug;

use super::subdivide::{mean_edge_length, refine_to_length};
use super::{index_map, orientation, position, scale};
use super::{FieldEngine, FieldState, Hierarchy};
use crate::error::{RemeshError, Result};
use crate::mesh::adjacency::endpoints;
use crate::mesh::CompactMesh;
use crate::pipeline::Stage;

/// Options for [`CrossFieldEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Smoothing sweeps per level for the orientation field.
    pub orientation_iterations: usize,

    /// Smoothing sweeps per level for the position field.
    pub position_iterations: usize,

    /// Smoothing sweeps for the adaptive scale field.
    pub scale_iterations: usize,

    /// Refinement stops before the finest level would exceed this many faces.
    pub face_budget: usize,

    /// Dihedral angle (radians) above which an edge counts as sharp.
    pub sharp_angle: f64,

    /// Largest corner deviation from a right angle (radians) accepted when
    /// pairing two triangles into a quad.
    pub quad_tolerance: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            orientation_iterations: 20,
            position_iterations: 20,
            scale_iterations: 10,
            face_budget: 1 << 20,
            sharp_angle: std::f64::consts::FRAC_PI_3,
            quad_tolerance: 50f64.to_radians(),
            parallel: true,
        }
    }
}

impl EngineOptions {
    /// Set the number of smoothing sweeps for both orientation and position.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.orientation_iterations = iterations;
        self.position_iterations = iterations;
        self
    }

    /// Set the refinement face budget.
    pub fn with_face_budget(mut self, budget: usize) -> Self {
        self.face_budget = budget;
        self
    }

    /// Set the sharp-edge dihedral threshold in radians.
    pub fn with_sharp_angle(mut self, angle: f64) -> Self {
        self.sharp_angle = angle;
        self
    }

    /// Set the quad corner tolerance in radians.
    pub fn with_quad_tolerance(mut self, tolerance: f64) -> Self {
        self.quad_tolerance = tolerance;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Instant-Meshes-style cross-field engine.
#[derive(Debug, Clone, Default)]
pub struct CrossFieldEngine {
    /// Solver options.
    pub options: EngineOptions,
}

impl CrossFieldEngine {
    /// Create an engine with the given options.
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }
}

/// Evaluate `f` for every vertex index, in parallel when requested. The
/// result is in index order either way.
pub(super) fn collect_vertices<T, F>(n: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..n).into_par_iter().map(f).collect()
    } else {
        (0..n).map(f).collect()
    }
}

impl FieldEngine for CrossFieldEngine {
    fn initialize(
        &self,
        state: &mut FieldState,
        mesh: &CompactMesh,
        target_faces: usize,
    ) -> Result<()> {
        if target_faces == 0 {
            return Err(RemeshError::invalid_param(
                "target_faces",
                target_faces,
                "must be positive",
            ));
        }

        let area = surface_area(&mesh.positions, &mesh.faces);
        if !(area > 0.0 && area.is_finite()) {
            return Err(RemeshError::engine(
                Stage::Initialized,
                format!("surface area is {area}"),
            ));
        }
        let scale = (area / target_faces as f64).sqrt();

        let mut positions = mesh.positions.clone();
        let mut faces = mesh.faces.clone();
        let max_length = (0.5 * scale).min(2.0 * mean_edge_length(&positions, &faces));
        let rounds = refine_to_length(&mut positions, &mut faces, max_length, self.options.face_budget);

        state.hierarchy.build(&positions, faces, scale);
        if state.flags.preserve_sharp {
            mark_sharp_edges(&mut state.hierarchy, self.options.sharp_angle);
        }
        state.hierarchy.randomize_fields();

        debug!(
            "Initialized hierarchy: scale {:.4}, {} refinement rounds, {} vertices, {} levels",
            scale,
            rounds,
            state.hierarchy.finest().len(),
            state.hierarchy.num_levels()
        );
        Ok(())
    }

    fn propagate_constraints(&self, hierarchy: &mut Hierarchy) -> Result<()> {
        hierarchy.propagate_constraints();
        Ok(())
    }

    fn optimize_orientations(&self, state: &mut FieldState) -> Result<()> {
        orientation::optimize(
            &mut state.hierarchy,
            state.flags.preserve_sharp,
            self.options.orientation_iterations,
            self.options.parallel,
        );
        Ok(())
    }

    fn compute_orientation_singularities(&self, state: &mut FieldState) -> Result<()> {
        state.orientation_singularities = orientation::singularities(&state.hierarchy);
        Ok(())
    }

    fn estimate_slope(&self, state: &mut FieldState) -> Result<()> {
        state.slope = scale::estimate_slope(&state.hierarchy, self.options.parallel);
        Ok(())
    }

    fn optimize_scale(&self, state: &mut FieldState, adaptive: bool) -> Result<()> {
        scale::optimize(
            &mut state.hierarchy,
            &state.slope,
            adaptive,
            self.options.scale_iterations,
        );
        Ok(())
    }

    fn optimize_positions(&self, state: &mut FieldState, adaptive: bool) -> Result<()> {
        position::optimize(
            &mut state.hierarchy,
            adaptive,
            self.options.position_iterations,
            self.options.parallel,
        );
        Ok(())
    }

    fn compute_position_singularities(&self, state: &mut FieldState) -> Result<()> {
        state.position_singularities = position::singularities(&state.hierarchy);
        Ok(())
    }

    fn compute_index_map(&self, state: &mut FieldState) -> Result<()> {
        let tolerance = if state.flags.aggressive_sat {
            std::f64::consts::PI
        } else {
            self.options.quad_tolerance
        };
        let resolve = state.flags.minimum_cost_flow.then_some(&state.position_singularities);
        state.quads = index_map::extract(&state.hierarchy, resolve, tolerance);
        debug!(
            "Index map: {} vertices, {} faces",
            state.quads.positions.len(),
            state.quads.faces.len()
        );
        Ok(())
    }
}

fn surface_area(positions: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
    faces
        .iter()
        .map(|&[a, b, c]| {
            0.5 * (positions[b] - positions[a])
                .cross(&(positions[c] - positions[a]))
                .norm()
        })
        .sum()
}

/// Flag half-edges whose adjacent face normals differ by more than `angle`.
fn mark_sharp_edges(hierarchy: &mut Hierarchy, angle: f64) {
    let positions = &hierarchy.levels[0].positions;
    let normals: Vec<_> = hierarchy
        .faces
        .iter()
        .map(|&[a, b, c]| {
            let n = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
            let norm = n.norm();
            if norm > 0.0 {
                n / norm
            } else {
                n
            }
        })
        .collect();

    let threshold = angle.cos();
    let mut count = 0;
    for e in 0..hierarchy.adjacency.num_halfedges() {
        let Some(twin) = hierarchy.adjacency.opposite(e) else {
            continue;
        };
        let (n0, n1) = (normals[e / 3], normals[twin / 3]);
        if n0.norm_squared() > 0.0 && n1.norm_squared() > 0.0 && n0.dot(&n1) < threshold {
            let (u, v) = endpoints(&hierarchy.faces, e);
            if u != v {
                hierarchy.sharp[e] = true;
                count += 1;
            }
        }
    }
    debug!("Marked {} sharp half-edges", count);
}
