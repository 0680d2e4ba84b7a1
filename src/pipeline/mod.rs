//! The remeshing pipeline.
//!
//! [`Pipeline`] drives a [`FieldEngine`] through a fixed sequence of stages:
//!
//! | Stage | Runs when |
//! |-------|-----------|
//! | [`Stage::Configured`] | always |
//! | [`Stage::Ingested`] | always |
//! | [`Stage::Initialized`] | always |
//! | [`Stage::Constrained`] | `preserve_boundary` |
//! | [`Stage::OrientationOptimized`] | always |
//! | [`Stage::OrientationSingularities`] | always |
//! | [`Stage::SlopeEstimated`] | `adaptive_scale` |
//! | [`Stage::ScaleOptimized`] | always |
//! | [`Stage::PositionOptimizationReady`] | always, pins adaptive scale on |
//! | [`Stage::PositionOptimized`] | always |
//! | [`Stage::PositionSingularities`] | always |
//! | [`Stage::IndexMapped`] | always |
//!
//! Each step method checks the transition and returns
//! [`RemeshError::InvalidState`] when called out of order. Most callers only
//! need [`quad_remesh`] or [`quad_remesh_arrays`], which run every stage.
//!
//! # Example
//!
//! ```
//! use quadflow::pipeline::{quad_remesh, RemeshOptions};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let quads = quad_remesh(&vertices, &faces, &RemeshOptions::new(50)).unwrap();
//! assert_eq!(quads.faces().len(), quads.num_faces() * 4);
//! ```

mod constraints;
mod extract;

pub use constraints::derive_boundary_constraints;
pub use extract::{extract, QuadMesh};

use std::fmt;

use nalgebra::Point3;
use tracing::{debug, info};

use crate::error::{RemeshError, Result};
use crate::field::{CrossFieldEngine, FieldEngine, FieldFlags, FieldState};
use crate::mesh::CompactMesh;
use crate::progress::Progress;

/// A step of the remeshing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Flags and seed applied.
    Configured,
    /// Input deduplicated and normalized.
    Ingested,
    /// Hierarchy built for the target face count.
    Initialized,
    /// Boundary constraints derived and propagated.
    Constrained,
    /// Orientation field solved.
    OrientationOptimized,
    /// Orientation singularities located.
    OrientationSingularities,
    /// Slope hints estimated for adaptive scaling.
    SlopeEstimated,
    /// Scale field solved.
    ScaleOptimized,
    /// Adaptive scale pinned on for the position solve.
    PositionOptimizationReady,
    /// Position field solved.
    PositionOptimized,
    /// Position singularities located.
    PositionSingularities,
    /// Quad mesh extracted in canonical space.
    IndexMapped,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 12] = [
        Stage::Configured,
        Stage::Ingested,
        Stage::Initialized,
        Stage::Constrained,
        Stage::OrientationOptimized,
        Stage::OrientationSingularities,
        Stage::SlopeEstimated,
        Stage::ScaleOptimized,
        Stage::PositionOptimizationReady,
        Stage::PositionOptimized,
        Stage::PositionSingularities,
        Stage::IndexMapped,
    ];

    /// Zero-based position in [`Stage::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Configured => "configuration",
            Stage::Ingested => "ingestion",
            Stage::Initialized => "initialization",
            Stage::Constrained => "boundary constraints",
            Stage::OrientationOptimized => "orientation optimization",
            Stage::OrientationSingularities => "orientation singularities",
            Stage::SlopeEstimated => "slope estimation",
            Stage::ScaleOptimized => "scale optimization",
            Stage::PositionOptimizationReady => "adaptive scale pin",
            Stage::PositionOptimized => "position optimization",
            Stage::PositionSingularities => "position singularities",
            Stage::IndexMapped => "index map",
        }
    }

    /// Stages this one may directly follow. `Configured` follows nothing.
    fn predecessors(self) -> &'static [Stage] {
        match self {
            Stage::Configured => &[],
            Stage::Ingested => &[Stage::Configured],
            Stage::Initialized => &[Stage::Ingested],
            Stage::Constrained => &[Stage::Initialized],
            Stage::OrientationOptimized => &[Stage::Initialized, Stage::Constrained],
            Stage::OrientationSingularities => &[Stage::OrientationOptimized],
            Stage::SlopeEstimated => &[Stage::OrientationSingularities],
            Stage::ScaleOptimized => &[Stage::OrientationSingularities, Stage::SlopeEstimated],
            Stage::PositionOptimizationReady => &[Stage::ScaleOptimized],
            Stage::PositionOptimized => &[Stage::PositionOptimizationReady],
            Stage::PositionSingularities => &[Stage::PositionOptimized],
            Stage::IndexMapped => &[Stage::PositionSingularities],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for a remeshing run.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RemeshOptions {
    /// Approximate number of output faces. Must be positive.
    pub target_faces: i64,

    /// Seed for the random field initialization (default: 0).
    pub seed: u64,

    /// Align quads with sharp creases.
    pub preserve_sharp: bool,

    /// Keep open boundaries in place.
    pub preserve_boundary: bool,

    /// Use smaller quads where the surface bends.
    pub adaptive_scale: bool,

    /// Accept lower-quality quads when pairing triangles.
    pub aggressive_sat: bool,

    /// Resolve position singularities before extraction.
    pub minimum_cost_flow: bool,

    /// Optional per-stage progress callback.
    pub progress: Option<Progress>,
}

impl RemeshOptions {
    /// Options for roughly `target_faces` output faces, everything else off.
    pub fn new(target_faces: i64) -> Self {
        Self {
            target_faces,
            seed: 0,
            preserve_sharp: false,
            preserve_boundary: false,
            adaptive_scale: false,
            aggressive_sat: false,
            minimum_cost_flow: false,
            progress: None,
        }
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set whether sharp features are preserved.
    pub fn with_preserve_sharp(mut self, preserve: bool) -> Self {
        self.preserve_sharp = preserve;
        self
    }

    /// Set whether open boundaries are preserved.
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set whether the lattice spacing adapts to curvature.
    pub fn with_adaptive_scale(mut self, adaptive: bool) -> Self {
        self.adaptive_scale = adaptive;
        self
    }

    /// Set whether quad pairing is aggressive.
    pub fn with_aggressive_sat(mut self, aggressive: bool) -> Self {
        self.aggressive_sat = aggressive;
        self
    }

    /// Set whether position singularities are resolved.
    pub fn with_minimum_cost_flow(mut self, enabled: bool) -> Self {
        self.minimum_cost_flow = enabled;
        self
    }

    /// Set a progress callback.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The engine switches carried by these options.
    pub fn flags(&self) -> FieldFlags {
        FieldFlags {
            preserve_sharp: self.preserve_sharp,
            preserve_boundary: self.preserve_boundary,
            adaptive_scale: self.adaptive_scale,
            aggressive_sat: self.aggressive_sat,
            minimum_cost_flow: self.minimum_cost_flow,
        }
    }

    /// The target face count as an unsigned value.
    ///
    /// # Errors
    ///
    /// Returns [`RemeshError::InvalidParameter`] unless `target_faces > 0`.
    pub fn validated_target(&self) -> Result<usize> {
        if self.target_faces <= 0 {
            return Err(RemeshError::invalid_param(
                "target_faces",
                self.target_faces,
                "must be positive",
            ));
        }
        usize::try_from(self.target_faces).map_err(|_| {
            RemeshError::invalid_param("target_faces", self.target_faces, "too large for this platform")
        })
    }
}

/// A row-major view of a 2-D array: `data.len() / columns` rows.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a, T> {
    /// Row-major elements.
    pub data: &'a [T],
    /// Number of columns per row.
    pub columns: usize,
}

impl<'a, T> ArrayView<'a, T> {
    /// View `data` as rows of `columns` elements.
    pub fn new(data: &'a [T], columns: usize) -> Self {
        Self { data, columns }
    }

    /// Number of complete rows.
    pub fn rows(&self) -> usize {
        if self.columns == 0 {
            0
        } else {
            self.data.len() / self.columns
        }
    }

    fn check_shape(&self, array: &'static str, expected: usize) -> Result<()> {
        if self.columns != expected {
            return Err(RemeshError::InputShape {
                array,
                expected,
                columns: self.columns,
            });
        }
        if self.data.len() % expected != 0 {
            return Err(RemeshError::RaggedInput {
                array,
                len: self.data.len(),
                columns: expected,
            });
        }
        Ok(())
    }
}

/// Stateful driver for one remeshing run.
pub struct Pipeline<'a, E: FieldEngine> {
    engine: &'a E,
    options: &'a RemeshOptions,
    target_faces: usize,
    state: FieldState,
    mesh: Option<CompactMesh>,
    input_faces: usize,
    history: Vec<Stage>,
}

impl<'a, E: FieldEngine> Pipeline<'a, E> {
    /// Validate `options` and apply flags and seed.
    ///
    /// # Errors
    ///
    /// Returns [`RemeshError::InvalidParameter`] for a non-positive target.
    pub fn new(engine: &'a E, options: &'a RemeshOptions) -> Result<Self> {
        let target_faces = options.validated_target()?;
        let mut pipeline = Self {
            engine,
            options,
            target_faces,
            state: FieldState::new(options.flags(), options.seed),
            mesh: None,
            input_faces: 0,
            history: Vec::with_capacity(Stage::ALL.len()),
        };
        pipeline.advance(Stage::Configured)?;
        Ok(pipeline)
    }

    /// The stage most recently completed.
    pub fn stage(&self) -> Option<Stage> {
        self.history.last().copied()
    }

    /// Every stage completed so far, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// The run's field state.
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    fn advance(&mut self, next: Stage) -> Result<()> {
        self.check_next(next)?;
        self.history.push(next);
        debug!("Pipeline stage: {}", next);
        if let Some(progress) = &self.options.progress {
            progress.report(next);
        }
        Ok(())
    }

    fn check_next(&self, next: Stage) -> Result<()> {
        let allowed = match self.stage() {
            None => next == Stage::Configured,
            Some(current) => next.predecessors().contains(&current),
        };
        if allowed {
            Ok(())
        } else {
            Err(RemeshError::InvalidState(format!(
                "cannot enter {} after {}",
                next,
                self.stage().map_or("nothing", Stage::name)
            )))
        }
    }

    /// Deduplicate the input and move it into canonical space.
    ///
    /// # Errors
    ///
    /// Returns an input error for empty input or out-of-range indices.
    pub fn ingest(&mut self, vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<()> {
        self.check_next(Stage::Ingested)?;
        let mut mesh = CompactMesh::from_triangles(vertices, faces)?;
        self.state.normalization = self.engine.normalize(&mut mesh);
        debug!(
            "Ingested {} of {} vertices, {} faces",
            mesh.num_vertices(),
            vertices.len(),
            mesh.num_faces()
        );
        self.input_faces = mesh.num_faces();
        self.mesh = Some(mesh);
        self.advance(Stage::Ingested)
    }

    /// Build the hierarchy for the target face count.
    pub fn initialize(&mut self) -> Result<()> {
        self.check_next(Stage::Initialized)?;
        let mesh = self
            .mesh
            .take()
            .ok_or_else(|| RemeshError::InvalidState("no ingested mesh".into()))?;
        self.engine.initialize(&mut self.state, &mesh, self.target_faces)?;
        self.advance(Stage::Initialized)
    }

    /// Derive boundary constraints and propagate them through the hierarchy.
    pub fn apply_boundary_constraints(&mut self) -> Result<()> {
        self.check_next(Stage::Constrained)?;
        if !self.state.flags.preserve_boundary {
            return Err(RemeshError::InvalidState(
                "boundary constraints requested without preserve_boundary".into(),
            ));
        }
        let count = derive_boundary_constraints(&mut self.state.hierarchy);
        debug!("Constrained {} boundary half-edges", count);
        self.engine.propagate_constraints(&mut self.state.hierarchy)?;
        self.advance(Stage::Constrained)
    }

    /// Solve for the orientation field.
    pub fn optimize_orientations(&mut self) -> Result<()> {
        self.check_next(Stage::OrientationOptimized)?;
        self.engine.optimize_orientations(&mut self.state)?;
        self.advance(Stage::OrientationOptimized)
    }

    /// Locate orientation singularities.
    pub fn compute_orientation_singularities(&mut self) -> Result<()> {
        self.check_next(Stage::OrientationSingularities)?;
        self.engine.compute_orientation_singularities(&mut self.state)?;
        self.advance(Stage::OrientationSingularities)
    }

    /// Estimate slope hints for adaptive scaling.
    pub fn estimate_slope(&mut self) -> Result<()> {
        self.check_next(Stage::SlopeEstimated)?;
        if !self.state.flags.adaptive_scale {
            return Err(RemeshError::InvalidState(
                "slope estimation requested without adaptive_scale".into(),
            ));
        }
        self.engine.estimate_slope(&mut self.state)?;
        self.advance(Stage::SlopeEstimated)
    }

    /// Solve for the scale field, honoring the adaptive-scale flag.
    pub fn optimize_scale(&mut self) -> Result<()> {
        self.check_next(Stage::ScaleOptimized)?;
        let adaptive = self.state.flags.adaptive_scale;
        self.engine.optimize_scale(&mut self.state, adaptive)?;
        self.advance(Stage::ScaleOptimized)
    }

    /// Turn adaptive scale on for every later stage, whatever the caller asked.
    pub fn pin_adaptive_scale(&mut self) -> Result<()> {
        self.check_next(Stage::PositionOptimizationReady)?;
        self.state.flags.adaptive_scale = true;
        self.advance(Stage::PositionOptimizationReady)
    }

    /// Solve for the position field.
    pub fn optimize_positions(&mut self) -> Result<()> {
        self.check_next(Stage::PositionOptimized)?;
        let adaptive = self.state.flags.adaptive_scale;
        self.engine.optimize_positions(&mut self.state, adaptive)?;
        self.advance(Stage::PositionOptimized)
    }

    /// Locate position singularities.
    pub fn compute_position_singularities(&mut self) -> Result<()> {
        self.check_next(Stage::PositionSingularities)?;
        self.engine.compute_position_singularities(&mut self.state)?;
        self.advance(Stage::PositionSingularities)
    }

    /// Extract the quad mesh in canonical space.
    ///
    /// # Errors
    ///
    /// Returns [`RemeshError::EmptyResult`] when no vertex or no face survives.
    pub fn compute_index_map(&mut self) -> Result<()> {
        self.check_next(Stage::IndexMapped)?;
        self.engine.compute_index_map(&mut self.state)?;
        let quads = &self.state.quads;
        if quads.is_empty() {
            return Err(RemeshError::EmptyResult {
                vertices: quads.positions.len(),
                faces: quads.faces.len(),
            });
        }
        self.advance(Stage::IndexMapped)
    }

    /// Denormalize the extracted mesh into flat output arrays.
    pub fn finish(self) -> Result<QuadMesh> {
        if self.stage() != Some(Stage::IndexMapped) {
            return Err(RemeshError::InvalidState(format!(
                "cannot extract before {}",
                Stage::IndexMapped
            )));
        }
        let result = extract(&self.state.quads, &self.state.normalization)?;
        info!(
            "Remeshed {} triangles into {} faces ({} vertices, {} orientation / {} position singularities)",
            self.input_faces,
            result.num_faces(),
            result.num_vertices(),
            self.state.orientation_singularities.len(),
            self.state.position_singularities.len()
        );
        Ok(result)
    }

    /// Run every stage after [`Pipeline::new`] in order.
    pub fn run(mut self, vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<QuadMesh> {
        self.ingest(vertices, faces)?;
        self.initialize()?;
        if self.state.flags.preserve_boundary {
            self.apply_boundary_constraints()?;
        }
        self.optimize_orientations()?;
        self.compute_orientation_singularities()?;
        if self.state.flags.adaptive_scale {
            self.estimate_slope()?;
        }
        self.optimize_scale()?;
        self.pin_adaptive_scale()?;
        self.optimize_positions()?;
        self.compute_position_singularities()?;
        self.compute_index_map()?;
        self.finish()
    }
}

/// Remesh a triangle mesh with the bundled [`CrossFieldEngine`].
///
/// # Errors
///
/// See [`RemeshError`]: input and parameter errors are raised before any
/// stage runs, [`RemeshError::EmptyResult`] when extraction yields nothing.
pub fn quad_remesh(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    options: &RemeshOptions,
) -> Result<QuadMesh> {
    quad_remesh_with_engine(vertices, faces, options, &CrossFieldEngine::default())
}

/// Remesh a triangle mesh with a caller-supplied engine.
///
/// # Errors
///
/// Same as [`quad_remesh`]. The input is validated before the pipeline is
/// configured, so a rejected mesh never reaches the engine or the progress
/// callback.
pub fn quad_remesh_with_engine<E: FieldEngine>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    options: &RemeshOptions,
    engine: &E,
) -> Result<QuadMesh> {
    CompactMesh::validate(vertices, faces)?;
    Pipeline::new(engine, options)?.run(vertices, faces)
}

/// Remesh from flat row-major arrays: vertices `(N, 3)` and faces `(M, 3)`.
///
/// # Errors
///
/// Returns [`RemeshError::InputShape`] for the wrong column count,
/// [`RemeshError::RaggedInput`] for a length that is not whole rows,
/// [`RemeshError::EmptyInput`] for zero rows and
/// [`RemeshError::InvalidVertexIndex`] for negative or out-of-range indices.
pub fn quad_remesh_arrays(
    vertices: ArrayView<'_, f64>,
    faces: ArrayView<'_, i32>,
    options: &RemeshOptions,
) -> Result<QuadMesh> {
    vertices.check_shape("vertices", 3)?;
    faces.check_shape("faces", 3)?;
    if vertices.rows() == 0 || faces.rows() == 0 {
        return Err(RemeshError::EmptyInput {
            vertices: vertices.rows(),
            faces: faces.rows(),
        });
    }

    let points: Vec<Point3<f64>> = vertices
        .data
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();

    let n = points.len();
    let mut triangles = Vec::with_capacity(faces.rows());
    for (fi, row) in faces.data.chunks_exact(3).enumerate() {
        let mut face = [0usize; 3];
        for (slot, &index) in face.iter_mut().zip(row) {
            *slot = usize::try_from(index)
                .ok()
                .filter(|&i| i < n)
                .ok_or(RemeshError::InvalidVertexIndex {
                    face: fi,
                    vertex: i64::from(index),
                })?;
        }
        triangles.push(face);
    }

    quad_remesh(&points, &triangles, options)
}
