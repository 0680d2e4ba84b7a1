//! Field optimization engine.
//!
//! The remeshing pipeline drives a [`FieldEngine`], a capability interface with
//! one method per stage. Every method mutates the run's [`FieldState`] in
//! place; the pipeline decides the order and never looks inside the solvers.
//!
//! [`CrossFieldEngine`] is the bundled implementation:
//!
//! - **Hierarchy**: the input is refined until edges are short relative to the
//!   target lattice spacing, then coarsened by pairwise vertex matching
//! - **Orientation**: extrinsic 4-RoSy smoothing, coarse to fine
//! - **Scale**: uniform, or shrunk where the surface bends
//! - **Position**: extrinsic 4-PoSy lattice smoothing, coarse to fine
//! - **Index map**: vertices that snap to the same lattice point are merged,
//!   and the collapsed triangles are paired into quads
//!
//! # Example
//!
//! ```
//! use quadflow::field::{CrossFieldEngine, FieldEngine, FieldState};
//! use quadflow::mesh::CompactMesh;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut mesh = CompactMesh::from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//!
//! let engine = CrossFieldEngine::default();
//! let mut state = FieldState::new(Default::default(), 0);
//! state.normalization = engine.normalize(&mut mesh);
//! engine.initialize(&mut state, &mesh, 4).unwrap();
//! assert!(state.hierarchy.num_levels() >= 1);
//! ```
//!
//! # References
//!
//! - Jakob, W., Tarini, M., Panozzo, D., & Sorkine-Hornung, O. (2015).
//!   "Instant Field-Aligned Meshes." SIGGRAPH Asia.
//! - Huang, J., Zhou, Y., Niessner, M., Shewchuk, J. R., & Guibas, L. J. (2018).
//!   "QuadriFlow: A Scalable and Robust Method for Quadrangulation."
//!   Symposium on Geometry Processing.

mod engine;
mod hierarchy;
mod index_map;
mod orientation;
mod position;
pub mod rosy;
mod scale;
pub mod subdivide;

pub use engine::{CrossFieldEngine, EngineOptions};
pub use hierarchy::{Constraints, Hierarchy, Level, Link};

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector2};

use crate::error::Result;
use crate::mesh::{CompactMesh, Normalization};

/// Switches that steer the field engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct FieldFlags {
    /// Align the field with sharp creases.
    pub preserve_sharp: bool,
    /// Pin boundary vertices and directions.
    pub preserve_boundary: bool,
    /// Vary the lattice spacing with curvature.
    pub adaptive_scale: bool,
    /// Accept lower-quality quads when pairing triangles.
    pub aggressive_sat: bool,
    /// Resolve position singularities before extraction.
    pub minimum_cost_flow: bool,
}

/// Quad mesh produced by the index map, in canonical space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompactQuadMesh {
    /// Output vertex positions.
    pub positions: Vec<Point3<f64>>,
    /// Quads indexing into `positions`. A triangle repeats its last index.
    pub faces: Vec<[usize; 4]>,
}

impl CompactQuadMesh {
    /// Whether the mesh has no vertices or no faces.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.faces.is_empty()
    }
}

/// All mutable state of one remeshing run.
#[derive(Debug, Clone, Default)]
pub struct FieldState {
    /// Engine switches.
    pub flags: FieldFlags,
    /// Multi-resolution field storage.
    pub hierarchy: Hierarchy,
    /// Transform between caller space and canonical space.
    pub normalization: Normalization,
    /// Per finest-level vertex curvature hint, filled by slope estimation.
    pub slope: Vec<f64>,
    /// Faces around which the orientation field turns, with the turn in
    /// quarter rotations.
    pub orientation_singularities: BTreeMap<usize, u32>,
    /// Faces around which the lattice does not close, with the residual.
    pub position_singularities: BTreeMap<usize, Vector2<i32>>,
    /// Extracted quad mesh.
    pub quads: CompactQuadMesh,
}

impl FieldState {
    /// Fresh state for one run.
    pub fn new(flags: FieldFlags, seed: u64) -> Self {
        Self {
            flags,
            hierarchy: Hierarchy::with_seed(seed),
            ..Self::default()
        }
    }
}

/// The stage-by-stage capabilities the remeshing pipeline relies on.
///
/// Implementations must be deterministic for a fixed seed and must not keep
/// per-run state in `self`; everything a run mutates lives in [`FieldState`].
pub trait FieldEngine: Sync {
    /// Move the mesh into canonical space and return the transform used.
    fn normalize(&self, mesh: &mut CompactMesh) -> Normalization {
        mesh.normalize()
    }

    /// Build the hierarchy for roughly `target_faces` output quads.
    fn initialize(&self, state: &mut FieldState, mesh: &CompactMesh, target_faces: usize)
        -> Result<()>;

    /// Restrict finest-level constraints to every coarser level.
    fn propagate_constraints(&self, hierarchy: &mut Hierarchy) -> Result<()>;

    /// Solve for the orientation field.
    fn optimize_orientations(&self, state: &mut FieldState) -> Result<()>;

    /// Locate orientation singularities.
    fn compute_orientation_singularities(&self, state: &mut FieldState) -> Result<()>;

    /// Estimate per-vertex slope hints for adaptive scaling.
    fn estimate_slope(&self, state: &mut FieldState) -> Result<()>;

    /// Solve for the scale field.
    fn optimize_scale(&self, state: &mut FieldState, adaptive: bool) -> Result<()>;

    /// Solve for the position field.
    fn optimize_positions(&self, state: &mut FieldState, adaptive: bool) -> Result<()>;

    /// Locate position singularities.
    fn compute_position_singularities(&self, state: &mut FieldState) -> Result<()>;

    /// Collapse the fields into [`FieldState::quads`].
    fn compute_index_map(&self, state: &mut FieldState) -> Result<()>;
}
