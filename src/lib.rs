//! # Quadflow
//!
//! Quad-dominant remeshing of triangle meshes.
//!
//! Quadflow takes an arbitrary triangle mesh and a target face count and
//! produces a mesh made mostly of quads whose edges follow a smooth cross
//! field over the surface.
//!
//! ## Features
//!
//! - **Deterministic**: identical input, options and seed give bit-identical output
//! - **Pluggable solvers**: the pipeline drives any [`field::FieldEngine`]
//! - **Boundary and feature preservation**: open boundaries and sharp creases
//!   can pin the field
//! - **Adaptive density**: optionally smaller quads where the surface bends
//!
//! ## Quick Start
//!
//! ```
//! use quadflow::prelude::*;
//! use nalgebra::Point3;
//!
//! // A unit cube
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//!     Point3::new(1.0, 0.0, 1.0),
//!     Point3::new(1.0, 1.0, 1.0),
//!     Point3::new(0.0, 1.0, 1.0),
//! ];
//! let faces = vec![
//!     [0, 2, 1], [0, 3, 2], // bottom
//!     [4, 5, 6], [4, 6, 7], // top
//!     [0, 1, 5], [0, 5, 4], // front
//!     [2, 3, 7], [2, 7, 6], // back
//!     [1, 2, 6], [1, 6, 5], // right
//!     [3, 0, 4], [3, 4, 7], // left
//! ];
//!
//! let options = RemeshOptions::new(20).with_seed(0);
//! let quads = quad_remesh(&vertices, &faces, &options).unwrap();
//!
//! for i in 0..quads.num_faces() {
//!     let [a, b, c, d] = quads.face(i);
//!     assert!(a.max(b).max(c).max(d) < quads.num_vertices());
//! }
//! ```
//!
//! ## Flat Arrays
//!
//! [`quad_remesh_arrays`] accepts row-major buffers, the layout array
//! libraries hand out:
//!
//! ```
//! use quadflow::{quad_remesh_arrays, ArrayView, RemeshOptions};
//!
//! let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0, 0.5, 0.5, 1.0];
//! let faces = [0, 2, 1, 0, 1, 3, 1, 2, 3, 2, 0, 3];
//!
//! let result = quad_remesh_arrays(
//!     ArrayView::new(&vertices, 3),
//!     ArrayView::new(&faces, 3),
//!     &RemeshOptions::new(50),
//! );
//! assert!(result.is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
pub mod field;
pub mod mesh;
pub mod pipeline;
pub mod progress;

pub use pipeline::{
    quad_remesh, quad_remesh_arrays, quad_remesh_with_engine, ArrayView, QuadMesh, RemeshOptions,
};

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use quadflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorKind, RemeshError, Result};
    pub use crate::field::{CrossFieldEngine, EngineOptions, FieldEngine, FieldFlags, FieldState};
    pub use crate::pipeline::{
        quad_remesh, quad_remesh_arrays, quad_remesh_with_engine, ArrayView, Pipeline, QuadMesh,
        RemeshOptions, Stage,
    };
    pub use crate::progress::Progress;
}

// Re-export nalgebra types for convenience
pub use nalgebra;
