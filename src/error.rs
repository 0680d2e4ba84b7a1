//! Error types for quadflow.
//!
//! Every failure of a remeshing run is reported through [`RemeshError`]. The
//! variants fall into a small number of categories, see [`ErrorKind`], so
//! callers can tell a usage mistake apart from a processing outcome.

use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias using [`RemeshError`].
pub type Result<T> = std::result::Result<T, RemeshError>;

/// Broad classification of a [`RemeshError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or empty input arrays.
    Input,
    /// An invalid parameter value.
    Parameter,
    /// The pipeline finished but produced no quads.
    EmptyResult,
    /// A failure raised by the field engine.
    Engine,
    /// The pipeline was driven out of order.
    State,
}

/// Errors that can occur while remeshing.
#[derive(Error, Debug)]
pub enum RemeshError {
    /// An input array has the wrong number of columns.
    #[error("{array} must have shape (N, {expected}), got {columns} columns")]
    InputShape {
        /// Name of the offending array.
        array: &'static str,
        /// Required column count.
        expected: usize,
        /// Column count that was supplied.
        columns: usize,
    },

    /// A flat input array does not split into whole rows.
    #[error("{array} has {len} elements, not a multiple of {columns}")]
    RaggedInput {
        /// Name of the offending array.
        array: &'static str,
        /// Number of elements supplied.
        len: usize,
        /// Row width.
        columns: usize,
    },

    /// The input mesh has no vertices or no faces.
    #[error("input mesh is empty ({vertices} vertices, {faces} faces)")]
    EmptyInput {
        /// Number of vertices supplied.
        vertices: usize,
        /// Number of faces supplied.
        faces: usize,
    },

    /// A face references a vertex outside the vertex array.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: i64,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// Every stage ran, but the extracted quad mesh is empty.
    #[error("remeshing produced an empty mesh ({vertices} vertices, {faces} faces)")]
    EmptyResult {
        /// Number of extracted vertices.
        vertices: usize,
        /// Number of extracted faces.
        faces: usize,
    },

    /// The field engine failed inside a stage.
    #[error("field engine failed during {stage}: {message}")]
    Engine {
        /// The stage that was running.
        stage: Stage,
        /// Engine-supplied description.
        message: String,
    },

    /// A pipeline stage was requested out of order.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),
}

impl RemeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        RemeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create an engine error for the given stage.
    pub fn engine<M: Into<String>>(stage: Stage, message: M) -> Self {
        RemeshError::Engine {
            stage,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemeshError::InputShape { .. }
            | RemeshError::RaggedInput { .. }
            | RemeshError::EmptyInput { .. }
            | RemeshError::InvalidVertexIndex { .. } => ErrorKind::Input,
            RemeshError::InvalidParameter { .. } => ErrorKind::Parameter,
            RemeshError::EmptyResult { .. } => ErrorKind::EmptyResult,
            RemeshError::Engine { .. } => ErrorKind::Engine,
            RemeshError::InvalidState(_) => ErrorKind::State,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RemeshError::InputShape {
            array: "vertices",
            expected: 3,
            columns: 2,
        };
        assert_eq!(format!("{err}"), "vertices must have shape (N, 3), got 2 columns");

        let err = RemeshError::invalid_param("target_faces", -5, "must be positive");
        assert_eq!(
            format!("{err}"),
            "invalid parameter: target_faces = -5 (must be positive)"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RemeshError::EmptyInput { vertices: 0, faces: 0 }.kind(),
            ErrorKind::Input
        );
        assert_eq!(
            RemeshError::invalid_param("target_faces", 0, "must be positive").kind(),
            ErrorKind::Parameter
        );
        assert_eq!(
            RemeshError::EmptyResult { vertices: 0, faces: 0 }.kind(),
            ErrorKind::EmptyResult
        );
        assert_eq!(
            RemeshError::engine(Stage::OrientationOptimized, "diverged").kind(),
            ErrorKind::Engine
        );
    }

    #[test]
    fn test_engine_error_names_stage() {
        let err = RemeshError::engine(Stage::IndexMapped, "no lattice");
        assert!(format!("{err}").contains("index map"));
    }
}
