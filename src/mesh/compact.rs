//! Compact indexed meshes built from raw face-vertex input.
//!
//! Ingestion walks the input faces in order and assigns every distinct vertex
//! reference a dense compact index on first sight. References are compared
//! structurally through [`VertexKey`], never by position value, so two input
//! vertices sitting at the same point stay distinct.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::error::{RemeshError, Result};

/// Sentinel for an attribute channel that is not present.
pub const UNSET: u32 = u32::MAX;

/// Deduplication key for one face corner.
///
/// The key mirrors the corner layout of indexed mesh formats: a position
/// index plus optional normal and texture-coordinate indices. Raw triangle
/// arrays carry no normal or uv channel, so both are always [`UNSET`] and two
/// corners share a compact vertex exactly when they share a position index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey {
    /// Index into the input position array.
    pub position: u32,
    /// Index into a normal array, or [`UNSET`].
    pub normal: u32,
    /// Index into a texture-coordinate array, or [`UNSET`].
    pub uv: u32,
}

impl VertexKey {
    /// Key for a corner that only references a position.
    #[inline]
    pub fn from_position(position: u32) -> Self {
        Self {
            position,
            normal: UNSET,
            uv: UNSET,
        }
    }
}

/// A deduplicated triangle mesh with dense, zero-based indices.
#[derive(Debug, Clone, Default)]
pub struct CompactMesh {
    /// Vertex positions in first-reference order.
    pub positions: Vec<Point3<f64>>,
    /// Triangles indexing into `positions`.
    pub faces: Vec<[usize; 3]>,
}

impl CompactMesh {
    /// Check that the input is non-empty and every face index is in range.
    ///
    /// # Errors
    ///
    /// Returns [`RemeshError::EmptyInput`] if either input is empty and
    /// [`RemeshError::InvalidVertexIndex`] if a face index is out of range.
    pub fn validate(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<()> {
        if vertices.is_empty() || faces.is_empty() {
            return Err(RemeshError::EmptyInput {
                vertices: vertices.len(),
                faces: faces.len(),
            });
        }
        if vertices.len() > UNSET as usize {
            return Err(RemeshError::invalid_param(
                "vertices",
                vertices.len(),
                "too many vertices for 32-bit indices",
            ));
        }

        for (fi, face) in faces.iter().enumerate() {
            for &vi in face {
                if vi >= vertices.len() {
                    return Err(RemeshError::InvalidVertexIndex {
                        face: fi,
                        vertex: vi as i64,
                    });
                }
            }
        }
        Ok(())
    }

    /// Build a compact mesh from raw positions and triangle faces.
    ///
    /// Vertices that no face references are dropped. Faces whose corners
    /// coincide are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns [`RemeshError::EmptyInput`] if either input is empty and
    /// [`RemeshError::InvalidVertexIndex`] if a face index is out of range.
    pub fn from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Self> {
        Self::validate(vertices, faces)?;

        let mut vertex_map: HashMap<VertexKey, usize> = HashMap::with_capacity(vertices.len());
        let mut keys: Vec<VertexKey> = Vec::with_capacity(vertices.len());
        let mut compact_faces = Vec::with_capacity(faces.len());

        for face in faces {
            let mut corners = [0usize; 3];
            for (corner, &vi) in corners.iter_mut().zip(face) {
                let key = VertexKey::from_position(vi as u32);
                *corner = *vertex_map.entry(key).or_insert_with(|| {
                    keys.push(key);
                    keys.len() - 1
                });
            }
            compact_faces.push(corners);
        }

        let positions = keys
            .iter()
            .map(|key| vertices[key.position as usize])
            .collect();

        Ok(Self {
            positions,
            faces: compact_faces,
        })
    }

    /// Number of compact vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Flattened face indices, three per face.
    pub fn face_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.faces.iter().flat_map(|f| f.iter().copied())
    }

    /// Recenter and rescale the mesh in place, returning the transform used.
    pub fn normalize(&mut self) -> Normalization {
        let normalization = Normalization::fit(&self.positions);
        for p in &mut self.positions {
            *p = normalization.forward(p);
        }
        normalization
    }
}

/// Affine map between caller coordinates and the engine's canonical space.
///
/// The forward map is `(p - offset) / scale`; the inverse is
/// `p * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Uniform scale factor.
    pub scale: f64,
    /// Translation applied before scaling.
    pub offset: Vector3<f64>,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::identity()
    }
}

impl Normalization {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Vector3::zeros(),
        }
    }

    /// Fit a transform that centers the bounding box of `points` at the origin
    /// and maps its largest half-extent to 1.
    pub fn fit(points: &[Point3<f64>]) -> Self {
        let Some(first) = points.first() else {
            return Self::identity();
        };

        let mut min = *first;
        let mut max = *first;
        for p in points {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        let extent = max - min;
        let half = 0.5 * extent.x.max(extent.y).max(extent.z);
        let scale = if half > 0.0 && half.is_finite() { half } else { 1.0 };

        Self {
            scale,
            offset: (min.coords + max.coords) * 0.5,
        }
    }

    /// Map a caller-space point into canonical space.
    #[inline]
    pub fn forward(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p.coords - self.offset) / self.scale)
    }

    /// Map a canonical-space point back into caller space.
    #[inline]
    pub fn inverse(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(p.coords * self.scale + self.offset)
    }
}
