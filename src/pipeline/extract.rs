//! Conversion of the engine's compact quad mesh into flat output arrays.

use nalgebra::Point3;

use super::Stage;
use crate::error::{RemeshError, Result};
use crate::field::CompactQuadMesh;
use crate::mesh::Normalization;

/// A remeshed quad-dominant mesh.
///
/// Positions are stored flat as `x, y, z` triples and faces flat as four
/// indices each. A face whose last two indices are equal is a triangle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadMesh {
    vertices: Vec<f64>,
    faces: Vec<u32>,
}

impl QuadMesh {
    /// Flat vertex coordinates, `num_vertices() * 3` values.
    #[inline]
    pub fn vertices(&self) -> &[f64] {
        &self.vertices
    }

    /// Flat face indices, `num_faces() * 4` values.
    #[inline]
    pub fn faces(&self) -> &[u32] {
        &self.faces
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len() / 4
    }

    /// Position of vertex `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_vertices()`.
    pub fn position(&self, i: usize) -> Point3<f64> {
        let v = &self.vertices[i * 3..i * 3 + 3];
        Point3::new(v[0], v[1], v[2])
    }

    /// Vertex indices of face `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= num_faces()`.
    pub fn face(&self, i: usize) -> [usize; 4] {
        let f = &self.faces[i * 4..i * 4 + 4];
        [f[0] as usize, f[1] as usize, f[2] as usize, f[3] as usize]
    }

    /// Split into positions and face index arrays.
    pub fn to_face_vertex(&self) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
        let positions = (0..self.num_vertices()).map(|i| self.position(i)).collect();
        let faces = (0..self.num_faces()).map(|i| self.face(i)).collect();
        (positions, faces)
    }
}

/// Denormalize `quads` back into caller space.
///
/// # Errors
///
/// Returns [`RemeshError::Engine`] if the mesh needs indices wider than 32
/// bits or a face references a missing vertex.
pub fn extract(quads: &CompactQuadMesh, normalization: &Normalization) -> Result<QuadMesh> {
    if quads.positions.len() > u32::MAX as usize {
        return Err(RemeshError::engine(
            Stage::IndexMapped,
            format!("{} output vertices exceed 32-bit indices", quads.positions.len()),
        ));
    }

    let mut vertices = Vec::with_capacity(quads.positions.len() * 3);
    for p in &quads.positions {
        let p = normalization.inverse(p);
        vertices.extend_from_slice(&[p.x, p.y, p.z]);
    }

    let mut faces = Vec::with_capacity(quads.faces.len() * 4);
    for (fi, face) in quads.faces.iter().enumerate() {
        for &index in face {
            if index >= quads.positions.len() {
                return Err(RemeshError::engine(
                    Stage::IndexMapped,
                    format!("face {fi} references missing vertex {index}"),
                ));
            }
            faces.push(index as u32);
        }
    }

    Ok(QuadMesh { vertices, faces })
}
