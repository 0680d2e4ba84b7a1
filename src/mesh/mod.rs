//! Indexed triangle meshes.
//!
//! This module holds the mesh representations the remeshing pipeline works
//! on before any field is computed:
//!
//! - [`CompactMesh`]: deduplicated positions plus triangle indices
//! - [`Normalization`]: the affine map into and out of canonical space
//! - [`EdgeAdjacency`]: directed half-edge to opposite half-edge lookup
//!
//! # Construction
//!
//! ```
//! use quadflow::mesh::CompactMesh;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh = CompactMesh::from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 3);
//! ```

pub mod adjacency;
mod compact;

pub use adjacency::EdgeAdjacency;
pub use compact::{CompactMesh, Normalization, VertexKey, UNSET};
