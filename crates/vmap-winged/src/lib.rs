#![warn(missing_docs)]

//! Winged-edge scene representation for the vmap view-map engine.
//!
//! The view-map builder consumes a [`WingedEdgeMesh`]: one [`WxShape`]
//! per scene object, each with explicit vertex / half-edge / edge / face
//! adjacency and room for the data the feature detector writes back
//! (per-edge [`Nature`], per-face facing and smooth layers, per-vertex
//! curvature). Shapes are built from plain indexed [`TriangleMesh`]es.

mod mesh;
mod nature;
pub mod primitives;
mod triangle_mesh;

pub use mesh::{
    CurvatureInfo, EdgeId, EdgePoint, FaceId, FaceLayer, FaceRef, HalfEdge, HalfEdgeId,
    ShapeId, SmoothSegment, VertexId, WingedEdgeMesh, WxEdge, WxFace, WxShape, WxVertex,
};
pub use nature::Nature;
pub use triangle_mesh::TriangleMesh;

use thiserror::Error;

/// Errors from building a winged-edge mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Vertex array length is not a multiple of three.
    #[error("vertex array length {0} is not a multiple of 3")]
    BadVertexCount(usize),

    /// Index array length is not a multiple of three.
    #[error("index array length {0} is not a multiple of 3")]
    BadIndexCount(usize),

    /// A triangle references a vertex that does not exist.
    #[error("triangle index {index} out of range ({vertices} vertices)")]
    IndexOutOfRange {
        /// Offending index.
        index: u32,
        /// Number of vertices in the mesh.
        vertices: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("vertex {0} has a non-finite coordinate")]
    NonFiniteVertex(usize),
}

/// Result type for mesh construction.
pub type Result<T> = std::result::Result<T, MeshError>;
