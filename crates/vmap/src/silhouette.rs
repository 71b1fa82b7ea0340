//! Mesh-level elements of the view map: feature vertices and edges.

use bitflags::bitflags;
use vmap_math::{Aabb3, Point3, Vec3};
use vmap_winged::{FaceRef, Nature, ShapeId};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning [`crate::ViewMap`] array.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Index of an [`SVertex`].
    SVertexId
);
id_type!(
    /// Index of an [`FEdge`].
    FEdgeId
);
id_type!(
    /// Index of a [`crate::ViewEdge`].
    ViewEdgeId
);
id_type!(
    /// Index of a [`crate::ViewVertex`].
    ViewVertexId
);

bitflags! {
    /// Role of a vertex in the view map.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexNature: u8 {
        /// Plain feature vertex.
        const S_VERTEX = 1 << 0;
        /// Endpoint of at least one view edge.
        const VIEW_VERTEX = 1 << 1;
        /// Junction of view edges meeting in 3D.
        const NON_T_VERTEX = 1 << 2;
        /// Crossing of two view edges in the image only.
        const T_VERTEX = 1 << 3;
        /// Point where a smooth silhouette folds back on itself.
        const CUSP = 1 << 4;
    }
}

/// A feature vertex: a 3D point, its projection, and its incident
/// feature edges.
#[derive(Debug, Clone, PartialEq)]
pub struct SVertex {
    /// Own index.
    pub id: SVertexId,
    /// Mesh shape the vertex lies on.
    pub shape: ShapeId,
    /// World position.
    pub point_3d: Point3,
    /// Image position `(x, y)` in pixels and depth in `[0, 1]`.
    pub point_2d: Point3,
    /// Normals of the surfaces meeting at the vertex, each listed once.
    pub normals: Vec<Vec3>,
    /// Incident feature edges.
    pub fedges: Vec<FEdgeId>,
    /// View vertex sitting on this feature vertex, if any.
    pub view_vertex: Option<ViewVertexId>,
}

impl SVertex {
    pub(crate) fn add_normal(&mut self, n: Vec3) {
        if !self.normals.iter().any(|m| (m - n).norm_squared() < 1e-24) {
            self.normals.push(n);
        }
    }
}

/// First surface hit behind a feature edge, seen from the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occludee {
    /// Face that was hit.
    pub face: FaceRef,
    /// Hit point.
    pub point: Point3,
}

/// Surface data carried by a feature edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FEdgeGeometry {
    /// Edge of the mesh between one or two faces.
    Sharp {
        /// Normal of the first face.
        normal_a: Vec3,
        /// Normal of the second face; absent on borders.
        normal_b: Option<Vec3>,
        /// Material of the first face.
        material_a: u32,
        /// Material of the second face.
        material_b: Option<u32>,
    },
    /// Line drawn inside a face of a smooth surface.
    Smooth {
        /// Interpolated surface normal.
        normal: Vec3,
        /// Material of the face.
        material: u32,
    },
}

/// A feature edge: one straight segment of a feature line.
#[derive(Debug, Clone, PartialEq)]
pub struct FEdge {
    /// Own index.
    pub id: FEdgeId,
    /// Mesh shape the edge lies on.
    pub shape: ShapeId,
    /// Start vertex.
    pub a: SVertexId,
    /// End vertex.
    pub b: SVertexId,
    /// Feature categories.
    pub nature: Nature,
    /// First originating face.
    pub face_a: Option<FaceRef>,
    /// Second originating face (sharp edges between two faces).
    pub face_b: Option<FaceRef>,
    /// Following edge along the same view edge.
    pub next: Option<FEdgeId>,
    /// Preceding edge along the same view edge.
    pub prev: Option<FEdgeId>,
    /// Owning view edge.
    pub view_edge: Option<ViewEdgeId>,
    /// Quantitative invisibility of the edge.
    pub qi: u32,
    /// Surface directly behind the edge, for silhouettes and borders.
    pub occludee: Option<Occludee>,
    /// Sharp or smooth surface data.
    pub geometry: FEdgeGeometry,
}

impl FEdge {
    /// Whether this edge lies inside a face of a smooth surface.
    pub fn is_smooth(&self) -> bool {
        matches!(self.geometry, FEdgeGeometry::Smooth { .. })
    }

    /// Originating faces.
    pub fn faces(&self) -> impl Iterator<Item = FaceRef> {
        self.face_a.into_iter().chain(self.face_b)
    }

    /// Surface normals carried by the edge.
    pub fn normals(&self) -> impl Iterator<Item = Vec3> {
        let (first, second) = match self.geometry {
            FEdgeGeometry::Sharp {
                normal_a, normal_b, ..
            } => (normal_a, normal_b),
            FEdgeGeometry::Smooth { normal, .. } => (normal, None),
        };
        std::iter::once(first).chain(second)
    }
}

/// The feature vertices and edges found on one mesh shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SShape {
    /// Mesh shape id.
    pub id: ShapeId,
    /// Shape name.
    pub name: String,
    /// Bounding box of the mesh shape.
    pub bbox: Aabb3,
    /// Feature vertices, in creation order.
    pub svertices: Vec<SVertexId>,
    /// Feature edges, in creation order.
    pub fedges: Vec<FEdgeId>,
}
