//! Winged-edge mesh extended with feature data ("WX" mesh).
//!
//! Every shape stores its elements in flat arrays addressed by `u32`
//! newtype ids. Adjacency is explicit: each half-edge knows its origin,
//! face, twin and the next/previous half-edges around its face, and each
//! vertex lists its incident edges.

use fxhash::FxHashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use vmap_math::{geom, Aabb3, Point3, Vec3};

use crate::{MeshError, Nature, Result, TriangleMesh};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning array.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

id_type!(
    /// Shape index within a [`WingedEdgeMesh`].
    ShapeId
);
id_type!(
    /// Vertex index within a [`WxShape`].
    VertexId
);
id_type!(
    /// Half-edge index within a [`WxShape`].
    HalfEdgeId
);
id_type!(
    /// Edge index within a [`WxShape`].
    EdgeId
);
id_type!(
    /// Face index within a [`WxShape`].
    FaceId
);

/// A face identified across the whole mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRef {
    /// Owning shape.
    pub shape: ShapeId,
    /// Face within the shape.
    pub face: FaceId,
}

/// Principal curvatures and directions estimated at a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvatureInfo {
    /// Maximum principal curvature.
    pub k1: f64,
    /// Minimum principal curvature.
    pub k2: f64,
    /// Direction of maximum curvature.
    pub e1: Vec3,
    /// Direction of minimum curvature.
    pub e2: Vec3,
}

impl CurvatureInfo {
    /// The principal curvature of larger magnitude with its direction.
    pub fn dominant(&self) -> (f64, Vec3) {
        if self.k1.abs() >= self.k2.abs() {
            (self.k1, self.e1)
        } else {
            (self.k2, self.e2)
        }
    }
}

/// A point on a mesh edge at parameter `t` from `edge.a` to `edge.b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePoint {
    /// Edge carrying the point.
    pub edge: EdgeId,
    /// Parameter along the edge.
    pub t: f64,
}

/// Straight piece of a smooth feature line crossing one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothSegment {
    /// Start point.
    pub a: EdgePoint,
    /// End point.
    pub b: EdgePoint,
}

/// Smooth feature line found inside a face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceLayer {
    /// Single nature bit of the line.
    pub nature: Nature,
    /// Geometry of the line inside the face.
    pub segment: SmoothSegment,
    /// Interpolated surface normal at the segment midpoint.
    pub normal: Vec3,
}

/// Mesh vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct WxVertex {
    /// Position in world space.
    pub position: Point3,
    /// Area-weighted vertex normal.
    pub normal: Vec3,
    /// Incident edges.
    pub edges: Vec<EdgeId>,
    /// Curvature estimate, filled in by the feature detector.
    pub curvature: Option<CurvatureInfo>,
}

/// Oriented half of an edge, bound to one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfEdge {
    /// Start vertex.
    pub origin: VertexId,
    /// Face on the left.
    pub face: FaceId,
    /// Next half-edge around the face.
    pub next: HalfEdgeId,
    /// Previous half-edge around the face.
    pub prev: HalfEdgeId,
    /// Opposite half-edge, absent on borders.
    pub twin: Option<HalfEdgeId>,
    /// Undirected edge.
    pub edge: EdgeId,
}

/// Undirected mesh edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WxEdge {
    /// First endpoint.
    pub a: VertexId,
    /// Second endpoint.
    pub b: VertexId,
    /// Half-edge running from `a` to `b`.
    pub half: HalfEdgeId,
    /// Half-edge running from `b` to `a`, absent on borders.
    pub twin_half: Option<HalfEdgeId>,
    /// Feature classification, set by the detector.
    pub nature: Nature,
}

/// Triangular face.
#[derive(Debug, Clone, PartialEq)]
pub struct WxFace {
    /// Corners in counter-clockwise order.
    pub vertices: [VertexId; 3],
    /// Half-edges `v0→v1`, `v1→v2`, `v2→v0`.
    pub half_edges: [HalfEdgeId; 3],
    /// Unit normal (zero for degenerate faces).
    pub normal: Vec3,
    /// Area.
    pub area: f64,
    /// Centroid.
    pub centroid: Point3,
    /// Material index.
    pub material: u32,
    /// Whether the face belongs to a smooth surface.
    pub smooth: bool,
    /// Whether the face points toward the viewer, set by the detector.
    pub front: bool,
    /// Smooth feature lines found inside the face.
    pub layers: Vec<FaceLayer>,
}

impl WxFace {
    /// Whether the face has zero area.
    pub fn is_degenerate(&self) -> bool {
        self.normal == Vec3::zeros()
    }
}

/// One connected piece of scene geometry with winged-edge adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct WxShape {
    /// Shape id within the mesh.
    pub id: ShapeId,
    /// Name carried from the input.
    pub name: String,
    /// Vertices.
    pub vertices: Vec<WxVertex>,
    /// Half-edges.
    pub half_edges: Vec<HalfEdge>,
    /// Edges.
    pub edges: Vec<WxEdge>,
    /// Faces.
    pub faces: Vec<WxFace>,
}

impl WxShape {
    /// Build the winged-edge structure of an indexed triangle mesh.
    ///
    /// Triangles repeating a vertex index are skipped with a warning. An
    /// edge already shared by two faces gets a fresh border edge for any
    /// further face, as does an edge whose neighbour has the same winding.
    pub fn from_triangle_mesh(id: ShapeId, mesh: &TriangleMesh) -> Result<Self> {
        if mesh.vertices.len() % 3 != 0 {
            return Err(MeshError::BadVertexCount(mesh.vertices.len()));
        }
        if mesh.indices.len() % 3 != 0 {
            return Err(MeshError::BadIndexCount(mesh.indices.len()));
        }
        let num_vertices = mesh.num_vertices();

        let mut vertices = Vec::with_capacity(num_vertices);
        for (i, c) in mesh.vertices.chunks_exact(3).enumerate() {
            if !(c[0].is_finite() && c[1].is_finite() && c[2].is_finite()) {
                return Err(MeshError::NonFiniteVertex(i));
            }
            vertices.push(WxVertex {
                position: Point3::new(c[0], c[1], c[2]),
                normal: Vec3::zeros(),
                edges: Vec::new(),
                curvature: None,
            });
        }

        let mut shape = Self {
            id,
            name: mesh.name.clone(),
            vertices,
            half_edges: Vec::with_capacity(mesh.indices.len()),
            edges: Vec::new(),
            faces: Vec::with_capacity(mesh.num_triangles()),
        };

        let mut edge_map: FxHashMap<(u32, u32), EdgeId> = FxHashMap::default();
        for (tri, idx) in mesh.indices.chunks_exact(3).enumerate() {
            for &i in idx {
                if i as usize >= num_vertices {
                    return Err(MeshError::IndexOutOfRange {
                        index: i,
                        vertices: num_vertices,
                    });
                }
            }
            if idx[0] == idx[1] || idx[1] == idx[2] || idx[0] == idx[2] {
                warn!(
                    "shape '{}': skipping triangle {tri} with repeated vertex {:?}",
                    mesh.name, idx
                );
                continue;
            }
            shape.add_face(
                [VertexId(idx[0]), VertexId(idx[1]), VertexId(idx[2])],
                mesh.material(tri),
                mesh.smooth,
                &mut edge_map,
            );
        }

        shape.compute_vertex_normals();
        Ok(shape)
    }

    fn add_face(
        &mut self,
        corners: [VertexId; 3],
        material: u32,
        smooth: bool,
        edge_map: &mut FxHashMap<(u32, u32), EdgeId>,
    ) {
        let face_id = FaceId(self.faces.len() as u32);
        let base = self.half_edges.len() as u32;
        let half_ids = [HalfEdgeId(base), HalfEdgeId(base + 1), HalfEdgeId(base + 2)];

        for k in 0..3 {
            let from = corners[k];
            let to = corners[(k + 1) % 3];
            let half_id = half_ids[k];
            let key = (from.0.min(to.0), from.0.max(to.0));

            let shared = edge_map.get(&key).copied().filter(|&e| {
                let edge = &self.edges[e.index()];
                edge.twin_half.is_none() && edge.a == to && edge.b == from
            });

            let edge_id = match shared {
                Some(e) => {
                    let first = self.edges[e.index()].half;
                    self.edges[e.index()].twin_half = Some(half_id);
                    self.half_edges[first.index()].twin = Some(half_id);
                    e
                }
                None => {
                    let e = EdgeId(self.edges.len() as u32);
                    self.edges.push(WxEdge {
                        a: from,
                        b: to,
                        half: half_id,
                        twin_half: None,
                        nature: Nature::empty(),
                    });
                    self.vertices[from.index()].edges.push(e);
                    self.vertices[to.index()].edges.push(e);
                    edge_map.entry(key).or_insert(e);
                    e
                }
            };

            let twin = if shared.is_some() {
                Some(self.edges[edge_id.index()].half)
            } else {
                None
            };
            self.half_edges.push(HalfEdge {
                origin: from,
                face: face_id,
                next: half_ids[(k + 1) % 3],
                prev: half_ids[(k + 2) % 3],
                twin,
                edge: edge_id,
            });
        }

        let [p0, p1, p2] = corners.map(|v| self.vertices[v.index()].position);
        self.faces.push(WxFace {
            vertices: corners,
            half_edges: half_ids,
            normal: geom::triangle_normal(&p0, &p1, &p2).unwrap_or_else(Vec3::zeros),
            area: geom::triangle_area(&p0, &p1, &p2),
            centroid: Point3::from((p0.coords + p1.coords + p2.coords) / 3.0),
            material,
            smooth,
            front: false,
            layers: Vec::new(),
        });
    }

    fn compute_vertex_normals(&mut self) {
        let mut sums = vec![Vec3::zeros(); self.vertices.len()];
        for face in &self.faces {
            for v in face.vertices {
                sums[v.index()] += face.normal * face.area;
            }
        }
        for (vertex, sum) in self.vertices.iter_mut().zip(sums) {
            vertex.normal = vmap_math::try_normalize(&sum).unwrap_or_else(Vec3::zeros);
        }
    }

    /// Vertex by id.
    pub fn vertex(&self, id: VertexId) -> &WxVertex {
        &self.vertices[id.index()]
    }

    /// Edge by id.
    pub fn edge(&self, id: EdgeId) -> &WxEdge {
        &self.edges[id.index()]
    }

    /// Face by id.
    pub fn face(&self, id: FaceId) -> &WxFace {
        &self.faces[id.index()]
    }

    /// Half-edge by id.
    pub fn half_edge(&self, id: HalfEdgeId) -> &HalfEdge {
        &self.half_edges[id.index()]
    }

    /// Faces on either side of an edge; the second is absent on borders.
    pub fn edge_faces(&self, id: EdgeId) -> (FaceId, Option<FaceId>) {
        let edge = self.edge(id);
        let first = self.half_edge(edge.half).face;
        let second = edge.twin_half.map(|h| self.half_edge(h).face);
        (first, second)
    }

    /// Whether the edge has a single adjacent face.
    pub fn is_border(&self, id: EdgeId) -> bool {
        self.edge(id).twin_half.is_none()
    }

    /// The endpoint of `edge` that is not `v`.
    pub fn other_vertex(&self, edge: EdgeId, v: VertexId) -> VertexId {
        let e = self.edge(edge);
        if e.a == v {
            e.b
        } else {
            e.a
        }
    }

    /// Edges bounding a face, in half-edge order.
    pub fn face_edges(&self, id: FaceId) -> [EdgeId; 3] {
        self.face(id).half_edges.map(|h| self.half_edge(h).edge)
    }

    /// Corner positions of a face.
    pub fn face_positions(&self, id: FaceId) -> [Point3; 3] {
        self.face(id).vertices.map(|v| self.vertex(v).position)
    }

    /// Faces incident to a vertex, each listed once.
    pub fn vertex_faces(&self, id: VertexId) -> Vec<FaceId> {
        let mut faces = Vec::new();
        for &e in &self.vertex(id).edges {
            let (f0, f1) = self.edge_faces(e);
            for f in std::iter::once(f0).chain(f1) {
                if !faces.contains(&f) {
                    faces.push(f);
                }
            }
        }
        faces
    }

    /// World position of a point on an edge.
    pub fn edge_point(&self, p: &EdgePoint) -> Point3 {
        let e = self.edge(p.edge);
        let a = self.vertex(e.a).position;
        let b = self.vertex(e.b).position;
        a + (b - a) * p.t
    }

    /// Length of an edge.
    pub fn edge_length(&self, id: EdgeId) -> f64 {
        let e = self.edge(id);
        (self.vertex(e.b).position - self.vertex(e.a).position).norm()
    }

    /// Clear every detector output so detection can run again.
    pub fn reset_features(&mut self) {
        for edge in &mut self.edges {
            edge.nature = Nature::empty();
        }
        for face in &mut self.faces {
            face.front = false;
            face.layers.clear();
        }
        for vertex in &mut self.vertices {
            vertex.curvature = None;
        }
    }

    /// Bounding box of the shape's vertices.
    pub fn bbox(&self) -> Aabb3 {
        Aabb3::from_points(self.vertices.iter().map(|v| &v.position))
    }
}

/// The scene: a list of winged-edge shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WingedEdgeMesh {
    /// Shapes, indexed by [`ShapeId`].
    pub shapes: Vec<WxShape>,
}

impl WingedEdgeMesh {
    /// Empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one shape per triangle mesh.
    pub fn from_triangle_meshes(meshes: &[TriangleMesh]) -> Result<Self> {
        let mut mesh = Self::new();
        for m in meshes {
            mesh.add_triangle_mesh(m)?;
        }
        Ok(mesh)
    }

    /// Add a triangle mesh as a new shape.
    pub fn add_triangle_mesh(&mut self, mesh: &TriangleMesh) -> Result<ShapeId> {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(WxShape::from_triangle_mesh(id, mesh)?);
        Ok(id)
    }

    /// Shape by id.
    pub fn shape(&self, id: ShapeId) -> &WxShape {
        &self.shapes[id.index()]
    }

    /// Face by global reference.
    pub fn face(&self, f: FaceRef) -> &WxFace {
        self.shape(f.shape).face(f.face)
    }

    /// Total face count over all shapes.
    pub fn num_faces(&self) -> usize {
        self.shapes.iter().map(|s| s.faces.len()).sum()
    }

    /// Whether the mesh has no faces at all.
    pub fn is_empty(&self) -> bool {
        self.num_faces() == 0
    }

    /// Bounding box of every shape.
    pub fn bbox(&self) -> Aabb3 {
        let mut bbox = Aabb3::empty();
        for shape in &self.shapes {
            bbox.include_box(&shape.bbox());
        }
        bbox
    }

    /// Length of the shortest non-degenerate edge, or zero when there is
    /// none.
    pub fn min_edge_size(&self) -> f64 {
        let min = self
            .shapes
            .iter()
            .flat_map(|s| (0..s.edges.len()).map(move |e| s.edge_length(EdgeId(e as u32))))
            .filter(|&l| l > 0.0)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    /// Mean edge length, or zero for an empty mesh.
    pub fn mean_edge_size(&self) -> f64 {
        let (sum, count) = self
            .shapes
            .iter()
            .flat_map(|s| (0..s.edges.len()).map(move |e| s.edge_length(EdgeId(e as u32))))
            .fold((0.0, 0usize), |(s, n), l| (s + l, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Clear detector output on every shape.
    pub fn reset_features(&mut self) {
        for shape in &mut self.shapes {
            shape.reset_features();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;

    #[test]
    fn test_cube_topology() {
        let shape = WxShape::from_triangle_mesh(ShapeId(0), &primitives::cube(1.0)).unwrap();
        assert_eq!(shape.vertices.len(), 8);
        assert_eq!(shape.faces.len(), 12);
        // 12 cube edges + 6 face diagonals
        assert_eq!(shape.edges.len(), 18);
        assert!(
            (0..shape.edges.len()).all(|e| !shape.is_border(EdgeId(e as u32))),
            "a closed cube has no border edges"
        );
        for (i, he) in shape.half_edges.iter().enumerate() {
            let twin = he.twin.unwrap();
            assert_eq!(shape.half_edge(twin).twin, Some(HalfEdgeId(i as u32)));
            assert_eq!(shape.half_edge(twin).edge, he.edge);
        }
    }

    #[test]
    fn test_face_normals_point_outward() {
        let shape = WxShape::from_triangle_mesh(ShapeId(0), &primitives::cube(1.0)).unwrap();
        let center = Point3::new(0.5, 0.5, 0.5);
        for face in &shape.faces {
            assert!(face.normal.dot(&(face.centroid - center)) > 0.0);
        }
    }

    #[test]
    fn test_quad_has_borders() {
        let shape = WxShape::from_triangle_mesh(ShapeId(0), &primitives::quad(0.0, 1.0)).unwrap();
        let borders = (0..shape.edges.len())
            .filter(|&e| shape.is_border(EdgeId(e as u32)))
            .count();
        assert_eq!(borders, 4);
    }

    #[test]
    fn test_out_of_range_index() {
        let mut mesh = TriangleMesh::new("bad");
        mesh.push_vertex(0.0, 0.0, 0.0);
        mesh.push_triangle(0, 1, 2, 0);
        let err = WxShape::from_triangle_mesh(ShapeId(0), &mesh).unwrap_err();
        assert!(matches!(err, MeshError::IndexOutOfRange { index: 1, .. }));
    }

    #[test]
    fn test_repeated_vertex_skipped() {
        let mut mesh = TriangleMesh::new("deg");
        let a = mesh.push_vertex(0.0, 0.0, 0.0);
        let b = mesh.push_vertex(1.0, 0.0, 0.0);
        let c = mesh.push_vertex(0.0, 1.0, 0.0);
        mesh.push_triangle(a, b, b, 0);
        mesh.push_triangle(a, b, c, 0);
        let shape = WxShape::from_triangle_mesh(ShapeId(0), &mesh).unwrap();
        assert_eq!(shape.faces.len(), 1);
    }

    #[test]
    fn test_edge_sizes() {
        let mesh = WingedEdgeMesh::from_triangle_meshes(&[primitives::cube(2.0)]).unwrap();
        assert!((mesh.min_edge_size() - 2.0).abs() < 1e-12);
        assert!(mesh.mean_edge_size() > 2.0);
        assert_eq!(mesh.num_faces(), 12);
        assert!(WingedEdgeMesh::new().is_empty());
        assert_eq!(WingedEdgeMesh::new().min_edge_size(), 0.0);
    }
}
