//! Indexed triangle soup accepted as view-map input.

use serde::{Deserialize, Serialize};

/// An indexed triangle mesh describing one scene shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Shape name, carried into the view map.
    pub name: String,
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]`.
    pub vertices: Vec<f64>,
    /// Flat array of counter-clockwise triangle indices: `[i0, i1, i2, ...]`.
    pub indices: Vec<u32>,
    /// Material index per triangle. Empty means material 0 everywhere.
    pub materials: Vec<u32>,
    /// Whether the surface approximates a smooth object, enabling
    /// in-face smooth feature lines.
    pub smooth: bool,
}

impl TriangleMesh {
    /// Create an empty named mesh.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Material of triangle `i`.
    pub fn material(&self, i: usize) -> u32 {
        self.materials.get(i).copied().unwrap_or(0)
    }

    /// Append a vertex, returning its index.
    pub fn push_vertex(&mut self, x: f64, y: f64, z: f64) -> u32 {
        let idx = self.num_vertices() as u32;
        self.vertices.extend_from_slice(&[x, y, z]);
        idx
    }

    /// Append a triangle with the given material.
    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32, material: u32) {
        if self.materials.len() < self.num_triangles() {
            self.materials.resize(self.num_triangles(), 0);
        }
        self.indices.extend_from_slice(&[a, b, c]);
        self.materials.push(material);
    }

    /// Merge another mesh into this one.
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.num_vertices() as u32;
        let own_tris = self.num_triangles();
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|&i| i + offset));
        if !self.materials.is_empty() || !other.materials.is_empty() {
            self.materials.resize(own_tris, 0);
            self.materials
                .extend((0..other.num_triangles()).map(|i| other.material(i)));
        }
    }

    /// Apply a translation to every vertex.
    pub fn translate(&mut self, dx: f64, dy: f64, dz: f64) {
        for v in self.vertices.chunks_exact_mut(3) {
            v[0] += dx;
            v[1] += dy;
            v[2] += dz;
        }
    }

    /// Assign one material to every triangle.
    pub fn with_material(mut self, material: u32) -> Self {
        self.materials = vec![material; self.num_triangles()];
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(name: &str) -> TriangleMesh {
        let mut mesh = TriangleMesh::new(name);
        let a = mesh.push_vertex(0.0, 0.0, 0.0);
        let b = mesh.push_vertex(1.0, 0.0, 0.0);
        let c = mesh.push_vertex(0.0, 1.0, 0.0);
        mesh.push_triangle(a, b, c, 3);
        mesh
    }

    #[test]
    fn test_counts() {
        let mesh = triangle("t");
        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_triangles(), 1);
        assert_eq!(mesh.material(0), 3);
        assert_eq!(mesh.material(7), 0);
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut a = triangle("a");
        let b = triangle("b").with_material(5);
        a.merge(&b);
        assert_eq!(a.num_triangles(), 2);
        assert_eq!(&a.indices[3..], &[3, 4, 5]);
        assert_eq!(a.materials, vec![3, 5]);
    }
}
