//! Normal-cycle curvature estimation.
//!
//! The curvature tensor at a vertex averages `β(e) · |e| · ê êᵀ` over the
//! edges of a geodesic-ish neighbourhood, divided by the neighbourhood's
//! barycentric area. `β(e)` is the signed dihedral angle at `e`, positive
//! where the surface is convex. Bending across an edge shows up along the
//! edge direction, so the eigenvector of the larger eigenvalue is the
//! direction of *minimum* curvature and vice versa.

use std::collections::VecDeque;

use fxhash::FxHashSet;
use nalgebra::SymmetricEigen;
use vmap_math::{Mat3, Vec3};
use vmap_winged::{CurvatureInfo, EdgeId, VertexId, WxShape};

/// Signed dihedral angle at an edge, zero on borders and next to
/// degenerate faces.
pub fn signed_dihedral(shape: &WxShape, edge: EdgeId) -> f64 {
    let (f0, f1) = shape.edge_faces(edge);
    let Some(f1) = f1 else {
        return 0.0;
    };
    let a = shape.face(f0);
    let b = shape.face(f1);
    if a.is_degenerate() || b.is_degenerate() {
        return 0.0;
    }
    let angle = a.normal.dot(&b.normal).clamp(-1.0, 1.0).acos();

    let e = shape.edge(edge);
    let opposite = b
        .vertices
        .iter()
        .copied()
        .find(|&v| v != e.a && v != e.b)
        .unwrap_or(e.a);
    let origin = shape.vertex(e.a).position;
    let height = a.normal.dot(&(shape.vertex(opposite).position - origin));
    if height <= 0.0 {
        angle
    } else {
        -angle
    }
}

/// Vertices within `radius` of `center`, always including its one-ring.
fn neighbourhood(shape: &WxShape, center: VertexId, radius: f64) -> FxHashSet<VertexId> {
    let origin = shape.vertex(center).position;
    let mut set = FxHashSet::default();
    set.insert(center);
    let mut queue = VecDeque::new();

    for &e in &shape.vertex(center).edges {
        let n = shape.other_vertex(e, center);
        if set.insert(n) {
            queue.push_back(n);
        }
    }
    while let Some(v) = queue.pop_front() {
        for &e in &shape.vertex(v).edges {
            let n = shape.other_vertex(e, v);
            if set.contains(&n) {
                continue;
            }
            if (shape.vertex(n).position - origin).norm() <= radius {
                set.insert(n);
                queue.push_back(n);
            }
        }
    }
    set
}

/// Estimate principal curvatures at one vertex.
///
/// Returns `None` for isolated vertices, vertices with no surrounding
/// area, or a singular local frame.
pub fn vertex_curvature(
    shape: &WxShape,
    dihedral: &[f64],
    v: VertexId,
    radius: f64,
) -> Option<CurvatureInfo> {
    let normal = shape.vertex(v).normal;
    if normal == Vec3::zeros() {
        return None;
    }
    let region = neighbourhood(shape, v, radius);

    let mut area = 0.0;
    let mut tensor = Mat3::zeros();
    let mut edges: FxHashSet<EdgeId> = FxHashSet::default();
    for &u in &region {
        for f in shape.vertex_faces(u) {
            area += shape.face(f).area / 3.0;
        }
        edges.extend(shape.vertex(u).edges.iter().copied());
    }
    if area <= 0.0 {
        return None;
    }

    for e in edges {
        let edge = shape.edge(e);
        let inside = usize::from(region.contains(&edge.a)) + usize::from(region.contains(&edge.b));
        let d = shape.vertex(edge.b).position - shape.vertex(edge.a).position;
        let len = d.norm();
        if len == 0.0 {
            continue;
        }
        let dir = d / len;
        let weight = dihedral[e.index()] * len * inside as f64 * 0.5;
        tensor += dir * dir.transpose() * weight;
    }
    tensor /= area;

    let eigen = SymmetricEigen::new(tensor);
    // The eigenvector most aligned with the normal carries no curvature.
    let normal_axis = (0..3)
        .max_by(|&i, &j| {
            let ai = eigen.eigenvectors.column(i).dot(&normal).abs();
            let aj = eigen.eigenvectors.column(j).dot(&normal).abs();
            ai.total_cmp(&aj)
        })
        .unwrap_or(0);
    let mut tangent: Vec<usize> = (0..3).filter(|&i| i != normal_axis).collect();
    tangent.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));
    let (big, small) = (tangent[0], tangent[1]);

    let project = |i: usize| {
        let c: Vec3 = eigen.eigenvectors.column(i).into_owned();
        vmap_math::try_normalize(&(c - normal * c.dot(&normal)))
    };
    let e1 = project(small)?;
    let e2 = project(big)?;
    Some(CurvatureInfo {
        k1: eigen.eigenvalues[big],
        k2: eigen.eigenvalues[small],
        e1,
        e2,
    })
}

/// Estimate curvature at every vertex of `shape`, storing the result on
/// the vertices.
pub fn compute_curvatures(shape: &mut WxShape, radius: f64) -> usize {
    let dihedral: Vec<f64> = (0..shape.edges.len())
        .map(|e| signed_dihedral(shape, EdgeId(e as u32)))
        .collect();
    let infos: Vec<Option<CurvatureInfo>> = (0..shape.vertices.len())
        .map(|v| vertex_curvature(shape, &dihedral, VertexId(v as u32), radius))
        .collect();
    let mut count = 0;
    for (vertex, info) in shape.vertices.iter_mut().zip(infos) {
        count += usize::from(info.is_some());
        vertex.curvature = info;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmap_winged::{primitives, ShapeId};

    #[test]
    fn test_cube_edges_are_convex() {
        let shape = WxShape::from_triangle_mesh(ShapeId(0), &primitives::cube(1.0)).unwrap();
        for e in 0..shape.edges.len() {
            let beta = signed_dihedral(&shape, EdgeId(e as u32));
            assert!(beta >= -1e-12, "cube edge {e} reported concave: {beta}");
        }
        let sharp = (0..shape.edges.len())
            .filter(|&e| signed_dihedral(&shape, EdgeId(e as u32)) > 1.5)
            .count();
        assert_eq!(sharp, 12);
    }

    #[test]
    fn test_sphere_curvature() {
        let mut shape =
            WxShape::from_triangle_mesh(ShapeId(0), &primitives::uv_sphere([0.0; 3], 2.0, 32, 16))
                .unwrap();
        compute_curvatures(&mut shape, 0.5);
        // Vertex on the equator ring.
        let v = 1 + 7 * 32;
        let info = shape.vertices[v].curvature.unwrap();
        let mean = 0.5 * (info.k1 + info.k2);
        assert!((mean - 0.5).abs() < 0.1, "mean curvature {mean}");
        assert!(info.k1 >= info.k2);
        assert!(info.k2 > 0.0, "sphere is convex everywhere");
    }

    #[test]
    fn test_flat_patch_has_zero_curvature() {
        let mut shape =
            WxShape::from_triangle_mesh(ShapeId(0), &primitives::heightfield(6, 1.0, |_, _| 0.0))
                .unwrap();
        compute_curvatures(&mut shape, 0.3);
        for v in &shape.vertices {
            let info = v.curvature.unwrap();
            assert!(info.k1.abs() < 1e-9 && info.k2.abs() < 1e-9);
        }
    }
}
