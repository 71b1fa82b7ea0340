//! Procedural test meshes.
//!
//! All meshes are wound counter-clockwise seen from outside, so face
//! normals point away from the enclosed volume.

use std::f64::consts::{PI, TAU};

use crate::TriangleMesh;

/// Axis-aligned box spanning `min..max`.
pub fn cuboid(min: [f64; 3], max: [f64; 3]) -> TriangleMesh {
    let [x0, y0, z0] = min;
    let [x1, y1, z1] = max;
    #[rustfmt::skip]
    let vertices = vec![
        x0, y0, z0,
        x1, y0, z0,
        x1, y1, z0,
        x0, y1, z0,
        x0, y0, z1,
        x1, y0, z1,
        x1, y1, z1,
        x0, y1, z1,
    ];

    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1, 0, 3, 2,  // Bottom (-Z)
        4, 5, 6, 4, 6, 7,  // Top (+Z)
        0, 1, 5, 0, 5, 4,  // Front (-Y)
        2, 3, 7, 2, 7, 6,  // Back (+Y)
        0, 4, 7, 0, 7, 3,  // Left (-X)
        1, 2, 6, 1, 6, 5,  // Right (+X)
    ];

    TriangleMesh {
        name: "cube".to_string(),
        vertices,
        indices,
        materials: vec![0; 12],
        smooth: false,
    }
}

/// Cube spanning `[0, size]` on every axis.
pub fn cube(size: f64) -> TriangleMesh {
    cuboid([0.0; 3], [size; 3])
}

/// Rectangle in the plane `z = z`, facing `+Z`.
pub fn rect(min: [f64; 2], max: [f64; 2], z: f64) -> TriangleMesh {
    #[rustfmt::skip]
    let vertices = vec![
        min[0], min[1], z,
        max[0], min[1], z,
        max[0], max[1], z,
        min[0], max[1], z,
    ];
    TriangleMesh {
        name: "rect".to_string(),
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
        materials: vec![0; 2],
        smooth: false,
    }
}

/// Square of half-width `half_size` centered on the Z axis at height `z`.
pub fn quad(z: f64, half_size: f64) -> TriangleMesh {
    let mut mesh = rect([-half_size; 2], [half_size; 2], z);
    mesh.name = "quad".to_string();
    mesh
}

/// Latitude/longitude sphere flagged smooth.
pub fn uv_sphere(center: [f64; 3], radius: f64, slices: u32, stacks: u32) -> TriangleMesh {
    let slices = slices.max(3);
    let stacks = stacks.max(2);
    let mut mesh = TriangleMesh::new("sphere");
    mesh.smooth = true;

    let top = mesh.push_vertex(center[0], center[1], center[2] + radius);
    for i in 1..stacks {
        let theta = PI * f64::from(i) / f64::from(stacks);
        for j in 0..slices {
            let phi = TAU * f64::from(j) / f64::from(slices);
            mesh.push_vertex(
                center[0] + radius * theta.sin() * phi.cos(),
                center[1] + radius * theta.sin() * phi.sin(),
                center[2] + radius * theta.cos(),
            );
        }
    }
    let bottom = mesh.push_vertex(center[0], center[1], center[2] - radius);

    let ring = |i: u32, j: u32| 1 + (i - 1) * slices + (j % slices);
    for j in 0..slices {
        mesh.push_triangle(top, ring(1, j), ring(1, j + 1), 0);
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            let a0 = ring(i, j);
            let a1 = ring(i, j + 1);
            let b0 = ring(i + 1, j);
            let b1 = ring(i + 1, j + 1);
            mesh.push_triangle(a0, b0, b1, 0);
            mesh.push_triangle(a0, b1, a1, 0);
        }
    }
    for j in 0..slices {
        mesh.push_triangle(ring(stacks - 1, j), bottom, ring(stacks - 1, j + 1), 0);
    }
    mesh
}

/// Torus around the Z axis flagged smooth.
pub fn torus(major: f64, minor: f64, major_segments: u32, minor_segments: u32) -> TriangleMesh {
    let nu = major_segments.max(3);
    let nv = minor_segments.max(3);
    let mut mesh = TriangleMesh::new("torus");
    mesh.smooth = true;

    for i in 0..nu {
        let u = TAU * f64::from(i) / f64::from(nu);
        for j in 0..nv {
            let v = TAU * f64::from(j) / f64::from(nv);
            let r = major + minor * v.cos();
            mesh.push_vertex(r * u.cos(), r * u.sin(), minor * v.sin());
        }
    }

    let idx = |i: u32, j: u32| (i % nu) * nv + (j % nv);
    for i in 0..nu {
        for j in 0..nv {
            let p00 = idx(i, j);
            let p10 = idx(i + 1, j);
            let p11 = idx(i + 1, j + 1);
            let p01 = idx(i, j + 1);
            mesh.push_triangle(p00, p10, p11, 0);
            mesh.push_triangle(p00, p11, p01, 0);
        }
    }
    mesh
}

/// Open height field `z = f(x, y)` over `[0, size]²`, flagged smooth.
pub fn heightfield(
    resolution: u32,
    size: f64,
    f: impl Fn(f64, f64) -> f64,
) -> TriangleMesh {
    let n = resolution.max(1);
    let mut mesh = TriangleMesh::new("heightfield");
    mesh.smooth = true;

    let step = size / f64::from(n);
    for j in 0..=n {
        for i in 0..=n {
            let x = f64::from(i) * step;
            let y = f64::from(j) * step;
            mesh.push_vertex(x, y, f(x, y));
        }
    }

    let idx = |i: u32, j: u32| j * (n + 1) + i;
    for j in 0..n {
        for i in 0..n {
            mesh.push_triangle(idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), 0);
            mesh.push_triangle(idx(i, j), idx(i + 1, j + 1), idx(i, j + 1), 0);
        }
    }
    mesh
}
