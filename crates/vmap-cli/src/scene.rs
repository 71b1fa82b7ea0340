//! Built-in demo scenes and the camera framing them.

use clap::ValueEnum;
use vmap_math::{Aabb3, Camera, Point3, Vec3, Viewport};
use vmap_winged::{primitives, TriangleMesh};

/// Demo scenes available from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scene {
    /// A unit cube.
    Cube,
    /// Three overlapping smooth spheres.
    Spheres,
    /// A smooth torus.
    Torus,
    /// A quad under a stack of three wide planes.
    Stack,
    /// A wavy smooth height field.
    Terrain,
}

impl Scene {
    /// Triangle meshes of the scene, one per shape.
    pub fn meshes(self) -> Vec<TriangleMesh> {
        match self {
            Scene::Cube => vec![primitives::cube(1.0)],
            Scene::Spheres => vec![
                primitives::uv_sphere([0.0, 0.0, 0.0], 1.0, 32, 16),
                primitives::uv_sphere([1.2, 0.3, -0.8], 0.8, 32, 16),
                primitives::uv_sphere([-1.0, 0.6, 0.9], 0.5, 24, 12),
            ],
            Scene::Torus => vec![primitives::torus(1.0, 0.35, 48, 24)],
            Scene::Stack => {
                let mut meshes = vec![primitives::quad(0.0, 1.0)];
                meshes.extend((1..=3).map(|z| primitives::rect([-3.0, -3.0], [3.0, 3.0], f64::from(z))));
                meshes
            }
            Scene::Terrain => vec![primitives::heightfield(48, 4.0, |x, y| {
                0.3 * (1.7 * x).sin() * (1.3 * y).cos()
            })],
        }
    }
}

/// Perspective camera looking at the centre of `bbox`, from `eye` or from
/// a default three-quarter position outside the box.
pub fn frame(bbox: &Aabb3, eye: Option<[f64; 3]>, fov_degrees: f64, width: i32, height: i32) -> Camera {
    let (center, radius) = if bbox.is_valid() {
        (bbox.center(), (bbox.size().norm() * 0.5).max(1e-3))
    } else {
        (Point3::origin(), 1.0)
    };
    let eye = match eye {
        Some(e) => Point3::from(e),
        None => center + Vec3::new(0.6, 0.8, 1.6).normalize() * radius * 3.0,
    };
    let dist = (eye - center).norm().max(1e-3);
    let up = if (eye - center).cross(&Vec3::y()).norm() < 1e-9 * dist {
        Vec3::z()
    } else {
        Vec3::y()
    };
    Camera::perspective(
        eye,
        center,
        up,
        fov_degrees.to_radians(),
        (dist - radius).max(dist * 1e-3),
        dist + radius * 2.0,
        Viewport::new(width, height),
    )
}
