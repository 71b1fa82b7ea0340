#![warn(missing_docs)]

//! Math types for the vmap view-map engine.
//!
//! Thin wrappers around nalgebra providing the types shared by every
//! stage of view-map construction: points, vectors, axis-aligned boxes,
//! the camera used to project the scene, the low-level geometric
//! predicates (ray/triangle, triangle/box, 2D segment crossing), and the
//! cooperative [`CancelToken`].

mod bbox;
mod camera;
mod cancel;
pub mod geom;

pub use bbox::Aabb3;
pub use camera::{Camera, CameraSnapshot, Viewport};
pub use cancel::CancelToken;

use nalgebra::{Matrix3, Matrix4, Unit, Vector2, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D image space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// A 3x3 matrix, used for curvature tensors.
pub type Mat3 = Matrix3<f64>;

/// A 4x4 homogeneous matrix (model-view and projection).
pub type Mat4 = Matrix4<f64>;

/// Relative factor between the smallest mesh edge and the scene epsilon.
pub const EPSILON_FACTOR: f64 = 1e-6;

/// Scene-wide numerical tolerance derived from the shortest mesh edge.
///
/// Returns `min_edge_size * 1e-6`, or exactly `0.0` when that product
/// falls below the smallest positive normal `f64`.
pub fn scene_epsilon(min_edge_size: f64) -> f64 {
    let eps = min_edge_size * EPSILON_FACTOR;
    if !eps.is_finite() || eps < f64::MIN_POSITIVE {
        0.0
    } else {
        eps
    }
}

/// Normalize `v`, returning `None` for vectors shorter than `1e-12`.
#[inline]
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    v.try_normalize(1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_epsilon_scales_with_edge() {
        let eps = scene_epsilon(0.5);
        assert!((eps - 0.5e-6).abs() < 1e-18);
    }

    #[test]
    fn test_scene_epsilon_floors_to_zero() {
        assert_eq!(scene_epsilon(0.0), 0.0);
        assert_eq!(scene_epsilon(1e-310), 0.0);
        assert_eq!(scene_epsilon(f64::NAN), 0.0);
    }

    #[test]
    fn test_try_normalize_rejects_zero() {
        assert!(try_normalize(&Vec3::zeros()).is_none());
        let n = try_normalize(&Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((n.norm() - 1.0).abs() < 1e-12);
    }
}
