//! Camera model: world-to-image projection for one viewpoint.

use log::warn;
use nalgebra::{Rotation3, UnitQuaternion, Vector4};
use serde::{Deserialize, Serialize};

use crate::{Mat3, Mat4, Point3, Vec3};

/// Smallest clip-space `w` accepted before a point is treated as lying
/// on the eye plane.
const MIN_CLIP_W: f64 = 1e-9;

/// Pixel rectangle the normalized device coordinates are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: i32,
    /// Bottom edge in pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Viewport {
    /// Viewport anchored at the origin.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Whether the 2D point lies inside the viewport grown by
    /// `margin` (a fraction of the larger viewport side) on every side.
    pub fn contains_with_margin(&self, x: f64, y: f64, margin: f64) -> bool {
        let pad = margin * f64::from(self.width.max(self.height));
        x >= f64::from(self.x) - pad
            && x <= f64::from(self.x + self.width) + pad
            && y >= f64::from(self.y) - pad
            && y <= f64::from(self.y + self.height) + pad
    }

    /// Whether the 2D rectangle `[min, max]` overlaps the viewport grown
    /// by `margin`.
    pub fn overlaps_with_margin(&self, min: (f64, f64), max: (f64, f64), margin: f64) -> bool {
        let pad = margin * f64::from(self.width.max(self.height));
        max.0 >= f64::from(self.x) - pad
            && min.0 <= f64::from(self.x + self.width) + pad
            && max.1 >= f64::from(self.y) - pad
            && min.1 <= f64::from(self.y + self.height) + pad
    }
}

/// Compact camera record stored alongside a serialized view map.
///
/// Position plus orientation quaternion `(i, j, k, w)`, single precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraSnapshot {
    /// Viewpoint in world coordinates.
    pub position: [f32; 3],
    /// Camera-to-world rotation as a quaternion `(i, j, k, w)`.
    pub orientation: [f32; 4],
}

/// A pinhole or orthographic camera.
///
/// Stores the OpenGL-style model-view and projection matrices together
/// with the viewport, and derives the viewpoint, the view direction and
/// the focal length from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    model_view: Mat4,
    projection: Mat4,
    inverse_model_view: Mat4,
    viewport: Viewport,
    fovy: f64,
    znear: f64,
    zfar: f64,
    orthographic: bool,
}

impl Camera {
    /// Build a camera from raw matrices.
    ///
    /// A singular model-view matrix is not rejected; the derived
    /// viewpoint then falls back to the origin.
    pub fn new(
        model_view: Mat4,
        projection: Mat4,
        viewport: Viewport,
        fovy: f64,
        znear: f64,
        zfar: f64,
        orthographic: bool,
    ) -> Self {
        let inverse_model_view = model_view.try_inverse().unwrap_or_else(|| {
            warn!("model-view matrix is singular; using identity as its inverse");
            Mat4::identity()
        });
        Self {
            model_view,
            projection,
            inverse_model_view,
            viewport,
            fovy,
            znear,
            zfar,
            orthographic,
        }
    }

    /// Perspective camera at `eye` looking at `target`.
    ///
    /// `fovy` is the vertical field of view in radians; the aspect ratio
    /// comes from the viewport.
    pub fn perspective(
        eye: Point3,
        target: Point3,
        up: Vec3,
        fovy: f64,
        znear: f64,
        zfar: f64,
        viewport: Viewport,
    ) -> Self {
        let aspect = f64::from(viewport.width) / f64::from(viewport.height.max(1));
        let model_view = Mat4::look_at_rh(&eye, &target, &up);
        let projection = Mat4::new_perspective(aspect, fovy, znear, zfar);
        Self::new(model_view, projection, viewport, fovy, znear, zfar, false)
    }

    /// Orthographic camera at `eye` looking at `target`, showing
    /// `half_height` world units above and below the view axis.
    pub fn orthographic(
        eye: Point3,
        target: Point3,
        up: Vec3,
        half_height: f64,
        znear: f64,
        zfar: f64,
        viewport: Viewport,
    ) -> Self {
        let aspect = f64::from(viewport.width) / f64::from(viewport.height.max(1));
        let half_width = half_height * aspect;
        let model_view = Mat4::look_at_rh(&eye, &target, &up);
        let projection =
            Mat4::new_orthographic(-half_width, half_width, -half_height, half_height, znear, zfar);
        Self::new(model_view, projection, viewport, 0.0, znear, zfar, true)
    }

    /// The model-view matrix.
    pub fn model_view(&self) -> &Mat4 {
        &self.model_view
    }

    /// The projection matrix.
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// The viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Vertical field of view in radians (zero for orthographic cameras).
    pub fn fovy(&self) -> f64 {
        self.fovy
    }

    /// Near clipping distance.
    pub fn znear(&self) -> f64 {
        self.znear
    }

    /// Far clipping distance.
    pub fn zfar(&self) -> f64 {
        self.zfar
    }

    /// Whether this camera uses an orthographic projection.
    pub fn is_orthographic(&self) -> bool {
        self.orthographic
    }

    /// Viewport width over height.
    pub fn aspect(&self) -> f64 {
        f64::from(self.viewport.width) / f64::from(self.viewport.height.max(1))
    }

    /// Distance from the eye to the image plane, in pixels.
    pub fn focal(&self) -> f64 {
        if self.orthographic || self.fovy <= 0.0 {
            return f64::INFINITY;
        }
        f64::from(self.viewport.height) / (2.0 * (self.fovy / 2.0).tan())
    }

    /// Eye position in world coordinates.
    pub fn viewpoint(&self) -> Point3 {
        self.inverse_model_view.transform_point(&Point3::origin())
    }

    /// Unit vector along the viewing axis, pointing away from the eye.
    pub fn view_direction(&self) -> Vec3 {
        let forward = self.inverse_model_view.transform_vector(&-Vec3::z());
        forward.try_normalize(1e-12).unwrap_or_else(|| -Vec3::z())
    }

    /// Unit vector from `p` toward the viewer.
    ///
    /// Returns `None` when `p` coincides with the eye of a perspective
    /// camera.
    pub fn direction_to_viewer(&self, p: &Point3) -> Option<Vec3> {
        if self.orthographic {
            Some(-self.view_direction())
        } else {
            (self.viewpoint() - p).try_normalize(1e-12)
        }
    }

    /// Distance from `p` to the eye (infinite for orthographic cameras).
    pub fn distance_to_viewer(&self, p: &Point3) -> f64 {
        if self.orthographic {
            f64::INFINITY
        } else {
            (self.viewpoint() - p).norm()
        }
    }

    /// Homogeneous clip coordinates of a world point.
    fn clip(&self, p: &Point3) -> Vector4<f64> {
        self.projection * self.model_view * p.to_homogeneous()
    }

    /// Project a world point to image space.
    ///
    /// Returns `(x, y, depth)` with `x, y` in viewport pixels and `depth`
    /// in `[0, 1]` between the near and far planes. Points on or behind
    /// the eye plane are clamped to a tiny positive `w`.
    pub fn project(&self, p: &Point3) -> Point3 {
        let clip = self.clip(p);
        let w = if clip.w.abs() < MIN_CLIP_W {
            MIN_CLIP_W
        } else {
            clip.w.max(MIN_CLIP_W)
        };
        let ndc = clip.xyz() / w;
        let vp = &self.viewport;
        Point3::new(
            f64::from(vp.x) + f64::from(vp.width) * (ndc.x + 1.0) / 2.0,
            f64::from(vp.y) + f64::from(vp.height) * (ndc.y + 1.0) / 2.0,
            (ndc.z + 1.0) / 2.0,
        )
    }

    /// Whether `p` lies strictly in front of the eye plane.
    pub fn is_in_front(&self, p: &Point3) -> bool {
        self.clip(p).w > MIN_CLIP_W
    }

    /// Map a parameter along the projected segment `[a, b]` to the
    /// parameter of the same point along the 3D segment.
    ///
    /// Perspective projection is not affine along a segment, so a point
    /// at image-space parameter `t` generally sits at a different 3D
    /// parameter.
    pub fn image_to_world_parameter(&self, a: &Point3, b: &Point3, t: f64) -> f64 {
        if self.orthographic {
            return t;
        }
        let wa = self.clip(a).w;
        let wb = self.clip(b).w;
        let denom = (1.0 - t) * wb + t * wa;
        if denom.abs() < MIN_CLIP_W {
            return t;
        }
        (t * wa / denom).clamp(0.0, 1.0)
    }

    /// Position and orientation record used by serialization.
    pub fn snapshot(&self) -> CameraSnapshot {
        let eye = self.viewpoint();
        let rot: Mat3 = self.inverse_model_view.fixed_view::<3, 3>(0, 0).into_owned();
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
        let c = q.quaternion().coords;
        CameraSnapshot {
            position: [eye.x as f32, eye.y as f32, eye.z as f32],
            orientation: [c.x as f32, c.y as f32, c.z as f32, c.w as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_3;

    fn front_camera() -> Camera {
        Camera::perspective(
            Point3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            Vec3::y(),
            FRAC_PI_3,
            0.1,
            100.0,
            Viewport::new(640, 480),
        )
    }

    #[test]
    fn test_viewpoint_and_direction() {
        let cam = front_camera();
        assert!((cam.viewpoint() - Point3::new(0.0, 0.0, 5.0)).norm() < 1e-9);
        assert!((cam.view_direction() - (-Vec3::z())).norm() < 1e-9);
    }

    #[test]
    fn test_project_center() {
        let cam = front_camera();
        let p = cam.project(&Point3::origin());
        assert!((p.x - 320.0).abs() < 1e-9);
        assert!((p.y - 240.0).abs() < 1e-9);
        assert!(p.z > 0.0 && p.z < 1.0);
    }

    #[test]
    fn test_project_depth_ordering() {
        let cam = front_camera();
        let near = cam.project(&Point3::new(0.0, 0.0, 1.0));
        let far = cam.project(&Point3::new(0.0, 0.0, -1.0));
        assert!(near.z < far.z, "closer points must have smaller depth");
    }

    #[test]
    fn test_image_to_world_parameter_midpoint() {
        let cam = front_camera();
        // Segment receding from the camera: its projected midpoint is
        // closer to the near end in 3D than the 3D midpoint.
        let a = Point3::new(1.0, 0.0, 2.0);
        let b = Point3::new(1.0, 0.0, -4.0);
        let u = cam.image_to_world_parameter(&a, &b, 0.5);
        assert!(u < 0.5);
        let p3 = a + (b - a) * u;
        let pa = cam.project(&a);
        let pb = cam.project(&b);
        let p2 = cam.project(&p3);
        let mid = nalgebra::center(&pa, &pb);
        assert!((p2.x - mid.x).abs() < 1e-6);
        assert!((p2.y - mid.y).abs() < 1e-6);
    }

    #[test]
    fn test_orthographic_direction_is_constant() {
        let cam = Camera::orthographic(
            Point3::new(0.0, 0.0, 10.0),
            Point3::origin(),
            Vec3::y(),
            2.0,
            0.1,
            100.0,
            Viewport::new(100, 100),
        );
        let d1 = cam.direction_to_viewer(&Point3::new(5.0, 0.0, 0.0)).unwrap();
        let d2 = cam.direction_to_viewer(&Point3::new(-3.0, 1.0, 2.0)).unwrap();
        assert!((d1 - d2).norm() < 1e-12);
        assert!((d1 - Vec3::z()).norm() < 1e-9);
        assert_eq!(cam.image_to_world_parameter(&Point3::origin(), &Point3::new(1.0, 0.0, 0.0), 0.3), 0.3);
    }

    #[test]
    fn test_snapshot_identity_orientation() {
        let cam = front_camera();
        let snap = cam.snapshot();
        assert!((snap.position[2] - 5.0).abs() < 1e-5);
        // Looking down -Z with +Y up is the identity rotation.
        assert!((snap.orientation[3].abs() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_viewport_margin() {
        let vp = Viewport::new(100, 50);
        assert!(vp.contains_with_margin(50.0, 25.0, 0.0));
        assert!(!vp.contains_with_margin(104.0, 25.0, 0.0));
        assert!(vp.contains_with_margin(104.0, 25.0, 0.05));
    }
}
