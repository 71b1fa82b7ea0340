use log::warn;
use serde::{Deserialize, Serialize};

/// Settings controlling which feature lines are detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Dihedral threshold in degrees: an edge whose faces meet at an
    /// angle at most this large is a crease (180° is flat).
    pub crease_angle: f64,
    /// Radius, in scene units, of the neighbourhood used for curvature.
    pub sphere_radius: f64,
    /// Minimum derivative of radial curvature for suggestive contours.
    pub kr_derivative_epsilon: f64,
    /// Detect ridges and valleys.
    pub ridges_and_valleys: bool,
    /// Detect suggestive contours.
    pub suggestive_contours: bool,
    /// Detect material boundaries.
    pub material_boundaries: bool,
    /// Trace silhouettes inside faces of smooth shapes.
    pub face_smoothness: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            crease_angle: 134.43,
            sphere_radius: 1.0,
            kr_derivative_epsilon: 0.0,
            ridges_and_valleys: false,
            suggestive_contours: false,
            material_boundaries: false,
            face_smoothness: false,
        }
    }
}

impl FeatureConfig {
    /// Whether any option needs curvature estimates.
    pub fn needs_curvature(&self) -> bool {
        self.ridges_and_valleys || self.suggestive_contours
    }

    /// Copy with out-of-range values clamped (each logged).
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        if !(0.0..=180.0).contains(&out.crease_angle) || out.crease_angle.is_nan() {
            let clamped = if out.crease_angle.is_nan() {
                Self::default().crease_angle
            } else {
                out.crease_angle.clamp(0.0, 180.0)
            };
            warn!(
                "crease angle {} outside [0, 180], using {clamped}",
                out.crease_angle
            );
            out.crease_angle = clamped;
        }
        if !(out.sphere_radius > 0.0 && out.sphere_radius.is_finite()) {
            warn!("sphere radius {} is not positive, using 1.0", out.sphere_radius);
            out.sphere_radius = 1.0;
        }
        if !out.kr_derivative_epsilon.is_finite() {
            warn!("kr derivative epsilon is not finite, using 0.0");
            out.kr_derivative_epsilon = 0.0;
        }
        out
    }

    /// Cosine threshold of the crease test: faces whose normals have a
    /// dot product at most this value meet at a crease.
    pub fn crease_cosine(&self) -> f64 {
        (std::f64::consts::PI * (180.0 - self.crease_angle) / 180.0).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = FeatureConfig::default();
        assert!(!cfg.needs_curvature());
        // 90° cube edges are creases under the default threshold.
        assert!(0.0 <= cfg.crease_cosine());
        assert!(cfg.crease_cosine() < 0.71);
    }

    #[test]
    fn test_sanitize_clamps() {
        let cfg = FeatureConfig {
            crease_angle: 270.0,
            sphere_radius: -2.0,
            ..FeatureConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.crease_angle, 180.0);
        assert_eq!(cfg.sphere_radius, 1.0);
    }
}
