//! View-map configuration, loadable from TOML.

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use vmap_features::FeatureConfig;

use crate::{Result, ViewMapError, VisibilityAlgorithm};

/// Everything that controls one view-map computation.
///
/// ```toml
/// visibility = "ray_casting_culled_adaptive_cumulative"
/// cull_margin = 0.1
///
/// [features]
/// crease_angle = 120.0
/// suggestive_contours = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewMapConfig {
    /// Feature categories and detector thresholds.
    pub features: FeatureConfig,
    /// Visibility algorithm used to assign quantitative invisibility.
    pub visibility: VisibilityAlgorithm,
    /// Reuse the previous view map when the scene hash is unchanged.
    pub cache: bool,
    /// Extra border around the viewport for culled algorithms, as a
    /// fraction of the larger viewport side.
    pub cull_margin: f64,
    /// Spatial grid cells per scene face.
    pub grid_density: f64,
    /// Occluders per image cell above which adaptive algorithms sample
    /// an edge more than once.
    pub adaptive_threshold: usize,
}

impl Default for ViewMapConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            visibility: VisibilityAlgorithm::default(),
            cache: true,
            cull_margin: 0.05,
            grid_density: 1.0,
            adaptive_threshold: 32,
        }
    }
}

impl ViewMapConfig {
    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config.sanitized())
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values that cannot be repaired by clamping.
    fn validate(&self) -> Result<()> {
        if self.grid_density.is_nan() {
            return Err(ViewMapError::InvalidConfig(
                "grid_density must be a number".to_string(),
            ));
        }
        if self.cull_margin.is_nan() {
            return Err(ViewMapError::InvalidConfig(
                "cull_margin must be a number".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with out-of-range values clamped (each logged).
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.features = out.features.sanitized();
        if !(out.cull_margin >= 0.0 && out.cull_margin.is_finite()) {
            warn!("cull margin {} is invalid, using 0.0", out.cull_margin);
            out.cull_margin = 0.0;
        }
        if !(out.grid_density > 0.0 && out.grid_density.is_finite()) {
            warn!("grid density {} is not positive, using 1.0", out.grid_density);
            out.grid_density = 1.0;
        }
        if out.adaptive_threshold == 0 {
            warn!("adaptive threshold 0 would resample every edge, using 1");
            out.adaptive_threshold = 1;
        }
        out
    }
}
