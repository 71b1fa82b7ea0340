#![warn(missing_docs)]

//! Feature-edge detection for the vmap view-map engine.
//!
//! [`FeatureEdgeDetector`] walks a [`vmap_winged::WingedEdgeMesh`] for one
//! viewpoint and flags:
//!
//! - sharp edges: `SILHOUETTE` (facing flips), `BORDER` (single face),
//!   `CREASE` (dihedral below the crease angle), `MATERIAL_BOUNDARY`;
//! - smooth lines inside faces of smooth shapes: silhouettes (zeros of
//!   `n · v`), suggestive contours (zeros of radial curvature), ridges and
//!   valleys (zeros of the curvature extremality).
//!
//! Curvature comes from a normal-cycle estimate, see [`curvature`].

mod config;
pub mod curvature;
mod detector;

pub use config::FeatureConfig;
pub use detector::{DetectionStats, FeatureEdgeDetector};
