#![warn(missing_docs)]

//! Steerable view map: line density by direction and scale.
//!
//! The visible feature edges of a [`vmap::ViewMap`] are drawn into one
//! image per orientation bin plus one holding every line, and each image
//! is wrapped in a [`GaussianPyramid`]. Stylization code can then ask how
//! many lines of roughly a given direction pass near a pixel, at any
//! scale.

mod image;
mod pyramid;
mod steerable;

pub use image::GrayImage;
pub use pyramid::GaussianPyramid;
pub use steerable::{SteerableViewMap, DEFAULT_NB_ORIENTATIONS, ENCODING};

use thiserror::Error;

/// Errors from building a steerable view map.
#[derive(Debug, Error)]
pub enum SteerableError {
    /// The number of images does not match the orientation bins.
    #[error("expected {expected} orientation images, got {got}")]
    ImageCount {
        /// Bins plus the complete bin.
        expected: usize,
        /// Images supplied.
        got: usize,
    },
}

/// Result type for steerable view-map operations.
pub type Result<T> = std::result::Result<T, SteerableError>;
