#![warn(missing_docs)]

//! Spatial acceleration for view-map visibility.
//!
//! - [`SpatialGrid`]: uniform 3D grid of scene triangles, walked cell by
//!   cell along a line of sight.
//! - [`ImageGrid`]: the same triangles bucketed by their projection, for
//!   resolvers that query one image point at a time.
//! - [`Ray`]: ray with slab clipping against boxes.
//!
//! Both grids are immutable during queries; each query carries its own
//! [`RayScratch`] so an occluder is tested once even when it spans many
//! cells.

mod grid;
mod image_grid;
mod ray;

pub use grid::{SpatialGrid, MAX_CELLS};
pub use image_grid::ImageGrid;
pub use ray::Ray;

use vmap_math::{Point3, Vec3};
use vmap_winged::FaceRef;

/// A scene triangle that can hide feature lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occluder {
    /// Mesh face the triangle comes from.
    pub face: FaceRef,
    /// Corner positions.
    pub vertices: [Point3; 3],
    /// Unit face normal.
    pub normal: Vec3,
}

/// Per-query visit stamps ("mailboxes").
///
/// Each query bumps `current`; an occluder is reported only if its stamp
/// differs, then its stamp is set.
#[derive(Debug, Clone, Default)]
pub struct RayScratch {
    stamps: Vec<u32>,
    current: u32,
}

impl RayScratch {
    /// Empty scratch space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new query over `n` occluders.
    pub fn begin(&mut self, n: usize) {
        if self.stamps.len() < n {
            self.stamps.resize(n, 0);
        }
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.stamps.fill(0);
            self.current = 1;
        }
    }

    /// Mark occluder `i` visited; returns `false` if it already was
    /// during this query.
    pub fn mark(&mut self, i: u32) -> bool {
        let slot = &mut self.stamps[i as usize];
        if *slot == self.current {
            false
        } else {
            *slot = self.current;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_marks_once_per_query() {
        let mut scratch = RayScratch::new();
        scratch.begin(3);
        assert!(scratch.mark(1));
        assert!(!scratch.mark(1));
        scratch.begin(3);
        assert!(scratch.mark(1), "a new query resets the marks");
    }
}
