//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

use crate::{Point3, Vec3};

/// A 3D axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create a box from two corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// An empty box that any `include_point` call will replace.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Bounding box of a set of points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.include_point(p);
        }
        bbox
    }

    /// Grow the box to contain `p`.
    pub fn include_point(&mut self, p: &Point3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow the box to contain `other`.
    pub fn include_box(&mut self, other: &Aabb3) {
        if other.is_valid() {
            self.include_point(&other.min);
            self.include_point(&other.max);
        }
    }

    /// Whether the box contains at least one point.
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Extent along each axis (zero for an empty box).
    pub fn size(&self) -> Vec3 {
        if self.is_valid() {
            self.max - self.min
        } else {
            Vec3::zeros()
        }
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Whether two boxes overlap (touching counts).
    pub fn intersects(&self, other: &Aabb3) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `p` lies inside or on the box.
    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_is_invalid() {
        let bb = Aabb3::empty();
        assert!(!bb.is_valid());
        assert_eq!(bb.size(), Vec3::zeros());
    }

    #[test]
    fn test_include_points() {
        let bb = Aabb3::from_points(&[Point3::new(1.0, -2.0, 0.0), Point3::new(-1.0, 2.0, 3.0)]);
        assert!(bb.is_valid());
        assert!((bb.size() - Vec3::new(2.0, 4.0, 3.0)).norm() < 1e-12);
        assert!(bb.contains(&Point3::new(0.0, 0.0, 1.5)));
        assert!(!bb.contains(&Point3::new(0.0, 0.0, 3.5)));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb3::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb3::new(Point3::new(1.0, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
        let c = Aabb3::new(Point3::new(1.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
