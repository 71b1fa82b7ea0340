//! Ray representation and ray/box clipping.

use vmap_math::{Aabb3, Dir3, Point3, Vec3};

/// A ray in 3D space defined by origin and direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Point3,
    /// Unit direction of the ray.
    pub direction: Dir3,
    /// Precomputed reciprocal of direction components for fast AABB tests.
    inv_direction: Vec3,
    /// Sign of direction components (0 if positive, 1 if negative).
    sign: [usize; 3],
}

impl Ray {
    /// Create a new ray from origin and direction.
    ///
    /// Returns `None` when `direction` is too short to normalize.
    pub fn new(origin: Point3, direction: Vec3) -> Option<Self> {
        let dir = Dir3::try_new(direction, 1e-12)?;
        let inv = Vec3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let sign = [
            usize::from(inv.x < 0.0),
            usize::from(inv.y < 0.0),
            usize::from(inv.z < 0.0),
        ];
        Some(Self {
            origin,
            direction: dir,
            inv_direction: inv,
            sign,
        })
    }

    /// Ray from `from` toward `to`, with the distance between them.
    pub fn between(from: Point3, to: Point3) -> Option<(Self, f64)> {
        let d = to - from;
        let len = d.norm();
        Self::new(from, d).map(|r| (r, len))
    }

    /// Evaluate the ray at parameter `t`: `origin + t * direction`.
    #[inline]
    pub fn at(&self, t: f64) -> Point3 {
        self.origin + t * self.direction.as_ref()
    }

    /// Test ray-AABB intersection using the slab method.
    ///
    /// Returns `Some((t_min, t_max))` with the entry parameter clamped to
    /// zero, or `None` if the ray misses the box.
    #[inline]
    pub fn intersect_aabb(&self, aabb: &Aabb3) -> Option<(f64, f64)> {
        let bounds = [aabb.min, aabb.max];
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;

        for axis in 0..3 {
            if self.direction[axis] == 0.0 {
                // Parallel to the slab: inside or never.
                if self.origin[axis] < aabb.min[axis] || self.origin[axis] > aabb.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (bounds[self.sign[axis]][axis] - self.origin[axis]) * self.inv_direction[axis];
            let t2 =
                (bounds[1 - self.sign[axis]][axis] - self.origin[axis]) * self.inv_direction[axis];
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
        }

        if t_max >= t_min && t_max >= 0.0 {
            Some((t_min.max(0.0), t_max))
        } else {
            None
        }
    }
}
