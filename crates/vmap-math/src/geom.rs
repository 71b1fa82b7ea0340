//! Geometric predicates shared by the grid, the detector and the
//! visibility resolver.

use crate::{Point2, Point3, Vec3};

/// Determinant below which a ray is treated as parallel to a triangle.
const PARALLEL_EPS: f64 = 1e-14;

/// Intersect a ray with a triangle (Möller-Trumbore).
///
/// Returns the ray parameter `t` of the hit, measured in multiples of
/// `dir`. `border_eps` is a barycentric margin: positive values reject
/// hits on or near the triangle border, negative values accept hits
/// slightly outside it. Rays parallel to the triangle never hit.
pub fn ray_triangle(
    origin: &Point3,
    dir: &Vec3,
    v0: &Point3,
    v1: &Point3,
    v2: &Point3,
    border_eps: f64,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = dir.cross(&edge2);
    let a = edge1.dot(&h);
    let scale = edge1.norm() * edge2.norm() * dir.norm();
    if a.abs() <= PARALLEL_EPS * scale.max(f64::MIN_POSITIVE) {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if u <= border_eps || u >= 1.0 - border_eps {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);
    if v <= border_eps || u + v >= 1.0 - border_eps {
        return None;
    }

    Some(f * edge2.dot(&q))
}

/// Separating-axis test between a triangle and an axis-aligned box
/// given by its center and half extents.
pub fn triangle_box_overlap(
    center: &Point3,
    half: &Vec3,
    v0: &Point3,
    v1: &Point3,
    v2: &Point3,
) -> bool {
    let a = v0 - center;
    let b = v1 - center;
    let c = v2 - center;
    let edges = [b - a, c - b, a - c];

    // Nine cross-product axes.
    for e in &edges {
        for axis in [
            Vec3::new(0.0, -e.z, e.y),
            Vec3::new(e.z, 0.0, -e.x),
            Vec3::new(-e.y, e.x, 0.0),
        ] {
            if separated(&axis, &a, &b, &c, half) {
                return false;
            }
        }
    }

    // Box face normals.
    for i in 0..3 {
        let lo = a[i].min(b[i]).min(c[i]);
        let hi = a[i].max(b[i]).max(c[i]);
        if lo > half[i] || hi < -half[i] {
            return false;
        }
    }

    // Triangle plane.
    let normal = edges[0].cross(&edges[1]);
    !separated(&normal, &a, &b, &c, half)
}

fn separated(axis: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3, half: &Vec3) -> bool {
    if axis.norm_squared() < 1e-30 {
        return false;
    }
    let pa = axis.dot(a);
    let pb = axis.dot(b);
    let pc = axis.dot(c);
    let r = half.x * axis.x.abs() + half.y * axis.y.abs() + half.z * axis.z.abs();
    pa.min(pb).min(pc) > r || pa.max(pb).max(pc) < -r
}

/// Intersection of two 2D segments `[a0, a1]` and `[b0, b1]`.
///
/// Returns the parameters `(t, u)` of the crossing along each segment,
/// both in `[0, 1]`. Parallel and collinear segments yield `None`.
pub fn segment_intersection_2d(
    a0: &Point2,
    a1: &Point2,
    b0: &Point2,
    b1: &Point2,
) -> Option<(f64, f64)> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = r.perp(&s);
    if denom.abs() <= 1e-12 * r.norm() * s.norm() || denom == 0.0 {
        return None;
    }
    let qp = b0 - a0;
    let t = qp.perp(&s) / denom;
    let u = qp.perp(&r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((t, u))
    } else {
        None
    }
}

/// Distance from `p` to the 2D segment `[a, b]`.
pub fn point_segment_distance_2d(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Area of the triangle `(a, b, c)`.
pub fn triangle_area(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Unit normal of the counter-clockwise triangle `(a, b, c)`, or `None`
/// for a degenerate triangle.
pub fn triangle_normal(a: &Point3, b: &Point3, c: &Point3) -> Option<Vec3> {
    crate::try_normalize(&(b - a).cross(&(c - a)))
}

/// Gradient of the linear function taking values `f` at the corners of
/// the triangle `p`. The result lies in the triangle's plane.
pub fn face_gradient(p: [&Point3; 3], f: [f64; 3]) -> Option<Vec3> {
    let cross = (p[1] - p[0]).cross(&(p[2] - p[0]));
    let twice_area = cross.norm();
    if twice_area < 1e-300 {
        return None;
    }
    let n = cross / twice_area;
    let g = n.cross(&(p[2] - p[1])) * f[0]
        + n.cross(&(p[0] - p[2])) * f[1]
        + n.cross(&(p[1] - p[0])) * f[2];
    Some(g / twice_area)
}

/// Parameter in `[0, 1]` where the linear interpolation between `f0` and
/// `f1` changes sign. Zero counts as positive.
pub fn zero_crossing(f0: f64, f1: f64) -> Option<f64> {
    if (f0 >= 0.0) == (f1 >= 0.0) {
        return None;
    }
    let denom = f0 - f1;
    if denom == 0.0 {
        return None;
    }
    Some((f0 / denom).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> [Point3; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_ray_triangle_hit() {
        let [a, b, c] = unit_triangle();
        let t = ray_triangle(
            &Point3::new(0.25, 0.25, 2.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &a,
            &b,
            &c,
            1e-9,
        );
        assert_relative_eq!(t.unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_triangle_grazing_edge_rejected() {
        let [a, b, c] = unit_triangle();
        let hit = ray_triangle(
            &Point3::new(0.5, 0.0, 1.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &a,
            &b,
            &c,
            1e-9,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_ray_triangle_inclusive_border() {
        let [a, b, c] = unit_triangle();
        let hit = ray_triangle(
            &Point3::new(0.5, 0.0, 1.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &a,
            &b,
            &c,
            -1e-9,
        );
        assert!(hit.is_some());
    }

    #[test]
    fn test_ray_triangle_parallel() {
        let [a, b, c] = unit_triangle();
        let hit = ray_triangle(
            &Point3::new(0.2, 0.2, 1.0),
            &Vec3::new(1.0, 0.0, 0.0),
            &a,
            &b,
            &c,
            0.0,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_triangle_box_overlap() {
        let [a, b, c] = unit_triangle();
        let half = Vec3::new(0.1, 0.1, 0.1);
        assert!(triangle_box_overlap(&Point3::new(0.2, 0.2, 0.0), &half, &a, &b, &c));
        // Above the plane.
        assert!(!triangle_box_overlap(&Point3::new(0.2, 0.2, 0.5), &half, &a, &b, &c));
        // Beyond the hypotenuse.
        assert!(!triangle_box_overlap(&Point3::new(0.9, 0.9, 0.0), &half, &a, &b, &c));
    }

    #[test]
    fn test_segment_intersection_2d() {
        let hit = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(2.0, 2.0),
            &Point2::new(0.0, 2.0),
            &Point2::new(2.0, 0.0),
        );
        let (t, u) = hit.unwrap();
        assert_relative_eq!(t, 0.5);
        assert_relative_eq!(u, 0.5);

        let parallel = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 0.0),
            &Point2::new(0.0, 1.0),
            &Point2::new(1.0, 1.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_point_segment_distance() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(4.0, 0.0);
        assert_relative_eq!(point_segment_distance_2d(&Point2::new(2.0, 3.0), &a, &b), 3.0);
        assert_relative_eq!(point_segment_distance_2d(&Point2::new(7.0, 4.0), &a, &b), 5.0);
    }

    #[test]
    fn test_face_gradient_of_linear_function() {
        let [a, b, c] = unit_triangle();
        // f(x, y) = 2x - 3y + 1
        let f = |p: &Point3| 2.0 * p.x - 3.0 * p.y + 1.0;
        let g = face_gradient([&a, &b, &c], [f(&a), f(&b), f(&c)]).unwrap();
        assert_relative_eq!(g, Vec3::new(2.0, -3.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_crossing() {
        assert_relative_eq!(zero_crossing(1.0, -3.0).unwrap(), 0.25);
        assert!(zero_crossing(0.0, 2.0).is_none());
        assert_relative_eq!(zero_crossing(-1.0, 0.0).unwrap(), 1.0);
    }
}
