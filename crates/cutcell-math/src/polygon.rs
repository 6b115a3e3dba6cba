//! Planar polygon helpers.
//!
//! All 2D routines work on counterclockwise loops in a [`crate::Plane`]
//! frame. Tolerances are absolute distances in the same units as the
//! coordinates.

use crate::{Point2, Point3, Vec3};

/// Newell normal of a (possibly slightly non-planar) polygon loop.
///
/// The length of the returned vector is twice the polygon area.
pub fn newell_normal(points: &[Point3]) -> Vec3 {
    let mut n = Vec3::zeros();
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

/// Vertex average of a point set.
pub fn centroid(points: &[Point3]) -> Point3 {
    let mut c = Vec3::zeros();
    for p in points {
        c += p.coords;
    }
    Point3::from(c / points.len().max(1) as f64)
}

/// Area of a planar 3D polygon loop.
pub fn area_3d(points: &[Point3]) -> f64 {
    newell_normal(points).norm() * 0.5
}

/// Signed area of a 2D loop (positive when counterclockwise).
pub fn signed_area_2d(points: &[Point2]) -> f64 {
    let mut a = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        a += p.x * q.y - q.x * p.y;
    }
    a * 0.5
}

/// 2D cross product of `(b - a) × (c - a)`.
pub fn orient_2d(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Convex hull of a 2D point set (Andrew's monotone chain).
///
/// Returns indices into `points` in counterclockwise order. Collinear
/// points on hull edges within `tol` of the edge line are dropped.
pub fn convex_hull_2d(points: &[Point2], tol: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| {
        points[i]
            .x
            .total_cmp(&points[j].x)
            .then(points[i].y.total_cmp(&points[j].y))
            .then(i.cmp(&j))
    });
    if order.len() < 3 {
        return order;
    }

    let turns_left = |hull: &[usize], k: usize| {
        let a = &points[hull[hull.len() - 2]];
        let b = &points[hull[hull.len() - 1]];
        let c = &points[k];
        let len = (c - a).norm().max(f64::MIN_POSITIVE);
        orient_2d(a, b, c) / len > tol
    };

    let mut lower: Vec<usize> = Vec::new();
    for &k in &order {
        while lower.len() >= 2 && !turns_left(&lower, k) {
            lower.pop();
        }
        lower.push(k);
    }
    let mut upper: Vec<usize> = Vec::new();
    for &k in order.iter().rev() {
        while upper.len() >= 2 && !turns_left(&upper, k) {
            upper.pop();
        }
        upper.push(k);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Whether a counterclockwise 2D loop is convex (collinear runs allowed).
pub fn is_convex_2d(points: &[Point2], tol: f64) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    (0..n).all(|i| {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        let c = &points[(i + 2) % n];
        orient_2d(a, b, c) >= -tol * (c - a).norm()
    })
}

/// Point-in-convex-polygon test with boundary tolerance.
///
/// `poly` must be counterclockwise. Points within `tol` of the boundary
/// count as inside.
pub fn point_in_convex_2d(p: &Point2, poly: &[Point2], tol: f64) -> bool {
    let n = poly.len();
    (0..n).all(|i| {
        let a = &poly[i];
        let b = &poly[(i + 1) % n];
        let len = (b - a).norm();
        if len <= f64::MIN_POSITIVE {
            return true;
        }
        orient_2d(a, b, p) / len >= -tol
    })
}

/// Even-odd point-in-polygon test for an arbitrary simple loop.
pub fn point_in_polygon_2d(p: &Point2, poly: &[Point2]) -> bool {
    let mut inside = false;
    let n = poly.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let a = &poly[i];
        let b = &poly[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Clip the segment `a→b` against a counterclockwise convex polygon
/// (Cyrus-Beck). Returns the parameter interval kept, boundary inclusive.
pub fn clip_segment_convex_2d(
    a: &Point2,
    b: &Point2,
    poly: &[Point2],
    tol: f64,
) -> Option<(f64, f64)> {
    let d = b - a;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    let n = poly.len();
    for i in 0..n {
        let p = &poly[i];
        let q = &poly[(i + 1) % n];
        let edge = q - p;
        let len = edge.norm();
        if len <= f64::MIN_POSITIVE {
            continue;
        }
        // Inward distance of a point from this edge line.
        let dist_a = orient_2d(p, q, a) / len + tol;
        let rate = (edge.x * d.y - edge.y * d.x) / len;
        if rate.abs() <= f64::MIN_POSITIVE {
            if dist_a < 0.0 {
                return None;
            }
            continue;
        }
        let t = -dist_a / rate;
        if rate > 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((t0.clamp(0.0, 1.0), t1.clamp(0.0, 1.0)))
}

/// Proper or touching intersection of two 2D segments.
///
/// Returns the parameters `(s, t)` on `a→b` and `c→d`. Parallel
/// segments return `None`.
pub fn segment_intersection_2d(
    a: &Point2,
    b: &Point2,
    c: &Point2,
    d: &Point2,
    tol: f64,
) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = r.x * s.y - r.y * s.x;
    let scale = r.norm() * s.norm();
    if denom.abs() <= 1e-14 * scale || scale <= f64::MIN_POSITIVE {
        return None;
    }
    let ac = c - a;
    let t = (ac.x * s.y - ac.y * s.x) / denom;
    let u = (ac.x * r.y - ac.y * r.x) / denom;
    let ta = tol / r.norm();
    let tc = tol / s.norm();
    if t < -ta || t > 1.0 + ta || u < -tc || u > 1.0 + tc {
        return None;
    }
    Some((t.clamp(0.0, 1.0), u.clamp(0.0, 1.0)))
}

/// Distance from `p` to the segment `a→b` and the clamped parameter of
/// the closest point.
pub fn point_segment_distance(p: &Point3, a: &Point3, b: &Point3) -> (f64, f64) {
    let d = b - a;
    let len2 = d.norm_squared();
    if len2 <= f64::MIN_POSITIVE {
        return ((p - a).norm(), 0.0);
    }
    let t = ((p - a).dot(&d) / len2).clamp(0.0, 1.0);
    ((a + d * t - p).norm(), t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_newell_normal_area() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = newell_normal(&pts);
        assert!((n - Vec3::new(0.0, 0.0, 4.0)).norm() < 1e-12);
        assert!((area_3d(&pts) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_convex_hull_drops_interior_and_collinear() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.5, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 0.5),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let hull = convex_hull_2d(&pts, 1e-12);
        assert_eq!(hull, vec![0, 2, 4, 5]);
        let loop_pts: Vec<Point2> = hull.iter().map(|&i| pts[i]).collect();
        assert!(signed_area_2d(&loop_pts) > 0.0);
    }

    #[test]
    fn test_point_in_convex_boundary_counts() {
        let sq = square();
        assert!(point_in_convex_2d(&Point2::new(0.5, 0.5), &sq, 1e-12));
        assert!(point_in_convex_2d(&Point2::new(1.0, 0.5), &sq, 1e-12));
        assert!(!point_in_convex_2d(&Point2::new(1.1, 0.5), &sq, 1e-12));
        assert!(point_in_polygon_2d(&Point2::new(0.5, 0.5), &sq));
        assert!(!point_in_polygon_2d(&Point2::new(1.5, 0.5), &sq));
    }

    #[test]
    fn test_clip_segment() {
        let sq = square();
        let (t0, t1) = clip_segment_convex_2d(
            &Point2::new(-1.0, 0.5),
            &Point2::new(3.0, 0.5),
            &sq,
            0.0,
        )
        .unwrap();
        assert!((t0 - 0.25).abs() < 1e-12);
        assert!((t1 - 0.5).abs() < 1e-12);
        assert!(clip_segment_convex_2d(
            &Point2::new(-1.0, 2.0),
            &Point2::new(3.0, 2.0),
            &sq,
            0.0
        )
        .is_none());
    }

    #[test]
    fn test_segment_intersection() {
        let (s, t) = segment_intersection_2d(
            &Point2::new(0.0, 0.0),
            &Point2::new(2.0, 2.0),
            &Point2::new(0.0, 2.0),
            &Point2::new(2.0, 0.0),
            1e-12,
        )
        .unwrap();
        assert!((s - 0.5).abs() < 1e-12);
        assert!((t - 0.5).abs() < 1e-12);
    }
}
