#![warn(missing_docs)]

//! Math types for the cut-cell geometry engine.
//!
//! Thin wrappers around nalgebra providing the types every layer of the
//! engine speaks: points, vectors, directions, planes, bounding boxes,
//! tolerance constants, and the small set of planar polygon routines the
//! intersection and facet code is built from.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub mod arrangement;
pub mod bbox;
pub mod polygon;
pub mod triangulate;

pub use bbox::Aabb3;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A point in a 2D plane frame.
pub type Point2 = nalgebra::Point2<f64>;

/// Tolerance constants for geometric comparisons.
///
/// `merge` is an absolute distance: two points closer than this are the
/// same point, and a point closer than this to a plane lies on it.
/// `reference` bounds cosines and normalized lengths that count as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Geometric merge distance.
    pub merge: f64,
    /// Angle / degeneracy tolerance.
    pub reference: f64,
}

impl Tolerance {
    /// Default tolerances for unit-scale meshes.
    pub const DEFAULT: Self = Self {
        merge: 1e-10,
        reference: 1e-8,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() <= self.merge
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() <= self.merge
    }

    /// Check if a cosine (or normalized length) is effectively zero.
    pub fn is_orthogonal(&self, cosine: f64) -> bool {
        cosine.abs() < self.reference
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An oriented plane `n·x = n·origin` with a right-handed in-plane frame.
///
/// The frame `(u, v, normal)` lets planar polygons be projected to 2D and
/// lifted back without losing orientation: a loop that is counterclockwise
/// in `(u, v)` is counterclockwise when viewed against `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// A point on the plane.
    pub origin: Point3,
    /// Unit normal.
    pub normal: Vec3,
    /// First in-plane axis.
    pub u: Vec3,
    /// Second in-plane axis (`normal × u`).
    pub v: Vec3,
}

impl Plane {
    /// Build a plane through `origin` with the given normal.
    ///
    /// Returns `None` for a (near) zero normal.
    pub fn new(origin: Point3, normal: Vec3) -> Option<Self> {
        let len = normal.norm();
        if len < 1e-300 || !len.is_finite() {
            return None;
        }
        let normal = normal / len;
        // Seed the frame with the coordinate axis least aligned with the normal.
        let seed = if normal.x.abs() <= normal.y.abs() && normal.x.abs() <= normal.z.abs() {
            Vec3::x()
        } else if normal.y.abs() <= normal.z.abs() {
            Vec3::y()
        } else {
            Vec3::z()
        };
        let u = (seed - normal * normal.dot(&seed)).normalize();
        let v = normal.cross(&u);
        Some(Self {
            origin,
            normal,
            u,
            v,
        })
    }

    /// Best-fit plane of a polygon loop (Newell normal through the centroid).
    pub fn from_polygon(points: &[Point3]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let normal = polygon::newell_normal(points);
        Self::new(polygon::centroid(points), normal)
    }

    /// Signed distance of `p` from the plane (positive on the normal side).
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&(p - self.origin))
    }

    /// Project a point into the plane frame.
    pub fn to_2d(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u), d.dot(&self.v))
    }

    /// Lift a frame point back onto the plane.
    pub fn to_3d(&self, p: &Point2) -> Point3 {
        self.origin + self.u * p.x + self.v * p.y
    }

    /// The same plane with the normal flipped.
    pub fn flipped(&self) -> Self {
        Self {
            origin: self.origin,
            normal: -self.normal,
            u: self.v,
            v: self.u,
        }
    }

    /// Whether two planes coincide (same or opposite orientation).
    pub fn coincides(&self, other: &Plane, tol: &Tolerance) -> bool {
        let cos = self.normal.dot(&other.normal).abs();
        1.0 - cos < tol.reference && tol.is_zero(self.signed_distance(&other.origin))
    }

    /// Intersect the segment `a→b` with the plane.
    ///
    /// Returns the segment parameter of the crossing, or `None` if both
    /// endpoints lie strictly on the same side or on the plane.
    pub fn segment_parameter(&self, a: &Point3, b: &Point3, tol: &Tolerance) -> Option<f64> {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        let a_on = tol.is_zero(da);
        let b_on = tol.is_zero(db);
        match (a_on, b_on) {
            (true, true) => None,
            (true, false) => Some(0.0),
            (false, true) => Some(1.0),
            (false, false) if (da > 0.0) == (db > 0.0) => None,
            (false, false) => Some(da / (da - db)),
        }
    }
}

/// Total lexicographic order on coordinates, used wherever a geometric
/// sort key is needed.
pub fn cmp_points(a: &Point3, b: &Point3) -> std::cmp::Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.z.total_cmp(&b.z))
}

/// Signed volume of the tetrahedron `(a, b, c, d)`; positive when `(a, b, c)`
/// is counterclockwise seen from `d`.
pub fn tet_signed_volume(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_points_equal() {
        let tol = Tolerance::DEFAULT;
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(1.0 + 1e-12, 2.0, 3.0);
        assert!(tol.points_equal(&a, &b));
        let c = Point3::new(1.001, 2.0, 3.0);
        assert!(!tol.points_equal(&a, &c));
    }

    #[test]
    fn test_plane_frame_is_right_handed() {
        let plane = Plane::new(Point3::origin(), Vec3::new(0.3, -0.2, 0.9)).unwrap();
        assert!((plane.u.cross(&plane.v) - plane.normal).norm() < 1e-12);
        let p = Point3::new(0.4, 0.7, -0.1);
        let q = plane.to_3d(&plane.to_2d(&p));
        // Projection removes the normal component only.
        let d = plane.signed_distance(&p);
        assert!((q + plane.normal * d - p).norm() < 1e-12);
    }

    #[test]
    fn test_segment_parameter() {
        let tol = Tolerance::DEFAULT;
        let plane = Plane::new(Point3::new(0.0, 0.0, 0.5), Vec3::z()).unwrap();
        let t = plane
            .segment_parameter(&Point3::origin(), &Point3::new(0.0, 0.0, 2.0), &tol)
            .unwrap();
        assert!((t - 0.25).abs() < 1e-14);
        assert!(plane
            .segment_parameter(&Point3::new(0.0, 0.0, 1.0), &Point3::new(1.0, 0.0, 2.0), &tol)
            .is_none());
        let t_end = plane
            .segment_parameter(&Point3::origin(), &Point3::new(0.0, 0.0, 0.5), &tol)
            .unwrap();
        assert_eq!(t_end, 1.0);
    }

    #[test]
    fn test_plane_from_polygon_orientation() {
        let square = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let plane = Plane::from_polygon(&square).unwrap();
        assert!((plane.normal - Vec3::z()).norm() < 1e-12);
        assert!(plane.signed_distance(&Point3::new(0.3, 0.3, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_tet_signed_volume() {
        let v = tet_signed_volume(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
        );
        assert!((v - 1.0 / 6.0).abs() < 1e-15);
    }
}
