//! Planar side shapes (element faces and cutter facets).

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use cutcell_math::{Point2, Point3, Vec3};

/// Linear side shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideShape {
    /// 3-node triangle, local coordinates in the unit simplex.
    Tri3,
    /// 4-node quadrilateral, local coordinates in `[-1, 1]^2`.
    Quad4,
}

impl SideShape {
    /// Shape for a node count.
    pub fn from_num_nodes(n: usize) -> Option<Self> {
        match n {
            3 => Some(Self::Tri3),
            4 => Some(Self::Quad4),
            _ => None,
        }
    }

    /// Number of nodes.
    pub fn num_nodes(self) -> usize {
        match self {
            Self::Tri3 => 3,
            Self::Quad4 => 4,
        }
    }

    /// Local coordinates of the side center.
    pub fn center(self) -> Point2 {
        match self {
            Self::Tri3 => Point2::new(1.0 / 3.0, 1.0 / 3.0),
            Self::Quad4 => Point2::new(0.0, 0.0),
        }
    }

    /// Shape function values.
    pub fn shape_functions(self, rs: &Point2) -> Vec<f64> {
        let (r, s) = (rs.x, rs.y);
        match self {
            Self::Tri3 => vec![1.0 - r - s, r, s],
            Self::Quad4 => vec![
                0.25 * (1.0 - r) * (1.0 - s),
                0.25 * (1.0 + r) * (1.0 - s),
                0.25 * (1.0 + r) * (1.0 + s),
                0.25 * (1.0 - r) * (1.0 + s),
            ],
        }
    }

    /// Shape function derivatives `(dN/dr, dN/ds)`.
    pub fn shape_derivatives(self, rs: &Point2) -> Vec<(f64, f64)> {
        let (r, s) = (rs.x, rs.y);
        match self {
            Self::Tri3 => vec![(-1.0, -1.0), (1.0, 0.0), (0.0, 1.0)],
            Self::Quad4 => vec![
                (-0.25 * (1.0 - s), -0.25 * (1.0 - r)),
                (0.25 * (1.0 - s), -0.25 * (1.0 + r)),
                (0.25 * (1.0 + s), 0.25 * (1.0 + r)),
                (-0.25 * (1.0 + s), 0.25 * (1.0 - r)),
            ],
        }
    }

    /// Map local coordinates to physical space.
    pub fn map(self, coords: &[Point3], rs: &Point2) -> Point3 {
        let mut x = Vec3::zeros();
        for (n, p) in self.shape_functions(rs).iter().zip(coords) {
            x += p.coords * *n;
        }
        Point3::from(x)
    }

    /// Tangent vectors `(dx/dr, dx/ds)`.
    pub fn tangents(self, coords: &[Point3], rs: &Point2) -> (Vec3, Vec3) {
        let mut tr = Vec3::zeros();
        let mut ts = Vec3::zeros();
        for ((dr, ds), p) in self.shape_derivatives(rs).iter().zip(coords) {
            tr += p.coords * *dr;
            ts += p.coords * *ds;
        }
        (tr, ts)
    }

    /// Unit normal at local coordinates (right-hand rule over the node order).
    pub fn normal(self, coords: &[Point3], rs: &Point2) -> Vec3 {
        let (tr, ts) = self.tangents(coords, rs);
        let n = tr.cross(&ts);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            n
        }
    }

    /// Local coordinates of the foot point of `x` and its signed distance
    /// along the normal.
    pub fn local_coordinates(self, coords: &[Point3], x: &Point3) -> Option<(Point2, f64)> {
        let mut rs = self.center();
        let mut dist = 0.0;
        for _ in 0..50 {
            let (tr, ts) = self.tangents(coords, &rs);
            let n = self.normal(coords, &rs);
            let residual = x - (self.map(coords, &rs) + n * dist);
            let j = Matrix3::from_columns(&[tr, ts, n]);
            let delta = j.try_inverse()? * residual;
            rs.x += delta.x;
            rs.y += delta.y;
            dist += delta.z;
            if delta.norm() < 1e-14 {
                break;
            }
        }
        let n = self.normal(coords, &rs);
        let residual = x - (self.map(coords, &rs) + n * dist);
        let scale = (coords[1] - coords[0]).norm().max(f64::MIN_POSITIVE);
        (residual.norm() < 1e-9 * scale).then_some((rs, dist))
    }

    /// Whether local coordinates lie inside the reference side.
    pub fn contains_local(self, rs: &Point2, tol: f64) -> bool {
        match self {
            Self::Tri3 => rs.x >= -tol && rs.y >= -tol && rs.x + rs.y <= 1.0 + tol,
            Self::Quad4 => rs.x.abs() <= 1.0 + tol && rs.y.abs() <= 1.0 + tol,
        }
    }

    /// Whether `x` lies on the side within `tol` (normal distance and
    /// parametric slack).
    pub fn within(self, coords: &[Point3], x: &Point3, tol: f64) -> Option<Point2> {
        let (rs, dist) = self.local_coordinates(coords, x)?;
        let scale = (coords[1] - coords[0]).norm().max(f64::MIN_POSITIVE);
        (dist.abs() <= tol && self.contains_local(&rs, tol / scale)).then_some(rs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_local_coordinates_with_distance() {
        let quad = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 2.0, 1.0),
            Point3::new(0.0, 2.0, 1.0),
        ];
        let (rs, dist) = SideShape::Quad4
            .local_coordinates(&quad, &Point3::new(1.5, 0.5, 1.25))
            .unwrap();
        assert!((rs.x - 0.5).abs() < 1e-12);
        assert!((rs.y + 0.5).abs() < 1e-12);
        assert!((dist - 0.25).abs() < 1e-12);
        assert!((SideShape::Quad4.normal(&quad, &rs) - Vec3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_tri_within() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(SideShape::Tri3
            .within(&tri, &Point3::new(0.5, 0.5, 0.0), 1e-10)
            .is_some());
        assert!(SideShape::Tri3
            .within(&tri, &Point3::new(0.6, 0.6, 0.0), 1e-10)
            .is_none());
        assert!(SideShape::Tri3
            .within(&tri, &Point3::new(0.2, 0.2, 0.1), 1e-10)
            .is_none());
    }
}
