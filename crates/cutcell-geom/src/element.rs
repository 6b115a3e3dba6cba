//! Background element shapes.
//!
//! A closed set of linear 3D cell shapes dispatched through lookup tables:
//! node layout in local coordinates, side and edge connectivity, shape
//! functions, and the local-coordinate inversion built on them.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use cutcell_math::{Point3, Vec3};

use crate::gauss::{reference_rule, QuadratureRule};
use crate::side::SideShape;

/// Linear 3D element shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementShape {
    /// 4-node tetrahedron.
    Tet4,
    /// 8-node hexahedron.
    Hex8,
    /// 6-node triangular prism.
    Wedge6,
    /// 5-node pyramid.
    Pyramid5,
}

// =============================================================================
// Connectivity tables
// =============================================================================

// Sides list their nodes counterclockwise seen from outside the element.

const TET4_SIDES: &[&[usize]] = &[&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]];
const HEX8_SIDES: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[4, 5, 6, 7],
];
const WEDGE6_SIDES: &[&[usize]] = &[
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];
const PYRAMID5_SIDES: &[&[usize]] = &[&[0, 3, 2, 1], &[0, 1, 4], &[1, 2, 4], &[2, 3, 4], &[3, 0, 4]];

const TET4_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const HEX8_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];
const WEDGE6_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 0],
    [3, 4],
    [4, 5],
    [5, 3],
    [0, 3],
    [1, 4],
    [2, 5],
];
const PYRAMID5_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 4],
    [2, 4],
    [3, 4],
];

const TET4_NODES: &[[f64; 3]] = &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
const HEX8_NODES: &[[f64; 3]] = &[
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];
const WEDGE6_NODES: &[[f64; 3]] = &[
    [0.0, 0.0, -1.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, -1.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
];
const PYRAMID5_NODES: &[[f64; 3]] = &[
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];

/// Tet4 decompositions of the non-simplex shapes, in node indices.
const HEX8_TO_TET4: &[[usize; 4]] = &[[0, 1, 3, 4], [1, 2, 3, 6], [4, 5, 1, 6], [6, 7, 3, 4], [1, 6, 3, 4]];
const WEDGE6_TO_TET4: &[[usize; 4]] = &[[0, 1, 2, 3], [3, 4, 1, 5], [1, 5, 2, 3]];
const PYRAMID5_TO_TET4: &[[usize; 4]] = &[[0, 1, 3, 4], [1, 2, 3, 4]];
const TET4_TO_TET4: &[[usize; 4]] = &[[0, 1, 2, 3]];

const NEWTON_MAX_ITER: usize = 50;

impl ElementShape {
    /// All supported shapes.
    pub const ALL: [ElementShape; 4] = [Self::Tet4, Self::Hex8, Self::Wedge6, Self::Pyramid5];

    /// Number of nodes.
    pub fn num_nodes(self) -> usize {
        self.reference_nodes().len()
    }

    /// Side connectivity, counterclockwise seen from outside.
    pub fn sides(self) -> &'static [&'static [usize]] {
        match self {
            Self::Tet4 => TET4_SIDES,
            Self::Hex8 => HEX8_SIDES,
            Self::Wedge6 => WEDGE6_SIDES,
            Self::Pyramid5 => PYRAMID5_SIDES,
        }
    }

    /// Shape of side `i`.
    pub fn side_shape(self, i: usize) -> SideShape {
        if self.sides()[i].len() == 3 {
            SideShape::Tri3
        } else {
            SideShape::Quad4
        }
    }

    /// Edge connectivity.
    pub fn edges(self) -> &'static [[usize; 2]] {
        match self {
            Self::Tet4 => TET4_EDGES,
            Self::Hex8 => HEX8_EDGES,
            Self::Wedge6 => WEDGE6_EDGES,
            Self::Pyramid5 => PYRAMID5_EDGES,
        }
    }

    /// Node positions in local coordinates.
    pub fn reference_nodes(self) -> &'static [[f64; 3]] {
        match self {
            Self::Tet4 => TET4_NODES,
            Self::Hex8 => HEX8_NODES,
            Self::Wedge6 => WEDGE6_NODES,
            Self::Pyramid5 => PYRAMID5_NODES,
        }
    }

    /// Decomposition into tetrahedra by node index.
    pub fn tet_split(self) -> &'static [[usize; 4]] {
        match self {
            Self::Tet4 => TET4_TO_TET4,
            Self::Hex8 => HEX8_TO_TET4,
            Self::Wedge6 => WEDGE6_TO_TET4,
            Self::Pyramid5 => PYRAMID5_TO_TET4,
        }
    }

    /// Local coordinates of the element center.
    pub fn center(self) -> Point3 {
        match self {
            Self::Tet4 => Point3::new(0.25, 0.25, 0.25),
            Self::Hex8 => Point3::origin(),
            Self::Wedge6 => Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
            Self::Pyramid5 => Point3::new(0.0, 0.0, 0.25),
        }
    }

    /// Volume of the reference element.
    pub fn reference_volume(self) -> f64 {
        match self {
            Self::Tet4 => 1.0 / 6.0,
            Self::Hex8 => 8.0,
            Self::Wedge6 => 1.0,
            Self::Pyramid5 => 4.0 / 3.0,
        }
    }

    /// Shape function values at local coordinates `xi`.
    pub fn shape_functions(self, xi: &Point3) -> Vec<f64> {
        let (r, s, t) = (xi.x, xi.y, xi.z);
        match self {
            Self::Tet4 => vec![1.0 - r - s - t, r, s, t],
            Self::Hex8 => HEX8_NODES
                .iter()
                .map(|n| 0.125 * (1.0 + r * n[0]) * (1.0 + s * n[1]) * (1.0 + t * n[2]))
                .collect(),
            Self::Wedge6 => {
                let l = [1.0 - r - s, r, s];
                let lo = 0.5 * (1.0 - t);
                let hi = 0.5 * (1.0 + t);
                vec![l[0] * lo, l[1] * lo, l[2] * lo, l[0] * hi, l[1] * hi, l[2] * hi]
            }
            Self::Pyramid5 => {
                let mut n: Vec<f64> = PYRAMID5_NODES[..4]
                    .iter()
                    .map(|c| 0.25 * (1.0 + r * c[0]) * (1.0 + s * c[1]) * (1.0 - t))
                    .collect();
                n.push(t);
                n
            }
        }
    }

    /// Shape function derivatives `dN/dxi` at local coordinates `xi`.
    pub fn shape_derivatives(self, xi: &Point3) -> Vec<Vec3> {
        let (r, s, t) = (xi.x, xi.y, xi.z);
        match self {
            Self::Tet4 => vec![
                Vec3::new(-1.0, -1.0, -1.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            Self::Hex8 => HEX8_NODES
                .iter()
                .map(|n| {
                    let fr = 1.0 + r * n[0];
                    let fs = 1.0 + s * n[1];
                    let ft = 1.0 + t * n[2];
                    Vec3::new(
                        0.125 * n[0] * fs * ft,
                        0.125 * fr * n[1] * ft,
                        0.125 * fr * fs * n[2],
                    )
                })
                .collect(),
            Self::Wedge6 => {
                let l = [1.0 - r - s, r, s];
                let dl = [(-1.0, -1.0), (1.0, 0.0), (0.0, 1.0)];
                let lo = 0.5 * (1.0 - t);
                let hi = 0.5 * (1.0 + t);
                let mut d = Vec::with_capacity(6);
                for a in 0..3 {
                    d.push(Vec3::new(dl[a].0 * lo, dl[a].1 * lo, -0.5 * l[a]));
                }
                for a in 0..3 {
                    d.push(Vec3::new(dl[a].0 * hi, dl[a].1 * hi, 0.5 * l[a]));
                }
                d
            }
            Self::Pyramid5 => {
                let mut d: Vec<Vec3> = PYRAMID5_NODES[..4]
                    .iter()
                    .map(|c| {
                        let fr = 1.0 + r * c[0];
                        let fs = 1.0 + s * c[1];
                        Vec3::new(
                            0.25 * c[0] * fs * (1.0 - t),
                            0.25 * fr * c[1] * (1.0 - t),
                            -0.25 * fr * fs,
                        )
                    })
                    .collect();
                d.push(Vec3::new(0.0, 0.0, 1.0));
                d
            }
        }
    }

    /// Map local coordinates to physical space.
    pub fn map(self, coords: &[Point3], xi: &Point3) -> Point3 {
        let n = self.shape_functions(xi);
        let mut x = Vec3::zeros();
        for (na, p) in n.iter().zip(coords) {
            x += p.coords * *na;
        }
        Point3::from(x)
    }

    /// Jacobian `dx/dxi` (column `j` holds `dx/dxi_j`).
    pub fn jacobian(self, coords: &[Point3], xi: &Point3) -> Matrix3<f64> {
        let d = self.shape_derivatives(xi);
        let mut j = Matrix3::zeros();
        for (da, p) in d.iter().zip(coords) {
            j += p.coords * da.transpose();
        }
        j
    }

    /// Invert the geometric map by Newton iteration.
    ///
    /// Returns `None` when the Jacobian is singular along the way or the
    /// iteration does not converge.
    pub fn local_coordinates(self, coords: &[Point3], x: &Point3) -> Option<Point3> {
        let mut xi = self.center();
        let scale = coords
            .iter()
            .map(|p| (p - coords[0]).norm())
            .fold(0.0_f64, f64::max)
            .max(f64::MIN_POSITIVE);
        for _ in 0..NEWTON_MAX_ITER {
            let residual = x - self.map(coords, &xi);
            let j_inv = self.jacobian(coords, &xi).try_inverse()?;
            let delta = j_inv * residual;
            xi += delta;
            if delta.norm() < 1e-13 && residual.norm() < 1e-11 * scale {
                return Some(xi);
            }
        }
        let residual = x - self.map(coords, &xi);
        (residual.norm() < 1e-9 * scale).then_some(xi)
    }

    /// Whether local coordinates lie inside the reference element.
    pub fn contains_local(self, xi: &Point3, tol: f64) -> bool {
        let (r, s, t) = (xi.x, xi.y, xi.z);
        match self {
            Self::Tet4 => r >= -tol && s >= -tol && t >= -tol && r + s + t <= 1.0 + tol,
            Self::Hex8 => r.abs() <= 1.0 + tol && s.abs() <= 1.0 + tol && t.abs() <= 1.0 + tol,
            Self::Wedge6 => r >= -tol && s >= -tol && r + s <= 1.0 + tol && t.abs() <= 1.0 + tol,
            // Collapsed-cube parametrization: r and s keep their range up to the apex.
            Self::Pyramid5 => {
                t >= -tol && t <= 1.0 + tol && r.abs() <= 1.0 + tol && s.abs() <= 1.0 + tol
            }
        }
    }

    /// Physical quadrature rule of the given polynomial degree.
    pub fn gauss_rule(self, coords: &[Point3], degree: usize) -> QuadratureRule {
        let reference = reference_rule(self, degree);
        let mut rule = QuadratureRule::default();
        for (xi, w) in reference.points.iter().zip(&reference.weights) {
            let det = self.jacobian(coords, xi).determinant();
            rule.push(self.map(coords, xi), w * det);
        }
        rule
    }

    /// Element volume, integrating `det J` exactly.
    pub fn volume(self, coords: &[Point3]) -> f64 {
        self.gauss_rule(coords, 3).total_weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_coords(shape: ElementShape) -> Vec<Point3> {
        shape
            .reference_nodes()
            .iter()
            .map(|n| Point3::new(n[0], n[1], n[2]))
            .collect()
    }

    #[test]
    fn test_partition_of_unity() {
        let xi = Point3::new(0.2, 0.1, 0.3);
        for shape in ElementShape::ALL {
            let sum: f64 = shape.shape_functions(&xi).iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-14);
            let dsum: Vec3 = shape.shape_derivatives(&xi).iter().sum();
            assert!(dsum.norm() < 1e-14, "{shape:?}");
        }
    }

    #[test]
    fn test_shape_functions_are_nodal() {
        for shape in ElementShape::ALL {
            for (a, node) in shape.reference_nodes().iter().enumerate() {
                let n = shape.shape_functions(&Point3::new(node[0], node[1], node[2]));
                for (b, nb) in n.iter().enumerate() {
                    let expected = if a == b { 1.0 } else { 0.0 };
                    assert_relative_eq!(*nb, expected, epsilon = 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_reference_volume_matches_integration() {
        for shape in ElementShape::ALL {
            let coords = reference_coords(shape);
            assert_relative_eq!(
                shape.volume(&coords),
                shape.reference_volume(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_sides_point_outward() {
        for shape in ElementShape::ALL {
            let coords = reference_coords(shape);
            let center = shape.map(&coords, &shape.center());
            for side in shape.sides() {
                let pts: Vec<Point3> = side.iter().map(|&i| coords[i]).collect();
                let n = cutcell_math::polygon::newell_normal(&pts);
                let c = cutcell_math::polygon::centroid(&pts);
                assert!(n.dot(&(c - center)) > 0.0, "{shape:?} side {side:?}");
            }
        }
    }

    #[test]
    fn test_tet_split_covers_volume() {
        for shape in ElementShape::ALL {
            let coords = reference_coords(shape);
            let sum: f64 = shape
                .tet_split()
                .iter()
                .map(|t| {
                    cutcell_math::tet_signed_volume(
                        &coords[t[0]],
                        &coords[t[1]],
                        &coords[t[2]],
                        &coords[t[3]],
                    )
                })
                .sum();
            assert_relative_eq!(sum, shape.reference_volume(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_local_coordinates_roundtrip() {
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.1, 0.0),
            Point3::new(2.2, 1.9, 0.1),
            Point3::new(-0.1, 2.0, 0.0),
            Point3::new(0.0, 0.1, 1.5),
            Point3::new(2.1, 0.0, 1.6),
            Point3::new(2.0, 2.0, 1.4),
            Point3::new(0.1, 1.9, 1.5),
        ];
        let xi = Point3::new(0.3, -0.6, 0.2);
        let x = ElementShape::Hex8.map(&coords, &xi);
        let back = ElementShape::Hex8.local_coordinates(&coords, &x).unwrap();
        assert!((back - xi).norm() < 1e-10);
        assert!(ElementShape::Hex8.contains_local(&back, 1e-12));
    }
}
