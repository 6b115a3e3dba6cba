//! Gauss quadrature rules.
//!
//! Line rules are Gauss-Legendre; simplex and pyramid rules are collapsed
//! tensor products of line rules, so any polynomial degree is available
//! with positive weights.

use cutcell_math::{Point2, Point3};

use crate::element::ElementShape;

/// A set of quadrature points and weights in physical (or reference) space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuadratureRule {
    /// Quadrature points.
    pub points: Vec<Point3>,
    /// Weights, one per point.
    pub weights: Vec<f64>,
}

impl QuadratureRule {
    /// Add a point.
    pub fn push(&mut self, p: Point3, w: f64) {
        self.points.push(p);
        self.weights.push(w);
    }

    /// Append all points of another rule.
    pub fn extend(&mut self, other: &QuadratureRule) {
        self.points.extend_from_slice(&other.points);
        self.weights.extend_from_slice(&other.weights);
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the rule has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of weights (the measure of the integration domain).
    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Integrate a function with this rule.
    pub fn integrate(&self, f: impl Fn(&Point3) -> f64) -> f64 {
        self.points
            .iter()
            .zip(&self.weights)
            .map(|(p, w)| f(p) * w)
            .sum()
    }
}

/// Gauss-Legendre points and weights on `[-1, 1]`, ascending.
pub fn gauss_legendre(n: usize) -> Vec<(f64, f64)> {
    let n = n.max(1);
    let mut rule = Vec::with_capacity(n);
    for i in 0..n {
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let (p, d) = legendre(n, x);
            dp = d;
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-16 {
                break;
            }
        }
        let (_, d) = legendre(n, x);
        if d.is_finite() {
            dp = d;
        }
        rule.push((x, 2.0 / ((1.0 - x * x) * dp * dp)));
    }
    rule.reverse();
    rule
}

/// Legendre polynomial `P_n(x)` and its derivative.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let d = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, d)
}

/// Points needed for a line rule exact to `degree`.
pub fn points_for_degree(degree: usize) -> usize {
    degree / 2 + 1
}

/// Gauss-Legendre rule on `[0, 1]`.
fn unit_interval(n: usize) -> Vec<(f64, f64)> {
    gauss_legendre(n)
        .into_iter()
        .map(|(x, w)| (0.5 * (x + 1.0), 0.5 * w))
        .collect()
}

/// Rule on the reference triangle `r, s >= 0, r + s <= 1` (area 1/2).
pub fn triangle_rule(degree: usize) -> Vec<(Point2, f64)> {
    let a = unit_interval(points_for_degree(degree + 1));
    let b = unit_interval(points_for_degree(degree));
    let mut rule = Vec::with_capacity(a.len() * b.len());
    for &(xi, wa) in &a {
        for &(eta, wb) in &b {
            rule.push((Point2::new(xi, eta * (1.0 - xi)), wa * wb * (1.0 - xi)));
        }
    }
    rule
}

/// Rule on the reference element of `shape`, exact for polynomials of
/// `degree` in the local coordinates (times the shape's Jacobian).
pub fn reference_rule(shape: ElementShape, degree: usize) -> QuadratureRule {
    let mut rule = QuadratureRule::default();
    match shape {
        ElementShape::Tet4 => {
            let a = unit_interval(points_for_degree(degree + 2));
            let b = unit_interval(points_for_degree(degree + 1));
            let c = unit_interval(points_for_degree(degree));
            for &(xi, wa) in &a {
                for &(eta, wb) in &b {
                    for &(zeta, wc) in &c {
                        let r = xi;
                        let s = eta * (1.0 - xi);
                        let t = zeta * (1.0 - xi) * (1.0 - eta);
                        let jac = (1.0 - xi) * (1.0 - xi) * (1.0 - eta);
                        rule.push(Point3::new(r, s, t), wa * wb * wc * jac);
                    }
                }
            }
        }
        ElementShape::Hex8 => {
            let g = gauss_legendre(points_for_degree(degree));
            for &(r, wr) in &g {
                for &(s, ws) in &g {
                    for &(t, wt) in &g {
                        rule.push(Point3::new(r, s, t), wr * ws * wt);
                    }
                }
            }
        }
        ElementShape::Wedge6 => {
            let line = gauss_legendre(points_for_degree(degree));
            for (rs, wt) in triangle_rule(degree) {
                for &(t, wl) in &line {
                    rule.push(Point3::new(rs.x, rs.y, t), wt * wl);
                }
            }
        }
        ElementShape::Pyramid5 => {
            // The collapsed map carries (1 - t)^2 in its Jacobian.
            let g = gauss_legendre(points_for_degree(degree));
            let h = unit_interval(points_for_degree(degree + 2));
            for &(r, wr) in &g {
                for &(s, ws) in &g {
                    for &(t, wt) in &h {
                        rule.push(Point3::new(r, s, t), wr * ws * wt);
                    }
                }
            }
        }
    }
    rule
}

/// Physical rule on the triangle `(a, b, c)`.
pub fn triangle_physical_rule(tri: &[Point3; 3], degree: usize) -> QuadratureRule {
    let area2 = (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).norm();
    let mut rule = QuadratureRule::default();
    for (rs, w) in triangle_rule(degree) {
        let p = tri[0] + (tri[1] - tri[0]) * rs.x + (tri[2] - tri[0]) * rs.y;
        rule.push(p, w * area2);
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gauss_legendre_exactness() {
        for n in 1..8 {
            let rule = gauss_legendre(n);
            let total: f64 = rule.iter().map(|(_, w)| w).sum();
            assert_relative_eq!(total, 2.0, epsilon = 1e-13);
            // x^(2n-2) integrates to 2 / (2n - 1)
            let k = 2 * n - 2;
            let int: f64 = rule.iter().map(|(x, w)| x.powi(k as i32) * w).sum();
            assert_relative_eq!(int, 2.0 / (k as f64 + 1.0), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gauss_legendre_sorted() {
        let rule = gauss_legendre(5);
        assert!(rule.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(rule[2].0.abs() < 1e-15);
    }

    #[test]
    fn test_triangle_rule_monomial() {
        // ∫ r^2 s over the unit triangle = 2! 1! / 5! = 1/60
        let int: f64 = triangle_rule(3)
            .iter()
            .map(|(p, w)| p.x * p.x * p.y * w)
            .sum();
        assert_relative_eq!(int, 1.0 / 60.0, epsilon = 1e-14);
    }

    #[test]
    fn test_tet_rule_monomial() {
        // ∫ r s t over the unit tet = 1 / 720
        let rule = reference_rule(ElementShape::Tet4, 3);
        let int = rule.integrate(|p| p.x * p.y * p.z);
        assert_relative_eq!(int, 1.0 / 720.0, epsilon = 1e-15);
        assert_relative_eq!(rule.total_weight(), 1.0 / 6.0, epsilon = 1e-15);
    }

    #[test]
    fn test_physical_triangle_rule_area() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 1.0),
        ];
        let rule = triangle_physical_rule(&tri, 2);
        let area = 0.5 * (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).norm();
        assert_relative_eq!(rule.total_weight(), area, epsilon = 1e-13);
    }
}
