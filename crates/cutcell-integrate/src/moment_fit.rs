//! Quadrature fitted to the polynomial moments of a volume cell.
//!
//! The moments of every monomial up to the requested degree are computed
//! on the cell boundary with the divergence theorem, then weights on a
//! Gauss grid of points inside the cell are solved for by least squares.

use nalgebra::{DMatrix, DVector};

use cutcell_geom::gauss::{gauss_legendre, triangle_physical_rule};
use cutcell_geom::QuadratureRule;
use cutcell_math::{Aabb3, Point3, Vec3};
use cutcell_mesh::cell::point_in_triangles;
use cutcell_mesh::{CellId, Mesh};

use crate::error::{IntegrationError, Result};

/// Largest Gauss grid tried per axis.
const MAX_GRID: usize = 16;

/// Relative residual accepted from the least-squares solve.
const RESIDUAL_TOL: f64 = 1e-8;

/// Monomial exponents `(a, b, c)` with `a + b + c <= degree`.
pub fn monomials(degree: usize) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for total in 0..=degree {
        for a in (0..=total).rev() {
            for b in (0..=total - a).rev() {
                out.push([a, b, total - a - b]);
            }
        }
    }
    out
}

/// Affine map of a bounding box onto `[-1, 1]^3`.
#[derive(Debug, Clone, Copy)]
struct Scaling {
    center: Point3,
    half: Vec3,
}

impl Scaling {
    fn new(bbox: &Aabb3) -> Self {
        let half = (bbox.max - bbox.min) * 0.5;
        let half = half.map(|h| if h > 0.0 { h } else { 1.0 });
        Self {
            center: bbox.center(),
            half,
        }
    }

    fn local(&self, x: &Point3) -> Vec3 {
        (x - self.center).component_div(&self.half)
    }

    fn basis(&self, x: &Point3, exps: &[[usize; 3]]) -> Vec<f64> {
        let l = self.local(x);
        exps.iter()
            .map(|&[a, b, c]| l.x.powi(a as i32) * l.y.powi(b as i32) * l.z.powi(c as i32))
            .collect()
    }

    /// Antiderivative in `x` of each basis monomial.
    fn antiderivative(&self, x: &Point3, exps: &[[usize; 3]]) -> Vec<f64> {
        let l = self.local(x);
        exps.iter()
            .map(|&[a, b, c]| {
                self.half.x * l.x.powi(a as i32 + 1) / (a as f64 + 1.0)
                    * l.y.powi(b as i32)
                    * l.z.powi(c as i32)
            })
            .collect()
    }
}

/// Moments of the basis over the region bounded by outward triangles.
fn boundary_moments(
    triangles: &[[Point3; 3]],
    scaling: &Scaling,
    exps: &[[usize; 3]],
    degree: usize,
) -> DVector<f64> {
    let mut moments = DVector::zeros(exps.len());
    for tri in triangles {
        let cross = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
        let area2 = cross.norm();
        if area2 <= 0.0 {
            continue;
        }
        let nx = cross.x / area2;
        if nx == 0.0 {
            continue;
        }
        let rule = triangle_physical_rule(tri, degree + 1);
        for (p, w) in rule.points.iter().zip(&rule.weights) {
            for (m, f) in moments.iter_mut().zip(scaling.antiderivative(p, exps)) {
                *m += f * nx * w;
            }
        }
    }
    moments
}

/// Gauss grid points of the box that fall inside the triangles.
fn interior_points(triangles: &[[Point3; 3]], bbox: &Aabb3, n: usize) -> Vec<Point3> {
    let line = gauss_legendre(n);
    let at = |lo: f64, hi: f64, xi: f64| lo + (hi - lo) * (xi + 1.0) * 0.5;
    let mut out = Vec::new();
    for &(r, _) in &line {
        for &(s, _) in &line {
            for &(t, _) in &line {
                let p = Point3::new(
                    at(bbox.min.x, bbox.max.x, r),
                    at(bbox.min.y, bbox.max.y, s),
                    at(bbox.min.z, bbox.max.z, t),
                );
                if point_in_triangles(&p, triangles) {
                    out.push(p);
                }
            }
        }
    }
    out
}

/// Fit a rule exact for monomials up to `degree` on one volume cell.
pub fn fit_cell(mesh: &Mesh, cid: CellId, degree: usize) -> Result<QuadratureRule> {
    let element = mesh.element(mesh.cell(cid).element()).user_id();
    let fail = |reason: String| IntegrationError::MomentFitting { element, reason };

    let triangles = mesh.cell_triangles(cid);
    let bbox = Aabb3::from_points(triangles.iter().flatten());
    let scaling = Scaling::new(&bbox);
    let exps = monomials(degree);
    let moments = boundary_moments(&triangles, &scaling, &exps, degree);

    // Points on too few planes leave the basis rank deficient, so the grid
    // is refined until the moments are matched.
    let start = (exps.len() as f64).cbrt().ceil() as usize;
    let mut last = format!("no grid yields {} interior points", exps.len());
    for n in start.max(2)..=MAX_GRID {
        let points = interior_points(&triangles, &bbox, n);
        if points.len() < exps.len() {
            continue;
        }
        match solve(&points, &scaling, &exps, &moments) {
            Ok(weights) => {
                let mut rule = QuadratureRule::default();
                for (p, w) in points.into_iter().zip(weights.iter()) {
                    rule.push(p, *w);
                }
                return Ok(rule);
            }
            Err(reason) => last = reason,
        }
    }
    Err(fail(last))
}

/// Least-squares weights reproducing `moments` at `points`.
fn solve(
    points: &[Point3],
    scaling: &Scaling,
    exps: &[[usize; 3]],
    moments: &DVector<f64>,
) -> std::result::Result<DVector<f64>, String> {
    let rows: Vec<Vec<f64>> = points.iter().map(|p| scaling.basis(p, exps)).collect();
    let matrix = DMatrix::from_fn(exps.len(), points.len(), |j, i| rows[i][j]);
    let weights = matrix
        .clone()
        .svd(true, true)
        .solve(moments, 1e-14)
        .map_err(str::to_string)?;
    let residual = (&matrix * &weights - moments).norm();
    if residual > RESIDUAL_TOL * moments.norm().max(f64::MIN_POSITIVE) {
        return Err(format!("moment residual {residual:e}"));
    }
    Ok(weights)
}
