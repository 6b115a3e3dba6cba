//! Volume quadrature from boundary integrals.
//!
//! For `F(x, y, z) = ∫_{x0}^{x} f(s, y, z) ds` the divergence theorem gives
//! `∫_V f dV = ∮ F n_x dS`. Each surface Gauss point on a triangle with
//! `n_x ≠ 0` is swept back to the reference plane `x = x0` with a 1D Gauss
//! rule, which yields volume points and weights without sub-cells.

use cutcell_geom::gauss::{gauss_legendre, triangle_physical_rule};
use cutcell_geom::QuadratureRule;
use cutcell_math::{Aabb3, Point3};
use cutcell_mesh::{CellId, Mesh};

/// Volume rule of a region bounded by outward triangles.
///
/// `surface_degree` is the exactness of the triangle rules, `line_points`
/// the number of points of the sweep rule.
pub fn divergence_rule(
    triangles: &[[Point3; 3]],
    surface_degree: usize,
    line_points: usize,
    normal_tol: f64,
) -> QuadratureRule {
    let x0 = Aabb3::from_points(triangles.iter().flatten()).min.x;
    let line: Vec<(f64, f64)> = gauss_legendre(line_points)
        .into_iter()
        .map(|(xi, w)| ((xi + 1.0) * 0.5, w * 0.5))
        .collect();

    let mut rule = QuadratureRule::default();
    for tri in triangles {
        let cross = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
        let area2 = cross.norm();
        if area2 <= 0.0 {
            continue;
        }
        let nx = cross.x / area2;
        if nx.abs() <= normal_tol {
            continue;
        }
        let surface = triangle_physical_rule(tri, surface_degree);
        for (p, ws) in surface.points.iter().zip(&surface.weights) {
            let length = p.x - x0;
            if length <= 0.0 {
                continue;
            }
            for &(t, wl) in &line {
                rule.push(Point3::new(x0 + length * t, p.y, p.z), ws * nx * length * wl);
            }
        }
    }
    rule
}

/// Direct-divergence rule of one volume cell.
pub fn divergence_cell(mesh: &Mesh, cid: CellId, surface_degree: usize, line_points: usize) -> QuadratureRule {
    let triangles = mesh.cell_triangles(cid);
    divergence_rule(
        &triangles,
        surface_degree,
        line_points,
        mesh.tolerance().reference,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tet() -> Vec<[Point3; 3]> {
        let o = Point3::origin();
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);
        let z = Point3::new(0.0, 0.0, 1.0);
        vec![[o, y, x], [o, x, z], [o, z, y], [x, y, z]]
    }

    #[test]
    fn test_tet_volume() {
        let rule = divergence_rule(&tet(), 3, 4, 1e-12);
        assert_relative_eq!(rule.total_weight(), 1.0 / 6.0, epsilon = 1e-13);
    }

    #[test]
    fn test_tet_polynomial() {
        // ∫ x y z over the unit tet is 1/720.
        let rule = divergence_rule(&tet(), 4, 4, 1e-12);
        let value = rule.integrate(|p| p.x * p.y * p.z);
        assert_relative_eq!(value, 1.0 / 720.0, epsilon = 1e-13);
    }
}
