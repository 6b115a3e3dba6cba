#![warn(missing_docs)]

//! Integration-cell generation for cut elements.
//!
//! [`integrate_element`] reads the finished volume cells of one element and
//! produces quadrature for each of them:
//!
//! 1. An element left whole (one cell filling it) keeps its own rule and is
//!    tagged [`IntegrationType::Uncut`]
//! 2. With [`Strategy::Tessellation`], cells that are canonical shapes are
//!    used directly when `simple_shapes` is set
//! 3. Otherwise the element is tetrahedralized deterministically
//! 4. [`Strategy::MomentFitting`] fits points and weights to polynomial
//!    moments of each cell
//! 5. [`Strategy::DirectDivergence`] sweeps boundary Gauss points into
//!    volume points
//!
//! The mesh is only read, so elements can be integrated in parallel and
//! the results written back with [`Mesh::store_integration`].

pub mod boundary;
pub mod divergence;
pub mod error;
pub mod moment_fit;
pub mod simple;
pub mod tetmesh;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cutcell_mesh::{CellId, CellIntegration, ElementId, IntegrationCell, IntegrationType, Mesh, Position};

pub use error::{IntegrationError, Result};
pub use simple::ShapeFilter;

/// Relative volume mismatch below which a single cell counts as the whole
/// element.
const WHOLE_ELEMENT_TOL: f64 = 1e-8;

/// How volume cells of cut elements are integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Canonical integration cells.
    #[default]
    Tessellation,
    /// Fitted points and weights per cell.
    MomentFitting,
    /// Boundary integrals through the divergence theorem.
    DirectDivergence,
}

impl From<Strategy> for IntegrationType {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Tessellation => IntegrationType::Tessellation,
            Strategy::MomentFitting => IntegrationType::MomentFitting,
            Strategy::DirectDivergence => IntegrationType::DirectDivergence,
        }
    }
}

/// Settings for [`integrate_element`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationOptions {
    /// Strategy for cut elements.
    pub strategy: Strategy,
    /// Try canonical shapes before tetrahedralizing.
    pub simple_shapes: bool,
    /// Canonical shapes kept whole; the rest are split into tets.
    pub shapes: ShapeFilter,
    /// Integrate `inside` cells with moment fitting and direct divergence.
    pub include_inner: bool,
    /// Polynomial degree matched by moment fitting and direct divergence.
    pub moment_fitting_degree: usize,
    /// Points of the direct-divergence sweep rule.
    pub divergence_line_points: usize,
    /// Degree of the boundary-cell rules.
    pub cubature_degree: usize,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Tessellation,
            simple_shapes: true,
            shapes: ShapeFilter {
                hex8: true,
                wedge6: false,
                pyramid5: false,
            },
            include_inner: true,
            moment_fitting_degree: 3,
            divergence_line_points: 7,
            cubature_degree: 4,
        }
    }
}

/// Quadrature for every volume cell of one element.
#[derive(Debug, Clone)]
pub struct ElementIntegration {
    /// Element handle.
    pub element: ElementId,
    /// The path taken.
    pub kind: IntegrationType,
    /// Per-cell results in the element's cell order.
    pub cells: Vec<(CellId, CellIntegration)>,
}

impl ElementIntegration {
    /// Write the results into the mesh.
    pub fn store(self, mesh: &mut Mesh) {
        mesh.set_integration_type(self.element, self.kind);
        for (cid, result) in self.cells {
            mesh.store_integration(cid, result);
        }
    }
}

/// Build quadrature for all volume cells of an element.
pub fn integrate_element(
    mesh: &Mesh,
    eid: ElementId,
    options: &IntegrationOptions,
) -> Result<ElementIntegration> {
    let element = mesh.element(eid);
    let cells = element.cells().to_vec();
    let coords = mesh.element_coords(eid);

    if let [only] = cells.as_slice() {
        let element_volume = element.shape().volume(&coords);
        let volume = mesh.cell(*only).volume();
        if (volume - element_volume).abs() <= WHOLE_ELEMENT_TOL * element_volume.abs() {
            let cell = IntegrationCell::new(element.shape(), coords, mesh.cell(*only).position());
            let result = CellIntegration {
                integration_cells: vec![cell],
                quadrature: None,
                boundary_cells: boundary::boundary_cells(mesh, *only, options.cubature_degree),
            };
            return Ok(ElementIntegration {
                element: eid,
                kind: IntegrationType::Uncut,
                cells: vec![(*only, result)],
            });
        }
    }

    let volume_rules: Vec<CellIntegration> = match options.strategy {
        Strategy::Tessellation => {
            let canonical = if options.simple_shapes {
                simple::canonical_cells(mesh, &cells)
            } else {
                None
            };
            let per_cell = match canonical {
                Some(found) => found,
                None => tetmesh::tessellate(mesh, eid, &cells)?,
            };
            per_cell
                .into_iter()
                .map(|found| CellIntegration {
                    integration_cells: found
                        .into_iter()
                        .flat_map(|c| options.shapes.apply(c))
                        .collect(),
                    ..CellIntegration::default()
                })
                .collect()
        }
        Strategy::MomentFitting | Strategy::DirectDivergence => {
            let mut out = Vec::with_capacity(cells.len());
            for &c in &cells {
                if !wants_volume_rule(mesh, c, options)? {
                    out.push(CellIntegration::default());
                    continue;
                }
                let rule = match options.strategy {
                    Strategy::MomentFitting => {
                        moment_fit::fit_cell(mesh, c, options.moment_fitting_degree)?
                    }
                    _ => divergence::divergence_cell(
                        mesh,
                        c,
                        options.moment_fitting_degree + 1,
                        options.divergence_line_points,
                    ),
                };
                out.push(CellIntegration {
                    quadrature: Some(rule),
                    ..CellIntegration::default()
                });
            }
            out
        }
    };

    let results: Vec<(CellId, CellIntegration)> = cells
        .iter()
        .zip(volume_rules)
        .map(|(&c, mut result)| {
            result.boundary_cells = boundary::boundary_cells(mesh, c, options.cubature_degree);
            (c, result)
        })
        .collect();
    debug!(
        element = element.user_id(),
        strategy = ?options.strategy,
        cells = results.len(),
        "element integrated"
    );
    Ok(ElementIntegration {
        element: eid,
        kind: options.strategy.into(),
        cells: results,
    })
}

/// Whether a cell gets a volume rule under `include_inner`.
fn wants_volume_rule(mesh: &Mesh, cid: CellId, options: &IntegrationOptions) -> Result<bool> {
    if options.include_inner {
        return Ok(true);
    }
    match mesh.cell(cid).position() {
        Position::Inside => Ok(false),
        Position::Undecided => Err(IntegrationError::UndecidedCell {
            element: mesh.element(mesh.cell(cid).element()).user_id(),
        }),
        Position::Outside | Position::OnCutSurface => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cutcell_geom::ElementShape;
    use cutcell_math::{Point3, Tolerance};

    const HEX: [[f64; 3]; 8] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];

    /// Unit hex cut by a quad with the given corners, fully processed.
    fn cut_hex(corners: [[f64; 3]; 4]) -> (Mesh, ElementId) {
        let mut mesh = Mesh::new(Tolerance::DEFAULT);
        for (i, p) in HEX.iter().enumerate() {
            mesh.add_node(i as u64 + 1, Point3::from(*p)).unwrap();
        }
        mesh.add_element(1, ElementShape::Hex8, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        for (i, p) in corners.iter().enumerate() {
            mesh.add_cutter_node(100 + i as u64, Point3::from(*p)).unwrap();
        }
        mesh.add_cutter_side(1, &[100, 101, 102, 103]).unwrap();
        mesh.reset_pass();
        let eid = mesh.element_id(1).unwrap();
        mesh.cut_element(eid).unwrap();
        mesh.find_positions().unwrap();
        (mesh, eid)
    }

    fn horizontal(z: f64) -> [[f64; 3]; 4] {
        [[-1.0, -1.0, z], [2.0, -1.0, z], [2.0, 2.0, z], [-1.0, 2.0, z]]
    }

    /// Tilted plane `z = 0.3 + 0.2 x + 0.1 y`.
    fn tilted() -> [[f64; 3]; 4] {
        let z = |x: f64, y: f64| 0.3 + 0.2 * x + 0.1 * y;
        [
            [-1.0, -1.0, z(-1.0, -1.0)],
            [2.0, -1.0, z(2.0, -1.0)],
            [2.0, 2.0, z(2.0, 2.0)],
            [-1.0, 2.0, z(-1.0, 2.0)],
        ]
    }

    fn total_volume(result: &ElementIntegration, degree: usize) -> f64 {
        result
            .cells
            .iter()
            .map(|(_, r)| match &r.quadrature {
                Some(rule) => rule.total_weight(),
                None => r.integration_cells.iter().map(|c| c.quadrature(degree).total_weight()).sum(),
            })
            .sum()
    }

    #[test]
    fn test_halved_hex_gives_two_hex_cells() {
        let (mesh, eid) = cut_hex(horizontal(0.5));
        let result = integrate_element(&mesh, eid, &IntegrationOptions::default()).unwrap();
        assert_eq!(result.kind, IntegrationType::Tessellation);
        assert_eq!(result.cells.len(), 2);
        for (_, r) in &result.cells {
            assert_eq!(r.integration_cells.len(), 1);
            assert_eq!(r.integration_cells[0].shape, ElementShape::Hex8);
            assert_relative_eq!(r.integration_cells[0].volume, 0.5, epsilon = 1e-10);
            assert_eq!(r.boundary_cells.len(), 2);
        }
    }

    #[test]
    fn test_hex_filter_splits_into_tets() {
        let (mesh, eid) = cut_hex(horizontal(0.5));
        let options = IntegrationOptions {
            shapes: ShapeFilter { hex8: false, wedge6: false, pyramid5: false },
            ..IntegrationOptions::default()
        };
        let result = integrate_element(&mesh, eid, &options).unwrap();
        for (_, r) in &result.cells {
            assert_eq!(r.integration_cells.len(), 5);
        }
        assert_relative_eq!(total_volume(&result, 2), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_tilted_cut_tessellation_conserves_volume() {
        let (mesh, eid) = cut_hex(tilted());
        let options = IntegrationOptions {
            simple_shapes: false,
            ..IntegrationOptions::default()
        };
        let result = integrate_element(&mesh, eid, &options).unwrap();
        assert_eq!(result.kind, IntegrationType::Tessellation);
        for (cid, r) in &result.cells {
            let sum: f64 = r.integration_cells.iter().map(|c| c.volume).sum();
            assert_relative_eq!(sum, mesh.cell(*cid).volume(), epsilon = 1e-10);
            assert!(r.integration_cells.iter().all(|c| c.shape == ElementShape::Tet4));
        }
        assert_relative_eq!(total_volume(&result, 1), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_moment_fitting_integrates_quadratic() {
        let (mesh, eid) = cut_hex(tilted());
        let options = IntegrationOptions {
            strategy: Strategy::MomentFitting,
            moment_fitting_degree: 2,
            ..IntegrationOptions::default()
        };
        let result = integrate_element(&mesh, eid, &options).unwrap();
        assert_eq!(result.kind, IntegrationType::MomentFitting);
        // x^2 over the unit cube is 1/3 however it is split.
        let total: f64 = result
            .cells
            .iter()
            .map(|(_, r)| r.quadrature.as_ref().unwrap().integrate(|p| p.x * p.x))
            .sum();
        assert_relative_eq!(total, 1.0 / 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_direct_divergence_matches_cell_volumes() {
        let (mesh, eid) = cut_hex(tilted());
        let options = IntegrationOptions {
            strategy: Strategy::DirectDivergence,
            ..IntegrationOptions::default()
        };
        let result = integrate_element(&mesh, eid, &options).unwrap();
        for (cid, r) in &result.cells {
            let rule = r.quadrature.as_ref().unwrap();
            assert_relative_eq!(rule.total_weight(), mesh.cell(*cid).volume(), epsilon = 1e-10);
        }
        let total: f64 = result
            .cells
            .iter()
            .map(|(_, r)| r.quadrature.as_ref().unwrap().integrate(|p| p.y * p.z))
            .sum();
        assert_relative_eq!(total, 0.25, epsilon = 1e-10);
    }

    #[test]
    fn test_outer_only_skips_inside_cell() {
        let (mesh, eid) = cut_hex(horizontal(0.5));
        let options = IntegrationOptions {
            strategy: Strategy::DirectDivergence,
            include_inner: false,
            ..IntegrationOptions::default()
        };
        let result = integrate_element(&mesh, eid, &options).unwrap();
        for (cid, r) in &result.cells {
            match mesh.cell(*cid).position() {
                Position::Inside => assert!(r.quadrature.is_none()),
                _ => assert!(r.quadrature.is_some()),
            }
        }
    }

    #[test]
    fn test_untouched_hex_is_uncut() {
        let (mesh, eid) = cut_hex(horizontal(3.0));
        let result = integrate_element(&mesh, eid, &IntegrationOptions::default()).unwrap();
        assert_eq!(result.kind, IntegrationType::Uncut);
        assert_eq!(result.cells.len(), 1);
        assert!(result.cells[0].1.boundary_cells.is_empty());
    }

    #[test]
    fn test_store_writes_back() {
        let (mut mesh, eid) = cut_hex(horizontal(0.5));
        let result = integrate_element(&mesh, eid, &IntegrationOptions::default()).unwrap();
        result.store(&mut mesh);
        assert_eq!(mesh.element(eid).integration_type(), IntegrationType::Tessellation);
        assert!(mesh.num_gauss_points(eid) > 0);
    }
}
