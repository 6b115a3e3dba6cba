//! Volume cells and the quadrature carriers attached to them.

use cutcell_geom::{ElementShape, QuadratureRule};
use cutcell_math::{Point3, Vec3};

use crate::ids::{CellId, ElementId, FacetId, SideId};
use crate::mesh::Mesh;
use crate::point::Position;

/// Ray direction for parity tests, tilted off the coordinate axes so that
/// axis-aligned facet edges are not hit head-on.
const RAY_DIR: [f64; 3] = [1.0, 1.37e-3, 2.91e-3];

/// A closed polyhedral sub-region of one element.
#[derive(Debug, Clone)]
pub struct VolumeCell {
    pub(crate) element: ElementId,
    /// Bounding facets with `true` where the facet normal points out of
    /// the cell.
    pub(crate) facets: Vec<(FacetId, bool)>,
    pub(crate) position: Position,
    pub(crate) volume: f64,
    pub(crate) integration_cells: Vec<IntegrationCell>,
    pub(crate) quadrature: Option<QuadratureRule>,
    pub(crate) boundary_cells: Vec<BoundaryCell>,
}

impl VolumeCell {
    /// Owning element.
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Bounding facets and whether each facet's normal points outward.
    pub fn facets(&self) -> &[(FacetId, bool)] {
        &self.facets
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Volume from the divergence theorem over the bounding facets.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Integration cells from tessellation.
    pub fn integration_cells(&self) -> &[IntegrationCell] {
        &self.integration_cells
    }

    /// Direct quadrature from moment fitting or direct divergence.
    pub fn quadrature(&self) -> Option<&QuadratureRule> {
        self.quadrature.as_ref()
    }

    /// Triangles of the cut surface bounding this cell.
    pub fn boundary_cells(&self) -> &[BoundaryCell] {
        &self.boundary_cells
    }

    /// Number of volume quadrature points, at the given per-cell degree for
    /// integration cells.
    pub fn num_gauss_points(&self) -> usize {
        match &self.quadrature {
            Some(rule) => rule.len(),
            None => self
                .integration_cells
                .iter()
                .map(|c| c.quadrature(IntegrationCell::DEFAULT_DEGREE).len())
                .sum(),
        }
    }

    /// The cell's volume quadrature: the direct rule, or the union of the
    /// integration-cell rules at `degree`.
    pub fn rule(&self, degree: usize) -> QuadratureRule {
        if let Some(rule) = &self.quadrature {
            return rule.clone();
        }
        let mut rule = QuadratureRule::default();
        for cell in &self.integration_cells {
            rule.extend(&cell.quadrature(degree));
        }
        rule
    }
}

/// A canonical sub-element used for quadrature.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationCell {
    /// Shape of the sub-element.
    pub shape: ElementShape,
    /// Node coordinates in shape order.
    pub coords: Vec<Point3>,
    /// Position inherited from the volume cell.
    pub position: Position,
    /// Volume of the sub-element.
    pub volume: f64,
}

impl IntegrationCell {
    /// Polynomial degree used when no degree is requested.
    pub const DEFAULT_DEGREE: usize = 3;

    /// Build a cell and compute its volume.
    pub fn new(shape: ElementShape, coords: Vec<Point3>, position: Position) -> Self {
        let volume = shape.volume(&coords);
        Self {
            shape,
            coords,
            position,
            volume,
        }
    }

    /// Physical Gauss rule of the cell.
    pub fn quadrature(&self, degree: usize) -> QuadratureRule {
        self.shape.gauss_rule(&self.coords, degree)
    }
}

/// A triangle of the cut surface with its surface rule.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCell {
    /// Corners, counterclockwise about `normal`.
    pub points: [Point3; 3],
    /// Unit normal pointing out of the volume cell.
    pub normal: Vec3,
    /// Triangle area.
    pub area: f64,
    /// The cutter side this triangle lies on.
    pub side: SideId,
    /// Surface Gauss rule (weights include the area).
    pub rule: QuadratureRule,
}

/// Everything an integrator computes for one volume cell.
#[derive(Debug, Clone, Default)]
pub struct CellIntegration {
    /// Integration cells (tessellation and uncut elements).
    pub integration_cells: Vec<IntegrationCell>,
    /// Direct rule (moment fitting, direct divergence).
    pub quadrature: Option<QuadratureRule>,
    /// Cut-surface triangles.
    pub boundary_cells: Vec<BoundaryCell>,
}

impl Mesh {
    /// Triangles of a cell's boundary, counterclockwise about the outward
    /// normal.
    pub fn cell_triangles(&self, cid: CellId) -> Vec<[Point3; 3]> {
        self.cells[cid]
            .facets
            .iter()
            .flat_map(|&(f, outward)| self.facet_triangles(f, !outward))
            .collect()
    }

    /// Ray-cast parity test against a cell's boundary.
    pub fn point_in_cell(&self, cid: CellId, x: &Point3) -> bool {
        point_in_triangles(x, &self.cell_triangles(cid))
    }

    /// Store an integrator's results.
    pub fn store_integration(&mut self, cid: CellId, result: CellIntegration) {
        let cell = &mut self.cells[cid];
        cell.integration_cells = result.integration_cells;
        cell.quadrature = result.quadrature;
        cell.boundary_cells = result.boundary_cells;
    }

    /// Cells of an element at a given position.
    pub fn cells_at(&self, eid: ElementId, position: Position) -> Vec<CellId> {
        self.elements[eid]
            .cells
            .iter()
            .copied()
            .filter(|&c| self.cells[c].position == position)
            .collect()
    }
}

/// Signed volume enclosed by outward triangles, relative to `origin`.
pub fn enclosed_volume(triangles: &[[Point3; 3]], origin: &Point3) -> f64 {
    triangles
        .iter()
        .map(|[a, b, c]| cutcell_math::tet_signed_volume(origin, a, b, c))
        .sum()
}

/// Parity of ray crossings through a closed triangle set (Möller–Trumbore).
pub fn point_in_triangles(x: &Point3, triangles: &[[Point3; 3]]) -> bool {
    let dir = Vec3::new(RAY_DIR[0], RAY_DIR[1], RAY_DIR[2]);
    let mut crossings = 0u32;
    for [v0, v1, v2] in triangles {
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let h = dir.cross(&e2);
        let a = e1.dot(&h);
        if a.abs() < 1e-14 * e1.norm() * e2.norm() {
            continue;
        }
        let f = 1.0 / a;
        let s = x - v0;
        let u = f * s.dot(&h);
        if !(0.0..1.0).contains(&u) {
            continue;
        }
        let q = s.cross(&e1);
        let v = f * dir.dot(&q);
        if v < 0.0 || u + v >= 1.0 {
            continue;
        }
        if f * e2.dot(&q) > 0.0 {
            crossings += 1;
        }
    }
    crossings % 2 == 1
}
