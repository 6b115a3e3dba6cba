//! Canonical cell shapes read directly off a volume cell's facets.
//!
//! A cell bounded by four triangles is a tet, by six quads a hex, by two
//! triangles and three quads a wedge, and by one quad and four triangles a
//! pyramid. The node order is recovered from the face loops, which are
//! counterclockwise seen from outside the cell.

use std::collections::{BTreeMap, BTreeSet};

use cutcell_geom::ElementShape;
use cutcell_math::{Point3, Tolerance};
use cutcell_mesh::{CellId, IntegrationCell, Mesh, PointId};

/// Relative volume mismatch accepted between a detected shape and its cell.
const VOLUME_TOL: f64 = 1e-8;

/// Face loops of a cell, counterclockwise seen from outside, with
/// collinear vertices removed. `None` if a facet has holes.
pub(crate) fn cell_faces(mesh: &Mesh, cid: CellId) -> Option<Vec<Vec<PointId>>> {
    let tol = mesh.tolerance();
    let mut faces = Vec::new();
    for &(f, outward) in mesh.cell(cid).facets() {
        let facet = mesh.facet(f);
        if !facet.holes().is_empty() {
            return None;
        }
        let mut ring = corners(mesh, facet.points(), tol);
        if !outward {
            ring.reverse();
        }
        if ring.len() < 3 {
            return None;
        }
        faces.push(ring);
    }
    Some(faces)
}

/// Drop loop vertices lying on the segment between their neighbours.
fn corners(mesh: &Mesh, ring: &[PointId], tol: &Tolerance) -> Vec<PointId> {
    let coords: Vec<Point3> = ring.iter().map(|&p| mesh.points().coords(p)).collect();
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let prev = coords[(i + n - 1) % n];
            let next = coords[(i + 1) % n];
            let a = prev - coords[i];
            let b = next - coords[i];
            a.cross(&b).norm() > tol.reference * a.norm() * b.norm()
        })
        .map(|i| ring[i])
        .collect()
}

/// Undirected edges of a face set.
fn edge_neighbors(faces: &[Vec<PointId>]) -> BTreeMap<PointId, BTreeSet<PointId>> {
    let mut out: BTreeMap<PointId, BTreeSet<PointId>> = BTreeMap::new();
    for face in faces {
        for i in 0..face.len() {
            let (a, b) = (face[i], face[(i + 1) % face.len()]);
            out.entry(a).or_default().insert(b);
            out.entry(b).or_default().insert(a);
        }
    }
    out
}

/// For each node of `base`, its single neighbour outside `base`.
fn lift(
    base: &[PointId],
    neighbors: &BTreeMap<PointId, BTreeSet<PointId>>,
) -> Option<Vec<PointId>> {
    base.iter()
        .map(|p| {
            let mut up = neighbors.get(p)?.iter().filter(|q| !base.contains(q));
            let q = *up.next()?;
            up.next().is_none().then_some(q)
        })
        .collect()
}

/// Recover the node order of a canonical shape from its faces.
fn match_shape(faces: &[Vec<PointId>]) -> Option<(ElementShape, Vec<PointId>)> {
    let tris: Vec<&Vec<PointId>> = faces.iter().filter(|f| f.len() == 3).collect();
    let quads: Vec<&Vec<PointId>> = faces.iter().filter(|f| f.len() == 4).collect();
    if tris.len() + quads.len() != faces.len() {
        return None;
    }
    let vertices: BTreeSet<PointId> = faces.iter().flatten().copied().collect();
    let neighbors = edge_neighbors(faces);

    let (shape, nodes) = match (tris.len(), quads.len()) {
        (4, 0) => {
            let [a, b, c] = [tris[0][0], tris[0][1], tris[0][2]];
            let apex = *vertices.iter().find(|v| !tris[0].contains(v))?;
            (ElementShape::Tet4, vec![a, c, b, apex])
        }
        (0, 6) => {
            let q = quads[0];
            let bottom = vec![q[0], q[3], q[2], q[1]];
            let top = lift(&bottom, &neighbors)?;
            (ElementShape::Hex8, [bottom, top].concat())
        }
        (2, 3) => {
            let t = tris[0];
            let bottom = vec![t[0], t[2], t[1]];
            let top = lift(&bottom, &neighbors)?;
            (ElementShape::Wedge6, [bottom, top].concat())
        }
        (4, 1) => {
            let q = quads[0];
            let apex = *vertices.iter().find(|v| !q.contains(v))?;
            (ElementShape::Pyramid5, vec![q[0], q[3], q[2], q[1], apex])
        }
        _ => return None,
    };

    let distinct: BTreeSet<PointId> = nodes.iter().copied().collect();
    if distinct.len() != shape.num_nodes() || distinct != vertices {
        return None;
    }
    // Every face must be a side of the recovered shape.
    let sides: BTreeSet<Vec<PointId>> = shape
        .sides()
        .iter()
        .map(|side| {
            let mut ids: Vec<PointId> = side.iter().map(|&i| nodes[i]).collect();
            ids.sort();
            ids
        })
        .collect();
    let all_match = faces.iter().all(|face| {
        let mut ids = face.clone();
        ids.sort();
        sides.contains(&ids)
    });
    all_match.then_some((shape, nodes))
}

/// The canonical shape of one volume cell, checked against the cell's
/// volume and for a positive Jacobian.
pub fn canonical_cell(mesh: &Mesh, cid: CellId) -> Option<IntegrationCell> {
    let faces = cell_faces(mesh, cid)?;
    let (shape, nodes) = match_shape(&faces)?;
    let coords: Vec<Point3> = nodes.iter().map(|&p| mesh.points().coords(p)).collect();

    let cell = mesh.cell(cid);
    let rule = shape.gauss_rule(&coords, 2);
    if rule.weights.iter().any(|&w| w <= 0.0) {
        return None;
    }
    let volume = rule.total_weight();
    if (volume - cell.volume()).abs() > VOLUME_TOL * cell.volume().abs().max(f64::MIN_POSITIVE) {
        return None;
    }
    Some(IntegrationCell::new(shape, coords, cell.position()))
}

/// Canonical shapes for every cell of an element, or `None` if any cell is
/// not one.
pub fn canonical_cells(mesh: &Mesh, cells: &[CellId]) -> Option<Vec<Vec<IntegrationCell>>> {
    cells
        .iter()
        .map(|&c| canonical_cell(mesh, c).map(|cell| vec![cell]))
        .collect()
}

/// Which canonical shapes are kept as integration cells; the others are
/// split into tets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeFilter {
    /// Keep hex8 cells.
    pub hex8: bool,
    /// Keep wedge6 cells.
    pub wedge6: bool,
    /// Keep pyramid5 cells.
    pub pyramid5: bool,
}

impl ShapeFilter {
    fn keeps(&self, shape: ElementShape) -> bool {
        match shape {
            ElementShape::Tet4 => true,
            ElementShape::Hex8 => self.hex8,
            ElementShape::Wedge6 => self.wedge6,
            ElementShape::Pyramid5 => self.pyramid5,
        }
    }

    /// Split a cell into tets unless its shape is kept.
    pub fn apply(&self, cell: IntegrationCell) -> Vec<IntegrationCell> {
        if self.keeps(cell.shape) {
            return vec![cell];
        }
        cell.shape
            .tet_split()
            .iter()
            .map(|tet| {
                let coords = tet.iter().map(|&i| cell.coords[i]).collect();
                IntegrationCell::new(ElementShape::Tet4, coords, cell.position)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cutcell_mesh::Position;

    fn unit_hex_cell() -> IntegrationCell {
        let coords = ElementShape::Hex8
            .reference_nodes()
            .iter()
            .map(|n| Point3::new(n[0] * 0.5 + 0.5, n[1] * 0.5 + 0.5, n[2] * 0.5 + 0.5))
            .collect();
        IntegrationCell::new(ElementShape::Hex8, coords, Position::Inside)
    }

    #[test]
    fn test_filter_keeps_hex() {
        let filter = ShapeFilter { hex8: true, wedge6: false, pyramid5: false };
        assert_eq!(filter.apply(unit_hex_cell()).len(), 1);
    }

    #[test]
    fn test_filter_splits_hex_into_five_tets() {
        let filter = ShapeFilter { hex8: false, wedge6: false, pyramid5: false };
        let tets = filter.apply(unit_hex_cell());
        assert_eq!(tets.len(), 5);
        let total: f64 = tets.iter().map(|t| t.volume).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(tets.iter().all(|t| t.volume > 0.0));
        assert!(tets.iter().all(|t| t.position == Position::Inside));
    }
}
