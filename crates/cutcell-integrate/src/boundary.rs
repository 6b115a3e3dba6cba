//! Boundary cells: triangles of the cut surface around a volume cell.

use cutcell_geom::gauss::triangle_physical_rule;
use cutcell_mesh::{BoundaryCell, CellId, Mesh};

/// Triangulate every facet of a cell lying on a cutter side, oriented with
/// the cell's outward normal.
pub fn boundary_cells(mesh: &Mesh, cid: CellId, degree: usize) -> Vec<BoundaryCell> {
    let mut out = Vec::new();
    for &(f, outward) in mesh.cell(cid).facets() {
        let facet = mesh.facet(f);
        let side = match (facet.is_owned(), facet.on_cut_side()) {
            (false, _) => facet.parent(),
            (true, Some(s)) => s,
            (true, None) => continue,
        };
        for points in mesh.facet_triangles(f, !outward) {
            let cross = (points[1] - points[0]).cross(&(points[2] - points[0]));
            let norm = cross.norm();
            if norm <= 0.0 {
                continue;
            }
            out.push(BoundaryCell {
                points,
                normal: cross / norm,
                area: norm * 0.5,
                side,
                rule: triangle_physical_rule(&points, degree),
            });
        }
    }
    out
}
