//! Deterministic tetrahedralization of a cut element.
//!
//! The element is split by the plane of every internal facet into convex
//! pieces. No piece crosses a facet, so each one lies in exactly one volume
//! cell. Each piece is fanned into tets from its smallest vertex.
//!
//! Planes are canonicalized and sorted by coefficients before splitting,
//! so the decomposition depends only on the geometry and not on the order
//! in which cutter sides were added.

use std::cmp::Ordering;

use tracing::debug;

use cutcell_geom::ElementShape;
use cutcell_math::{cmp_points, polygon, Plane, Point3, Tolerance, Vec3};
use cutcell_mesh::{CellId, ElementId, IntegrationCell, Mesh};

use crate::error::{IntegrationError, Result};

/// Relative volume mismatch accepted between a cell and its tets.
const VOLUME_TOL: f64 = 1e-6;

/// Oriented splitting plane `normal · x = offset`.
#[derive(Debug, Clone, Copy)]
struct SplitPlane {
    normal: Vec3,
    offset: f64,
}

impl SplitPlane {
    /// Flip so the first significant component of the normal is positive.
    fn canonical(normal: Vec3, through: &Point3, tol: &Tolerance) -> Self {
        let first = normal
            .iter()
            .copied()
            .find(|c| c.abs() > tol.reference)
            .unwrap_or(0.0);
        let normal = if first < 0.0 { -normal } else { normal };
        Self {
            normal,
            offset: normal.dot(&through.coords),
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        self.normal
            .x
            .total_cmp(&other.normal.x)
            .then(self.normal.y.total_cmp(&other.normal.y))
            .then(self.normal.z.total_cmp(&other.normal.z))
            .then(self.offset.total_cmp(&other.offset))
    }

    fn same(&self, other: &Self, tol: &Tolerance) -> bool {
        (self.normal - other.normal).norm() <= tol.reference
            && (self.offset - other.offset).abs() <= tol.merge
    }

    fn distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }
}

/// A convex polyhedron as outward, counterclockwise face loops.
#[derive(Debug, Clone)]
struct ConvexPiece {
    faces: Vec<Vec<Point3>>,
}

impl ConvexPiece {
    fn vertices(&self) -> Vec<Point3> {
        let mut out: Vec<Point3> = Vec::new();
        for p in self.faces.iter().flatten() {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        out
    }

    fn centroid(&self) -> Point3 {
        polygon::centroid(&self.vertices())
    }

    /// Split into the parts below and above `plane`. A piece entirely on
    /// one side comes back unchanged.
    fn split(&self, plane: &SplitPlane, tol: &Tolerance) -> (Option<Self>, Option<Self>) {
        let snap = |p: &Point3| {
            let d = plane.distance(p);
            if d.abs() <= tol.merge { 0.0 } else { d }
        };
        let dists: Vec<f64> = self.faces.iter().flatten().map(snap).collect();
        if dists.iter().all(|&d| d >= 0.0) {
            return (None, Some(self.clone()));
        }
        if dists.iter().all(|&d| d <= 0.0) {
            return (Some(self.clone()), None);
        }
        let below = self.clip(plane, tol, -1.0);
        let above = self.clip(plane, tol, 1.0);
        (below, above)
    }

    /// Keep the part where `sign * distance >= 0` and close it with a cap.
    fn clip(&self, plane: &SplitPlane, tol: &Tolerance, sign: f64) -> Option<Self> {
        let dist = |p: &Point3| {
            let d = sign * plane.distance(p);
            if d.abs() <= tol.merge { 0.0 } else { d }
        };
        let mut faces = Vec::new();
        let mut on_plane: Vec<Point3> = Vec::new();
        for face in &self.faces {
            let mut out: Vec<Point3> = Vec::new();
            for i in 0..face.len() {
                let (p, q) = (face[i], face[(i + 1) % face.len()]);
                let (dp, dq) = (dist(&p), dist(&q));
                if dp >= 0.0 {
                    out.push(p);
                    if dp == 0.0 {
                        on_plane.push(p);
                    }
                }
                if (dp > 0.0 && dq < 0.0) || (dp < 0.0 && dq > 0.0) {
                    // Interpolate from the smaller end so both faces of an
                    // edge produce the same point.
                    let (s, e, ds, de) = if cmp_points(&p, &q) == Ordering::Less {
                        (p, q, dp, dq)
                    } else {
                        (q, p, dq, dp)
                    };
                    let x = s + (e - s) * (ds / (ds - de));
                    out.push(x);
                    on_plane.push(x);
                }
            }
            if out.len() >= 3 && polygon::area_3d(&out) > tol.merge * tol.merge {
                faces.push(out);
            }
        }

        let normal = plane.normal * -sign;
        let frame = Plane::new(polygon::centroid(&on_plane), normal)?;
        let flat: Vec<_> = on_plane.iter().map(|p| frame.to_2d(p)).collect();
        let hull = polygon::convex_hull_2d(&flat, tol.merge);
        if hull.len() >= 3 {
            faces.push(hull.iter().map(|&i| on_plane[i]).collect());
        }
        (faces.len() >= 4).then_some(Self { faces })
    }

    /// Fan tets from the smallest vertex, skipping faces through it.
    fn tets(&self, min_volume: f64) -> Vec<[Point3; 4]> {
        let Some(apex) = self
            .vertices()
            .into_iter()
            .min_by(cmp_points)
        else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for face in &self.faces {
            if face.iter().any(|p| *p == apex) {
                continue;
            }
            for i in 1..face.len() - 1 {
                let (a, b, c) = (face[0], face[i], face[i + 1]);
                if cutcell_math::tet_signed_volume(&a, &c, &b, &apex) > min_volume {
                    out.push([a, c, b, apex]);
                }
            }
        }
        out
    }
}

/// Convex piece of a straight-sided element.
fn element_piece(shape: ElementShape, coords: &[Point3]) -> ConvexPiece {
    let faces = shape
        .sides()
        .iter()
        .map(|side| side.iter().map(|&i| coords[i]).collect())
        .collect();
    ConvexPiece { faces }
}

/// Sorted, deduplicated planes of the element's internal facets.
fn split_planes(mesh: &Mesh, eid: ElementId) -> Vec<SplitPlane> {
    let tol = mesh.tolerance();
    let mut planes: Vec<SplitPlane> = mesh
        .element(eid)
        .facets()
        .iter()
        .filter(|&&f| !mesh.facet(f).is_owned())
        .filter_map(|&f| {
            // The smallest corner, not the centroid, so the offset does not
            // depend on where the loop starts.
            let through = mesh.facet_coords(f).into_iter().min_by(cmp_points)?;
            Some(SplitPlane::canonical(mesh.facet(f).normal(), &through, tol))
        })
        .collect();
    planes.sort_by(SplitPlane::cmp);
    planes.dedup_by(|a, b| a.same(b, tol));
    planes
}

/// Tets of every volume cell of a cut element, in the order of `cells`.
pub fn tessellate(mesh: &Mesh, eid: ElementId, cells: &[CellId]) -> Result<Vec<Vec<IntegrationCell>>> {
    let tol = mesh.tolerance();
    let element = mesh.element(eid);
    let coords = mesh.element_coords(eid);
    let element_volume = element.shape().volume(&coords);
    let fail = |reason: String| IntegrationError::TriangulationFailed {
        element: element.user_id(),
        reason,
    };

    let mut pieces = vec![element_piece(element.shape(), &coords)];
    let planes = split_planes(mesh, eid);
    for plane in &planes {
        pieces = pieces
            .iter()
            .flat_map(|piece| {
                let (below, above) = piece.split(plane, tol);
                below.into_iter().chain(above)
            })
            .collect();
    }

    let min_volume = 1e-14 * element_volume.abs();
    let mut out: Vec<Vec<IntegrationCell>> = vec![Vec::new(); cells.len()];
    for piece in &pieces {
        let tets = piece.tets(min_volume);
        if tets.is_empty() {
            continue;
        }
        let center = piece.centroid();
        let slot = cells
            .iter()
            .position(|&c| mesh.point_in_cell(c, &center))
            .ok_or_else(|| fail(format!("no volume cell contains piece centred at {center:?}")))?;
        let position = mesh.cell(cells[slot]).position();
        out[slot].extend(
            tets.into_iter()
                .map(|t| IntegrationCell::new(ElementShape::Tet4, t.to_vec(), position)),
        );
    }

    for (slot, &c) in cells.iter().enumerate() {
        let expected = mesh.cell(c).volume();
        let got: f64 = out[slot].iter().map(|t| t.volume).sum();
        if (got - expected).abs() > VOLUME_TOL * element_volume.abs() {
            return Err(fail(format!(
                "tets of a cell sum to {got:e}, cell volume is {expected:e}"
            )));
        }
    }
    debug!(
        element = element.user_id(),
        planes = planes.len(),
        pieces = pieces.len(),
        "element tessellated"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube() -> ConvexPiece {
        let coords: Vec<Point3> = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ]
        .iter()
        .map(|p| Point3::from(*p))
        .collect();
        element_piece(ElementShape::Hex8, &coords)
    }

    fn volume(piece: &ConvexPiece) -> f64 {
        piece
            .tets(0.0)
            .iter()
            .map(|[a, b, c, d]| cutcell_math::tet_signed_volume(a, b, c, d))
            .sum()
    }

    #[test]
    fn test_cube_fan_volume() {
        assert_relative_eq!(volume(&cube()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_cube_by_oblique_plane() {
        let tol = Tolerance::DEFAULT;
        let plane = SplitPlane::canonical(
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            &Point3::new(0.5, 0.5, 0.5),
            &tol,
        );
        let (below, above) = cube().split(&plane, &tol);
        let (below, above) = (below.unwrap(), above.unwrap());
        assert_relative_eq!(volume(&below), 0.5, epsilon = 1e-12);
        assert_relative_eq!(volume(&above), 0.5, epsilon = 1e-12);
        // The cap of this cut is a hexagon.
        assert!(below.faces.iter().any(|f| f.len() == 6));
    }

    #[test]
    fn test_plane_touching_face_leaves_piece_whole() {
        let tol = Tolerance::DEFAULT;
        let plane = SplitPlane::canonical(Vec3::z(), &Point3::new(0.0, 0.0, 1.0), &tol);
        let (below, above) = cube().split(&plane, &tol);
        assert!(above.is_none());
        assert_relative_eq!(volume(&below.unwrap()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_canonical_plane_orientation() {
        let tol = Tolerance::DEFAULT;
        let a = SplitPlane::canonical(-Vec3::x(), &Point3::new(0.3, 0.0, 0.0), &tol);
        let b = SplitPlane::canonical(Vec3::x(), &Point3::new(0.3, 5.0, 1.0), &tol);
        assert!(a.same(&b, &tol));
        assert_relative_eq!(a.offset, 0.3);
    }
}
