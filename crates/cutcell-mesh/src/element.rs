//! Background elements and the per-element cutting driver.
//!
//! Cutting an element walks every accumulated cutter side through
//! `untested → cut points → cut lines → facets`, then assembles the facets
//! into volume cells.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use cutcell_geom::ElementShape;
use cutcell_math::{polygon, Plane, Point2, Point3, Vec3};

use crate::error::{GeometryError, Result};
use crate::ids::{CellId, EdgeId, ElementId, FacetId, NodeId, PointId, SideId};
use crate::intersect::{snap_point, SNAP_FACTOR};
use crate::mesh::Mesh;
use crate::side::SideKind;

/// Progress of one (element, cutter side) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CutStage {
    /// Not intersected yet.
    Untested,
    /// Cut points registered.
    CutPointsFound,
    /// Cut points joined into cut lines.
    CutLinesFound,
    /// Facets emitted.
    FacetsBuilt,
}

/// Which quadrature strategy produced an element's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    /// The element's own rule; not cut or only touched.
    Uncut,
    /// Integration cells of canonical shape.
    Tessellation,
    /// Fitted points and weights per volume cell.
    MomentFitting,
    /// Boundary integrals through the divergence theorem.
    DirectDivergence,
}

/// A straight segment between two cut points, lying on `carrier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutLine {
    /// The side the line splits (element side or cutter side).
    pub carrier: SideId,
    /// The cutter side that produced it.
    pub cutter: SideId,
    /// End points.
    pub points: [PointId; 2],
}

/// A background mesh cell.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) user_id: u64,
    pub(crate) shape: ElementShape,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) sides: Vec<SideId>,
    pub(crate) edges: Vec<EdgeId>,
    /// Cutter sides cutting or touching this element, canonical order.
    pub(crate) cut_faces: Vec<SideId>,
    pub(crate) stages: BTreeMap<SideId, CutStage>,
    pub(crate) pair_points: BTreeMap<SideId, BTreeSet<PointId>>,
    /// Every point registered against this element.
    pub(crate) points: BTreeSet<PointId>,
    /// Cutter sides crossing the interior, with their trimmed loop.
    pub(crate) internal_polygons: Vec<(SideId, Vec<PointId>)>,
    /// Cutter sides lying flat on an element side.
    pub(crate) touches: Vec<(SideId, SideId)>,
    pub(crate) cut_lines: Vec<CutLine>,
    pub(crate) facets: Vec<FacetId>,
    pub(crate) cells: Vec<CellId>,
    pub(crate) active: bool,
    pub(crate) shadow: bool,
    pub(crate) quad_corners: Option<Vec<Point3>>,
    pub(crate) integration_type: IntegrationType,
}

impl Element {
    pub(crate) fn new(
        user_id: u64,
        shape: ElementShape,
        nodes: Vec<NodeId>,
        edges: Vec<EdgeId>,
    ) -> Self {
        Self {
            user_id,
            shape,
            nodes,
            sides: Vec::new(),
            edges,
            cut_faces: Vec::new(),
            stages: BTreeMap::new(),
            pair_points: BTreeMap::new(),
            points: BTreeSet::new(),
            internal_polygons: Vec::new(),
            touches: Vec::new(),
            cut_lines: Vec::new(),
            facets: Vec::new(),
            cells: Vec::new(),
            active: true,
            shadow: false,
            quad_corners: None,
            integration_type: IntegrationType::Uncut,
        }
    }

    /// Drop everything a cutting pass derived.
    pub(crate) fn clear_cut_state(&mut self) {
        self.cut_faces.clear();
        self.stages.clear();
        self.pair_points.clear();
        self.points.clear();
        self.internal_polygons.clear();
        self.touches.clear();
        self.cut_lines.clear();
        self.facets.clear();
        self.cells.clear();
        self.integration_type = IntegrationType::Uncut;
    }

    /// Caller-assigned id.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Element shape.
    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    /// Node handles in shape order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Side handles in shape order.
    pub fn sides(&self) -> &[SideId] {
        &self.sides
    }

    /// Accumulated cutter sides, canonical order.
    pub fn cut_faces(&self) -> &[SideId] {
        &self.cut_faces
    }

    /// Stage reached by one cutter side.
    pub fn stage(&self, cutter: SideId) -> CutStage {
        self.stages.get(&cutter).copied().unwrap_or(CutStage::Untested)
    }

    /// Cut lines of this element.
    pub fn cut_lines(&self) -> &[CutLine] {
        &self.cut_lines
    }

    /// Facets of this element.
    pub fn facets(&self) -> &[FacetId] {
        &self.facets
    }

    /// Volume cells of this element.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Whether integration cells are generated for this element.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether this is the linear shadow of a quadratic element.
    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    /// Corner coordinates of the quadratic parent, if set.
    pub fn quad_corners(&self) -> Option<&[Point3]> {
        self.quad_corners.as_deref()
    }

    /// Strategy recorded by the last integration.
    pub fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }
}

impl Mesh {
    // =========================================================================
    // Cutting driver
    // =========================================================================

    /// Run every cutting stage on one element.
    pub fn cut_element(&mut self, eid: ElementId) -> Result<()> {
        self.find_cut_points(eid)?;
        self.find_cut_lines(eid)?;
        self.make_facets(eid)?;
        self.make_volume_cells(eid)?;
        let element = &self.elements[eid];
        debug!(
            element = element.user_id,
            cut_faces = element.cut_faces.len(),
            facets = element.facets.len(),
            cells = element.cells.len(),
            "element cut"
        );
        Ok(())
    }

    /// Cutter sides whose bounding box overlaps the element.
    fn candidate_cutters(&self, eid: ElementId) -> Vec<SideId> {
        let mut bbox = self.element_aabb(eid);
        bbox.expand(self.tol.merge);
        self.all_cutter_sides()
            .into_iter()
            .filter(|&sid| match self.sides[sid].kind {
                SideKind::LevelSet { element } => element == eid,
                _ => true,
            })
            .filter(|&sid| self.side_aabb(sid).overlaps(&bbox))
            .collect()
    }

    /// Stage 1: intersect the element with every candidate cutter side.
    pub fn find_cut_points(&mut self, eid: ElementId) -> Result<()> {
        for cutter in self.candidate_cutters(eid) {
            let points = self.intersect_side_pair(eid, cutter)?;
            if points.is_empty() {
                continue;
            }
            let plane = self.side_plane(cutter)?;
            let diameter = self.side_aabb(cutter).diagonal();
            let limit = (self.tol.reference * diameter).max(10.0 * self.tol.merge);
            for &pid in &points {
                let x = self.pool.coords(pid);
                let distance = plane.signed_distance(&x).abs();
                if distance > limit {
                    return Err(GeometryError::CutPointNotOnSide {
                        x: x.x,
                        y: x.y,
                        z: x.z,
                        side: self.sides[cutter].user_id(),
                        distance,
                    });
                }
            }
            let element = &mut self.elements[eid];
            element.points.extend(points.iter().copied());
            element.cut_faces.push(cutter);
            element.pair_points.insert(cutter, points);
            element.stages.insert(cutter, CutStage::CutPointsFound);
        }
        Ok(())
    }

    /// Element sides of `eid` that a point lies on.
    pub(crate) fn point_element_sides(&self, pid: PointId, eid: ElementId) -> BTreeSet<SideId> {
        let on = &self.pool.point(pid).element_sides;
        self.elements[eid]
            .sides
            .iter()
            .copied()
            .filter(|s| on.contains(s))
            .collect()
    }

    fn common_element_sides(&self, pids: &[PointId], eid: ElementId) -> BTreeSet<SideId> {
        let mut iter = pids.iter();
        let Some(&first) = iter.next() else {
            return BTreeSet::new();
        };
        let mut common = self.point_element_sides(first, eid);
        for &pid in iter {
            let other = self.point_element_sides(pid, eid);
            common.retain(|s| other.contains(s));
        }
        common
    }

    /// Stage 2: join each cutter side's cut points into lines.
    ///
    /// The cut points of one pair lie in the cutter plane and bound the
    /// convex region `cutter ∩ element`; the edges of their hull are the
    /// cut lines. Hull edges lying on an element side split that side. A
    /// hull lying entirely in one element side is a touch.
    pub fn find_cut_lines(&mut self, eid: ElementId) -> Result<()> {
        let cut_faces = self.elements[eid].cut_faces.clone();
        for cutter in cut_faces {
            let plane = self.side_plane(cutter)?;
            let pts: Vec<PointId> = self.elements[eid].pair_points[&cutter]
                .iter()
                .copied()
                .collect();
            let hull = self.hull_loop(&plane, &pts);
            let common = self.common_element_sides(&hull, eid);

            if hull.len() >= 3 && common.is_empty() {
                for i in 0..hull.len() {
                    let seg = [hull[i], hull[(i + 1) % hull.len()]];
                    for carrier in self.common_element_sides(&seg, eid) {
                        self.elements[eid].cut_lines.push(CutLine {
                            carrier,
                            cutter,
                            points: seg,
                        });
                    }
                }
                self.elements[eid].internal_polygons.push((cutter, hull));
            } else if hull.len() >= 2 {
                if let Some(&carrier) = common.iter().next() {
                    let n = hull.len();
                    let segs = if n == 2 { 1 } else { n };
                    for i in 0..segs {
                        self.elements[eid].cut_lines.push(CutLine {
                            carrier,
                            cutter,
                            points: [hull[i], hull[(i + 1) % n]],
                        });
                    }
                    if n >= 3 {
                        self.elements[eid].touches.push((carrier, cutter));
                    }
                }
            }
            self.elements[eid]
                .stages
                .insert(cutter, CutStage::CutLinesFound);
        }
        self.find_cutter_cutter_lines(eid)
    }

    /// Counterclockwise hull of points in a plane, starting at the
    /// smallest coordinate.
    pub(crate) fn hull_loop(&self, plane: &Plane, pts: &[PointId]) -> Vec<PointId> {
        let pts_2d: Vec<Point2> = pts
            .iter()
            .map(|&p| plane.to_2d(&self.pool.coords(p)))
            .collect();
        let hull: Vec<PointId> = polygon::convex_hull_2d(&pts_2d, self.tol.merge)
            .into_iter()
            .map(|i| pts[i])
            .collect();
        self.rotate_to_min(hull)
    }

    /// Rotate a loop so it starts at its lexicographically smallest point.
    pub(crate) fn rotate_to_min(&self, mut ids: Vec<PointId>) -> Vec<PointId> {
        if let Some(start) = (0..ids.len()).min_by(|&a, &b| {
            cutcell_math::cmp_points(&self.pool.coords(ids[a]), &self.pool.coords(ids[b]))
        }) {
            ids.rotate_left(start);
        }
        ids
    }

    /// Lines where two interior cutter polygons cross.
    fn find_cutter_cutter_lines(&mut self, eid: ElementId) -> Result<()> {
        let polys = self.elements[eid].internal_polygons.clone();
        let center = self.element_aabb(eid).center();
        let reach = 2.0 * self.element_aabb(eid).diagonal();
        for i in 0..polys.len() {
            for j in i + 1..polys.len() {
                let (c1, loop1) = (polys[i].0, &polys[i].1);
                let (c2, loop2) = (polys[j].0, &polys[j].1);
                let p1 = self.side_plane(c1)?;
                let p2 = self.side_plane(c2)?;
                let dir = p1.normal.cross(&p2.normal);
                if dir.norm() < self.tol.reference {
                    continue;
                }
                let dir = dir.normalize();
                let origin = plane_plane_point(&p1, &p2, &center);
                let a = origin - dir * reach;
                let b = origin + dir * reach;
                let Some((s0, s1)) = self.clip_to_loop(&p1, loop1, &a, &b) else {
                    continue;
                };
                let Some((t0, t1)) = self.clip_to_loop(&p2, loop2, &a, &b) else {
                    continue;
                };
                let (lo, hi) = (s0.max(t0), s1.min(t1));
                if (hi - lo) * 2.0 * reach <= self.tol.merge {
                    continue;
                }
                let corners: Vec<Point3> = loop1
                    .iter()
                    .chain(loop2.iter())
                    .map(|&p| self.pool.coords(p))
                    .collect();
                let snap = SNAP_FACTOR * self.tol.merge;
                let x0 = snap_point(a + (b - a) * lo, corners.iter(), snap);
                let x1 = snap_point(a + (b - a) * hi, corners.iter(), snap);
                let ends = [x0, x1].map(|x| self.pool.insert(x));
                for pid in ends {
                    self.attach_point(pid, eid);
                    self.mark_cut(pid, c1);
                    self.mark_cut(pid, c2);
                    self.elements[eid].points.insert(pid);
                }
                if ends[0] == ends[1] {
                    continue;
                }
                for (carrier, cutter) in [(c1, c2), (c2, c1)] {
                    self.elements[eid].cut_lines.push(CutLine {
                        carrier,
                        cutter,
                        points: ends,
                    });
                }
            }
        }
        Ok(())
    }

    fn clip_to_loop(
        &self,
        plane: &Plane,
        ids: &[PointId],
        a: &Point3,
        b: &Point3,
    ) -> Option<(f64, f64)> {
        let loop_2d: Vec<Point2> = ids
            .iter()
            .map(|&p| plane.to_2d(&self.pool.coords(p)))
            .collect();
        polygon::clip_segment_convex_2d(&plane.to_2d(a), &plane.to_2d(b), &loop_2d, self.tol.merge)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether the element is cut: a cutter side cuts or touches it, or a
    /// side of it is split into several facets.
    pub fn is_cut(&self, eid: ElementId) -> bool {
        let element = &self.elements[eid];
        !element.cut_faces.is_empty() || element.sides.iter().any(|&s| self.side_is_cut(s))
    }

    /// Whether a side carries more than one facet or a touched facet.
    pub fn side_is_cut(&self, sid: SideId) -> bool {
        let facets = &self.sides[sid].facets;
        facets.len() > 1
            || facets
                .iter()
                .any(|&f| self.facets[f].on_cut_side.is_some())
    }

    /// All cut points on the element's sides.
    pub fn cut_points(&self, eid: ElementId) -> Vec<PointId> {
        self.elements[eid]
            .points
            .iter()
            .copied()
            .filter(|&p| !self.pool.point(p).cut_sides.is_empty())
            .filter(|&p| !self.point_element_sides(p, eid).is_empty())
            .collect()
    }

    /// The element side a facet lies on entirely, if any.
    pub fn on_side(&self, eid: ElementId, facet: FacetId) -> Option<SideId> {
        let points = &self.facets[facet].points;
        self.common_element_sides(points, eid).into_iter().next()
    }

    /// Whether a level-set side cuts this element.
    pub fn has_level_set_side(&self, eid: ElementId) -> bool {
        self.elements[eid]
            .cut_faces
            .iter()
            .any(|&s| self.sides[s].is_level_set())
    }

    fn nodal_level_set(&self, eid: ElementId) -> Option<Vec<f64>> {
        self.elements[eid]
            .nodes
            .iter()
            .map(|&n| self.nodes[n].level_set)
            .collect()
    }

    /// Interpolated level-set value at `x`; `None` without nodal values or
    /// when `x` cannot be mapped into the element.
    pub fn level_set_value(&self, eid: ElementId, x: &Point3) -> Option<f64> {
        let phi = self.nodal_level_set(eid)?;
        let shape = self.elements[eid].shape;
        let xi = shape.local_coordinates(&self.element_coords(eid), x)?;
        Some(
            shape
                .shape_functions(&xi)
                .iter()
                .zip(&phi)
                .map(|(n, p)| n * p)
                .sum(),
        )
    }

    /// Level-set gradient `J^-T Σ φ_i ∇_ξ N_i` at `x`.
    pub fn level_set_gradient(&self, eid: ElementId, x: &Point3) -> Option<Vec3> {
        let phi = self.nodal_level_set(eid)?;
        let shape = self.elements[eid].shape;
        let coords = self.element_coords(eid);
        let xi = shape.local_coordinates(&coords, x)?;
        let local: Vec3 = shape
            .shape_derivatives(&xi)
            .iter()
            .zip(&phi)
            .map(|(d, p)| d * *p)
            .sum();
        let jac = shape.jacobian(&coords, &xi);
        let inv = jac.try_inverse()?;
        Some(inv.transpose() * local)
    }

    /// Quadrature points of all volume cells of the element.
    pub fn num_gauss_points(&self, eid: ElementId) -> usize {
        self.elements[eid]
            .cells
            .iter()
            .map(|&c| self.cells[c].num_gauss_points())
            .sum()
    }

    /// Record the strategy an integrator used for an element.
    pub fn set_integration_type(&mut self, eid: ElementId, kind: IntegrationType) {
        self.elements[eid].integration_type = kind;
    }
}

/// Point on the intersection line of two planes closest to `near`.
fn plane_plane_point(p1: &Plane, p2: &Plane, near: &Point3) -> Point3 {
    let (n1, n2) = (p1.normal, p2.normal);
    let d1 = n1.dot(&p1.origin.coords);
    let d2 = n2.dot(&p2.origin.coords);
    let dir = n1.cross(&n2);
    let det = dir.norm_squared();
    let base = (n2.cross(&dir) * d1 + dir.cross(&n1) * d2) / det;
    let dir = dir / det.sqrt();
    let base = Point3::from(base);
    base + dir * dir.dot(&(near - base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_plane_point() {
        let p1 = Plane::new(Point3::new(0.0, 0.0, 0.5), Vec3::z()).unwrap();
        let p2 = Plane::new(Point3::new(0.25, 0.0, 0.0), Vec3::x()).unwrap();
        let x = plane_plane_point(&p1, &p2, &Point3::new(1.0, 0.7, 1.0));
        assert_relative_eq!(x, Point3::new(0.25, 0.7, 0.5), epsilon = 1e-12);
    }
}
