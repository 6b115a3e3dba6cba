//! Side/edge intersection.
//!
//! An element side and a cutter side are intersected in both directions:
//! element edges against the cutter polygon, and cutter edges against the
//! element side polygons. Cutter nodes embedded in the element are picked
//! up as well. Every coincidence registers a pooled point, so the union of
//! both directions is one deduplicated cut-point set per pair.

use std::collections::BTreeSet;

use cutcell_math::{polygon, Plane, Point2, Point3, Tolerance};

use crate::error::{GeometryError, Result};
use crate::ids::{ElementId, PointId, SideId};
use crate::mesh::Mesh;
use crate::point::Position;

/// Hits this many merge distances from a segment endpoint or polygon corner
/// are moved onto it. The clip widens every polygon edge by the merge
/// distance, which lengthens the kept interval near a corner by about
/// `merge / sin(angle / 2)`.
pub(crate) const SNAP_FACTOR: f64 = 16.0;

/// A planar convex polygon with its plane frame.
#[derive(Debug, Clone)]
pub struct ConvexPolygon {
    /// Loop in 3D.
    pub points: Vec<Point3>,
    /// Plane oriented by the loop.
    pub plane: Plane,
    /// Loop in the plane frame (counterclockwise).
    pub loop_2d: Vec<Point2>,
}

impl ConvexPolygon {
    /// Build from a loop; `None` for degenerate loops.
    pub fn new(points: Vec<Point3>) -> Option<Self> {
        let plane = Plane::from_polygon(&points)?;
        let loop_2d = points.iter().map(|p| plane.to_2d(p)).collect();
        Some(Self {
            points,
            plane,
            loop_2d,
        })
    }

    /// Whether `p` lies on the polygon (boundary included).
    pub fn contains(&self, p: &Point3, tol: &Tolerance) -> bool {
        tol.is_zero(self.plane.signed_distance(p))
            && polygon::point_in_convex_2d(&self.plane.to_2d(p), &self.loop_2d, tol.merge)
    }
}

/// Result of intersecting a segment with a convex polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentHit {
    /// No common point.
    Miss,
    /// One common point at the segment parameter.
    Point(f64),
    /// The segment lies in the polygon plane and overlaps it on `[t0, t1]`.
    Overlap(f64, f64),
}

/// Intersect the segment `a→b` with a convex polygon.
pub fn segment_polygon(a: &Point3, b: &Point3, poly: &ConvexPolygon, tol: &Tolerance) -> SegmentHit {
    let da = poly.plane.signed_distance(a);
    let db = poly.plane.signed_distance(b);
    if tol.is_zero(da) && tol.is_zero(db) {
        let a2 = poly.plane.to_2d(a);
        let b2 = poly.plane.to_2d(b);
        return match polygon::clip_segment_convex_2d(&a2, &b2, &poly.loop_2d, tol.merge) {
            None => SegmentHit::Miss,
            Some((t0, t1)) if (t1 - t0) * (b - a).norm() <= SNAP_FACTOR * tol.merge => {
                SegmentHit::Point(0.5 * (t0 + t1))
            }
            Some((t0, t1)) => SegmentHit::Overlap(t0, t1),
        };
    }
    let Some(t) = poly.plane.segment_parameter(a, b, tol) else {
        return SegmentHit::Miss;
    };
    let x = a + (b - a) * t;
    if polygon::point_in_convex_2d(&poly.plane.to_2d(&x), &poly.loop_2d, tol.merge) {
        SegmentHit::Point(t)
    } else {
        SegmentHit::Miss
    }
}

/// The candidate closest to `x` if it lies within `dist`, else `x`.
pub(crate) fn snap_point<'a>(x: Point3, candidates: impl Iterator<Item = &'a Point3>, dist: f64) -> Point3 {
    candidates
        .map(|c| ((c - x).norm(), c))
        .filter(|(d, _)| *d <= dist)
        .min_by(|l, r| l.0.total_cmp(&r.0))
        .map_or(x, |(_, c)| *c)
}

/// Points of a segment hit, snapped onto the segment endpoints and the
/// polygon corners they nearly coincide with.
fn hit_points(a: &Point3, b: &Point3, hit: SegmentHit, poly: &ConvexPolygon, tol: &Tolerance) -> Vec<Point3> {
    let snap = SNAP_FACTOR * tol.merge;
    let at = |t: f64| {
        let x = if t <= 0.0 {
            *a
        } else if t >= 1.0 {
            *b
        } else {
            a + (b - a) * t
        };
        snap_point(x, [a, b].into_iter().chain(poly.points.iter()), snap)
    };
    match hit {
        SegmentHit::Miss => Vec::new(),
        SegmentHit::Point(t) => vec![at(t)],
        SegmentHit::Overlap(t0, t1) => vec![at(t0), at(t1)],
    }
}

impl Mesh {
    /// Convex polygons of an element's sides.
    pub(crate) fn element_side_polygons(&self, eid: ElementId) -> Result<Vec<(SideId, ConvexPolygon)>> {
        self.elements[eid]
            .sides
            .iter()
            .map(|&sid| {
                ConvexPolygon::new(self.side_coords(sid))
                    .map(|poly| (sid, poly))
                    .ok_or_else(|| {
                        GeometryError::DegenerateGeometry(format!(
                            "element {} has a side with zero normal",
                            self.elements[eid].user_id
                        ))
                    })
            })
            .collect()
    }

    /// Convex polygon of a cutter side.
    pub(crate) fn side_polygon(&self, sid: SideId) -> Result<ConvexPolygon> {
        ConvexPolygon::new(self.side_coords(sid)).ok_or_else(|| {
            GeometryError::DegenerateGeometry(format!(
                "cutter side {} has a zero normal",
                self.sides[sid].user_id()
            ))
        })
    }

    /// Whether `x` lies inside the (convex) element, boundary included.
    pub fn point_in_element(&self, eid: ElementId, x: &Point3) -> bool {
        self.elements[eid].sides.iter().all(|&sid| {
            Plane::from_polygon(&self.side_coords(sid))
                .is_some_and(|plane| plane.signed_distance(x) <= self.tol.merge)
        })
    }

    /// Intersect one element with one cutter side and register every cut
    /// point found. Returns the pair's cut-point set.
    pub fn intersect_side_pair(&mut self, eid: ElementId, cutter: SideId) -> Result<BTreeSet<PointId>> {
        let tol = self.tol;
        let cutter_poly = self.side_polygon(cutter)?;
        let element_polys = self.element_side_polygons(eid)?;
        let mut found: Vec<Point3> = Vec::new();

        // Element edges against the cutter side.
        for &e in &self.elements[eid].edges {
            let [n0, n1] = self.edges[e].nodes;
            let a = self.node_coords(n0);
            let b = self.node_coords(n1);
            let hit = segment_polygon(&a, &b, &cutter_poly, &tol);
            found.extend(hit_points(&a, &b, hit, &cutter_poly, &tol));
        }

        // Cutter edges against the element sides.
        for &e in &self.sides[cutter].edges {
            let [n0, n1] = self.edges[e].nodes;
            let a = self.node_coords(n0);
            let b = self.node_coords(n1);
            for (_, poly) in &element_polys {
                let hit = segment_polygon(&a, &b, poly, &tol);
                found.extend(hit_points(&a, &b, hit, poly, &tol));
            }
        }

        // Cutter nodes embedded in the element.
        let cutter_nodes = self.sides[cutter].nodes.clone();
        for n in cutter_nodes {
            let x = self.node_coords(n);
            if self.point_in_element(eid, &x) {
                found.push(x);
            }
        }

        let mut cut_points = BTreeSet::new();
        for x in found {
            let pid = self.register_cut_point(eid, cutter, x);
            cut_points.insert(pid);
        }
        Ok(cut_points)
    }

    /// Pool a point that lies on `cutter` inside element `eid`.
    pub(crate) fn register_cut_point(&mut self, eid: ElementId, cutter: SideId, x: Point3) -> PointId {
        let pid = self.pool.insert(x);
        self.attach_point(pid, eid);
        self.mark_cut(pid, cutter);
        pid
    }

    /// Record which edges and sides of an element a point lies on.
    pub(crate) fn attach_point(&mut self, pid: PointId, eid: ElementId) {
        let tol = self.tol;
        let x = self.pool.coords(pid);
        let edges = self.elements[eid].edges.clone();
        for e in edges {
            let [n0, n1] = self.edges[e].nodes;
            let (a, b) = (self.nodes[n0].point, self.nodes[n1].point);
            let (dist, _) =
                polygon::point_segment_distance(&x, &self.pool.coords(a), &self.pool.coords(b));
            if dist <= tol.merge {
                if pid != a && pid != b {
                    self.edges[e].cut_points.insert(pid);
                }
                self.pool.point_mut(pid).edges.insert(e);
            }
        }
        let sides = self.elements[eid].sides.clone();
        for sid in sides {
            let on_side = ConvexPolygon::new(self.side_coords(sid))
                .is_some_and(|poly| poly.contains(&x, &tol));
            if on_side {
                self.pool.point_mut(pid).element_sides.insert(sid);
            }
        }
        self.pool.point_mut(pid).elements.insert(eid);
    }

    /// Mark a point as lying on a cutter side, and on every neighboring
    /// cutter side sharing the cutter edge or node it sits on.
    pub(crate) fn mark_cut(&mut self, pid: PointId, cutter: SideId) {
        let tol = self.tol;
        let x = self.pool.coords(pid);
        let mut sides = BTreeSet::from([cutter]);
        let edges = self.sides[cutter].edges.clone();
        for e in edges {
            let [n0, n1] = self.edges[e].nodes;
            let (a, b) = (self.nodes[n0].point, self.nodes[n1].point);
            let (dist, _) =
                polygon::point_segment_distance(&x, &self.pool.coords(a), &self.pool.coords(b));
            if dist > tol.merge {
                continue;
            }
            sides.extend(self.edges[e].sides.iter().copied());
            if pid != a && pid != b {
                self.edges[e].cut_points.insert(pid);
            }
            self.pool.point_mut(pid).edges.insert(e);
        }
        let point = self.pool.point_mut(pid);
        point.cut_sides.extend(sides);
        point.set_position(Position::OnCutSurface);
    }
}
