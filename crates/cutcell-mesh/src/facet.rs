//! Facets: the planar polygons bounding volume cells.
//!
//! Every element side is split by the cut lines lying on it into owned
//! facets; every cutter side crossing the element interior is trimmed to the
//! element and split by the lines where other cutter sides cross it into
//! internal facets. After both passes each facet edge is split at every
//! facet point lying on it, so neighbouring facets share edges exactly.

use std::collections::{BTreeMap, BTreeSet};

use cutcell_math::arrangement;
use cutcell_math::triangulate::triangulate;
use cutcell_math::{polygon, Plane, Point2, Point3, Vec3};

use crate::element::{CutLine, CutStage};
use crate::error::Result;
use crate::ids::{CellId, ElementId, FacetId, PointId, SideId};
use crate::mesh::Mesh;
use crate::point::Position;

/// A planar polygon bounding one or two volume cells of an element.
#[derive(Debug, Clone)]
pub struct Facet {
    pub(crate) element: ElementId,
    pub(crate) parent: SideId,
    pub(crate) points: Vec<PointId>,
    pub(crate) holes: Vec<Vec<PointId>>,
    pub(crate) normal: Vec3,
    pub(crate) position: Position,
    pub(crate) cells: Vec<CellId>,
    pub(crate) on_cut_side: Option<SideId>,
    pub(crate) owned: bool,
}

impl Facet {
    /// Owning element.
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// The element side or cutter side this facet is a piece of.
    pub fn parent(&self) -> SideId {
        self.parent
    }

    /// Outer loop, counterclockwise about [`Facet::normal`].
    pub fn points(&self) -> &[PointId] {
        &self.points
    }

    /// Hole loops.
    pub fn holes(&self) -> &[Vec<PointId>] {
        &self.holes
    }

    /// Unit normal: outward for owned facets, the cutter normal otherwise.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Adjacent volume cells (one for owned facets, two for internal ones).
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// The cutter side an owned facet lies flat on, if any.
    pub fn on_cut_side(&self) -> Option<SideId> {
        self.on_cut_side
    }

    /// Whether this facet is a piece of an element side.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Whether this facet lies on the cutting surface.
    pub fn is_cut_facet(&self) -> bool {
        !self.owned || self.on_cut_side.is_some()
    }

    /// Boundary segments of the outer loop and every hole.
    pub fn lines(&self) -> impl Iterator<Item = [PointId; 2]> + '_ {
        std::iter::once(&self.points)
            .chain(self.holes.iter())
            .flat_map(|ring| {
                (0..ring.len()).map(move |i| [ring[i], ring[(i + 1) % ring.len()]])
            })
    }

    /// Whether the point is on the outer loop or a hole.
    pub fn contains_point(&self, p: PointId) -> bool {
        self.points.contains(&p) || self.holes.iter().any(|h| h.contains(&p))
    }
}

/// A segment to be inserted into a side, with the cutters producing it.
type Segment = ([PointId; 2], BTreeSet<SideId>);

/// Loops of one arranged face: outer loop and holes.
type FaceLoops = (Vec<PointId>, Vec<Vec<PointId>>);

impl Mesh {
    /// Stage 3: build owned and internal facets.
    pub fn make_facets(&mut self, eid: ElementId) -> Result<()> {
        let mut built: Vec<Facet> = Vec::new();
        let lines = self.elements[eid].cut_lines.clone();
        let element_points = self.elements[eid].points.clone();

        let sides = self.elements[eid].sides.clone();
        for sid in sides {
            let plane = self.side_plane(sid)?;
            let boundary = self.side_boundary_loop(sid);
            let loose: Vec<PointId> = element_points
                .iter()
                .copied()
                .filter(|&p| self.pool.point(p).element_sides.contains(&sid))
                .collect();
            let faces = self.arrange(eid, &plane, &boundary, &segments_on(&lines, sid), &loose);
            for (points, holes) in faces {
                let on_cut_side = self.touching_cutter(eid, sid, &points)?;
                let position = match on_cut_side {
                    Some(_) => Position::OnCutSurface,
                    None => Position::Undecided,
                };
                built.push(Facet {
                    element: eid,
                    parent: sid,
                    points,
                    holes,
                    normal: plane.normal,
                    position,
                    cells: Vec::new(),
                    on_cut_side,
                    owned: true,
                });
            }
        }

        let polys = self.elements[eid].internal_polygons.clone();
        for (cutter, boundary) in polys {
            let plane = self.side_plane(cutter)?;
            let loose: Vec<PointId> = element_points
                .iter()
                .copied()
                .filter(|&p| self.pool.point(p).is_cut_by(cutter))
                .collect();
            let faces = self.arrange(eid, &plane, &boundary, &segments_on(&lines, cutter), &loose);
            for (points, holes) in faces {
                built.push(Facet {
                    element: eid,
                    parent: cutter,
                    points,
                    holes,
                    normal: plane.normal,
                    position: Position::OnCutSurface,
                    cells: Vec::new(),
                    on_cut_side: None,
                    owned: false,
                });
            }
        }

        self.insert_t_junctions(&mut built);

        for facet in built {
            let parent = facet.parent;
            let points: Vec<PointId> = facet
                .points
                .iter()
                .chain(facet.holes.iter().flatten())
                .copied()
                .collect();
            let fid = self.facets.insert(facet);
            for p in points {
                self.pool.point_mut(p).facets.insert(fid);
            }
            self.sides[parent].facets.insert(fid);
            self.elements[eid].facets.push(fid);
        }
        let cut_faces = self.elements[eid].cut_faces.clone();
        for cutter in cut_faces {
            self.elements[eid]
                .stages
                .insert(cutter, CutStage::FacetsBuilt);
        }
        Ok(())
    }

    /// Node points of a side with the points found on its edges, in loop
    /// order.
    pub(crate) fn side_boundary_loop(&self, sid: SideId) -> Vec<PointId> {
        let side = &self.sides[sid];
        let mut ring = Vec::new();
        for (i, &e) in side.edges.iter().enumerate() {
            let start = self.nodes[side.nodes[i]].point;
            let end = self.nodes[side.nodes[(i + 1) % side.nodes.len()]].point;
            ring.push(start);
            let a = self.pool.coords(start);
            let b = self.pool.coords(end);
            let mut on_edge: Vec<(f64, PointId)> = self.edges[e]
                .cut_points
                .iter()
                .filter(|&&p| p != start && p != end)
                .map(|&p| (polygon::point_segment_distance(&self.pool.coords(p), &a, &b).1, p))
                .collect();
            on_edge.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            ring.extend(on_edge.into_iter().map(|(_, p)| p));
        }
        ring
    }

    /// The cutter side lying flat on element side `sid` and covering the
    /// loop, if any.
    fn touching_cutter(
        &self,
        eid: ElementId,
        sid: SideId,
        points: &[PointId],
    ) -> Result<Option<SideId>> {
        for &(carrier, cutter) in &self.elements[eid].touches {
            if carrier != sid {
                continue;
            }
            let poly = self.side_polygon(cutter)?;
            if points
                .iter()
                .all(|&p| poly.contains(&self.pool.coords(p), &self.tol))
            {
                return Ok(Some(cutter));
            }
        }
        Ok(None)
    }

    /// Split a planar region by segments and return its faces.
    ///
    /// `boundary` is the counterclockwise outer loop in `plane`'s frame.
    /// Crossing segments create new points that are marked as cut by the
    /// cutters of both segments. Every vertex, including `loose` points,
    /// splits the segments it lies on.
    fn arrange(
        &mut self,
        eid: ElementId,
        plane: &Plane,
        boundary: &[PointId],
        lines: &[Segment],
        loose: &[PointId],
    ) -> Vec<FaceLoops> {
        let tol = self.tol.merge;
        let mut segments: Vec<Segment> = (0..boundary.len())
            .map(|i| {
                (
                    [boundary[i], boundary[(i + 1) % boundary.len()]],
                    BTreeSet::new(),
                )
            })
            .collect();
        segments.extend(lines.iter().filter(|(s, _)| s[0] != s[1]).cloned());

        let mut vertices: BTreeSet<PointId> = boundary.iter().copied().collect();
        vertices.extend(lines.iter().flat_map(|(s, _)| s.iter().copied()));
        vertices.extend(loose.iter().copied());

        // Proper crossings of two segments.
        for i in 0..segments.len() {
            for j in i + 1..segments.len() {
                let (sa, ci) = &segments[i];
                let (sb, cj) = &segments[j];
                let ([a, b], [c, d]) = (*sa, *sb);
                if a == c || a == d || b == c || b == d || (ci.is_empty() && cj.is_empty()) {
                    continue;
                }
                let (pa, pb) = (self.pool.coords(a), self.pool.coords(b));
                let (pc, pd) = (self.pool.coords(c), self.pool.coords(d));
                let Some((s, t)) = polygon::segment_intersection_2d(
                    &plane.to_2d(&pa),
                    &plane.to_2d(&pb),
                    &plane.to_2d(&pc),
                    &plane.to_2d(&pd),
                    0.0,
                ) else {
                    continue;
                };
                // Endpoint contacts are handled by the vertex split below.
                let (la, lc) = ((pb - pa).norm(), (pd - pc).norm());
                if s * la <= tol || (1.0 - s) * la <= tol || t * lc <= tol || (1.0 - t) * lc <= tol {
                    continue;
                }
                let x = pa + (pb - pa) * s;
                let cutters: Vec<SideId> = ci.iter().chain(cj.iter()).copied().collect();
                let pid = self.pool.insert(x);
                self.attach_point(pid, eid);
                for c in cutters {
                    self.mark_cut(pid, c);
                }
                self.elements[eid].points.insert(pid);
                vertices.insert(pid);
            }
        }

        // Split every segment at the vertices lying on it.
        let mut edges: BTreeSet<(PointId, PointId)> = BTreeSet::new();
        for ([a, b], _) in &segments {
            let (pa, pb) = (self.pool.coords(*a), self.pool.coords(*b));
            let mut on: Vec<(f64, PointId)> = vertices
                .iter()
                .filter(|&&v| v != *a && v != *b)
                .filter_map(|&v| {
                    let (dist, t) = polygon::point_segment_distance(&self.pool.coords(v), &pa, &pb);
                    (dist <= tol && t > 0.0 && t < 1.0).then_some((t, v))
                })
                .collect();
            on.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            let chain: Vec<PointId> = std::iter::once(*a)
                .chain(on.into_iter().map(|(_, v)| v))
                .chain(std::iter::once(*b))
                .collect();
            for w in chain.windows(2) {
                if w[0] != w[1] {
                    edges.insert((w[0].min(w[1]), w[0].max(w[1])));
                }
            }
        }

        let ids: Vec<PointId> = edges
            .iter()
            .flat_map(|&(a, b)| [a, b])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<PointId, usize> = ids.iter().enumerate().map(|(i, &p)| (p, i)).collect();
        let pts_2d: Vec<Point2> = ids
            .iter()
            .map(|&p| plane.to_2d(&self.pool.coords(p)))
            .collect();
        let local_edges: Vec<[usize; 2]> = edges.iter().map(|(a, b)| [index[a], index[b]]).collect();

        arrangement::faces(&pts_2d, &local_edges, tol * tol)
            .into_iter()
            .map(|face| {
                let outer = self.rotate_to_min(face.outer.iter().map(|&i| ids[i]).collect());
                let holes = face
                    .holes
                    .iter()
                    .map(|h| self.rotate_to_min(h.iter().map(|&i| ids[i]).collect()))
                    .collect();
                (outer, holes)
            })
            .collect()
    }

    /// Split facet edges at points of other facets lying on them.
    fn insert_t_junctions(&self, facets: &mut [Facet]) {
        let tol = self.tol.merge;
        let all: BTreeSet<PointId> = facets
            .iter()
            .flat_map(|f| f.points.iter().chain(f.holes.iter().flatten()).copied())
            .collect();
        let split_ring = |ring: &[PointId]| -> Vec<PointId> {
            let mut out = Vec::with_capacity(ring.len());
            for i in 0..ring.len() {
                let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
                out.push(a);
                let (pa, pb) = (self.pool.coords(a), self.pool.coords(b));
                let mut on: Vec<(f64, PointId)> = all
                    .iter()
                    .filter(|&&p| p != a && p != b && !ring.contains(&p))
                    .filter_map(|&p| {
                        let (dist, t) =
                            polygon::point_segment_distance(&self.pool.coords(p), &pa, &pb);
                        (dist <= tol && t > 0.0 && t < 1.0).then_some((t, p))
                    })
                    .collect();
                on.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
                out.extend(on.into_iter().map(|(_, p)| p));
            }
            out
        };
        for facet in facets.iter_mut() {
            facet.points = split_ring(&facet.points);
            facet.holes = facet.holes.iter().map(|h| split_ring(h)).collect();
        }
    }

    /// Coordinates of a facet's outer loop.
    pub fn facet_coords(&self, fid: FacetId) -> Vec<Point3> {
        self.facets[fid]
            .points
            .iter()
            .map(|&p| self.pool.coords(p))
            .collect()
    }

    /// Triangles of a facet, counterclockwise about its normal, or about
    /// the flipped normal when `flip` is set.
    pub fn facet_triangles(&self, fid: FacetId, flip: bool) -> Vec<[Point3; 3]> {
        let facet = &self.facets[fid];
        let outer = self.facet_coords(fid);
        let Some(plane) = Plane::new(polygon::centroid(&outer), facet.normal) else {
            return Vec::new();
        };
        let mut all: Vec<Point3> = outer.clone();
        let holes_2d: Vec<Vec<Point2>> = facet
            .holes
            .iter()
            .map(|h| {
                let ring: Vec<Point3> = h.iter().map(|&p| self.pool.coords(p)).collect();
                let ring_2d = ring.iter().map(|p| plane.to_2d(p)).collect();
                all.extend(ring);
                ring_2d
            })
            .collect();
        let outer_2d: Vec<Point2> = outer.iter().map(|p| plane.to_2d(p)).collect();
        triangulate(&outer_2d, &holes_2d)
            .into_iter()
            .map(|[a, b, c]| {
                if flip {
                    [all[a], all[c], all[b]]
                } else {
                    [all[a], all[b], all[c]]
                }
            })
            .collect()
    }

    /// A point strictly inside a facet.
    pub fn facet_interior_point(&self, fid: FacetId) -> Option<Point3> {
        self.facet_triangles(fid, false)
            .iter()
            .max_by(|x, y| tri_area(x).total_cmp(&tri_area(y)))
            .map(|[a, b, c]| Point3::from((a.coords + b.coords + c.coords) / 3.0))
    }
}

fn tri_area(t: &[Point3; 3]) -> f64 {
    (t[1] - t[0]).cross(&(t[2] - t[0])).norm()
}

fn segments_on(lines: &[CutLine], carrier: SideId) -> Vec<Segment> {
    let mut merged: BTreeMap<(PointId, PointId), BTreeSet<SideId>> = BTreeMap::new();
    for line in lines.iter().filter(|l| l.carrier == carrier) {
        let [a, b] = line.points;
        merged
            .entry((a.min(b), a.max(b)))
            .or_default()
            .insert(line.cutter);
    }
    merged
        .into_iter()
        .map(|((a, b), cutters)| ([a, b], cutters))
        .collect()
}
