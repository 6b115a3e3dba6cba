//! Position classification of points, facets and volume cells.
//!
//! Classification is a fixed-point iteration. Each sweep reads the current
//! positions, derives a set of new decisions without touching the mesh, and
//! only then applies them, so the visiting order of points never changes the
//! outcome. A sweep first propagates known positions through the
//! point → facet → cell → facet → point chain; when that stalls, undecided
//! points are classified by the angle between the nearest cutter side and
//! a facet edge leading to a cut point. Cells still undecided after that
//! are classified from the orientation of their cut facets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use cutcell_math::{Point3, Vec3};

use crate::error::{GeometryError, Resolution, Result};
use crate::facet::Facet;
use crate::ids::{CellId, ElementId, FacetId, PointId, SideId};
use crate::intersect::{segment_polygon, SegmentHit};
use crate::mesh::Mesh;
use crate::point::Position;

/// Upper bound on classification sweeps; every productive sweep decides at
/// least one entity, so this is never reached on a finite mesh.
const MAX_SWEEPS: usize = 10_000;

/// Position decisions derived from one snapshot of the mesh.
#[derive(Debug, Default)]
struct Decisions {
    points: BTreeMap<PointId, Position>,
    facets: BTreeMap<FacetId, Position>,
    cells: BTreeMap<CellId, Position>,
}

impl Decisions {
    fn is_empty(&self) -> bool {
        self.points.is_empty() && self.facets.is_empty() && self.cells.is_empty()
    }
}

/// Record a decision; a disagreeing second decision is dropped.
fn record<K: Ord + Copy + std::fmt::Debug>(
    map: &mut BTreeMap<K, Position>,
    key: K,
    position: Position,
) {
    match map.get(&key) {
        None => {
            map.insert(key, position);
        }
        Some(&first) if first != position => {
            warn!(?key, ?first, second = ?position, "conflicting positions");
        }
        Some(_) => {}
    }
}

/// Neighbours of `p` along the loops of a facet.
fn loop_neighbors(facet: &Facet, p: PointId) -> Vec<PointId> {
    let mut out = Vec::new();
    for ring in std::iter::once(&facet.points).chain(facet.holes.iter()) {
        let n = ring.len();
        for (i, &q) in ring.iter().enumerate() {
            if q == p {
                for c in [ring[(i + n - 1) % n], ring[(i + 1) % n]] {
                    if c != p && !out.contains(&c) {
                        out.push(c);
                    }
                }
            }
        }
    }
    out
}

impl Mesh {
    /// Resolve positions mesh-wide to a fixed point.
    ///
    /// Returns the number of points of cut elements left undecided; the
    /// caller decides whether that is fatal.
    pub fn find_positions(&mut self) -> Result<usize> {
        self.assign_level_set_positions();
        let elements = self.element_ids();
        let mut sweeps = 0;
        while sweeps < MAX_SWEEPS {
            sweeps += 1;
            if self.propagate() {
                continue;
            }
            let by_angle = self.angle_decisions(&elements)?;
            if self.apply(by_angle) {
                continue;
            }
            let by_facets = self.cut_facet_decisions(&elements);
            if !self.apply(by_facets) {
                break;
            }
        }
        let undecided = self.undecided_points();
        if !undecided.is_empty() {
            warn!(count = undecided.len(), "points left undecided");
        }
        debug!(sweeps, undecided = undecided.len(), "positions found");
        Ok(undecided.len())
    }

    /// Undecided points on the facets of cut elements, ordered by handle.
    pub fn undecided_points(&self) -> Vec<PointId> {
        let mut out = BTreeSet::new();
        for (eid, element) in &self.elements {
            if !self.is_cut(eid) {
                continue;
            }
            for &f in &element.facets {
                let facet = &self.facets[f];
                for &p in facet.points.iter().chain(facet.holes.iter().flatten()) {
                    if !self.pool.point(p).position.is_decided() {
                        out.insert(p);
                    }
                }
            }
        }
        out.into_iter().collect()
    }

    /// Node positions from the sign of the nodal level set.
    fn assign_level_set_positions(&mut self) {
        let merge = self.tol.merge;
        let decided: Vec<(PointId, Position)> = self
            .nodes
            .values()
            .filter_map(|node| {
                let phi = node.level_set?;
                let position = if phi.abs() <= merge {
                    Position::OnCutSurface
                } else if phi > 0.0 {
                    Position::Outside
                } else {
                    Position::Inside
                };
                Some((node.point, position))
            })
            .collect();
        for (p, position) in decided {
            self.pool.point_mut(p).set_position(position);
        }
    }

    /// Apply decisions; returns whether any position changed.
    fn apply(&mut self, decisions: Decisions) -> bool {
        if decisions.is_empty() {
            return false;
        }
        let mut changed = false;
        for (p, position) in decisions.points {
            changed |= self.pool.point_mut(p).set_position(position);
        }
        for (f, position) in decisions.facets {
            let facet = &mut self.facets[f];
            if !facet.position.is_decided() {
                facet.position = position;
                changed = true;
            }
        }
        for (c, position) in decisions.cells {
            let cell = &mut self.cells[c];
            if !cell.position.is_decided() {
                cell.position = position;
                changed = true;
            }
        }
        changed
    }

    /// Propagate known positions until nothing changes. Returns whether
    /// anything was decided.
    fn propagate(&mut self) -> bool {
        let mut any = false;
        loop {
            let step = self.propagation_decisions();
            if !self.apply(step) {
                return any;
            }
            any = true;
        }
    }

    fn propagation_decisions(&self) -> Decisions {
        let mut out = Decisions::default();

        // Point → owned facets.
        for (_, point) in self.pool.iter() {
            if !point.position.is_volume() {
                continue;
            }
            for &f in &point.facets {
                let facet = &self.facets[f];
                if facet.owned && !facet.is_cut_facet() && !facet.position.is_decided() {
                    record(&mut out.facets, f, point.position);
                }
            }
        }

        // Owned facet → its cell.
        for (_, facet) in &self.facets {
            if !facet.owned || !facet.position.is_volume() {
                continue;
            }
            for &c in &facet.cells {
                if !self.cells[c].position.is_decided() {
                    record(&mut out.cells, c, facet.position);
                }
            }
        }

        // Cell → owned facets and their points.
        for (_, cell) in &self.cells {
            if !cell.position.is_volume() {
                continue;
            }
            for &(f, _) in &cell.facets {
                let facet = &self.facets[f];
                if !facet.owned || facet.is_cut_facet() {
                    continue;
                }
                if !facet.position.is_decided() {
                    record(&mut out.facets, f, cell.position);
                }
                for &p in facet.points.iter().chain(facet.holes.iter().flatten()) {
                    if !self.pool.point(p).position.is_decided() {
                        record(&mut out.points, p, cell.position);
                    }
                }
            }
        }
        out
    }

    /// Angle-based decisions for every undecided point of every element.
    fn angle_decisions(&self, elements: &[ElementId]) -> Result<Decisions> {
        let mut out = Decisions::default();
        for &eid in elements {
            let element = &self.elements[eid];
            if !element
                .cut_faces
                .iter()
                .any(|&s| !self.sides[s].is_level_set())
            {
                continue;
            }
            let points: BTreeSet<PointId> = element
                .facets
                .iter()
                .flat_map(|&f| {
                    let facet = &self.facets[f];
                    facet.points.iter().chain(facet.holes.iter().flatten()).copied()
                })
                .collect();
            for p in points {
                if self.pool.point(p).position.is_decided() {
                    continue;
                }
                if let Resolution::Resolved(position) = self.compute_position(p, eid)? {
                    record(&mut out.points, p, position);
                }
            }
        }
        Ok(out)
    }

    /// Classify one point of an element from its facet edges leading to
    /// cut points.
    pub fn compute_position(&self, p: PointId, eid: ElementId) -> Result<Resolution> {
        let element = &self.elements[eid];
        let point = self.pool.point(p);
        let cutters: Vec<SideId> = element
            .cut_faces
            .iter()
            .copied()
            .filter(|&s| !self.sides[s].is_level_set())
            .collect();
        if cutters.iter().any(|&s| point.is_cut_by(s)) {
            return Ok(Resolution::Resolved(Position::OnCutSurface));
        }

        for &f in &element.facets {
            let facet = &self.facets[f];
            if !facet.owned || !facet.contains_point(p) {
                continue;
            }
            let neighbors = loop_neighbors(facet, p);
            for &s in &cutters {
                for &c in &neighbors {
                    if !self.pool.point(c).is_cut_by(s) {
                        continue;
                    }
                    let cell = self.adjacent_cell(f)?;
                    if let Resolution::Resolved(position) =
                        self.position_from_candidate(eid, p, c, cell)?
                    {
                        return Ok(Resolution::Resolved(position));
                    }
                }
            }
        }
        Ok(Resolution::Unresolved)
    }

    /// The single volume cell of the facet's element bordering it.
    fn adjacent_cell(&self, f: FacetId) -> Result<CellId> {
        let facet = &self.facets[f];
        let cells: Vec<CellId> = facet
            .cells
            .iter()
            .copied()
            .filter(|&c| self.cells[c].element == facet.element)
            .collect();
        match cells.as_slice() {
            [c] => Ok(*c),
            _ => Err(GeometryError::NonUniqueAdjacency {
                found: cells.len(),
                context: format!(
                    "owned facet of element {}",
                    self.elements[facet.element].user_id
                ),
            }),
        }
    }

    fn position_from_candidate(
        &self,
        eid: ElementId,
        p: PointId,
        c: PointId,
        cell: CellId,
    ) -> Result<Resolution> {
        let xp = self.pool.coords(p);
        let xc = self.pool.coords(c);
        let line = xp - xc;
        let length = line.norm();
        if length <= self.tol.merge {
            return Err(GeometryError::DegenerateGeometry(format!(
                "zero-length classification line at ({}, {}, {})",
                xc.x, xc.y, xc.z
            )));
        }
        let line = line / length;

        let mut sides: Vec<SideId> = self.elements[eid]
            .cut_faces
            .iter()
            .copied()
            .filter(|&s| !self.sides[s].is_level_set())
            .filter(|&s| self.pool.point(c).is_cut_by(s))
            .filter(|&s| self.cell_borders(cell, s))
            .filter(|&s| !self.is_orthogonal_side(s, c, &line))
            .collect();
        if sides.is_empty() {
            return Ok(Resolution::Unresolved);
        }
        self.sort_sides(&mut sides);
        for s in self.nearest_first(&xp, sides, cell) {
            if let Resolution::Resolved(position) = self.position_by_angle(s, &xc, &line) {
                return Ok(Resolution::Resolved(position));
            }
        }
        Ok(Resolution::Unresolved)
    }

    /// Whether a volume cell has a facet lying on cutter side `s`.
    fn cell_borders(&self, cell: CellId, s: SideId) -> bool {
        self.cells[cell].facets.iter().any(|&(f, _)| {
            let facet = &self.facets[f];
            (!facet.owned && facet.parent == s) || facet.on_cut_side == Some(s)
        })
    }

    /// Whether the side's normal is orthogonal to the line at `c`, checked
    /// only where `c` sits on the side's boundary.
    pub(crate) fn is_orthogonal_side(&self, s: SideId, c: PointId, line: &Vec3) -> bool {
        let side = &self.sides[s];
        let point = self.pool.point(c);
        let on_boundary = side.edges.iter().any(|e| point.edges.contains(e))
            || side.nodes.iter().any(|&n| self.nodes[n].point == c);
        if !on_boundary {
            return false;
        }
        let normal = self.side_normal_at(s, &point.coords);
        self.tol.is_orthogonal(normal.dot(line))
    }

    /// Unit normal of a side at a point on it.
    pub fn side_normal_at(&self, s: SideId, x: &Point3) -> Vec3 {
        let side = &self.sides[s];
        let coords = self.side_coords(s);
        let tol = self.tol.merge.max(self.tol.reference * self.side_aabb(s).diagonal());
        match side.shape.within(&coords, x, tol) {
            Some(rs) => side.shape.normal(&coords, &rs),
            None => cutcell_math::polygon::newell_normal(&coords).normalize(),
        }
    }

    /// Inside/outside from the cosine between the side normal at `c` and
    /// the unit line from `c` to the point.
    pub fn position_by_angle(&self, s: SideId, xc: &Point3, line: &Vec3) -> Resolution {
        let cosine = self.side_normal_at(s, xc).dot(line);
        if cosine > self.tol.reference {
            Resolution::Resolved(Position::Outside)
        } else if cosine < -self.tol.reference {
            Resolution::Resolved(Position::Inside)
        } else {
            Resolution::Unresolved
        }
    }

    /// Order candidate sides so the side nearest to `x` comes first.
    ///
    /// Selection by pairwise comparison: the comparator is geometric and
    /// need not be transitive, so no sort routine is used on it.
    fn nearest_first(&self, x: &Point3, mut sides: Vec<SideId>, cell: CellId) -> Vec<SideId> {
        let mut ordered = Vec::with_capacity(sides.len());
        while !sides.is_empty() {
            let mut best = 0;
            for i in 1..sides.len() {
                if self.closer_side(x, sides[i], sides[best], cell) == Ordering::Less {
                    best = i;
                }
            }
            ordered.push(sides.remove(best));
        }
        ordered
    }

    /// Compare two cutter sides by which one a ray from `x` reaches first.
    ///
    /// A ray from `x` towards `a`'s piece of the cell boundary that passes
    /// through `b` first makes `b` the nearer side, and vice versa. Parallel
    /// sides and rays hitting neither compare equal.
    pub(crate) fn closer_side(&self, x: &Point3, a: SideId, b: SideId, cell: CellId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let na = self.side_normal_at(a, x);
        let nb = self.side_normal_at(b, x);
        if (na.dot(&nb).abs() - 1.0).abs() < self.tol.reference {
            return Ordering::Equal;
        }
        if self.ray_blocked(x, a, b, cell) {
            return Ordering::Greater;
        }
        if self.ray_blocked(x, b, a, cell) {
            return Ordering::Less;
        }
        Ordering::Equal
    }

    /// Whether the segment from `x` to the cell's piece of side `target`
    /// crosses side `other` strictly before reaching it.
    fn ray_blocked(&self, x: &Point3, target: SideId, other: SideId, cell: CellId) -> bool {
        let Some(aim) = self.side_target(target, cell) else {
            return false;
        };
        let Ok(poly) = self.side_polygon(other) else {
            return false;
        };
        let length = (aim - x).norm();
        if length <= self.tol.merge {
            return false;
        }
        let slack = self.tol.merge / length;
        match segment_polygon(x, &aim, &poly, &self.tol) {
            SegmentHit::Point(t) => t > slack && t < 1.0 - slack,
            SegmentHit::Overlap(t0, _) => t0 < 1.0 - slack,
            SegmentHit::Miss => false,
        }
    }

    /// A point on the part of side `s` bounding the cell.
    fn side_target(&self, s: SideId, cell: CellId) -> Option<Point3> {
        self.cells[cell].facets.iter().find_map(|&(f, _)| {
            let facet = &self.facets[f];
            let on = (!facet.owned && facet.parent == s) || facet.on_cut_side == Some(s);
            if on {
                self.facet_interior_point(f)
            } else {
                None
            }
        })
    }

    /// Fallback for cells the angle test could not reach: the orientation
    /// of a cut facet relative to the cutter normal.
    fn cut_facet_decisions(&self, elements: &[ElementId]) -> Decisions {
        let mut out = Decisions::default();
        for &eid in elements {
            for &c in &self.elements[eid].cells {
                let cell = &self.cells[c];
                if cell.position.is_decided() {
                    continue;
                }
                if let Some(position) = self.position_from_cut_facets(c) {
                    record(&mut out.cells, c, position);
                }
            }
        }
        out
    }

    fn position_from_cut_facets(&self, c: CellId) -> Option<Position> {
        for &(f, outward) in &self.cells[c].facets {
            let facet = &self.facets[f];
            let (cell_normal, cutter_normal) = if !facet.owned {
                let n = if outward { facet.normal } else { -facet.normal };
                (n, facet.normal)
            } else if let Some(s) = facet.on_cut_side {
                let Ok(plane) = self.side_plane(s) else {
                    continue;
                };
                (facet.normal, plane.normal)
            } else {
                continue;
            };
            // The cutter normal points to the outside.
            let cosine = cell_normal.dot(&cutter_normal);
            if cosine > self.tol.reference {
                return Some(Position::Inside);
            }
            if cosine < -self.tol.reference {
                return Some(Position::Outside);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_first_decision() {
        let mut map: BTreeMap<u32, Position> = BTreeMap::new();
        record(&mut map, 1, Position::Inside);
        record(&mut map, 1, Position::Outside);
        record(&mut map, 2, Position::Outside);
        assert_eq!(map[&1], Position::Inside);
        assert_eq!(map[&2], Position::Outside);
    }
}
