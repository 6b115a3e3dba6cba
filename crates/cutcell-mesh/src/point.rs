//! Deduplicated points and the tolerance-aware point pool.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use cutcell_math::Point3;

use crate::ids::{EdgeId, ElementId, FacetId, NodeId, PointId, SideId};

/// Inside/outside state of a point, facet or volume cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    /// Not known yet.
    #[default]
    Undecided,
    /// On the negative side of the cut surface.
    Inside,
    /// On the positive side of the cut surface.
    Outside,
    /// On the cut surface itself.
    OnCutSurface,
}

impl Position {
    /// Anything but `Undecided`.
    pub fn is_decided(self) -> bool {
        self != Position::Undecided
    }

    /// `Inside` or `Outside`.
    pub fn is_volume(self) -> bool {
        matches!(self, Position::Inside | Position::Outside)
    }
}

/// A deduplicated 3D coordinate shared by every entity that touches it.
#[derive(Debug, Clone)]
pub struct Point {
    pub(crate) coords: Point3,
    pub(crate) position: Position,
    /// Cutter (and level-set) sides this point lies on.
    pub(crate) cut_sides: BTreeSet<SideId>,
    /// Element sides this point lies on.
    pub(crate) element_sides: BTreeSet<SideId>,
    pub(crate) edges: BTreeSet<EdgeId>,
    pub(crate) facets: BTreeSet<FacetId>,
    pub(crate) elements: BTreeSet<ElementId>,
    pub(crate) node: Option<NodeId>,
}

impl Point {
    fn new(coords: Point3) -> Self {
        Self {
            coords,
            position: Position::Undecided,
            cut_sides: BTreeSet::new(),
            element_sides: BTreeSet::new(),
            edges: BTreeSet::new(),
            facets: BTreeSet::new(),
            elements: BTreeSet::new(),
            node: None,
        }
    }

    /// Coordinates.
    pub fn coords(&self) -> &Point3 {
        &self.coords
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether this point lies on the given cutter side.
    pub fn is_cut_by(&self, side: SideId) -> bool {
        self.cut_sides.contains(&side)
    }

    /// Cutter sides this point lies on.
    pub fn cut_sides(&self) -> impl Iterator<Item = SideId> + '_ {
        self.cut_sides.iter().copied()
    }

    /// Facets this point belongs to.
    pub fn facets(&self) -> impl Iterator<Item = FacetId> + '_ {
        self.facets.iter().copied()
    }

    /// The node owning this point, if any.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Set the position once. Returns whether anything changed.
    ///
    /// A decided position is never overwritten within a pass.
    pub(crate) fn set_position(&mut self, pos: Position) -> bool {
        if self.position.is_decided() || !pos.is_decided() {
            return false;
        }
        self.position = pos;
        true
    }
}

/// Key for position hashing (for deduplication).
///
/// Quantized coordinates on a grid at least as coarse as the merge
/// tolerance, so a lookup only needs the 27 neighboring cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridKey {
    x: i64,
    y: i64,
    z: i64,
}

impl GridKey {
    fn from_point(p: &Point3, cell: f64) -> Self {
        Self {
            x: (p.x / cell).floor() as i64,
            y: (p.y / cell).floor() as i64,
            z: (p.z / cell).floor() as i64,
        }
    }
}

/// Tolerance-merging point registry for one cutting pass.
#[derive(Debug, Clone)]
pub struct PointPool {
    points: SlotMap<PointId, Point>,
    grid: HashMap<GridKey, Vec<PointId>>,
    cell: f64,
    merge: f64,
}

impl PointPool {
    /// Empty pool merging points closer than `merge`.
    pub fn new(merge: f64) -> Self {
        let merge = merge.max(f64::MIN_POSITIVE);
        Self {
            points: SlotMap::with_key(),
            grid: HashMap::new(),
            cell: merge * 16.0,
            merge,
        }
    }

    /// Find an existing point within the merge tolerance.
    pub fn find(&self, p: &Point3) -> Option<PointId> {
        let key = GridKey::from_point(p, self.cell);
        let mut best: Option<(f64, PointId)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let k = GridKey {
                        x: key.x + dx,
                        y: key.y + dy,
                        z: key.z + dz,
                    };
                    let Some(ids) = self.grid.get(&k) else {
                        continue;
                    };
                    for &id in ids {
                        let d = (self.points[id].coords - p).norm();
                        if d <= self.merge && best.map_or(true, |(bd, bid)| (d, id) < (bd, bid)) {
                            best = Some((d, id));
                        }
                    }
                }
            }
        }
        best.map(|(_, id)| id)
    }

    /// Register a point, returning the existing one if within tolerance.
    pub fn insert(&mut self, p: Point3) -> PointId {
        if let Some(id) = self.find(&p) {
            return id;
        }
        let id = self.points.insert(Point::new(p));
        self.grid
            .entry(GridKey::from_point(&p, self.cell))
            .or_default()
            .push(id);
        id
    }

    /// Look up a point.
    pub fn get(&self, id: PointId) -> Option<&Point> {
        self.points.get(id)
    }

    /// Coordinates of a point.
    ///
    /// Ids always come from this pool, so the lookup cannot miss.
    pub fn coords(&self, id: PointId) -> Point3 {
        self.points[id].coords
    }

    pub(crate) fn point(&self, id: PointId) -> &Point {
        &self.points[id]
    }

    pub(crate) fn point_mut(&mut self, id: PointId) -> &mut Point {
        &mut self.points[id]
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate all points.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Point)> {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_merges_within_tolerance() {
        let mut pool = PointPool::new(1e-10);
        let a = pool.insert(Point3::new(0.5, 0.5, 0.5));
        let b = pool.insert(Point3::new(0.5 + 5e-11, 0.5, 0.5));
        let c = pool.insert(Point3::new(0.5 + 1e-9, 0.5, 0.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
        // The first registration keeps its coordinates.
        assert_eq!(pool.coords(a), Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_pool_merges_across_grid_cells() {
        let mut pool = PointPool::new(1e-10);
        let cell = 16e-10;
        let a = pool.insert(Point3::new(cell - 1e-12, 0.0, 0.0));
        let b = pool.insert(Point3::new(cell + 1e-12, 0.0, 0.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_position_is_set_once() {
        let mut pool = PointPool::new(1e-10);
        let id = pool.insert(Point3::origin());
        assert!(pool.point_mut(id).set_position(Position::Inside));
        assert!(!pool.point_mut(id).set_position(Position::Outside));
        assert_eq!(pool.point(id).position(), Position::Inside);
    }
}
