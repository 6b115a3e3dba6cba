//! Element sides, cutter sides and level-set sides.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use cutcell_geom::SideShape;
use cutcell_math::{cmp_points, Point3};

use crate::ids::{EdgeId, ElementId, FacetId, NodeId};

/// What a side belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideKind {
    /// Face `index` of a background element.
    Element {
        /// Owning element.
        element: ElementId,
        /// Local side number.
        index: usize,
    },
    /// A side of the cutting surface mesh.
    Cutter {
        /// Caller-assigned id.
        user_id: u64,
    },
    /// A triangle of the zero level set inside one element.
    LevelSet {
        /// The element the level set was extracted from.
        element: ElementId,
    },
}

/// A planar polygonal face.
#[derive(Debug, Clone)]
pub struct Side {
    pub(crate) kind: SideKind,
    pub(crate) shape: SideShape,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) edges: Vec<EdgeId>,
    /// Owned facets (element sides) or internal facets (cutter sides).
    pub(crate) facets: BTreeSet<FacetId>,
    /// Node coordinates sorted lexicographically; a purely geometric
    /// identity used wherever cutter sides must be visited in a fixed order.
    pub(crate) sort_key: Vec<Point3>,
}

impl Side {
    pub(crate) fn new(
        kind: SideKind,
        shape: SideShape,
        nodes: Vec<NodeId>,
        edges: Vec<EdgeId>,
        coords: &[Point3],
    ) -> Self {
        let mut sort_key = coords.to_vec();
        sort_key.sort_by(cmp_points);
        Self {
            kind,
            shape,
            nodes,
            edges,
            facets: BTreeSet::new(),
            sort_key,
        }
    }

    /// Owner of this side.
    pub fn kind(&self) -> SideKind {
        self.kind
    }

    /// Side shape.
    pub fn shape(&self) -> SideShape {
        self.shape
    }

    /// Node handles in loop order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Edge handles in loop order (edge `i` joins node `i` and `i + 1`).
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Facets built on this side.
    pub fn facets(&self) -> impl Iterator<Item = FacetId> + '_ {
        self.facets.iter().copied()
    }

    /// Whether this side is part of a cutting surface (mesh or level set).
    pub fn is_cutter(&self) -> bool {
        !matches!(self.kind, SideKind::Element { .. })
    }

    /// Whether this side was extracted from a level set.
    pub fn is_level_set(&self) -> bool {
        matches!(self.kind, SideKind::LevelSet { .. })
    }

    /// Caller-assigned id of a cutter side; `0` otherwise.
    pub fn user_id(&self) -> u64 {
        match self.kind {
            SideKind::Cutter { user_id } => user_id,
            _ => 0,
        }
    }

    /// Canonical order of two sides by geometry.
    pub fn geometric_cmp(&self, other: &Side) -> Ordering {
        for (a, b) in self.sort_key.iter().zip(&other.sort_key) {
            let c = cmp_points(a, b);
            if c != Ordering::Equal {
                return c;
            }
        }
        self.sort_key
            .len()
            .cmp(&other.sort_key.len())
            .then(self.user_id().cmp(&other.user_id()))
    }
}
