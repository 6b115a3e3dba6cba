//! Nodes and edges.

use std::collections::BTreeSet;

use crate::ids::{NodeId, PointId, SideId};

/// Whether a node belongs to the background mesh or to a cutter surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Vertex of a background element.
    Background,
    /// Vertex of a cutter side.
    Cutter,
    /// Vertex of a triangle extracted from a level set; rebuilt every pass.
    LevelSet,
}

/// A vertex of a background element or cutter side; owns one point.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) user_id: u64,
    pub(crate) role: NodeRole,
    pub(crate) point: PointId,
    pub(crate) level_set: Option<f64>,
    /// Sides using this node.
    pub(crate) sides: BTreeSet<SideId>,
}

impl Node {
    /// Caller-assigned id.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Background or cutter node.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// The pooled point of this node.
    pub fn point(&self) -> PointId {
        self.point
    }

    /// Level-set value, if one was assigned.
    pub fn level_set(&self) -> Option<f64> {
        self.level_set
    }
}

/// A straight edge between two nodes, shared by all sides using it.
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) nodes: [NodeId; 2],
    pub(crate) sides: BTreeSet<SideId>,
    /// Points lying on this edge, endpoints excluded.
    pub(crate) cut_points: BTreeSet<PointId>,
}

impl Edge {
    /// End nodes.
    pub fn nodes(&self) -> [NodeId; 2] {
        self.nodes
    }

    /// Sides sharing this edge.
    pub fn sides(&self) -> impl Iterator<Item = SideId> + '_ {
        self.sides.iter().copied()
    }

    /// Points found on this edge.
    pub fn cut_points(&self) -> impl Iterator<Item = PointId> + '_ {
        self.cut_points.iter().copied()
    }
}
