//! Error types for the cutting pass.

use thiserror::Error;

use crate::point::Position;

/// Fatal geometric inconsistencies.
///
/// Any of these aborts the cutting pass for the element being processed;
/// no partial facet or volume cell is kept for it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A shape outside the supported set reached shape-specific code.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// A facet or line is adjacent to zero or several volume cells where
    /// exactly one is required.
    #[error("expected exactly one adjacent volume cell, found {found} ({context})")]
    NonUniqueAdjacency {
        /// Number of adjacent cells found.
        found: usize,
        /// Where the adjacency was queried.
        context: String,
    },

    /// Near-zero lengths or normals.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Facets do not assemble into closed 2-manifold shells.
    #[error("non-manifold facet configuration: {0}")]
    NonManifold(String),

    /// A point registered as a cut point of a side does not lie on it.
    #[error("cut point ({x}, {y}, {z}) does not lie on side {side} (distance {distance:e})")]
    CutPointNotOnSide {
        /// Point x.
        x: f64,
        /// Point y.
        y: f64,
        /// Point z.
        z: f64,
        /// User id of the side.
        side: u64,
        /// Normal distance to the side.
        distance: f64,
    },

    /// The zero level set crosses an element side more than twice or does
    /// not form a single closed loop.
    #[error("ambiguous level set in element {element}: {reason}")]
    AmbiguousLevelSet {
        /// User id of the element.
        element: u64,
        /// What was ambiguous.
        reason: String,
    },

    /// Malformed input (wrong node count, duplicate ids, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A node id was referenced but never added.
    #[error("unknown node id {0}")]
    UnknownNode(u64),

    /// An element id was referenced but never added.
    #[error("unknown element id {0}")]
    UnknownElement(u64),
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Outcome of a recoverable classification attempt.
///
/// `Unresolved` means "try another candidate or a later pass"; fatal
/// conditions travel as [`GeometryError`] in the surrounding `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A definite inside/outside position was found.
    Resolved(Position),
    /// No decision possible from this candidate.
    Unresolved,
}
