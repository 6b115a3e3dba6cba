//! Error types for integration-cell generation.

use thiserror::Error;

use cutcell_mesh::GeometryError;

/// Errors that can occur while building quadrature for an element.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// The element could not be split into tetrahedra matching its cells.
    #[error("tessellation of element {element} failed: {reason}")]
    TriangulationFailed {
        /// User id of the element.
        element: u64,
        /// What went wrong.
        reason: String,
    },

    /// A cell's position is needed but was never decided.
    #[error("volume cell of element {element} has no position")]
    UndecidedCell {
        /// User id of the element.
        element: u64,
    },

    /// The moment equations could not be solved to tolerance.
    #[error("moment fitting failed for element {element}: {reason}")]
    MomentFitting {
        /// User id of the element.
        element: u64,
        /// What went wrong.
        reason: String,
    },

    /// Geometry queries failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Result type for integration operations.
pub type Result<T> = std::result::Result<T, IntegrationError>;
