//! Errors of a mesh-wide cutting pass.

use thiserror::Error;

use cutcell_integrate::IntegrationError;
use cutcell_mesh::{CutDump, GeometryError};

/// Errors returned by [`crate::CutSession`] and [`crate::CutOptions`].
#[derive(Error, Debug)]
pub enum CutError {
    /// Cutting or integrating one element failed. Carries a self-contained
    /// description of the element for offline replay.
    #[error("element {element}: {source}")]
    Element {
        /// User id of the failing element.
        element: u64,
        /// What went wrong.
        #[source]
        source: IntegrationError,
        /// The element's cut configuration when it failed.
        dump: Box<CutDump>,
    },

    /// Points stayed undecided after classification reached its fixed point.
    #[error("{count} cut points left without a position")]
    UnresolvedPositions {
        /// Number of undecided points.
        count: usize,
    },

    /// A mesh-wide step failed outside any single element.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Reading configuration or writing a dump failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cutting passes.
pub type Result<T> = std::result::Result<T, CutError>;
