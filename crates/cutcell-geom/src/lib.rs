#![warn(missing_docs)]

//! Shape tables for the cut-cell geometry engine.
//!
//! Element and side behavior is dispatched over a closed set of shapes
//! (tet4/hex8/wedge6/pyramid5 cells, tri3/quad4 sides) through lookup
//! tables instead of per-shape types:
//!
//! - [`ElementShape`]: node layout, side/edge connectivity, shape functions,
//!   local-coordinate inversion, volume and tet decomposition
//! - [`SideShape`]: shape functions, normals and the within-side test
//! - [`gauss`]: Gauss-Legendre and collapsed simplex quadrature

pub mod element;
pub mod gauss;
pub mod side;

pub use element::ElementShape;
pub use gauss::QuadratureRule;
pub use side::SideShape;
