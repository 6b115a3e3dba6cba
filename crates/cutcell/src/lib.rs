#![warn(missing_docs)]

//! cutcell: a cut-cell geometry engine.
//!
//! Background elements (tet4, hex8, wedge6, pyramid5) are cut by embedded
//! cutter surfaces, given as polygonal sides or as nodal level-set values,
//! into closed volume cells. Each cell is classified inside or outside and
//! gets a volume quadrature plus triangles of the cut surface.
//!
//! # Example
//!
//! ```rust,no_run
//! use cutcell::{CutOptions, CutSession, ElementShape, Point3};
//!
//! let mut session = CutSession::new(CutOptions::default());
//! let mesh = session.mesh_mut();
//! let corners = [
//!     [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
//!     [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0],
//! ];
//! for (i, p) in corners.iter().enumerate() {
//!     mesh.add_node(i as u64 + 1, Point3::from(*p)).unwrap();
//! }
//! mesh.add_element(1, ElementShape::Hex8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
//! for (i, [x, y]) in [[-1.0, -1.0], [2.0, -1.0], [2.0, 2.0], [-1.0, 2.0]].iter().enumerate() {
//!     mesh.add_cutter_node(100 + i as u64, Point3::new(*x, *y, 0.5)).unwrap();
//! }
//! mesh.add_cutter_side(1, &[100, 101, 102, 103]).unwrap();
//!
//! let report = session.run().unwrap();
//! assert_eq!(report.volume_cells, 2);
//! ```

pub mod error;
pub mod options;
pub mod session;

pub use error::{CutError, Result};
pub use options::CutOptions;
pub use session::{CutReport, CutSession};

pub use cutcell_geom::{ElementShape, QuadratureRule, SideShape};
pub use cutcell_integrate::{IntegrationError, IntegrationOptions, ShapeFilter, Strategy};
pub use cutcell_math::{Point3, Tolerance, Vec3};
pub use cutcell_mesh::{
    BoundaryCell, CellId, CutDump, ElementId, GeometryError, IntegrationCell, IntegrationType,
    Mesh, Position, VolumeCell,
};

/// Lower layers, for callers that drive the stages themselves.
pub use cutcell_integrate as integrate;
pub use cutcell_mesh as mesh;
