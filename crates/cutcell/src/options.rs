//! Configuration of a cutting pass, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cutcell_integrate::{IntegrationOptions, ShapeFilter, Strategy};
use cutcell_math::Tolerance;

use crate::error::Result;

/// Settings for [`crate::CutSession`].
///
/// Every field has a default, so a TOML file only lists what it changes:
///
/// ```toml
/// integration = "moment_fitting"
/// moment_fitting_degree = 2
///
/// [tolerance]
/// merge = 1e-9
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutOptions {
    /// Integration strategy for cut elements.
    pub integration: Strategy,
    /// Use canonical shapes read off the facets before tetrahedralizing.
    pub simple_shapes: bool,
    /// Keep hex8 integration cells instead of splitting them into tets.
    pub gen_hex8: bool,
    /// Keep wedge6 integration cells instead of splitting them into tets.
    pub gen_wedge6: bool,
    /// Keep pyramid5 integration cells instead of splitting them into tets.
    pub gen_pyramid5: bool,
    /// Integrate `inside` cells with moment fitting and direct divergence.
    pub include_inner: bool,
    /// Classify points and cells after cutting.
    pub find_positions: bool,
    /// Polynomial degree of the fitted basis.
    pub moment_fitting_degree: usize,
    /// Gauss points of the direct-divergence sweep rule.
    pub divergence_line_points: usize,
    /// Degree of boundary-cell rules.
    pub cubature_degree: usize,
    /// Where diagnostic dumps of failing elements are written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,
    /// Geometric tolerances.
    pub tolerance: Tolerance,
}

impl Default for CutOptions {
    fn default() -> Self {
        Self {
            integration: Strategy::Tessellation,
            simple_shapes: true,
            gen_hex8: true,
            gen_wedge6: false,
            gen_pyramid5: false,
            include_inner: true,
            find_positions: true,
            moment_fitting_degree: 3,
            divergence_line_points: 7,
            cubature_degree: 4,
            dump_dir: None,
            tolerance: Tolerance::DEFAULT,
        }
    }
}

impl CutOptions {
    /// Parse options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The settings handed to the integrator.
    pub fn integration_options(&self) -> IntegrationOptions {
        IntegrationOptions {
            strategy: self.integration,
            simple_shapes: self.simple_shapes,
            shapes: ShapeFilter {
                hex8: self.gen_hex8,
                wedge6: self.gen_wedge6,
                pyramid5: self.gen_pyramid5,
            },
            include_inner: self.include_inner,
            moment_fitting_degree: self.moment_fitting_degree,
            divergence_line_points: self.divergence_line_points,
            cubature_degree: self.cubature_degree,
        }
    }
}
