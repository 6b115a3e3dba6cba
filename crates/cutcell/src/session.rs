//! The mesh-wide cutting driver.
//!
//! A pass runs in four phases:
//! 1. Level-set cutter sides are rebuilt from the nodal values
//! 2. Every element is cut in id order on the shared point pool
//! 3. Positions are resolved to a mesh-wide fixed point
//! 4. Active elements are integrated in parallel and the results written
//!    back in element order
//!
//! A failing element aborts the pass with a [`CutError::Element`] carrying
//! a dump of its cut configuration.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use cutcell_integrate::{integrate_element, ElementIntegration, IntegrationError};
use cutcell_mesh::{ElementId, GeometryError, IntegrationType, Mesh, Position};

use crate::error::{CutError, Result};
use crate::options::CutOptions;

/// Counts describing a finished pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CutReport {
    /// Elements in the mesh.
    pub elements: usize,
    /// Elements cut or touched by a cutter side.
    pub cut_elements: usize,
    /// Level-set cutter sides extracted.
    pub level_set_sides: usize,
    /// Points in the pool.
    pub points: usize,
    /// Facets built.
    pub facets: usize,
    /// Volume cells built.
    pub volume_cells: usize,
    /// Volume cells per position.
    pub cells_by_position: BTreeMap<Position, usize>,
    /// Elements per integration path.
    pub integration: BTreeMap<IntegrationType, usize>,
    /// Volume quadrature points over all elements.
    pub gauss_points: usize,
}

impl CutReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A mesh together with the options it is cut with.
#[derive(Debug)]
pub struct CutSession {
    options: CutOptions,
    mesh: Mesh,
}

impl CutSession {
    /// Start with an empty mesh using the configured tolerances.
    pub fn new(options: CutOptions) -> Self {
        let mesh = Mesh::new(options.tolerance);
        Self { options, mesh }
    }

    /// Cut an existing mesh with the configured tolerances.
    pub fn with_mesh(options: CutOptions, mut mesh: Mesh) -> Self {
        mesh.set_tolerance(options.tolerance);
        Self { options, mesh }
    }

    /// The options of this session.
    pub fn options(&self) -> &CutOptions {
        &self.options
    }

    /// The mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// The mesh, for adding nodes, elements and cutter sides.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    /// Give up the session and keep the mesh.
    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    /// Run one cutting pass over the whole mesh.
    ///
    /// Everything derived by an earlier pass is discarded first, so a pass
    /// can be repeated after cutter nodes have moved.
    pub fn run(&mut self) -> Result<CutReport> {
        self.mesh.reset_pass();
        let level_set_sides = match self.mesh.extract_level_sets() {
            Ok(n) => n,
            Err(GeometryError::AmbiguousLevelSet { element, reason }) => {
                let eid = self.mesh.element_id(element)?;
                let source = GeometryError::AmbiguousLevelSet { element, reason };
                return Err(self.element_failure(eid, source.into()));
            }
            Err(e) => return Err(e.into()),
        };

        let elements = self.mesh.element_ids();
        for &eid in &elements {
            if let Err(e) = self.mesh.cut_element(eid) {
                return Err(self.element_failure(eid, e.into()));
            }
        }

        if self.options.find_positions {
            let undecided = self.mesh.find_positions()?;
            if undecided > 0 {
                warn!(count = undecided, "cut points left undecided");
                return Err(CutError::UnresolvedPositions { count: undecided });
            }
        }

        let options = self.options.integration_options();
        let active: Vec<ElementId> = elements
            .iter()
            .copied()
            .filter(|&eid| self.mesh.element(eid).is_active())
            .collect();
        let mesh = &self.mesh;
        let results: Vec<std::result::Result<ElementIntegration, (ElementId, IntegrationError)>> =
            active
                .par_iter()
                .map(|&eid| integrate_element(mesh, eid, &options).map_err(|e| (eid, e)))
                .collect();
        for result in results {
            match result {
                Ok(integration) => integration.store(&mut self.mesh),
                Err((eid, e)) => return Err(self.element_failure(eid, e)),
            }
        }

        let report = self.report(level_set_sides);
        info!(
            elements = report.elements,
            cut = report.cut_elements,
            cells = report.volume_cells,
            "cutting pass finished"
        );
        Ok(report)
    }

    /// Wrap a failure with a dump of the element, writing the dump out when
    /// a dump directory is configured.
    fn element_failure(&self, eid: ElementId, source: IntegrationError) -> CutError {
        let dump = self.mesh.dump_element(eid, &source);
        let element = dump.element;
        error!(element, error = %source, "element failed; cut configuration dumped");
        if let Some(dir) = &self.options.dump_dir {
            match dump.export(dir) {
                Ok(path) => debug!(element, path = %path.display(), "dump written"),
                Err(e) => warn!(element, error = %e, "could not write dump"),
            }
        }
        CutError::Element {
            element,
            source,
            dump: Box::new(dump),
        }
    }

    fn report(&self, level_set_sides: usize) -> CutReport {
        let mesh = &self.mesh;
        let elements = mesh.element_ids();
        let mut report = CutReport {
            elements: elements.len(),
            level_set_sides,
            points: mesh.points().len(),
            facets: mesh.num_facets(),
            volume_cells: mesh.num_cells(),
            ..CutReport::default()
        };
        for &eid in &elements {
            let element = mesh.element(eid);
            if mesh.is_cut(eid) {
                report.cut_elements += 1;
            }
            for &c in element.cells() {
                *report
                    .cells_by_position
                    .entry(mesh.cell(c).position())
                    .or_default() += 1;
            }
            if element.is_active() {
                *report.integration.entry(element.integration_type()).or_default() += 1;
                report.gauss_points += mesh.num_gauss_points(eid);
            }
        }
        report
    }
}
