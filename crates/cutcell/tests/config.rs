//! Sessions configured from TOML.

mod common;

use anyhow::Result;
use approx::assert_relative_eq;

use common::{cut_unit_hex, height_quad};
use cutcell::{CutOptions, CutSession, IntegrationType, Strategy};

#[test]
fn test_session_from_toml_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("cutcell-options-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
integration = "direct_divergence"
moment_fitting_degree = 2
divergence_line_points = 4

[tolerance]
merge = 1e-11
"#,
    )?;
    let options = CutOptions::from_toml_file(&path)?;
    std::fs::remove_file(&path)?;
    assert_eq!(options.integration, Strategy::DirectDivergence);
    assert_eq!(options.tolerance.merge, 1e-11);

    let mesh = cut_unit_hex(&[height_quad(|x, _| 0.25 + 0.5 * x, 1.0)]);
    let mut session = CutSession::with_mesh(options, mesh);
    assert_eq!(session.mesh().tolerance().merge, 1e-11);
    let report = session.run()?;
    assert_eq!(report.integration.get(&IntegrationType::DirectDivergence), Some(&1));

    let mesh = session.mesh();
    let eid = mesh.element_id(1)?;
    let volume: f64 = mesh
        .element(eid)
        .cells()
        .iter()
        .map(|&c| mesh.cell(c).rule(0).total_weight())
        .sum();
    assert_relative_eq!(volume, 1.0, epsilon = 1e-10);
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let err = CutOptions::from_toml_file("/nonexistent/cutcell.toml").unwrap_err();
    assert!(matches!(err, cutcell::CutError::Io(_)));
}

#[test]
fn test_hex_split_into_tets_when_disabled() {
    let options = CutOptions::from_toml_str("gen_hex8 = false").unwrap();
    let mesh = cut_unit_hex(&[height_quad(|_, _| 0.5, 1.0)]);
    let session = {
        let mut s = CutSession::with_mesh(options, mesh);
        s.run().unwrap();
        s
    };
    let mesh = session.mesh();
    let eid = mesh.element_id(1).unwrap();
    for &c in mesh.element(eid).cells() {
        let cells = mesh.cell(c).integration_cells();
        assert_eq!(cells.len(), 5);
        assert!(cells.iter().all(|ic| ic.shape == cutcell::ElementShape::Tet4));
    }
}

#[test]
fn test_session_tolerance_overrides_mesh() -> Result<()> {
    let mesh = cut_unit_hex(&[height_quad(|_, _| 0.5, 1.0)]);
    let default_merge = mesh.tolerance().merge;
    let options = CutOptions::from_toml_str("[tolerance]\nmerge = 1e-9")?;
    let mut session = CutSession::with_mesh(options, mesh);
    assert_ne!(default_merge, 1e-9);
    assert_eq!(session.mesh().tolerance().merge, 1e-9);

    session.run()?;
    let mesh = session.mesh();
    let eid = mesh.element_id(1)?;
    assert_eq!(mesh.element(eid).cells().len(), 2);
    Ok(())
}
