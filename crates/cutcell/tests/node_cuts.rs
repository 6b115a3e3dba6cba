//! Cut surfaces passing exactly through element nodes and edges.

mod common;

use approx::assert_relative_eq;

use common::{add_element, cut_unit_hex, height_quad, UNIT_HEX};
use cutcell::{CutOptions, CutSession, ElementShape, Mesh, Point3, Position, Tolerance};

fn run(mesh: Mesh) -> CutSession {
    let mut session = CutSession::with_mesh(CutOptions::default(), mesh);
    session.run().unwrap();
    session
}

fn cell_volumes(session: &CutSession) -> Vec<f64> {
    let mesh = session.mesh();
    let eid = mesh.element_id(1).unwrap();
    let mut volumes: Vec<f64> = mesh
        .element(eid)
        .cells()
        .iter()
        .map(|&c| mesh.cell(c).volume())
        .collect();
    volumes.sort_by(f64::total_cmp);
    volumes
}

fn assert_halved(session: &CutSession) {
    let volumes = cell_volumes(session);
    assert_eq!(volumes.len(), 2);
    assert_relative_eq!(volumes[0], 0.5, epsilon = 1e-10);
    assert_relative_eq!(volumes[1], 0.5, epsilon = 1e-10);

    let mesh = session.mesh();
    let eid = mesh.element_id(1).unwrap();
    assert_eq!(mesh.cells_at(eid, Position::Inside).len(), 1);
    assert_eq!(mesh.cells_at(eid, Position::Outside).len(), 1);
    assert_eq!(mesh.node_position(1).unwrap(), Position::Inside);
    assert_eq!(mesh.node_position(3).unwrap(), Position::Outside);
}

fn unit_hex() -> Mesh {
    let mut mesh = Mesh::new(Tolerance::DEFAULT);
    add_element(&mut mesh, 1, ElementShape::Hex8, &UNIT_HEX, 1);
    mesh
}

fn add_cutter_nodes(mesh: &mut Mesh, coords: &[[f64; 3]], first_node: u64) {
    for (i, p) in coords.iter().enumerate() {
        mesh.add_cutter_node(first_node + i as u64, Point3::from(*p)).unwrap();
    }
}

#[test]
fn test_level_set_through_diagonal_nodes() {
    let mut mesh = unit_hex();
    for (i, p) in UNIT_HEX.iter().enumerate() {
        mesh.set_level_set(i as u64 + 1, p[0] + p[1] - 1.0).unwrap();
    }
    let session = run(mesh);
    assert_halved(&session);

    let mesh = session.mesh();
    for node in [2, 4, 6, 8] {
        assert_eq!(mesh.node_position(node).unwrap(), Position::OnCutSurface);
    }
    assert_eq!(mesh.node_position(5).unwrap(), Position::Inside);
    assert_eq!(mesh.node_position(7).unwrap(), Position::Outside);
}

#[test]
fn test_triangle_fan_through_diagonal_nodes() {
    let mut mesh = unit_hex();
    let ring = [
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 1.0, 1.0],
        [1.0, 0.0, 1.0],
    ];
    add_cutter_nodes(&mut mesh, &[[0.5, 0.5, 0.5]], 100);
    add_cutter_nodes(&mut mesh, &ring, 101);
    for i in 0..4u64 {
        let (a, b) = (101 + i, 101 + (i + 1) % 4);
        mesh.add_cutter_side(i + 1, &[100, a, b]).unwrap();
    }
    let session = run(mesh);
    assert_halved(&session);
    assert!(session
        .mesh()
        .points()
        .iter()
        .all(|(_, p)| p.position() != Position::Undecided));
}

#[test]
fn test_cutter_edge_along_element_edge() {
    // Two quads in the plane x + y = 1 sharing the line x = 1, y = 0, which
    // contains a vertical edge of the hex. Only the first spans the hex.
    let mut mesh = unit_hex();
    let corners = [
        [2.0, -1.0, -1.0],
        [1.0, 0.0, -1.0],
        [-1.0, 2.0, -1.0],
        [2.0, -1.0, 2.0],
        [1.0, 0.0, 2.0],
        [-1.0, 2.0, 2.0],
    ];
    add_cutter_nodes(&mut mesh, &corners, 200);
    mesh.add_cutter_side(1, &[201, 202, 205, 204]).unwrap();
    mesh.add_cutter_side(2, &[200, 201, 204, 203]).unwrap();
    let session = run(mesh);
    assert_halved(&session);
}

#[test]
fn test_recut_after_warping_move_matches_fresh_mesh() {
    let flat = height_quad(|_, _| 0.5, 1.0);
    let mut session = run(cut_unit_hex(&[flat]));
    let lifted = [2.0, 2.0, 0.9];
    session
        .mesh_mut()
        .move_cutter_node(102, Point3::from(lifted))
        .unwrap();
    assert_eq!(session.mesh().cutter_sides(1).len(), 2);
    session.run().unwrap();

    let mut warped = flat;
    warped[2] = lifted;
    let fresh = run(cut_unit_hex(&[warped]));

    let (moved, expected) = (cell_volumes(&session), cell_volumes(&fresh));
    assert_eq!(moved.len(), expected.len());
    for (a, b) in moved.iter().zip(&expected) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
    assert_relative_eq!(moved.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
}
