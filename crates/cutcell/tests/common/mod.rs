#![allow(dead_code)]

use cutcell::{ElementShape, Mesh, Point3};

/// Corners of the unit cube in hex8 order.
pub const UNIT_HEX: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Add an element with fresh nodes numbered from `first_node`.
pub fn add_element(mesh: &mut Mesh, id: u64, shape: ElementShape, coords: &[[f64; 3]], first_node: u64) {
    let ids: Vec<u64> = (0..coords.len() as u64).map(|i| first_node + i).collect();
    for (id, p) in ids.iter().zip(coords) {
        mesh.add_node(*id, Point3::from(*p)).unwrap();
    }
    mesh.add_element(id, shape, &ids).unwrap();
}

/// Add a quad cutter side with fresh cutter nodes numbered from `first_node`.
pub fn add_quad_cutter(mesh: &mut Mesh, id: u64, corners: [[f64; 3]; 4], first_node: u64) {
    let ids: Vec<u64> = (0..4).map(|i| first_node + i).collect();
    for (id, p) in ids.iter().zip(&corners) {
        mesh.add_cutter_node(*id, Point3::from(*p)).unwrap();
    }
    mesh.add_cutter_side(id, &ids).unwrap();
}

/// A square patch of the surface `z = f(x, y)` spanning `[-r, 1 + r]^2`,
/// counterclockwise seen from above.
pub fn height_quad(f: impl Fn(f64, f64) -> f64, r: f64) -> [[f64; 3]; 4] {
    let (lo, hi) = (-r, 1.0 + r);
    [
        [lo, lo, f(lo, lo)],
        [hi, lo, f(hi, lo)],
        [hi, hi, f(hi, hi)],
        [lo, hi, f(lo, hi)],
    ]
}

/// A unit hex (nodes 1..=8, element 1) cut by the given quads.
pub fn cut_unit_hex(cutters: &[[[f64; 3]; 4]]) -> Mesh {
    let mut mesh = Mesh::new(cutcell::Tolerance::DEFAULT);
    add_element(&mut mesh, 1, ElementShape::Hex8, &UNIT_HEX, 1);
    for (i, quad) in cutters.iter().enumerate() {
        add_quad_cutter(&mut mesh, i as u64 + 1, *quad, 100 * (i as u64 + 1));
    }
    mesh
}
