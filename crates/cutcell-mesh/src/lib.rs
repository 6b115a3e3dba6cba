#![warn(missing_docs)]

//! Cutting pass of the cut-cell geometry engine.
//!
//! A [`Mesh`] owns every entity of one pass in arenas and hands out
//! [`slotmap`] handles. Cutting an element runs four stages:
//! 1. **Cut points**: element edges against cutter sides and cutter edges
//!    against element sides, pooled with a merge tolerance
//! 2. **Cut lines**: the hull of each pair's cut points, split onto the
//!    element sides it lies on
//! 3. **Facets**: element sides and interior cutter polygons split by the
//!    cut lines on them
//! 4. **Volume cells**: facets assembled into closed shells by a radial
//!    sort around every facet edge
//!
//! Positions are then resolved mesh-wide by [`Mesh::find_positions`].

pub mod cell;
pub mod dump;
pub mod element;
pub mod error;
pub mod facet;
mod facet_graph;
pub mod ids;
pub mod intersect;
mod level_set;
mod mesh;
pub mod node;
pub mod point;
mod position;
pub mod side;

pub use cell::{BoundaryCell, CellIntegration, IntegrationCell, VolumeCell};
pub use dump::CutDump;
pub use element::{CutLine, CutStage, Element, IntegrationType};
pub use error::{GeometryError, Resolution, Result};
pub use facet::Facet;
pub use ids::{CellId, EdgeId, ElementId, FacetId, NodeId, PointId, SideId};
pub use mesh::Mesh;
pub use node::{Edge, Node, NodeRole};
pub use point::{Point, PointPool, Position};
pub use side::{Side, SideKind};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cutcell_geom::ElementShape;
    use cutcell_math::{Point3, Tolerance};

    const HEX: [[f64; 3]; 8] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];

    fn unit_hex() -> Mesh {
        let mut mesh = Mesh::new(Tolerance::DEFAULT);
        for (i, p) in HEX.iter().enumerate() {
            mesh.add_node(i as u64 + 1, Point3::from(*p)).unwrap();
        }
        mesh.add_element(1, ElementShape::Hex8, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        mesh
    }

    /// A square cutter at height `z`, larger than the element, normal +z.
    fn add_plane_cutter(mesh: &mut Mesh, id: u64, z: f64) {
        let base = id * 10;
        let corners = [[-1.0, -1.0], [2.0, -1.0], [2.0, 2.0], [-1.0, 2.0]];
        for (i, [x, y]) in corners.iter().enumerate() {
            mesh.add_cutter_node(base + i as u64, Point3::new(*x, *y, z))
                .unwrap();
        }
        mesh.add_cutter_side(id, &[base, base + 1, base + 2, base + 3])
            .unwrap();
    }

    fn cut_all(mesh: &mut Mesh) -> usize {
        mesh.reset_pass();
        mesh.extract_level_sets().unwrap();
        for eid in mesh.element_ids() {
            mesh.cut_element(eid).unwrap();
        }
        mesh.find_positions().unwrap()
    }

    #[test]
    fn test_hex_halved_by_plane() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.5);
        assert_eq!(cut_all(&mut mesh), 0);

        let eid = mesh.element_id(1).unwrap();
        assert!(mesh.is_cut(eid));
        let cells = mesh.element(eid).cells().to_vec();
        assert_eq!(cells.len(), 2);
        for &c in &cells {
            assert_relative_eq!(mesh.cell(c).volume(), 0.5, epsilon = 1e-10);
            assert_eq!(mesh.cell_euler_characteristic(c), 2);
        }
        assert_eq!(mesh.cells_at(eid, Position::Inside).len(), 1);
        assert_eq!(mesh.cells_at(eid, Position::Outside).len(), 1);

        // Normal +z: the lower half is inside.
        assert_eq!(mesh.node_position(1).unwrap(), Position::Inside);
        assert_eq!(mesh.node_position(7).unwrap(), Position::Outside);

        // 6 sides, 4 of them split, plus one internal facet.
        assert_eq!(mesh.element(eid).facets().len(), 11);
        for &f in mesh.element(eid).facets() {
            let expected = if mesh.facet(f).is_owned() { 1 } else { 2 };
            assert_eq!(mesh.facet(f).cells().len(), expected);
        }
    }

    #[test]
    fn test_uncut_hex_has_one_cell() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 3.0);
        cut_all(&mut mesh);
        let eid = mesh.element_id(1).unwrap();
        assert!(!mesh.is_cut(eid));
        assert_eq!(mesh.element(eid).cells().len(), 1);
        assert_relative_eq!(
            mesh.cell(mesh.element(eid).cells()[0]).volume(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_two_crossing_cutters_make_four_cells() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.5);
        let corners = [[0.3, -1.0, -1.0], [0.3, 2.0, -1.0], [0.3, 2.0, 2.0], [0.3, -1.0, 2.0]];
        for (i, p) in corners.iter().enumerate() {
            mesh.add_cutter_node(100 + i as u64, Point3::from(*p)).unwrap();
        }
        mesh.add_cutter_side(2, &[100, 101, 102, 103]).unwrap();
        cut_all(&mut mesh);

        let eid = mesh.element_id(1).unwrap();
        let mut volumes: Vec<f64> = mesh
            .element(eid)
            .cells()
            .iter()
            .map(|&c| mesh.cell(c).volume())
            .collect();
        volumes.sort_by(f64::total_cmp);
        assert_eq!(volumes.len(), 4);
        assert_relative_eq!(volumes[0], 0.15, epsilon = 1e-10);
        assert_relative_eq!(volumes[1], 0.15, epsilon = 1e-10);
        assert_relative_eq!(volumes[2], 0.35, epsilon = 1e-10);
        assert_relative_eq!(volumes[3], 0.35, epsilon = 1e-10);
    }

    #[test]
    fn test_level_set_cut_tet() {
        let mut mesh = Mesh::new(Tolerance::DEFAULT);
        let pts = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        for (i, p) in pts.iter().enumerate() {
            mesh.add_node(i as u64 + 1, Point3::from(*p)).unwrap();
            // φ = z - 0.5
            mesh.set_level_set(i as u64 + 1, p[2] - 0.5).unwrap();
        }
        mesh.add_element(1, ElementShape::Tet4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(cut_all(&mut mesh), 0);

        let eid = mesh.element_id(1).unwrap();
        assert!(mesh.has_level_set_side(eid));
        let inside = mesh.cells_at(eid, Position::Inside);
        let outside = mesh.cells_at(eid, Position::Outside);
        assert_eq!((inside.len(), outside.len()), (1, 1));
        // The tip above z = 0.5 is an eighth of the tet.
        assert_relative_eq!(mesh.cell(outside[0]).volume(), 1.0 / 48.0, epsilon = 1e-10);
        assert_relative_eq!(mesh.cell(inside[0]).volume(), 7.0 / 48.0, epsilon = 1e-10);
        assert_eq!(mesh.node_position(4).unwrap(), Position::Outside);
    }

    #[test]
    fn test_reset_pass_is_repeatable() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.25);
        cut_all(&mut mesh);
        let first = mesh.num_cells();
        let points = mesh.points().len();
        cut_all(&mut mesh);
        assert_eq!(mesh.num_cells(), first);
        assert_eq!(mesh.points().len(), points);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.4);
        cut_all(&mut mesh);
        let before: Vec<Position> = mesh.points().iter().map(|(_, p)| p.position()).collect();
        assert_eq!(mesh.find_positions().unwrap(), 0);
        let after: Vec<Position> = mesh.points().iter().map(|(_, p)| p.position()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_dump_replays_element() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.5);
        cut_all(&mut mesh);
        let eid = mesh.element_id(1).unwrap();
        let dump = mesh.dump_element(eid, "replay");
        assert_eq!(dump.cutter_sides.len(), 1);
        assert_eq!(dump.facets.len(), 11);

        let mut replay = dump.to_mesh(Tolerance::DEFAULT).unwrap();
        cut_all(&mut replay);
        let rid = replay.element_id(1).unwrap();
        assert_eq!(replay.element(rid).cells().len(), 2);
    }

    fn sorted_volumes(mesh: &Mesh) -> Vec<f64> {
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

    #[test]
    fn test_cut_stages_progress() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.5);
        add_plane_cutter(&mut mesh, 2, 3.0);
        mesh.reset_pass();
        let eid = mesh.element_id(1).unwrap();
        let near = mesh.cutter_sides(1)[0];
        let far = mesh.cutter_sides(2)[0];
        assert_eq!(mesh.element(eid).stage(near), CutStage::Untested);

        mesh.find_cut_points(eid).unwrap();
        assert_eq!(mesh.element(eid).stage(near), CutStage::CutPointsFound);
        mesh.find_cut_lines(eid).unwrap();
        assert_eq!(mesh.element(eid).stage(near), CutStage::CutLinesFound);
        mesh.make_facets(eid).unwrap();
        assert_eq!(mesh.element(eid).stage(near), CutStage::FacetsBuilt);
        assert_eq!(mesh.element(eid).stage(far), CutStage::Untested);

        mesh.reset_pass();
        assert_eq!(mesh.element(eid).stage(near), CutStage::Untested);
    }

    #[test]
    fn test_moved_node_resplits_warped_quad() {
        let mut mesh = unit_hex();
        add_plane_cutter(&mut mesh, 1, 0.5);
        assert_eq!(mesh.cutter_sides(1).len(), 1);

        let lifted = Point3::new(2.0, 2.0, 0.9);
        mesh.move_cutter_node(12, lifted).unwrap();
        assert_eq!(mesh.cutter_sides(1).len(), 2);
        cut_all(&mut mesh);

        let mut fresh = unit_hex();
        let corners = [
            Point3::new(-1.0, -1.0, 0.5),
            Point3::new(2.0, -1.0, 0.5),
            lifted,
            Point3::new(-1.0, 2.0, 0.5),
        ];
        for (i, p) in corners.iter().enumerate() {
            fresh.add_cutter_node(10 + i as u64, *p).unwrap();
        }
        fresh.add_cutter_side(1, &[10, 11, 12, 13]).unwrap();
        cut_all(&mut fresh);

        let (moved, expected) = (sorted_volumes(&mesh), sorted_volumes(&fresh));
        assert_eq!(moved.len(), expected.len());
        for (a, b) in moved.iter().zip(&expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }

        // Flattening it again restores the single quad.
        mesh.move_cutter_node(12, Point3::new(2.0, 2.0, 0.5)).unwrap();
        assert_eq!(mesh.cutter_sides(1).len(), 1);
        cut_all(&mut mesh);
        for v in sorted_volumes(&mesh) {
            assert_relative_eq!(v, 0.5, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_degenerate_move_is_rejected() {
        let mut mesh = unit_hex();
        let corners = [[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]];
        for (i, [x, y]) in corners.iter().enumerate() {
            mesh.add_cutter_node(50 + i as u64, Point3::new(*x, *y, 0.5)).unwrap();
        }
        mesh.add_cutter_side(5, &[50, 51, 52]).unwrap();

        let err = mesh.move_cutter_node(52, Point3::new(1.0, -1.0, 0.5)).unwrap_err();
        assert!(matches!(err, GeometryError::DegenerateGeometry(_)));
        assert_eq!(mesh.cutter_sides(5).len(), 1);

        // The node kept its place, so the triangle still halves the hex.
        cut_all(&mut mesh);
        for v in sorted_volumes(&mesh) {
            assert_relative_eq!(v, 0.5, epsilon = 1e-10);
        }
    }
}
