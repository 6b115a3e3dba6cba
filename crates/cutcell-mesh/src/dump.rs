//! Self-contained description of one element's cut configuration.
//!
//! Written when a fatal geometry error aborts an element so the case can be
//! replayed offline: [`CutDump::to_mesh`] rebuilds a mesh holding just the
//! failing element and its cutter sides.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cutcell_geom::ElementShape;
use cutcell_math::{Point3, Tolerance};

use crate::error::Result;
use crate::ids::{ElementId, PointId};
use crate::mesh::Mesh;
use crate::point::Position;

/// A background node in a dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpNode {
    /// Caller id.
    pub id: u64,
    /// Coordinates.
    pub coords: [f64; 3],
    /// Nodal level-set value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_set: Option<f64>,
}

/// A cutter side in a dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpSide {
    /// Caller id (0 for level-set sides).
    pub id: u64,
    /// Whether the side was extracted from a level set.
    pub level_set: bool,
    /// Corner coordinates in loop order.
    pub nodes: Vec<[f64; 3]>,
}

/// A facet in a dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpFacet {
    /// Outer loop.
    pub points: Vec<[f64; 3]>,
    /// Hole loops.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Vec<[f64; 3]>>,
    /// Whether the facet is a piece of an element side.
    pub owned: bool,
    /// Position at the time of the dump.
    pub position: Position,
}

/// Everything needed to reproduce a failing element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutDump {
    /// Caller id of the element.
    pub element: u64,
    /// Element shape.
    pub shape: ElementShape,
    /// Element nodes in shape order.
    pub nodes: Vec<DumpNode>,
    /// Cutter sides accumulated on the element.
    pub cutter_sides: Vec<DumpSide>,
    /// Facets built so far.
    pub facets: Vec<DumpFacet>,
    /// Cut points with their positions.
    pub cut_points: Vec<([f64; 3], Position)>,
    /// The error that triggered the dump.
    pub error: String,
}

fn xyz(p: &Point3) -> [f64; 3] {
    [p.x, p.y, p.z]
}

impl Mesh {
    /// Capture an element's cut configuration.
    ///
    /// Cutter sides are taken from the element's accumulated cut faces, or
    /// from every overlapping cutter side when the failure happened before
    /// they were recorded.
    pub fn dump_element(&self, eid: ElementId, error: impl ToString) -> CutDump {
        let element = &self.elements[eid];
        let nodes = element
            .nodes
            .iter()
            .map(|&n| DumpNode {
                id: self.nodes[n].user_id,
                coords: xyz(&self.node_coords(n)),
                level_set: self.nodes[n].level_set,
            })
            .collect();

        let mut sides = element.cut_faces.clone();
        if sides.is_empty() {
            let mut bbox = self.element_aabb(eid);
            bbox.expand(self.tol.merge);
            sides = self
                .all_cutter_sides()
                .into_iter()
                .filter(|&s| self.side_aabb(s).overlaps(&bbox))
                .collect();
        }
        let cutter_sides = sides
            .iter()
            .map(|&s| DumpSide {
                id: self.sides[s].user_id(),
                level_set: self.sides[s].is_level_set(),
                nodes: self.side_coords(s).iter().map(xyz).collect(),
            })
            .collect();

        let ring = |ids: &[PointId]| -> Vec<[f64; 3]> {
            ids.iter().map(|&p| xyz(&self.pool.coords(p))).collect()
        };
        let facets = element
            .facets
            .iter()
            .map(|&f| {
                let facet = &self.facets[f];
                DumpFacet {
                    points: ring(&facet.points),
                    holes: facet.holes.iter().map(|h| ring(h)).collect(),
                    owned: facet.owned,
                    position: facet.position,
                }
            })
            .collect();

        let cut_points = element
            .points
            .iter()
            .map(|&p| {
                let point = self.pool.point(p);
                (xyz(&point.coords), point.position)
            })
            .collect();

        CutDump {
            element: element.user_id,
            shape: element.shape,
            nodes,
            cutter_sides,
            facets,
            cut_points,
            error: error.to_string(),
        }
    }
}

impl CutDump {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a dump written by [`CutDump::to_json`].
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Gmsh post-processing view: element edges, cutter sides, facets
    /// colored by position, and cut points.
    pub fn to_gmsh(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.export_gmsh_to_writer(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Write the Gmsh view to a writer.
    pub fn export_gmsh_to_writer(&self, mut writer: impl Write) -> std::io::Result<()> {
        writeln!(writer, "View \"element {}\" {{", self.element)?;
        for [a, b] in self.shape.edges() {
            let (p, q) = (self.nodes[*a].coords, self.nodes[*b].coords);
            writeln!(
                writer,
                "SL({},{},{},{},{},{}){{0,0}};",
                p[0], p[1], p[2], q[0], q[1], q[2]
            )?;
        }
        writeln!(writer, "}};")?;

        writeln!(writer, "View \"cutter sides\" {{")?;
        for side in &self.cutter_sides {
            write_polygon(&mut writer, &side.nodes, if side.level_set { 1 } else { 0 })?;
        }
        writeln!(writer, "}};")?;

        writeln!(writer, "View \"facets\" {{")?;
        for facet in &self.facets {
            let value = match facet.position {
                Position::Undecided => 0,
                Position::Inside => 1,
                Position::Outside => 2,
                Position::OnCutSurface => 3,
            };
            write_polygon(&mut writer, &facet.points, value)?;
        }
        writeln!(writer, "}};")?;

        writeln!(writer, "View \"cut points\" {{")?;
        for (p, position) in &self.cut_points {
            writeln!(
                writer,
                "SP({},{},{}){{{}}};",
                p[0],
                p[1],
                p[2],
                u8::from(*position == Position::OnCutSurface)
            )?;
        }
        writeln!(writer, "}};")?;
        Ok(())
    }

    /// Write `cut_element_<id>.json` and `cut_element_<id>.pos` into `dir`.
    /// Returns the JSON path.
    pub fn export(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let json_path = dir.join(format!("cut_element_{}.json", self.element));
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(&json_path, json)?;

        let file = File::create(dir.join(format!("cut_element_{}.pos", self.element)))?;
        let mut writer = BufWriter::new(file);
        self.export_gmsh_to_writer(&mut writer)?;
        writer.flush()?;
        Ok(json_path)
    }

    /// Rebuild a mesh holding only this element and its cutter sides.
    ///
    /// Level-set sides are not replayed; they are extracted again from the
    /// nodal values.
    pub fn to_mesh(&self, tol: Tolerance) -> Result<Mesh> {
        let mut mesh = Mesh::new(tol);
        for node in &self.nodes {
            mesh.add_node(node.id, Point3::from(node.coords))?;
            if let Some(phi) = node.level_set {
                mesh.set_level_set(node.id, phi)?;
            }
        }
        let ids: Vec<u64> = self.nodes.iter().map(|n| n.id).collect();
        mesh.add_element(self.element, self.shape, &ids)?;

        let mut cutter_nodes: BTreeMap<[u64; 3], u64> = BTreeMap::new();
        let mut next_side = 1;
        for side in self.cutter_sides.iter().filter(|s| !s.level_set) {
            let mut node_ids = Vec::with_capacity(side.nodes.len());
            for p in &side.nodes {
                let key = p.map(f64::to_bits);
                let id = match cutter_nodes.get(&key) {
                    Some(&id) => id,
                    None => {
                        let id = cutter_nodes.len() as u64 + 1;
                        mesh.add_cutter_node(id, Point3::from(*p))?;
                        cutter_nodes.insert(key, id);
                        id
                    }
                };
                node_ids.push(id);
            }
            // Split quads share an id; replay them as separate sides.
            let id = if side.id == 0 { next_side } else { side.id.max(next_side) };
            mesh.add_cutter_side(id, &node_ids)?;
            next_side = id + 1;
        }
        Ok(mesh)
    }
}

fn write_polygon(writer: &mut impl Write, points: &[[f64; 3]], value: u8) -> std::io::Result<()> {
    // Fan into triangles; Gmsh views have no general polygon type.
    for i in 1..points.len().saturating_sub(1) {
        let (a, b, c) = (points[0], points[i], points[i + 1]);
        writeln!(
            writer,
            "ST({},{},{},{},{},{},{},{},{}){{{v},{v},{v}}};",
            a[0],
            a[1],
            a[2],
            b[0],
            b[1],
            b[2],
            c[0],
            c[1],
            c[2],
            v = value
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CutDump {
        CutDump {
            element: 7,
            shape: ElementShape::Tet4,
            nodes: vec![
                DumpNode { id: 1, coords: [0.0, 0.0, 0.0], level_set: None },
                DumpNode { id: 2, coords: [1.0, 0.0, 0.0], level_set: None },
                DumpNode { id: 3, coords: [0.0, 1.0, 0.0], level_set: None },
                DumpNode { id: 4, coords: [0.0, 0.0, 1.0], level_set: None },
            ],
            cutter_sides: vec![DumpSide {
                id: 10,
                level_set: false,
                nodes: vec![[-1.0, -1.0, 0.25], [2.0, -1.0, 0.25], [-1.0, 2.0, 0.25]],
            }],
            facets: Vec::new(),
            cut_points: vec![([0.0, 0.0, 0.25], Position::OnCutSurface)],
            error: "non-manifold facet configuration: test".to_string(),
        }
    }

    #[test]
    fn test_json_preserves_dump() {
        let dump = sample();
        let json = dump.to_json().unwrap();
        assert!(json.contains("\"on_cut_surface\""));
        assert_eq!(CutDump::from_json(&json).unwrap(), dump);
    }

    #[test]
    fn test_gmsh_views() {
        let text = sample().to_gmsh();
        assert_eq!(text.matches("View").count(), 4);
        assert_eq!(text.matches("SL(").count(), 6);
        assert_eq!(text.matches("ST(").count(), 1);
        assert!(text.contains("SP(0,0,0.25){1};"));
    }

    #[test]
    fn test_replay_mesh() {
        let mesh = sample().to_mesh(Tolerance::DEFAULT).unwrap();
        assert_eq!(mesh.element_ids().len(), 1);
        assert_eq!(mesh.cutter_sides(10).len(), 1);
    }
}
