//! Cutter sides extracted from a nodal level set.
//!
//! The zero crossings on an element's edges are joined side by side into a
//! closed polygon, which is fanned into triangles. The triangles are
//! ordinary cutter sides restricted to their element, flagged as level-set
//! sides and rebuilt on every pass.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use cutcell_geom::SideShape;
use cutcell_math::{polygon, Point3, Vec3};

use crate::error::{GeometryError, Result};
use crate::ids::{ElementId, NodeId};
use crate::mesh::Mesh;
use crate::node::NodeRole;
use crate::side::SideKind;

/// Where the zero level set crosses the element boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Crossing {
    /// At a node (local index) whose value is zero.
    Node(usize),
    /// Strictly inside an edge (local index).
    Edge(usize),
}

impl Mesh {
    /// Build level-set cutter sides for every element whose nodal values
    /// change sign. Returns the number of sides created.
    pub fn extract_level_sets(&mut self) -> Result<usize> {
        let mut created = 0;
        for eid in self.element_ids() {
            created += self.extract_level_set(eid)?;
        }
        if created > 0 {
            debug!(sides = created, "level-set sides extracted");
        }
        Ok(created)
    }

    fn extract_level_set(&mut self, eid: ElementId) -> Result<usize> {
        let element = &self.elements[eid];
        let user_id = element.user_id;
        let shape = element.shape;
        let nodes = element.nodes.clone();
        let Some(phi) = nodes
            .iter()
            .map(|&n| self.nodes[n].level_set)
            .collect::<Option<Vec<f64>>>()
        else {
            return Ok(0);
        };
        let tol = self.tol.merge;
        let has_positive = phi.iter().any(|&v| v > tol);
        let has_negative = phi.iter().any(|&v| v < -tol);
        if !(has_positive && has_negative) {
            return Ok(0);
        }

        let coords = self.element_coords(eid);
        let mut points: BTreeMap<Crossing, Point3> = BTreeMap::new();
        for (i, &v) in phi.iter().enumerate() {
            if v.abs() <= tol {
                points.insert(Crossing::Node(i), coords[i]);
            }
        }
        for (k, &[a, b]) in shape.edges().iter().enumerate() {
            let (fa, fb) = (phi[a], phi[b]);
            if fa.abs() <= tol || fb.abs() <= tol || fa * fb > 0.0 {
                continue;
            }
            // Interpolate from the node with the smaller id so neighbouring
            // elements produce bit-identical points.
            let a_first = self.nodes[nodes[a]].user_id <= self.nodes[nodes[b]].user_id;
            let (from, to, f_from, f_to) = if a_first { (a, b, fa, fb) } else { (b, a, fb, fa) };
            let t = f_from / (f_from - f_to);
            points.insert(
                Crossing::Edge(k),
                coords[from] + (coords[to] - coords[from]) * t,
            );
        }

        // One segment per side carrying exactly two crossings.
        let mut adjacency: BTreeMap<Crossing, Vec<Crossing>> = BTreeMap::new();
        for (index, side) in shape.sides().iter().enumerate() {
            let mut on_side: BTreeSet<Crossing> = BTreeSet::new();
            for &local in side.iter() {
                if points.contains_key(&Crossing::Node(local)) {
                    on_side.insert(Crossing::Node(local));
                }
            }
            for (k, edge) in shape.edges().iter().enumerate() {
                if side.contains(&edge[0])
                    && side.contains(&edge[1])
                    && points.contains_key(&Crossing::Edge(k))
                {
                    on_side.insert(Crossing::Edge(k));
                }
            }
            match on_side.len() {
                0 | 1 => {}
                2 => {
                    let pair: Vec<Crossing> = on_side.into_iter().collect();
                    // A side shared with the zero set only along an edge
                    // contributes that edge once.
                    let entry = adjacency.entry(pair[0]).or_default();
                    if !entry.contains(&pair[1]) {
                        entry.push(pair[1]);
                        adjacency.entry(pair[1]).or_default().push(pair[0]);
                    }
                }
                n => {
                    return Err(GeometryError::AmbiguousLevelSet {
                        element: user_id,
                        reason: format!("side {index} carries {n} zero crossings"),
                    });
                }
            }
        }
        if adjacency.is_empty() {
            return Ok(0);
        }

        let ring = chain_loop(&adjacency).ok_or_else(|| GeometryError::AmbiguousLevelSet {
            element: user_id,
            reason: "zero crossings do not form a single closed loop".to_string(),
        })?;
        if ring.len() < 3 {
            return Ok(0);
        }
        let mut loop_coords: Vec<Point3> = ring.iter().map(|c| points[c]).collect();

        // Orient the loop so its normal points towards positive values.
        let center = polygon::centroid(&loop_coords);
        let towards_positive = self
            .level_set_gradient(eid, &center)
            .filter(|g| g.norm() > 0.0)
            .unwrap_or_else(|| positive_direction(&coords, &phi));
        if polygon::newell_normal(&loop_coords).dot(&towards_positive) < 0.0 {
            loop_coords.reverse();
        }

        let triangles: Vec<[Point3; 3]> = if loop_coords.len() == 3 {
            vec![[loop_coords[0], loop_coords[1], loop_coords[2]]]
        } else {
            (0..loop_coords.len())
                .map(|i| [center, loop_coords[i], loop_coords[(i + 1) % loop_coords.len()]])
                .collect()
        };

        let mut created = 0;
        let mut node_of: Vec<(Point3, NodeId)> = Vec::new();
        for tri in triangles {
            let area = (tri[1] - tri[0]).cross(&(tri[2] - tri[0])).norm() * 0.5;
            if area <= tol * self.element_aabb(eid).diagonal() {
                continue;
            }
            let ids: Vec<NodeId> = tri
                .iter()
                .map(|x| match node_of.iter().find(|(p, _)| p == x) {
                    Some(&(_, id)) => id,
                    None => {
                        let id = self.insert_node(0, NodeRole::LevelSet, *x);
                        node_of.push((*x, id));
                        id
                    }
                })
                .collect();
            self.insert_side(SideKind::LevelSet { element: eid }, SideShape::Tri3, ids);
            created += 1;
        }
        debug!(element = user_id, crossings = ring.len(), sides = created, "level set cut");
        Ok(created)
    }
}

/// Walk a crossing graph where every vertex has two neighbours, returning
/// the single loop, or `None` if the graph is not one cycle.
fn chain_loop(adjacency: &BTreeMap<Crossing, Vec<Crossing>>) -> Option<Vec<Crossing>> {
    if adjacency.values().any(|n| n.len() != 2) {
        return None;
    }
    let (&start, _) = adjacency.iter().next()?;
    let mut ring = vec![start];
    let mut prev = start;
    let mut cur = adjacency[&start][0];
    while cur != start {
        if ring.len() > adjacency.len() {
            return None;
        }
        ring.push(cur);
        let next = adjacency[&cur].iter().copied().find(|&c| c != prev)?;
        prev = cur;
        cur = next;
    }
    (ring.len() == adjacency.len()).then_some(ring)
}

/// Mean position of positive nodes minus that of negative nodes.
fn positive_direction(coords: &[Point3], phi: &[f64]) -> Vec3 {
    let mean = |pred: &dyn Fn(f64) -> bool| {
        let pts: Vec<Point3> = coords
            .iter()
            .zip(phi)
            .filter(|(_, &v)| pred(v))
            .map(|(p, _)| *p)
            .collect();
        polygon::centroid(&pts)
    };
    mean(&|v| v > 0.0) - mean(&|v| v < 0.0)
}
