//! The mesh: owner of every arena of one cutting pass.
//!
//! Background nodes/elements and cutter nodes/sides are registered here by
//! caller-assigned ids. All derived entities (points, facets, volume cells)
//! are created by the cutting stages and discarded by [`Mesh::reset_pass`].

use std::collections::{BTreeMap, BTreeSet};

use slotmap::SlotMap;
use tracing::debug;

use cutcell_geom::{ElementShape, SideShape};
use cutcell_math::{polygon, Aabb3, Plane, Point3, Tolerance};

use crate::cell::VolumeCell;
use crate::element::Element;
use crate::error::{GeometryError, Result};
use crate::facet::Facet;
use crate::ids::{CellId, EdgeId, ElementId, FacetId, NodeId, PointId, SideId};
use crate::node::{Edge, Node, NodeRole};
use crate::point::{Point, PointPool, Position};
use crate::side::{Side, SideKind};

/// Relative planarity tolerance for quad sides.
const PLANARITY_TOL: f64 = 1e-8;

/// Owns the deduplicated point pool and every entity of a cutting pass.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) tol: Tolerance,
    pub(crate) pool: PointPool,
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) edges: SlotMap<EdgeId, Edge>,
    pub(crate) sides: SlotMap<SideId, Side>,
    pub(crate) elements: SlotMap<ElementId, Element>,
    pub(crate) facets: SlotMap<FacetId, Facet>,
    pub(crate) cells: SlotMap<CellId, VolumeCell>,
    node_index: BTreeMap<u64, NodeId>,
    cutter_node_index: BTreeMap<u64, NodeId>,
    element_index: BTreeMap<u64, ElementId>,
    cutter_index: BTreeMap<u64, Vec<SideId>>,
    cutter_nodes: BTreeMap<u64, Vec<NodeId>>,
    edge_index: BTreeMap<(NodeId, NodeId), EdgeId>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new(Tolerance::DEFAULT)
    }
}

impl Mesh {
    /// Empty mesh with the given tolerances.
    pub fn new(tol: Tolerance) -> Self {
        Self {
            tol,
            pool: PointPool::new(tol.merge),
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            sides: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            facets: SlotMap::with_key(),
            cells: SlotMap::with_key(),
            node_index: BTreeMap::new(),
            cutter_node_index: BTreeMap::new(),
            element_index: BTreeMap::new(),
            cutter_index: BTreeMap::new(),
            cutter_nodes: BTreeMap::new(),
            edge_index: BTreeMap::new(),
        }
    }

    /// Tolerances in use.
    pub fn tolerance(&self) -> &Tolerance {
        &self.tol
    }

    /// Replace the tolerances. Points are pooled with the new merge distance
    /// from the next [`Mesh::reset_pass`] on.
    pub fn set_tolerance(&mut self, tol: Tolerance) {
        self.tol = tol;
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Add a background node.
    pub fn add_node(&mut self, user_id: u64, coords: Point3) -> Result<NodeId> {
        if self.node_index.contains_key(&user_id) {
            return Err(GeometryError::InvalidInput(format!(
                "duplicate node id {user_id}"
            )));
        }
        let id = self.insert_node(user_id, NodeRole::Background, coords);
        self.node_index.insert(user_id, id);
        Ok(id)
    }

    /// Add a node of the cutting surface mesh.
    pub fn add_cutter_node(&mut self, user_id: u64, coords: Point3) -> Result<NodeId> {
        if self.cutter_node_index.contains_key(&user_id) {
            return Err(GeometryError::InvalidInput(format!(
                "duplicate cutter node id {user_id}"
            )));
        }
        let id = self.insert_node(user_id, NodeRole::Cutter, coords);
        self.cutter_node_index.insert(user_id, id);
        Ok(id)
    }

    pub(crate) fn insert_node(&mut self, user_id: u64, role: NodeRole, coords: Point3) -> NodeId {
        let point = self.pool.insert(coords);
        let id = self.nodes.insert(Node {
            user_id,
            role,
            point,
            level_set: None,
            sides: BTreeSet::new(),
        });
        let p = self.pool.point_mut(point);
        if p.node.is_none() {
            p.node = Some(id);
        }
        id
    }

    /// Assign a level-set value to a background node.
    pub fn set_level_set(&mut self, node_user_id: u64, value: f64) -> Result<()> {
        let id = *self
            .node_index
            .get(&node_user_id)
            .ok_or(GeometryError::UnknownNode(node_user_id))?;
        if !value.is_finite() {
            return Err(GeometryError::InvalidInput(format!(
                "non-finite level-set value at node {node_user_id}"
            )));
        }
        self.nodes[id].level_set = Some(value);
        Ok(())
    }

    /// Add a background element.
    ///
    /// Sides must be planar and the element convex with positive volume.
    pub fn add_element(
        &mut self,
        user_id: u64,
        shape: ElementShape,
        node_ids: &[u64],
    ) -> Result<ElementId> {
        if self.element_index.contains_key(&user_id) {
            return Err(GeometryError::InvalidInput(format!(
                "duplicate element id {user_id}"
            )));
        }
        if node_ids.len() != shape.num_nodes() {
            return Err(GeometryError::InvalidInput(format!(
                "element {user_id}: {shape:?} needs {} nodes, got {}",
                shape.num_nodes(),
                node_ids.len()
            )));
        }
        let nodes = node_ids
            .iter()
            .map(|n| {
                self.node_index
                    .get(n)
                    .copied()
                    .ok_or(GeometryError::UnknownNode(*n))
            })
            .collect::<Result<Vec<NodeId>>>()?;
        let coords: Vec<Point3> = nodes.iter().map(|&n| self.node_coords(n)).collect();
        validate_element(user_id, shape, &coords, &self.tol)?;

        let edges: Vec<EdgeId> = shape
            .edges()
            .iter()
            .map(|e| self.edge_between(nodes[e[0]], nodes[e[1]]))
            .collect();
        let eid = self
            .elements
            .insert(Element::new(user_id, shape, nodes.clone(), edges));
        let mut sides = Vec::with_capacity(shape.sides().len());
        for (index, local) in shape.sides().iter().enumerate() {
            let side_nodes: Vec<NodeId> = local.iter().map(|&i| nodes[i]).collect();
            let sid = self.insert_side(
                SideKind::Element { element: eid, index },
                shape.side_shape(index),
                side_nodes,
            );
            sides.push(sid);
        }
        self.elements[eid].sides = sides;
        self.element_index.insert(user_id, eid);
        Ok(eid)
    }

    /// Add a side of the cutting surface mesh.
    ///
    /// A warped or non-convex quad is split into two triangles sharing the
    /// `0-2` diagonal; both keep the caller's id.
    pub fn add_cutter_side(&mut self, user_id: u64, node_ids: &[u64]) -> Result<Vec<SideId>> {
        if SideShape::from_num_nodes(node_ids.len()).is_none() {
            return Err(GeometryError::UnsupportedShape(format!(
                "cutter side {user_id} with {} nodes",
                node_ids.len()
            )));
        }
        if self.cutter_index.contains_key(&user_id) {
            return Err(GeometryError::InvalidInput(format!(
                "duplicate cutter side id {user_id}"
            )));
        }
        let nodes = node_ids
            .iter()
            .map(|n| {
                self.cutter_node_index
                    .get(n)
                    .copied()
                    .ok_or(GeometryError::UnknownNode(*n))
            })
            .collect::<Result<Vec<NodeId>>>()?;
        let pieces = self.cutter_pieces(user_id, &nodes)?;
        let ids = self.insert_cutter_pieces(user_id, pieces);
        self.cutter_nodes.insert(user_id, nodes);
        Ok(ids)
    }

    /// The sides a cutter polygon is stored as: itself, or two triangles
    /// when it is a warped or non-convex quad.
    fn cutter_pieces(&self, user_id: u64, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        let coords: Vec<Point3> = nodes.iter().map(|&n| self.node_coords(n)).collect();
        let area = polygon::area_3d(&coords);
        let diameter = Aabb3::from_points(&coords).diagonal();
        if area <= self.tol.merge * diameter {
            return Err(GeometryError::DegenerateGeometry(format!(
                "cutter side {user_id} has zero area"
            )));
        }
        if nodes.len() == 4 && !convex_planar(&coords) {
            debug!(side = user_id, "splitting warped cutter quad");
            for [a, b, c] in [[0, 1, 2], [0, 2, 3]] {
                if polygon::area_3d(&[coords[a], coords[b], coords[c]]) <= self.tol.merge * diameter {
                    return Err(GeometryError::DegenerateGeometry(format!(
                        "cutter side {user_id} folds onto its 0-2 diagonal"
                    )));
                }
            }
            return Ok(vec![
                vec![nodes[0], nodes[1], nodes[2]],
                vec![nodes[0], nodes[2], nodes[3]],
            ]);
        }
        Ok(vec![nodes.to_vec()])
    }

    fn insert_cutter_pieces(&mut self, user_id: u64, pieces: Vec<Vec<NodeId>>) -> Vec<SideId> {
        let mut ids = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let shape = SideShape::from_num_nodes(piece.len()).unwrap_or(SideShape::Tri3);
            ids.push(self.insert_side(SideKind::Cutter { user_id }, shape, piece));
        }
        self.cutter_index.insert(user_id, ids.clone());
        ids
    }

    /// Create a side over existing nodes, wiring edges and back-references.
    pub(crate) fn insert_side(
        &mut self,
        kind: SideKind,
        shape: SideShape,
        nodes: Vec<NodeId>,
    ) -> SideId {
        let n = nodes.len();
        let edges: Vec<EdgeId> = (0..n)
            .map(|i| self.edge_between(nodes[i], nodes[(i + 1) % n]))
            .collect();
        let coords: Vec<Point3> = nodes.iter().map(|&id| self.node_coords(id)).collect();
        let sid = self
            .sides
            .insert(Side::new(kind, shape, nodes.clone(), edges.clone(), &coords));
        for e in edges {
            self.edges[e].sides.insert(sid);
        }
        for nid in nodes {
            self.nodes[nid].sides.insert(sid);
        }
        sid
    }

    /// The edge joining two nodes, created on first use.
    pub(crate) fn edge_between(&mut self, a: NodeId, b: NodeId) -> EdgeId {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(&id) = self.edge_index.get(&key) {
            return id;
        }
        let id = self.edges.insert(Edge {
            nodes: [a, b],
            sides: BTreeSet::new(),
            cut_points: BTreeSet::new(),
        });
        self.edge_index.insert(key, id);
        id
    }

    /// Move a cutter node and rebuild the cutter sides on it. The cut
    /// itself is redone after [`Mesh::reset_pass`].
    pub fn move_cutter_node(&mut self, user_id: u64, coords: Point3) -> Result<()> {
        let id = *self
            .cutter_node_index
            .get(&user_id)
            .ok_or(GeometryError::UnknownNode(user_id))?;
        let old = self.nodes[id].point;
        // The stale point is replaced when the pool is rebuilt.
        self.nodes[id].point = self.pool.insert(coords);

        // A move may warp a quad or flatten a split one, so every cutter
        // polygon on the node is rebuilt from its original nodes.
        let cutters: BTreeSet<u64> = self.nodes[id]
            .sides
            .iter()
            .filter_map(|&sid| match self.sides[sid].kind {
                SideKind::Cutter { user_id } => Some(user_id),
                _ => None,
            })
            .collect();
        let mut rebuilt = Vec::with_capacity(cutters.len());
        for cutter in cutters {
            let nodes = self.cutter_nodes.get(&cutter).cloned().unwrap_or_default();
            match self.cutter_pieces(cutter, &nodes) {
                Ok(pieces) => rebuilt.push((cutter, pieces)),
                Err(e) => {
                    self.nodes[id].point = old;
                    return Err(e);
                }
            }
        }
        for (cutter, pieces) in rebuilt {
            for sid in self.cutter_index.remove(&cutter).unwrap_or_default() {
                self.remove_side(sid);
            }
            self.insert_cutter_pieces(cutter, pieces);
        }
        Ok(())
    }

    /// Discard every derived entity so the mesh can be cut again.
    ///
    /// Node coordinates survive; points are re-pooled in node order
    /// (background nodes, then cutter nodes, each by caller id).
    pub fn reset_pass(&mut self) {
        let level_set_sides: Vec<SideId> = self
            .sides
            .iter()
            .filter(|(_, s)| s.is_level_set())
            .map(|(id, _)| id)
            .collect();
        for sid in level_set_sides {
            self.remove_side(sid);
        }
        let level_set_nodes: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.role == NodeRole::LevelSet)
            .map(|(id, _)| id)
            .collect();
        for nid in &level_set_nodes {
            self.nodes.remove(*nid);
        }
        let edges = &mut self.edges;
        self.edge_index.retain(|(a, b), e| {
            let keep = !level_set_nodes.contains(a) && !level_set_nodes.contains(b);
            if !keep {
                edges.remove(*e);
            }
            keep
        });

        let coords: BTreeMap<NodeId, Point3> = self
            .nodes
            .iter()
            .map(|(id, n)| (id, self.pool.coords(n.point)))
            .collect();
        self.pool = PointPool::new(self.tol.merge);
        let order: Vec<NodeId> = self
            .node_index
            .values()
            .chain(self.cutter_node_index.values())
            .copied()
            .collect();
        for nid in order {
            let point = self.pool.insert(coords[&nid]);
            self.nodes[nid].point = point;
            let p = self.pool.point_mut(point);
            if p.node.is_none() {
                p.node = Some(nid);
            }
        }

        for (_, side) in self.sides.iter_mut() {
            side.facets.clear();
        }
        for (_, edge) in self.edges.iter_mut() {
            edge.cut_points.clear();
        }
        for (_, element) in self.elements.iter_mut() {
            element.clear_cut_state();
        }
        self.facets.clear();
        self.cells.clear();
    }

    pub(crate) fn remove_side(&mut self, sid: SideId) {
        let Some(side) = self.sides.remove(sid) else {
            return;
        };
        for e in &side.edges {
            if let Some(edge) = self.edges.get_mut(*e) {
                edge.sides.remove(&sid);
            }
        }
        for n in &side.nodes {
            if let Some(node) = self.nodes.get_mut(*n) {
                node.sides.remove(&sid);
            }
        }
    }

    // =========================================================================
    // Element flags
    // =========================================================================

    /// Toggle whether integration cells are generated for an element.
    pub fn set_active(&mut self, element_user_id: u64, active: bool) -> Result<()> {
        let eid = self.element_id(element_user_id)?;
        self.elements[eid].active = active;
        Ok(())
    }

    /// Mark an element as the linear shadow of a quadratic element.
    pub fn set_shadow(&mut self, element_user_id: u64) -> Result<()> {
        let eid = self.element_id(element_user_id)?;
        self.elements[eid].shadow = true;
        Ok(())
    }

    /// Store the corner coordinates of the quadratic parent of a shadow element.
    pub fn set_quad_corners(&mut self, element_user_id: u64, corners: Vec<Point3>) -> Result<()> {
        let eid = self.element_id(element_user_id)?;
        let element = &mut self.elements[eid];
        if !element.shadow {
            return Err(GeometryError::InvalidInput(format!(
                "element {element_user_id} is not a shadow element"
            )));
        }
        element.quad_corners = Some(corners);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Element handle for a caller id.
    pub fn element_id(&self, user_id: u64) -> Result<ElementId> {
        self.element_index
            .get(&user_id)
            .copied()
            .ok_or(GeometryError::UnknownElement(user_id))
    }

    /// Background node handle for a caller id.
    pub fn node_id(&self, user_id: u64) -> Result<NodeId> {
        self.node_index
            .get(&user_id)
            .copied()
            .ok_or(GeometryError::UnknownNode(user_id))
    }

    /// Cutter sides created for a caller id.
    pub fn cutter_sides(&self, user_id: u64) -> &[SideId] {
        self.cutter_index
            .get(&user_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All element handles ordered by caller id.
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.element_index.values().copied().collect()
    }

    /// All cutter sides (mesh and level-set) in canonical geometric order.
    pub fn all_cutter_sides(&self) -> Vec<SideId> {
        let mut ids: Vec<SideId> = self
            .sides
            .iter()
            .filter(|(_, s)| s.is_cutter())
            .map(|(id, _)| id)
            .collect();
        self.sort_sides(&mut ids);
        ids
    }

    /// Sort side handles by their geometric key.
    pub fn sort_sides(&self, ids: &mut [SideId]) {
        ids.sort_by(|a, b| self.sides[*a].geometric_cmp(&self.sides[*b]));
    }

    /// Look up an element.
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    /// Look up a side.
    pub fn side(&self, id: SideId) -> &Side {
        &self.sides[id]
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Look up an edge.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// Look up a facet.
    pub fn facet(&self, id: FacetId) -> &Facet {
        &self.facets[id]
    }

    /// Look up a volume cell.
    pub fn cell(&self, id: CellId) -> &VolumeCell {
        &self.cells[id]
    }

    /// Look up a point.
    pub fn point(&self, id: PointId) -> &Point {
        self.pool.point(id)
    }

    /// The point pool.
    pub fn points(&self) -> &PointPool {
        &self.pool
    }

    /// Position of a background node's point.
    pub fn node_position(&self, user_id: u64) -> Result<Position> {
        let nid = self.node_id(user_id)?;
        Ok(self.pool.point(self.nodes[nid].point).position)
    }

    /// Coordinates of a node.
    pub fn node_coords(&self, id: NodeId) -> Point3 {
        self.pool.coords(self.nodes[id].point)
    }

    /// Coordinates of an element's nodes.
    pub fn element_coords(&self, id: ElementId) -> Vec<Point3> {
        self.elements[id]
            .nodes
            .iter()
            .map(|&n| self.node_coords(n))
            .collect()
    }

    /// Coordinates of a side's nodes.
    pub fn side_coords(&self, id: SideId) -> Vec<Point3> {
        self.sides[id]
            .nodes
            .iter()
            .map(|&n| self.node_coords(n))
            .collect()
    }

    /// Plane of a side oriented by its node order.
    pub fn side_plane(&self, id: SideId) -> Result<Plane> {
        Plane::from_polygon(&self.side_coords(id)).ok_or_else(|| {
            GeometryError::DegenerateGeometry(format!(
                "side {} has a zero normal",
                self.sides[id].user_id()
            ))
        })
    }

    /// Bounding box of an element.
    pub fn element_aabb(&self, id: ElementId) -> Aabb3 {
        Aabb3::from_points(&self.element_coords(id))
    }

    /// Bounding box of a side.
    pub fn side_aabb(&self, id: SideId) -> Aabb3 {
        Aabb3::from_points(&self.side_coords(id))
    }

    /// Total number of volume cells of the pass.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Total number of facets of the pass.
    pub fn num_facets(&self) -> usize {
        self.facets.len()
    }
}

/// Whether a quad loop is planar and convex.
fn convex_planar(coords: &[Point3]) -> bool {
    let Some(plane) = Plane::from_polygon(coords) else {
        return false;
    };
    let diameter = Aabb3::from_points(coords).diagonal();
    if coords
        .iter()
        .any(|p| plane.signed_distance(p).abs() > PLANARITY_TOL * diameter)
    {
        return false;
    }
    let loop_2d: Vec<_> = coords.iter().map(|p| plane.to_2d(p)).collect();
    polygon::is_convex_2d(&loop_2d, PLANARITY_TOL * diameter)
}

/// Reject elements the planar-facet machinery cannot represent.
fn validate_element(
    user_id: u64,
    shape: ElementShape,
    coords: &[Point3],
    tol: &Tolerance,
) -> Result<()> {
    let diameter = Aabb3::from_points(coords).diagonal();
    let volume = shape.volume(coords);
    if volume <= tol.merge * diameter * diameter {
        return Err(GeometryError::DegenerateGeometry(format!(
            "element {user_id} has non-positive volume {volume:e}"
        )));
    }
    for side in shape.sides() {
        let pts: Vec<Point3> = side.iter().map(|&i| coords[i]).collect();
        if pts.len() == 4 && !convex_planar(&pts) {
            return Err(GeometryError::UnsupportedShape(format!(
                "element {user_id} has a warped or non-convex quad side {side:?}"
            )));
        }
        let Some(plane) = Plane::from_polygon(&pts) else {
            return Err(GeometryError::DegenerateGeometry(format!(
                "element {user_id} side {side:?} has zero area"
            )));
        };
        if coords
            .iter()
            .any(|p| plane.signed_distance(p) > PLANARITY_TOL * diameter)
        {
            return Err(GeometryError::UnsupportedShape(format!(
                "element {user_id} is not convex"
            )));
        }
    }
    Ok(())
}
