//! Facet graph: assemble an element's facets into closed volume cells.
//!
//! Around every facet edge the incident facets are sorted by angle. Each
//! wedge between two angular neighbours is one region of space, so the
//! facet sides facing the same wedge belong to the same cell. A union-find
//! over facet sides then yields one group per region. The group holding
//! the outer sides of the owned facets is the exterior of the element;
//! every other group is a volume cell, except cavity shells (negative
//! enclosed volume) which are merged into the cell enclosing them.

use std::collections::BTreeMap;

use cutcell_math::{Point3, Vec3};

use crate::cell::{enclosed_volume, point_in_triangles, VolumeCell};
use crate::error::{GeometryError, Result};
use crate::ids::{ElementId, FacetId, PointId};
use crate::mesh::Mesh;
use crate::point::Position;

/// Disjoint-set forest with path halving.
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so group identity does not depend on order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Union-find node of facet `k`, side `positive` (the side its normal
/// points to) or negative.
fn side_node(k: usize, positive: bool) -> usize {
    2 * k + usize::from(!positive)
}

impl Mesh {
    /// Stage 4: partition the element's facets into volume cells.
    pub fn make_volume_cells(&mut self, eid: ElementId) -> Result<()> {
        let user_id = self.elements[eid].user_id;
        let facets = self.elements[eid].facets.clone();
        let mut uf = UnionFind::new(2 * facets.len());

        // Incident facets per edge, with whether the facet runs min→max.
        let mut edge_map: BTreeMap<(PointId, PointId), Vec<(usize, bool)>> = BTreeMap::new();
        for (k, &f) in facets.iter().enumerate() {
            for [a, b] in self.facets[f].lines() {
                if a == b {
                    continue;
                }
                edge_map
                    .entry((a.min(b), a.max(b)))
                    .or_default()
                    .push((k, a < b));
            }
        }

        for (&(a, b), incident) in &edge_map {
            let pa = self.pool.coords(a);
            let pb = self.pool.coords(b);
            if incident.len() < 2 {
                return Err(GeometryError::NonManifold(format!(
                    "element {user_id}: edge ({:.6}, {:.6}, {:.6})-({:.6}, {:.6}, {:.6}) bounds a single facet",
                    pa.x, pa.y, pa.z, pb.x, pb.y, pb.z
                )));
            }
            let t = (pb - pa).normalize();
            let mut radial: Vec<(f64, usize, bool)> = Vec::with_capacity(incident.len());
            let mut reference: Option<(Vec3, Vec3)> = None;
            for &(k, forward) in incident {
                let n = self.facets[facets[k]].normal;
                let d = if forward { t } else { -t };
                // Direction from the edge into the facet.
                let w = n.cross(&d);
                let (u, v) = *reference.get_or_insert_with(|| (w, t.cross(&w)));
                radial.push((w.dot(&v).atan2(w.dot(&u)), k, forward));
            }
            radial.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            for pair in radial.windows(2) {
                if (pair[1].0 - pair[0].0).abs() < self.tol.reference {
                    return Err(GeometryError::NonManifold(format!(
                        "element {user_id}: overlapping facets along edge ({:.6}, {:.6}, {:.6})-({:.6}, {:.6}, {:.6})",
                        pa.x, pa.y, pa.z, pb.x, pb.y, pb.z
                    )));
                }
            }
            // Rotating about t, the wedge after facet k lies on its positive
            // side exactly when the facet runs along t; the wedge before
            // facet k + 1 lies on its negative side in that case.
            let m = radial.len();
            for i in 0..m {
                let (_, k, fwd_k) = radial[i];
                let (_, next, fwd_next) = radial[(i + 1) % m];
                uf.union(side_node(k, fwd_k), side_node(next, !fwd_next));
            }
        }

        // Exterior: outer sides of the owned facets.
        let mut exterior: Option<usize> = None;
        for (k, &f) in facets.iter().enumerate() {
            if !self.facets[f].owned {
                continue;
            }
            let root = uf.find(side_node(k, true));
            match exterior {
                None => exterior = Some(root),
                Some(e) if e != root => {
                    return Err(GeometryError::NonManifold(format!(
                        "element {user_id}: element boundary splits into several exterior regions"
                    )));
                }
                Some(_) => {}
            }
        }
        let exterior = exterior.ok_or_else(|| {
            GeometryError::NonManifold(format!("element {user_id} has no boundary facets"))
        })?;

        // Group facet sides by region.
        let mut groups: BTreeMap<usize, Vec<(FacetId, bool)>> = BTreeMap::new();
        for (k, &f) in facets.iter().enumerate() {
            let pos_root = uf.find(side_node(k, true));
            let neg_root = uf.find(side_node(k, false));
            if pos_root == neg_root {
                return Err(GeometryError::NonManifold(format!(
                    "element {user_id}: both sides of a facet face the same region"
                )));
            }
            if self.facets[f].owned && neg_root == exterior {
                return Err(GeometryError::NonManifold(format!(
                    "element {user_id}: inner side of a boundary facet faces the exterior"
                )));
            }
            // A region on the negative side sees the facet normal pointing out.
            for (root, outward) in [(pos_root, false), (neg_root, true)] {
                if root != exterior {
                    groups.entry(root).or_default().push((f, outward));
                }
            }
        }

        let origin = self.element_aabb(eid).center();
        let element_volume = self.elements[eid].shape.volume(&self.element_coords(eid));
        let vol_tol = self.tol.reference * element_volume.abs().max(f64::MIN_POSITIVE);
        let mut shells: Vec<(Vec<(FacetId, bool)>, f64, Vec<[Point3; 3]>)> = groups
            .into_values()
            .map(|shell| {
                let tris: Vec<[Point3; 3]> = shell
                    .iter()
                    .flat_map(|&(f, outward)| self.facet_triangles(f, !outward))
                    .collect();
                let volume = enclosed_volume(&tris, &origin);
                (shell, volume, tris)
            })
            .collect();

        // Merge cavity shells into the smallest cell enclosing them.
        let (mut cells, cavities): (Vec<_>, Vec<_>) =
            shells.drain(..).partition(|(_, volume, _)| *volume > 0.0);
        for (shell, volume, tris) in cavities {
            if volume.abs() <= vol_tol {
                return Err(GeometryError::NonManifold(format!(
                    "element {user_id}: facet shell encloses no volume"
                )));
            }
            let sample = shell
                .first()
                .and_then(|&(f, _)| self.facet_interior_point(f))
                .ok_or_else(|| {
                    GeometryError::DegenerateGeometry(format!(
                        "element {user_id}: cavity shell without area"
                    ))
                })?;
            let host = cells
                .iter()
                .enumerate()
                .filter(|(_, (_, _, host_tris))| point_in_triangles(&sample, host_tris))
                .min_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
                .map(|(i, _)| i)
                .ok_or_else(|| {
                    GeometryError::NonManifold(format!(
                        "element {user_id}: cavity shell outside every cell"
                    ))
                })?;
            let (host_shell, host_volume, host_tris) = &mut cells[host];
            host_shell.extend(shell);
            *host_volume += volume;
            host_tris.extend(tris);
        }

        // Deterministic order: by the first facet (in element order) of each cell.
        let facet_rank: BTreeMap<FacetId, usize> =
            facets.iter().enumerate().map(|(k, &f)| (f, k)).collect();
        for (shell, _, _) in &mut cells {
            shell.sort_by_key(|(f, _)| facet_rank[f]);
        }
        cells.sort_by_key(|(shell, _, _)| shell.first().map(|(f, _)| facet_rank[f]));

        let mut total = 0.0;
        for (shell, volume, _) in cells {
            if volume <= vol_tol {
                return Err(GeometryError::NonManifold(format!(
                    "element {user_id}: volume cell with volume {volume:e}"
                )));
            }
            total += volume;
            let cid = self.cells.insert(VolumeCell {
                element: eid,
                facets: shell.clone(),
                position: Position::Undecided,
                volume,
                integration_cells: Vec::new(),
                quadrature: None,
                boundary_cells: Vec::new(),
            });
            for (f, _) in shell {
                self.facets[f].cells.push(cid);
            }
            self.elements[eid].cells.push(cid);
        }

        if (total - element_volume).abs() > 1e3 * vol_tol {
            return Err(GeometryError::NonManifold(format!(
                "element {user_id}: cell volumes sum to {total:e}, element volume {element_volume:e}"
            )));
        }
        Ok(())
    }

    /// Euler characteristic `V - E + F` of a cell's boundary (2 for a
    /// sphere-like shell without holes).
    pub fn cell_euler_characteristic(&self, cid: crate::ids::CellId) -> i64 {
        let mut vertices = std::collections::BTreeSet::new();
        let mut edges = std::collections::BTreeSet::new();
        let mut faces = 0i64;
        for &(f, _) in &self.cells[cid].facets {
            let facet = &self.facets[f];
            // A facet with holes counts as a face minus one per hole bridge.
            faces += 1 - facet.holes.len() as i64;
            for [a, b] in facet.lines() {
                vertices.insert(a);
                edges.insert((a.min(b), a.max(b)));
            }
        }
        vertices.len() as i64 - edges.len() as i64 + faces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_find_keeps_smallest_root() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 2);
        uf.union(5, 4);
        assert_eq!(uf.find(5), 2);
        uf.union(0, 5);
        assert_eq!(uf.find(2), 0);
        assert_ne!(uf.find(1), uf.find(3));
    }

    #[test]
    fn test_side_nodes_are_distinct() {
        assert_eq!(side_node(0, true), 0);
        assert_eq!(side_node(0, false), 1);
        assert_eq!(side_node(3, true), 6);
    }
}
