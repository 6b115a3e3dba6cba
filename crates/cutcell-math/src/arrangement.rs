//! Faces of a planar straight-line graph.
//!
//! The input edges must already be split at every crossing and at every
//! vertex lying on them. Faces are traced on half-edges sorted by angle
//! around each vertex, always turning to the next clockwise edge, so every
//! bounded face comes out counterclockwise.

use std::collections::{BTreeMap, BTreeSet};

use crate::polygon::{point_in_polygon_2d, signed_area_2d};
use crate::Point2;

/// A bounded face: counterclockwise outer loop and clockwise holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    /// Vertex indices of the outer loop.
    pub outer: Vec<usize>,
    /// Vertex indices of each hole loop.
    pub holes: Vec<Vec<usize>>,
}

/// Trace the bounded faces of a planar graph.
///
/// Dangling edges are pruned. `area_tol` is the smallest loop area kept.
pub fn faces(points: &[Point2], edges: &[[usize; 2]], area_tol: f64) -> Vec<Face> {
    let mut edge_set: BTreeSet<(usize, usize)> = edges
        .iter()
        .filter(|e| e[0] != e[1])
        .map(|e| (e[0].min(e[1]), e[0].max(e[1])))
        .collect();

    // Prune dangling edges until every vertex has degree 0 or >= 2.
    loop {
        let mut degree: BTreeMap<usize, usize> = BTreeMap::new();
        for &(a, b) in &edge_set {
            *degree.entry(a).or_default() += 1;
            *degree.entry(b).or_default() += 1;
        }
        let before = edge_set.len();
        edge_set.retain(|(a, b)| degree[a] > 1 && degree[b] > 1);
        if edge_set.len() == before {
            break;
        }
    }

    let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(a, b) in &edge_set {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }
    for (&v, nbrs) in adjacency.iter_mut() {
        let origin = points[v];
        nbrs.sort_by(|&i, &j| {
            let di = points[i] - origin;
            let dj = points[j] - origin;
            di.y.atan2(di.x).total_cmp(&dj.y.atan2(dj.x)).then(i.cmp(&j))
        });
    }

    let mut visited: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut positive: Vec<(f64, Vec<usize>)> = Vec::new();
    let mut negative: Vec<(f64, Vec<usize>)> = Vec::new();
    let half_edges: Vec<(usize, usize)> = edge_set
        .iter()
        .flat_map(|&(a, b)| [(a, b), (b, a)])
        .collect();

    for &start in &half_edges {
        if visited.contains(&start) {
            continue;
        }
        let mut cycle = Vec::new();
        let mut cur = start;
        for _ in 0..=half_edges.len() {
            visited.insert(cur);
            cycle.push(cur.0);
            let nbrs = &adjacency[&cur.1];
            let n = nbrs.len();
            let Some(i) = nbrs.iter().position(|&x| x == cur.0) else {
                break;
            };
            let next = (cur.1, nbrs[(i + n - 1) % n]);
            if next == start {
                break;
            }
            cur = next;
        }
        let loop_pts: Vec<Point2> = cycle.iter().map(|&i| points[i]).collect();
        let area = signed_area_2d(&loop_pts);
        if area > area_tol {
            positive.push((area, cycle));
        } else if area < -area_tol {
            negative.push((area, cycle));
        }
    }

    let mut result: Vec<Face> = positive
        .iter()
        .map(|(_, outer)| Face {
            outer: outer.clone(),
            holes: Vec::new(),
        })
        .collect();

    // The most negative loop bounds the unbounded face; the others are
    // holes of the smallest face enclosing them.
    negative.sort_by(|a, b| a.0.total_cmp(&b.0));
    for (_, hole) in negative.into_iter().skip(1) {
        let sample = points[hole[0]];
        let host = positive
            .iter()
            .enumerate()
            .filter(|(_, (_, outer))| !outer.contains(&hole[0]))
            .filter(|(_, (_, outer))| {
                let poly: Vec<Point2> = outer.iter().map(|&i| points[i]).collect();
                point_in_polygon_2d(&sample, &poly)
            })
            .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
            .map(|(k, _)| k);
        if let Some(k) = host {
            result[k].holes.push(hole);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_single_loop() {
        let pts = grid();
        let edges = [[0, 2], [2, 3], [3, 5], [5, 0]];
        let f = faces(&pts, &edges, 1e-12);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].outer.len(), 4);
    }

    #[test]
    fn test_split_rectangle() {
        let pts = grid();
        let edges = [[0, 1], [1, 2], [2, 3], [3, 4], [4, 5], [5, 0], [1, 4]];
        let mut f = faces(&pts, &edges, 1e-12);
        assert_eq!(f.len(), 2);
        for face in &mut f {
            let loop_pts: Vec<Point2> = face.outer.iter().map(|&i| pts[i]).collect();
            assert!((signed_area_2d(&loop_pts) - 1.0).abs() < 1e-12);
            face.outer.sort();
        }
        f.sort_by(|a, b| a.outer.cmp(&b.outer));
        assert_eq!(f[0].outer, vec![0, 1, 4, 5]);
        assert_eq!(f[1].outer, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dangling_edge_is_pruned() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
            Point2::new(0.5, 0.5),
        ];
        let edges = [[0, 1], [1, 2], [2, 3], [3, 0], [0, 4]];
        let f = faces(&pts, &edges, 1e-12);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].outer.len(), 4);
    }

    #[test]
    fn test_nested_loop_becomes_hole() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(0.0, 4.0),
            Point2::new(1.0, 1.0),
            Point2::new(3.0, 1.0),
            Point2::new(3.0, 3.0),
            Point2::new(1.0, 3.0),
        ];
        let edges = [[0, 1], [1, 2], [2, 3], [3, 0], [4, 5], [5, 6], [6, 7], [7, 4]];
        let f = faces(&pts, &edges, 1e-12);
        assert_eq!(f.len(), 2);
        let outer = f.iter().find(|face| face.outer.contains(&0)).unwrap();
        let inner = f.iter().find(|face| face.outer.contains(&4)).unwrap();
        assert_eq!(outer.holes.len(), 1);
        assert!(inner.holes.is_empty());
    }
}
