//! Triangulation of planar polygons with holes.
//!
//! Holes are bridged into the outer loop at their closest vertex pair and
//! the merged loop is ear-clipped. Convex loops without holes take a fan.

use crate::polygon::{is_convex_2d, orient_2d, signed_area_2d};
use crate::Point2;

/// Triangulate an outer loop with holes.
///
/// Vertex indices refer to the concatenation `outer ++ holes[0] ++ holes[1] ...`.
/// Triangles are counterclockwise regardless of the input loop orientation.
pub fn triangulate(outer: &[Point2], holes: &[Vec<Point2>]) -> Vec<[usize; 3]> {
    if outer.len() < 3 {
        return Vec::new();
    }
    let mut verts: Vec<Point2> = outer.to_vec();
    let mut poly: Vec<usize> = (0..outer.len()).collect();
    if signed_area_2d(outer) < 0.0 {
        poly.reverse();
    }

    if holes.is_empty() {
        let ordered: Vec<Point2> = poly.iter().map(|&i| verts[i]).collect();
        if is_convex_2d(&ordered, 1e-12) {
            return fan(&poly);
        }
    }

    for hole in holes.iter().filter(|h| h.len() >= 3) {
        let start = verts.len();
        verts.extend_from_slice(hole);
        let mut hole_idx: Vec<usize> = (start..start + hole.len()).collect();
        // Holes run clockwise inside a counterclockwise outer loop.
        if signed_area_2d(hole) > 0.0 {
            hole_idx.reverse();
        }

        // Closest (outer vertex, hole vertex) pair.
        let mut best: Option<(f64, usize, usize)> = None;
        for (j, &o) in poly.iter().enumerate() {
            for (i, &h) in hole_idx.iter().enumerate() {
                let d = (verts[o] - verts[h]).norm_squared();
                if best.map_or(true, |(bd, _, _)| d < bd) {
                    best = Some((d, j, i));
                }
            }
        }
        let Some((_, j, i)) = best else {
            continue;
        };

        let bridge_outer = poly[j];
        let n = hole_idx.len();
        let rotated: Vec<usize> = (0..n).map(|k| hole_idx[(i + k) % n]).collect();
        let mut merged = Vec::with_capacity(poly.len() + n + 2);
        merged.extend_from_slice(&poly[..=j]);
        merged.extend_from_slice(&rotated);
        merged.push(rotated[0]);
        merged.push(bridge_outer);
        merged.extend_from_slice(&poly[j + 1..]);
        poly = merged;
    }

    ear_clip(&verts, poly)
}

fn fan(poly: &[usize]) -> Vec<[usize; 3]> {
    (1..poly.len() - 1)
        .map(|i| [poly[0], poly[i], poly[i + 1]])
        .collect()
}

/// Ear clipping of a counterclockwise loop of vertex indices.
fn ear_clip(verts: &[Point2], mut remaining: Vec<usize>) -> Vec<[usize; 3]> {
    let mut out = Vec::with_capacity(remaining.len().saturating_sub(2));
    let scale = remaining
        .iter()
        .map(|&i| verts[i].coords.norm())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let eps = 1e-14 * scale * scale;

    while remaining.len() > 3 {
        let n = remaining.len();
        let mut clipped = false;

        for i in 0..n {
            let prev = remaining[(i + n - 1) % n];
            let cur = remaining[i];
            let next = remaining[(i + 1) % n];
            let (a, b, c) = (verts[prev], verts[cur], verts[next]);
            let cross = orient_2d(&a, &b, &c);

            // A straight-through vertex carries no area.
            if cross.abs() <= eps && (b - a).dot(&(c - b)) > 0.0 {
                remaining.remove(i);
                clipped = true;
                break;
            }
            if cross <= eps {
                continue;
            }

            let blocked = remaining.iter().any(|&j| {
                j != prev
                    && j != cur
                    && j != next
                    && verts[j] != a
                    && verts[j] != b
                    && verts[j] != c
                    && point_in_triangle(&verts[j], &a, &b, &c)
            });
            if !blocked {
                out.push([prev, cur, next]);
                remaining.remove(i);
                clipped = true;
                break;
            }
        }

        if !clipped {
            // Numerically stuck: close the rest as a fan.
            out.extend(fan(&remaining));
            return out;
        }
    }

    if remaining.len() == 3 {
        out.push([remaining[0], remaining[1], remaining[2]]);
    }
    out
}

/// Strict interior test of a counterclockwise triangle.
fn point_in_triangle(p: &Point2, a: &Point2, b: &Point2, c: &Point2) -> bool {
    orient_2d(a, b, p) > 0.0 && orient_2d(b, c, p) > 0.0 && orient_2d(c, a, p) > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(verts: &[Point2], tris: &[[usize; 3]]) -> f64 {
        tris.iter()
            .map(|t| orient_2d(&verts[t[0]], &verts[t[1]], &verts[t[2]]) * 0.5)
            .sum()
    }

    #[test]
    fn test_convex_fan() {
        let square = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let tris = triangulate(&square, &[]);
        assert_eq!(tris.len(), 2);
        assert!((area(&square, &tris) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clockwise_input_is_reoriented() {
        let square = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 0.0),
        ];
        let tris = triangulate(&square, &[]);
        assert!((area(&square, &tris) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_with_hole() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 4.0),
            Point2::new(0.0, 4.0),
        ];
        let hole = vec![
            Point2::new(1.0, 1.0),
            Point2::new(3.0, 1.0),
            Point2::new(3.0, 3.0),
            Point2::new(1.0, 3.0),
        ];
        let tris = triangulate(&outer, &[hole.clone()]);
        let mut verts = outer.clone();
        verts.extend(hole);
        assert!((area(&verts, &tris) - 12.0).abs() < 1e-9);
        for t in &tris {
            assert!(orient_2d(&verts[t[0]], &verts[t[1]], &verts[t[2]]) >= 0.0);
        }
    }

    #[test]
    fn test_collinear_vertices_keep_area() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.5, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let tris = triangulate(&outer, &[]);
        assert!((area(&outer, &tris) - 1.0).abs() < 1e-12);
    }
}
