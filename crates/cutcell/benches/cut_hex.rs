//! Benchmarks for cutting a small hex grid.

use criterion::{criterion_group, criterion_main, Criterion};
use cutcell::{CutOptions, CutSession, ElementShape, Mesh, Point3, Strategy, Tolerance};
use std::hint::black_box;

const N: u64 = 4;

/// An `N^3` grid of unit hexes cut by one tilted quad.
fn grid_mesh() -> Mesh {
    let mut mesh = Mesh::new(Tolerance::DEFAULT);
    let node = |i: u64, j: u64, k: u64| 1 + i + (N + 1) * (j + (N + 1) * k);
    for k in 0..=N {
        for j in 0..=N {
            for i in 0..=N {
                let p = Point3::new(i as f64, j as f64, k as f64);
                mesh.add_node(node(i, j, k), p).unwrap();
            }
        }
    }
    let mut id = 1;
    for k in 0..N {
        for j in 0..N {
            for i in 0..N {
                let ids = [
                    node(i, j, k),
                    node(i + 1, j, k),
                    node(i + 1, j + 1, k),
                    node(i, j + 1, k),
                    node(i, j, k + 1),
                    node(i + 1, j, k + 1),
                    node(i + 1, j + 1, k + 1),
                    node(i, j + 1, k + 1),
                ];
                mesh.add_element(id, ElementShape::Hex8, &ids).unwrap();
                id += 1;
            }
        }
    }
    let height = |x: f64, y: f64| 1.3 + 0.2 * x + 0.1 * y;
    let (lo, hi) = (-1.0, N as f64 + 1.0);
    for (i, (x, y)) in [(lo, lo), (hi, lo), (hi, hi), (lo, hi)].into_iter().enumerate() {
        mesh.add_cutter_node(10_000 + i as u64, Point3::new(x, y, height(x, y)))
            .unwrap();
    }
    mesh.add_cutter_side(1, &[10_000, 10_001, 10_002, 10_003]).unwrap();
    mesh
}

fn bench_cut(c: &mut Criterion) {
    let mut group = c.benchmark_group("cut_hex_grid");
    for (name, strategy) in [
        ("tessellation", Strategy::Tessellation),
        ("moment_fitting", Strategy::MomentFitting),
        ("direct_divergence", Strategy::DirectDivergence),
    ] {
        let options = CutOptions {
            integration: strategy,
            ..CutOptions::default()
        };
        let mut session = CutSession::with_mesh(options, grid_mesh());
        group.bench_function(name, |b| {
            b.iter(|| {
                let report = session.run().unwrap();
                black_box(report.gauss_points)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cut);
criterion_main!(benches);
