//! Benchmarks for the remeshing pipeline.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point3;
use quadflow::mesh::CompactMesh;
use quadflow::prelude::*;

fn create_grid(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    // Create grid vertices on a gentle bump
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64 / n as f64, j as f64 / n as f64);
            let z = 0.2 * (std::f64::consts::PI * x).sin() * (std::f64::consts::PI * y).sin();
            vertices.push(Point3::new(x, y, z));
        }
    }

    // Create triangles
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    (vertices, faces)
}

fn bench_ingestion(c: &mut Criterion) {
    let (vertices, faces) = create_grid(100);

    c.bench_function("ingest_grid_100x100", |b| {
        b.iter(|| {
            let mut mesh = CompactMesh::from_triangles(&vertices, &faces).unwrap();
            mesh.normalize();
            mesh
        })
    });
}

fn bench_remesh(c: &mut Criterion) {
    let (vertices, faces) = create_grid(30);
    let options = RemeshOptions::new(200).with_preserve_boundary(true);

    c.bench_function("remesh_grid_30x30_parallel", |b| {
        let engine = CrossFieldEngine::default();
        b.iter(|| quad_remesh_with_engine(&vertices, &faces, &options, &engine).unwrap())
    });

    c.bench_function("remesh_grid_30x30_sequential", |b| {
        let engine = CrossFieldEngine::new(EngineOptions::default().sequential());
        b.iter(|| quad_remesh_with_engine(&vertices, &faces, &options, &engine).unwrap())
    });
}

criterion_group!(benches, bench_ingestion, bench_remesh);
criterion_main!(benches);
