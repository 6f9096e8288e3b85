//! Builder Benchmarks
//!
//! Performance benchmarks for partitioning, simplification and full builds

use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use tessera_builder::{build, Simplifier};
use tessera_core::mesh::primitives;
use tessera_core::{triangle_adjacency, BuildConfig, MeshInputData, Partitioner, RecursiveBisection, SimplifyConfig};

fn corners(mesh: &MeshInputData) -> Vec<[tessera_core::math::Vec3; 3]> {
    (0..mesh.triangle_count()).map(|t| mesh.triangle_positions(t)).collect()
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_grid");
    let partitioner = RecursiveBisection::default();

    for size in [16u32, 32, 64].iter() {
        let mesh = primitives::grid(*size, *size);
        let graph = triangle_adjacency(&corners(&mesh));
        let parts = mesh.triangle_count().div_ceil(128);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(partitioner.partition(&graph, parts).part_count));
        });
    }

    group.finish();
}

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplify_sphere");
    let simplifier = Simplifier::new(SimplifyConfig::default());

    for segments in [16u32, 32, 64].iter() {
        let mesh = primitives::uv_sphere(*segments, *segments / 2);
        let target = mesh.triangle_count() / 2;

        group.bench_with_input(BenchmarkId::from_parameter(segments), segments, |b, _| {
            b.iter(|| black_box(simplifier.simplify(&mesh, target, None).map(|s| s.error)));
        });
    }

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);

    let shapes = [
        ("grid_32", primitives::grid(32, 32)),
        ("sphere_48", primitives::uv_sphere(48, 24)),
    ];
    for (name, mesh) in &shapes {
        group.bench_function(format!("{}_parallel", name), |b| {
            let config = BuildConfig::default();
            b.iter(|| black_box(build(mesh, &config).map(|o| o.stats.clusters)));
        });

        group.bench_function(format!("{}_sequential", name), |b| {
            let config = BuildConfig {
                parallel: false,
                ..BuildConfig::default()
            };
            b.iter(|| black_box(build(mesh, &config).map(|o| o.stats.clusters)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_simplify, bench_build);
criterion_main!(benches);
