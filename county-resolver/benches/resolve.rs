//! Benchmarks de classification

use std::sync::Arc;

use county_resolver::regions::square;
use county_resolver::{classify, Batch, BruteForceIndex, IterSource, Point, Region, RegionSet, ResolverConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geo::coord;

const POINTS: usize = 100_000;

/// Grille 10x10 de comtés carrés
fn grid() -> Arc<RegionSet> {
    let regions = (0..100).map(|i| {
        let (row, col) = (i / 10, i % 10);
        Region::new(
            format!("{:02}{:02}", row, col),
            square(f64::from(col), f64::from(row), 0.95),
        )
    });
    Arc::new(RegionSet::from_regions(regions).unwrap())
}

fn points(n: usize) -> Vec<Point> {
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let x = (state % 10_000) as f64 / 1000.0;
            let y = ((state >> 32) % 10_000) as f64 / 1000.0;
            coord! { x: x, y: y }
        })
        .collect()
}

fn bench_classify_batch(c: &mut Criterion) {
    let index = BruteForceIndex::new(grid());
    let batch = Batch {
        sequence: 0,
        points: points(1000),
    };

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("batch_1000_x_100_regions", |b| {
        b.iter(|| black_box(classify(black_box(&batch), &index).unwrap()))
    });
    group.finish();
}

fn bench_resolve_configs(c: &mut Criterion) {
    let regions = grid();
    let input = points(POINTS);

    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(POINTS as u64));
    group.sample_size(10);

    for (workers, batch_size) in [(1, 1000), (8, 1000), (100, 1000), (8, 100), (8, 10_000)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("w{}_b{}", workers, batch_size)),
            &ResolverConfig::new(workers, batch_size),
            |b, config| {
                b.iter(|| {
                    let mut source = IterSource::from_points(input.clone());
                    let resolution =
                        county_resolver::resolve(Arc::clone(&regions), &mut source, config)
                            .unwrap();
                    black_box(resolution.resolved_total())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_classify_batch, bench_resolve_configs);
criterion_main!(benches);
