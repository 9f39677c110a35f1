// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_core::{IngestContext, StoreConfig, XmsConfig};
use strata_storage::{CheckpointEngine, EdgePair, ExternalSorter, MultiVersionGraph, WritableGraph};

fn engine() -> CheckpointEngine {
    let graph = Arc::new(MultiVersionGraph::new(StoreConfig::default()).unwrap());
    let delta = Arc::new(WritableGraph::new(graph, Arc::new(IngestContext::new(0))));
    CheckpointEngine::new(delta)
}

fn bench_ingest_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_throughput");

    for size in [1_000u32, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let eng = engine();
                for i in 0..size {
                    eng.delta().add_edge(black_box(i % 1024), black_box((i * 7 + 1) % 1024));
                }
            });
        });
    }
    group.finish();
}

fn bench_checkpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint");

    for size in [10_000u32, 100_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let eng = engine();
                for i in 0..size {
                    eng.delta().add_edge(i % 4096, (i * 13 + 5) % 4096);
                }
                eng.checkpoint().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_snapshot_scan(c: &mut Criterion) {
    let eng = engine();
    for i in 0..100_000u32 {
        eng.delta().add_edge(i % 4096, (i * 13 + 5) % 4096);
    }
    eng.checkpoint().unwrap();
    let snap = eng.store().snapshot();

    c.bench_function("snapshot_full_scan", |b| {
        b.iter(|| {
            let mut edges = 0u64;
            for v in 0..snap.max_nodes() {
                edges += snap.out_iter(black_box(v)).count() as u64;
            }
            black_box(edges)
        });
    });

    c.bench_function("snapshot_point_find", |b| {
        b.iter(|| {
            black_box(snap.find(black_box(17), black_box((17 * 13 + 5) % 4096)));
        });
    });
}

fn bench_external_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("external_sort");

    for size in [100_000u32, 500_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cfg = XmsConfig {
                    buffer_bytes: 0,
                    tmp_dirs: vec![],
                    parallel: true,
                };
                // Small buffer to force spills and exercise the merge.
                let mut sorter = ExternalSorter::new(cfg).with_buffer_records(64 * 1024);
                for i in 0..size {
                    sorter
                        .push(EdgePair {
                            tail: i.wrapping_mul(2654435761) % 100_000,
                            head: i,
                        })
                        .unwrap();
                }
                sorter.sort().unwrap();
                let mut n = 0u64;
                sorter.for_each_sorted(|_| n += 1).unwrap();
                black_box(n)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_ingest_throughput,
    bench_checkpoint,
    bench_snapshot_scan,
    bench_external_sort
);
criterion_main!(benches);
