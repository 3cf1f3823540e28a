//! Benchmarks for the index's hot paths: size rollup and natural sort.
//!
//! Run with: `cargo bench --bench index_bench`. Results are saved to
//! `target/criterion/` with HTML reports.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use vaultfs_index::index::IndexStore;
use vaultfs_index::path_utils::natural_sort;

/// Seeds a store with `dir_count` directories of `files_per_dir` files
/// each, all directly under root.
fn seed_store(dir_count: usize, files_per_dir: usize) -> IndexStore {
    let store = IndexStore::new();
    for d in 0..dir_count {
        let dir = format!("/dir_{d}");
        store.put_dir(&dir, 0);
        for f in 0..files_per_dir {
            store.put_file(&dir, &format!("file_{f}.txt"), 1024, 0);
        }
    }
    store
}

fn bench_recompute_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompute_sizes");

    for dir_count in [10, 100, 1000] {
        let store = seed_store(dir_count, 20);
        group.bench_with_input(BenchmarkId::new("dirs", dir_count), &store, |b, store| {
            b.iter(|| store.recompute_sizes());
        });
    }

    group.finish();
}

fn bench_natural_sort(c: &mut Criterion) {
    let mut names: Vec<String> = (0..2000).map(|i| format!("file_{i}.txt")).collect();
    names.reverse();

    c.bench_function("natural_sort_2000_names", |b| {
        b.iter(|| {
            let mut copy = names.clone();
            copy.sort_by(|a, b| natural_sort(a, b));
            copy
        });
    });
}

criterion_group!(benches, bench_recompute_sizes, bench_natural_sort);
criterion_main!(benches);
