//! Benchmarks for catalog-walker
//!
//! Run with: cargo bench

use catalog_walker::tree::{build_lookup, recalculate, CatalogNode, NewNode, TreeArena};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Balanced tree with `fanout^levels` leaves
fn sample_tree(levels: u32, fanout: usize) -> CatalogNode {
    fn grow(prefix: &str, level: u32, levels: u32, fanout: usize) -> Vec<CatalogNode> {
        if level == levels {
            return Vec::new();
        }
        (0..fanout)
            .map(|i| {
                let path = format!("{}/d{}", prefix, i);
                let mut node = CatalogNode::leaf(&path, format!("h{}", path), 1024 + i as u64);
                node.children = grow(&path, level + 1, levels, fanout);
                node
            })
            .collect()
    }

    let mut root = CatalogNode::root("root", 4096, false);
    root.children = grow("", 0, levels, fanout);
    root
}

fn benchmark_build_lookup(c: &mut Criterion) {
    let tree = sample_tree(4, 8);

    c.bench_function("build_lookup_4x8", |b| {
        b.iter(|| black_box(build_lookup(black_box(&tree)).len()))
    });
}

fn benchmark_recalculate(c: &mut Criterion) {
    let tree = sample_tree(4, 8);

    c.bench_function("recalculate_4x8", |b| {
        b.iter(|| {
            let mut tree = tree.clone();
            recalculate(&mut tree);
            black_box(tree.cumulative_cost)
        })
    });
}

fn benchmark_arena_insert(c: &mut Criterion) {
    c.bench_function("arena_insert_virtual_paths", |b| {
        b.iter(|| {
            let mut arena = TreeArena::with_root("root", 4096, false);
            let root = arena.root();
            for i in 0..512 {
                arena.insert(
                    root,
                    NewNode {
                        path: format!("/a{}/b{}/c{}", i % 8, i % 32, i),
                        content_hash: format!("h{}", i),
                        size_bytes: 100,
                        is_large: false,
                    },
                );
            }
            black_box(arena.len())
        })
    });
}

criterion_group!(
    benches,
    benchmark_build_lookup,
    benchmark_recalculate,
    benchmark_arena_insert
);
criterion_main!(benches);
