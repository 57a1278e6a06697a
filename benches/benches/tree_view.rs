// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use understory_tree_view::{MemoryProvider, NodeId, RowWindow, Tree, TreeConfig};

/// `dirs` directories of `files` leaves each, plus one deep chain.
fn provider(dirs: usize, files: usize) -> MemoryProvider {
    let provider = MemoryProvider::new();
    for d in 0..dirs {
        for f in 0..files {
            provider.add_path(&format!("dir{d:04}/file{f:04}.rs"));
        }
    }
    provider.add_path("deep/a/b/c/d/e/f/g/h/leaf");
    provider
}

fn loaded(dirs: usize, files: usize) -> (Tree, Vec<NodeId>) {
    let mut tree = Tree::new(provider(dirs, files), TreeConfig::new("/bench"));
    let root = tree.root();
    pollster::block_on(tree.ensure_loaded(root)).unwrap();
    let children = tree.hierarchy().children(root).unwrap().to_vec();
    for &dir in &children {
        pollster::block_on(tree.ensure_loaded(dir)).unwrap();
    }
    (tree, children)
}

fn bench_expand_collapse(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_view/expand_collapse");

    // Hypothesis: toggling one directory costs O(rows) for the copy-on-splice,
    // independent of how many other directories are expanded.
    for dirs in [64usize, 512, 2_048] {
        let (mut tree, children) = loaded(dirs, 16);
        for &dir in children.iter().step_by(2) {
            pollster::block_on(tree.set_expanded(dir, true)).unwrap();
        }
        let target = children[1];
        group.throughput(Throughput::Elements(tree.hierarchy().row_count() as u64));
        group.bench_function(BenchmarkId::from_parameter(dirs), |b| {
            b.iter(|| {
                pollster::block_on(tree.set_expanded(target, true)).unwrap();
                tree.set_collapsed(target).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_reveal_deep(c: &mut Criterion) {
    c.bench_function("tree_view/reveal_deep", |b| {
        b.iter_batched(
            || loaded(256, 8).0,
            |mut tree| {
                let leaf = pollster::block_on(tree.force_load_node_at_path("deep/a/b/c/d/e/f/g/h")).unwrap();
                pollster::block_on(tree.set_expanded(leaf, true)).unwrap();
                black_box(tree.hierarchy().row_count());
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_visible_rows(c: &mut Criterion) {
    let (mut tree, children) = loaded(1_024, 16);
    for &dir in &children {
        pollster::block_on(tree.set_expanded(dir, true)).unwrap();
    }
    let window = RowWindow::new(22.0, 900.0).with_overscan(220.0);
    let rows = tree.hierarchy().row_count();
    c.bench_function("tree_view/visible_rows", |b| {
        let mut offset = 0.0;
        b.iter(|| {
            offset = (offset + 517.0) % (rows as f64 * 22.0);
            tree.save_scroll_offset(offset);
            black_box(tree.visible_rows(&window).len());
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let (mut tree, children) = loaded(1_024, 4);
    for &dir in children.iter().step_by(3) {
        pollster::block_on(tree.set_expanded(dir, true)).unwrap();
    }
    tree.add_metadata(children[0], "note", json!("bench")).unwrap();
    c.bench_function("tree_view/snapshot_to_string", |b| {
        b.iter(|| black_box(tree.snapshot().to_string()));
    });
}

criterion_group!(
    benches,
    bench_expand_collapse,
    bench_reveal_deep,
    bench_visible_rows,
    bench_snapshot
);
criterion_main!(benches);
