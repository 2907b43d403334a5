//! Criterion benchmarks for the tree and the single-worker selection path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp1};
use reservoir::comm::mesh;
use reservoir::{AmsSelectMulti, OrderStatTree, Selector};

fn exp_keys(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let key: f64 = Exp1.sample(&mut rng);
            key.max(f64::MIN_POSITIVE)
        })
        .collect()
}

fn bench_tree_insert(c: &mut Criterion) {
    let keys = exp_keys(10_000, 1);
    c.bench_function("tree_insert_10k", |b| {
        b.iter(|| {
            let mut tree: OrderStatTree<u32> = OrderStatTree::new();
            for (i, &key) in keys.iter().enumerate() {
                tree.insert(key, i as u32);
            }
            black_box(tree.len())
        })
    });
}

fn bench_find_rank(c: &mut Criterion) {
    let keys = exp_keys(100_000, 2);
    let mut tree: OrderStatTree<u32> = OrderStatTree::new();
    for (i, &key) in keys.iter().enumerate() {
        tree.insert(key, i as u32);
    }
    c.bench_function("tree_find_rank_100k", |b| {
        let mut rank = 0;
        b.iter(|| {
            rank = (rank + 63) % tree.len();
            black_box(tree.key_at(tree.find_rank(rank)))
        })
    });
}

fn bench_split_join(c: &mut Criterion) {
    let items: Vec<(f64, u32)> = {
        let mut keys = exp_keys(100_000, 3);
        keys.sort_by(f64::total_cmp);
        keys.into_iter().enumerate().map(|(i, k)| (k, i as u32)).collect()
    };
    let tree: OrderStatTree<u32> = OrderStatTree::bulk_load(items);
    c.bench_function("tree_split_join_100k", |b| {
        b.iter(|| {
            let (mut left, right) = tree.clone().split_at_rank(black_box(31_337));
            left.join(right);
            black_box(left.len())
        })
    });
}

fn bench_single_worker_select(c: &mut Criterion) {
    let keys = exp_keys(100_000, 4);
    let mut tree: OrderStatTree<u32> = OrderStatTree::new();
    for (i, &key) in keys.iter().enumerate() {
        tree.insert(key, i as u32);
    }
    let comm = mesh(1).remove(0);
    c.bench_function("select_multi16_100k_k1000", |b| {
        let mut selector = AmsSelectMulti::<16>::new(comm.clone(), 5);
        b.iter(|| black_box(selector.select(&tree, 1000, 1000).unwrap().count))
    });
}

criterion_group!(
    benches,
    bench_tree_insert,
    bench_find_rank,
    bench_split_join,
    bench_single_worker_select
);
criterion_main!(benches);
