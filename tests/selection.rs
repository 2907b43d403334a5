//! Multi-worker tests of the selection protocol against sequential oracles.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp1};
use reservoir::{run_group, AmsSelect, AmsSelectMulti, OrderStatTree, Selector};

/// A tree of `n` Exp(1) keys, reproducible per (seed, rank).
fn exp_tree(seed: u64, n: usize) -> OrderStatTree<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut tree = OrderStatTree::new();
    for i in 0..n {
        let key: f64 = Exp1.sample(&mut rng);
        tree.insert(key.max(f64::MIN_POSITIVE), i as u32);
    }
    tree
}

/// The selected prefix of a worker's tree, as raw key bits.
fn prefix_keys(tree: &OrderStatTree<u32>, count: usize) -> Vec<u64> {
    tree.iter().take(count).map(|(k, _)| k.to_bits()).collect()
}

#[test]
fn selection_matches_sequential_baseline() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 10_000;
    const K: usize = 100;

    let gathered = run_group(WORKERS, |comm| {
        let tree = exp_tree(1000 + comm.rank() as u64, PER_WORKER);
        let mut selector = AmsSelectMulti::<16>::new(comm.clone(), 42 + comm.rank() as u64);
        let splitter = selector.select(&tree, K, K).unwrap();

        let prefix = prefix_keys(&tree, splitter.count);
        let all: Vec<u64> = tree.iter().map(|(k, _)| k.to_bits()).collect();
        comm.gather(0, (prefix, all)).unwrap()
    });

    let parts = gathered[0].as_ref().expect("rank 0 gathers");
    let mut selected: Vec<u64> = parts.iter().flat_map(|(p, _)| p.iter().copied()).collect();
    let mut all: Vec<u64> = parts.iter().flat_map(|(_, a)| a.iter().copied()).collect();
    assert_eq!(selected.len(), K);

    all.sort_by(|a, b| f64::from_bits(*a).total_cmp(&f64::from_bits(*b)));
    let mut expected: Vec<u64> = all[..K].to_vec();
    expected.sort_unstable();
    selected.sort_unstable();
    assert_eq!(selected, expected, "selected set is not the global k smallest");
}

#[test]
fn single_and_multi_pivot_agree() {
    const WORKERS: usize = 3;
    const K: usize = 250;

    let sets = run_group(WORKERS, |comm| {
        let tree = exp_tree(7 + comm.rank() as u64, 5000);

        // The single-pivot selector must be seeded identically everywhere.
        let mut single = AmsSelect::new(comm.clone(), 999);
        let s1 = single.select(&tree, K, K).unwrap();
        let mut multi = AmsSelectMulti::<8>::new(comm.clone(), 100 + comm.rank() as u64);
        let s2 = multi.select(&tree, K, K).unwrap();

        let p1 = comm.gather(0, prefix_keys(&tree, s1.count)).unwrap();
        let p2 = comm.gather(0, prefix_keys(&tree, s2.count)).unwrap();
        (p1, p2)
    });

    let (p1, p2) = &sets[0];
    let mut flat1: Vec<u64> = p1.as_ref().unwrap().iter().flatten().copied().collect();
    let mut flat2: Vec<u64> = p2.as_ref().unwrap().iter().flatten().copied().collect();
    assert_eq!(flat1.len(), K);
    assert_eq!(flat2.len(), K);
    flat1.sort_unstable();
    flat2.sort_unstable();
    assert_eq!(flat1, flat2, "variants disagree on the k smallest set");
}

#[test]
fn exact_counts_across_k_range() {
    const WORKERS: usize = 4;
    const PER_WORKER: usize = 500;

    run_group(WORKERS, |comm| {
        let tree = exp_tree(31 + comm.rank() as u64, PER_WORKER);
        let global = WORKERS * PER_WORKER;
        for k in [1usize, 2, 10, 499, 500, 501, 1999, global] {
            let mut selector =
                AmsSelectMulti::<8>::new(comm.clone(), 5 + k as u64 + comm.rank() as u64);
            let splitter = selector.select(&tree, k, k).unwrap();
            let total = comm.all_reduce_sum(splitter.count as i64).unwrap();
            assert_eq!(total, k as i64, "wrong total for k={k}");
        }
    });
}

#[test]
fn exact_counts_with_duplicate_keys() {
    // Every worker holds the same few key values, so every boundary falls
    // into an equal-key run and must be settled by the scan.
    const WORKERS: usize = 3;

    run_group(WORKERS, |comm| {
        let mut tree: OrderStatTree<u32> = OrderStatTree::new();
        for i in 0..300u32 {
            tree.insert(((i % 3) + 1) as f64, i);
        }
        for k in [1usize, 5, 100, 300, 450, 899, 900] {
            let mut selector =
                AmsSelectMulti::<8>::new(comm.clone(), k as u64 + comm.rank() as u64);
            let splitter = selector.select(&tree, k, k).unwrap();
            let total = comm.all_reduce_sum(splitter.count as i64).unwrap();
            assert_eq!(total, k as i64, "wrong total for k={k}");

            // No selected key may exceed an unselected one anywhere.
            let boundary = if splitter.count > 0 {
                tree.key_at(tree.find_rank(splitter.count - 1))
            } else {
                0.0
            };
            let max_selected = comm.all_reduce_max(boundary).unwrap();
            let first_rejected = if splitter.count < tree.len() {
                tree.key_at(tree.find_rank(splitter.count))
            } else {
                f64::INFINITY
            };
            let min_rejected = comm.all_reduce_min(first_rejected).unwrap();
            assert!(
                max_selected <= min_rejected,
                "selection crosses the boundary for k={k}"
            );
        }
    });
}

#[test]
fn range_form_returns_within_bounds() {
    const WORKERS: usize = 4;

    run_group(WORKERS, |comm| {
        let tree = exp_tree(61 + comm.rank() as u64, 2000);
        for (kmin, kmax) in [(50usize, 80usize), (1, 100), (700, 710), (1999, 2100)] {
            let mut selector =
                AmsSelectMulti::<16>::new(comm.clone(), kmin as u64 + comm.rank() as u64);
            let splitter = selector.select(&tree, kmin, kmax).unwrap();
            let total = comm.all_reduce_sum(splitter.count as i64).unwrap() as usize;
            assert!(
                (kmin..=kmax).contains(&total),
                "total {total} outside [{kmin}, {kmax}]"
            );
        }
    });
}

#[test]
fn selection_is_deterministic_for_fixed_seed() {
    const WORKERS: usize = 4;
    const K: usize = 333;

    let run = || {
        run_group(WORKERS, |comm| {
            let tree = exp_tree(17 + comm.rank() as u64, 3000);
            let mut selector =
                AmsSelectMulti::<32>::new(comm.clone(), 55 + comm.rank() as u64);
            selector.select(&tree, K, K).unwrap().count
        })
    };
    assert_eq!(run(), run());
}

#[test]
fn workers_with_empty_trees_participate() {
    const WORKERS: usize = 4;
    const K: usize = 123;

    run_group(WORKERS, |comm| {
        // Workers 1 and 3 hold nothing at all.
        let tree = if comm.rank() % 2 == 0 {
            exp_tree(83 + comm.rank() as u64, 1000)
        } else {
            OrderStatTree::new()
        };
        let mut selector = AmsSelectMulti::<8>::new(comm.clone(), 9 + comm.rank() as u64);
        let splitter = selector.select(&tree, K, K).unwrap();
        if comm.rank() % 2 == 1 {
            assert_eq!(splitter.count, 0);
        }
        let total = comm.all_reduce_sum(splitter.count as i64).unwrap();
        assert_eq!(total, K as i64);
    });
}

#[test]
fn zero_kmax_yields_empty_splitter() {
    run_group(2, |comm| {
        let tree = exp_tree(3 + comm.rank() as u64, 100);
        let mut selector = AmsSelect::new(comm.clone(), 4);
        let splitter = selector.select(&tree, 0, 0).unwrap();
        assert_eq!(splitter.count, 0);
    });
}
