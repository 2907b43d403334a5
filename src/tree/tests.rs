use super::OrderStatTree;

type Tree8 = OrderStatTree<u32, 8>;
type Tree16 = OrderStatTree<u32, 16>;

/// Deterministic 64-bit LCG for reproducible key sequences.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg(seed)
    }

    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }
}

fn sequential_tree(n: u32) -> Tree8 {
    let mut tree = Tree8::new();
    for i in 0..n {
        tree.insert(i as f64, i);
    }
    tree
}

#[test]
fn rank_queries_over_sequential_keys() {
    let tree = sequential_tree(1000);
    tree.verify();
    assert_eq!(tree.len(), 1000);

    for r in [0usize, 1, 499, 998, 999] {
        let cursor = tree.find_rank(r);
        assert_eq!(tree.key_at(cursor), r as f64, "rank {r}");
        assert_eq!(tree.value_at(cursor), r as u32);
    }
    assert_eq!(tree.find_rank(1000), tree.end());
    assert_eq!(tree.rank_of_lower_bound(500.0).0, 500);
    assert_eq!(tree.rank_of_upper_bound(500.0).0, 501);
}

#[test]
fn split_at_key_round_trips_lcg_keys() {
    let mut rng = Lcg::new(34234235);
    let mut tree = Tree8::new();
    for i in 0..3200u32 {
        tree.insert((rng.next() % 1000) as f64, i);
    }
    tree.verify();
    let size = tree.len();

    for s in [-1.0, 0.0, 500.0, 1000.0, 2000.0] {
        let (left, right) = tree.clone().split_at_key(s);
        left.verify();
        right.verify();
        assert_eq!(left.len() + right.len(), size, "split at {s}");
        assert!(left.iter().all(|(k, _)| k <= s), "left exceeds {s}");
        assert!(right.iter().all(|(k, _)| k > s), "right at or below {s}");

        let mut joined = left;
        joined.join(right);
        joined.verify();
        assert_eq!(joined, tree, "round trip at {s}");
    }
}

#[test]
fn split_at_rank_round_trips() {
    let mut rng = Lcg::new(99991);
    let mut tree = Tree8::new();
    for i in 0..2000u32 {
        // few distinct keys, so rank splits usually land inside runs of
        // duplicates
        tree.insert((rng.next() % 37) as f64, i);
    }

    for m in [0, 1, 17, 500, 1000, 1999, 2000] {
        let (left, right) = tree.clone().split_at_rank(m);
        left.verify();
        right.verify();
        assert_eq!(left.len(), m, "left size at rank {m}");
        assert_eq!(right.len(), 2000 - m);
        if let (Some(lmax), Some(rmin)) = (left.last_key(), right.first_key()) {
            assert!(lmax <= rmin, "halves out of order at rank {m}");
        }

        let mut joined = left;
        joined.join(right);
        joined.verify();
        // Moving boundary duplicates may permute payloads among equal keys,
        // so compare as a multiset.
        assert_eq!(sorted_entries(&joined), sorted_entries(&tree), "round trip at rank {m}");
    }
}

fn sorted_entries(tree: &Tree8) -> Vec<(u64, u32)> {
    let mut entries: Vec<(u64, u32)> = tree.iter().map(|(k, v)| (k.to_bits(), v)).collect();
    entries.sort_unstable();
    entries
}

#[test]
fn bulk_load_duplicate_pairs() {
    let items: Vec<(f64, u32)> = (0..500u32)
        .flat_map(|k| [(k as f64, 2 * k), (k as f64, 2 * k + 1)])
        .collect();
    let tree: Tree16 = OrderStatTree::bulk_load(items.clone());
    tree.verify();

    assert_eq!(tree.len(), 1000);
    assert_eq!(tree.count(250.0), 2);
    assert_eq!(tree.key_at(tree.find_rank(500)), 250.0);
    let collected: Vec<(f64, u32)> = tree.iter().collect();
    assert_eq!(collected, items);
}

#[test]
fn bulk_load_matches_incremental_insert() {
    let keys: Vec<f64> = (0..777u32).map(|i| (i / 3) as f64).collect();
    let bulk: Tree8 = OrderStatTree::bulk_load(keys.iter().map(|&k| (k, 0u32)));
    bulk.verify();
    let mut incremental = Tree8::new();
    for &k in &keys {
        incremental.insert(k, 0);
    }
    assert_eq!(bulk, incremental);
}

#[test]
fn empty_tree_edge_cases() {
    let tree = Tree8::new();
    tree.verify();
    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
    assert_eq!(tree.find_rank(0), tree.end());
    assert_eq!(tree.begin(), tree.end());

    let (left, right) = tree.split_at_rank(0);
    assert!(left.is_empty() && right.is_empty());

    // Joining an empty tree on either side is a no-op on the other.
    let mut populated = sequential_tree(100);
    populated.join(Tree8::new());
    assert_eq!(populated.len(), 100);
    populated.verify();

    let mut empty = Tree8::new();
    empty.join(sequential_tree(100));
    assert_eq!(empty.len(), 100);
    empty.verify();
}

#[test]
fn join_trees_from_separate_pools() {
    let mut low = Tree8::new();
    for i in 0..300u32 {
        low.insert(i as f64, i);
    }
    let mut high = Tree8::new();
    for i in 300..1000u32 {
        high.insert(i as f64, i);
    }

    low.join(high);
    low.verify();
    assert_eq!(low.len(), 1000);
    for (i, (k, v)) in low.iter().enumerate() {
        assert_eq!(k, i as f64);
        assert_eq!(v, i as u32);
    }
}

#[test]
fn remove_rank_against_reference() {
    let mut rng = Lcg::new(777);
    let mut tree = Tree8::new();
    let mut reference: Vec<f64> = Vec::new();
    for _ in 0..1500 {
        let key = (rng.next() % 200) as f64;
        tree.insert(key, 0);
        let pos = reference.partition_point(|&k| k <= key);
        reference.insert(pos, key);
    }

    while !reference.is_empty() {
        let rank = rng.next() as usize % reference.len();
        let expected = reference.remove(rank);
        let (key, _) = tree.remove_rank(rank);
        assert_eq!(key, expected, "rank {rank}");
    }
    assert!(tree.is_empty());
    tree.verify();
}

#[test]
fn self_verify_catches_nothing_on_mixed_workload() {
    let mut rng = Lcg::new(4242);
    let mut tree = Tree8::new();
    tree.set_self_verify(true);
    for _ in 0..300 {
        tree.insert((rng.next() % 50) as f64, 0);
    }
    for _ in 0..250 {
        let rank = rng.next() as usize % tree.len();
        tree.remove_rank(rank);
    }
    assert_eq!(tree.len(), 50);
}

#[test]
fn pop_last_returns_descending_keys() {
    let mut tree = sequential_tree(64);
    let mut last = f64::INFINITY;
    while let Some((key, _)) = tree.pop_last() {
        assert!(key < last);
        last = key;
    }
    assert_eq!(tree.pop_last(), None);
}

#[test]
fn clone_is_independent() {
    let mut tree = sequential_tree(500);
    let copy = tree.clone();
    copy.verify();
    assert_eq!(copy, tree);

    for _ in 0..200 {
        tree.remove_rank(0);
    }
    assert_eq!(copy.len(), 500);
    assert_eq!(tree.len(), 300);
    copy.verify();
}

#[test]
fn cursors_walk_both_directions() {
    let tree = sequential_tree(100);
    let mut cursor = tree.begin();
    for i in 0..100 {
        assert_eq!(tree.key_at(cursor), i as f64);
        cursor = tree.advance(cursor);
    }
    assert!(tree.is_end(cursor));
    for i in (0..100).rev() {
        cursor = tree.retreat(cursor);
        assert_eq!(tree.key_at(cursor), i as f64);
    }
}

#[test]
fn count_and_bounds_with_duplicates() {
    let mut tree = Tree16::new();
    for i in 0..30u32 {
        for _ in 0..(i % 4) {
            tree.insert(i as f64, i);
        }
    }
    tree.verify();
    for i in 0..30u32 {
        assert_eq!(tree.count(i as f64), (i % 4) as usize, "key {i}");
    }
    assert_eq!(tree.count(100.0), 0);
    assert!(tree.is_end(tree.lower_bound(100.0)));
}
