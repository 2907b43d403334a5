use super::OrderStatTree;
use proptest::collection::vec;
use proptest::prelude::*;

type Tree = OrderStatTree<u32, 8>;

/// Keys drawn from a small integer range so duplicates and boundary runs are
/// common; exact as `f64`, so a sorted `Vec<f64>` is a faithful reference
/// multiset.
fn keys() -> impl Strategy<Value = Vec<u32>> {
    vec(0u32..200, 0..500)
}

fn build(keys: &[u32]) -> (Tree, Vec<f64>) {
    let mut tree = Tree::new();
    let mut reference: Vec<f64> = Vec::with_capacity(keys.len());
    for (i, &k) in keys.iter().enumerate() {
        tree.insert(k as f64, i as u32);
        reference.push(k as f64);
    }
    reference.sort_by(f64::total_cmp);
    (tree, reference)
}

proptest! {
    #[test]
    fn inserts_keep_invariants_and_order(keys in keys()) {
        let (tree, reference) = build(&keys);
        tree.verify();
        prop_assert_eq!(tree.len(), reference.len());
        let iterated: Vec<f64> = tree.iter().map(|(k, _)| k).collect();
        prop_assert_eq!(iterated, reference);
    }

    #[test]
    fn bound_queries_match_reference(keys in keys(), probes in vec(0u32..210, 1..20)) {
        let (tree, reference) = build(&keys);
        for probe in probes {
            let key = probe as f64;
            let lb = reference.partition_point(|&k| k < key);
            let ub = reference.partition_point(|&k| k <= key);
            prop_assert_eq!(tree.rank_of_lower_bound(key).0, lb);
            prop_assert_eq!(tree.rank_of_upper_bound(key).0, ub);
            prop_assert_eq!(tree.count(key), ub - lb);
        }
    }

    #[test]
    fn find_rank_matches_sorted_order(keys in keys()) {
        let (tree, reference) = build(&keys);
        for (r, &expected) in reference.iter().enumerate() {
            prop_assert_eq!(tree.key_at(tree.find_rank(r)), expected);
        }
        prop_assert_eq!(tree.find_rank(reference.len()), tree.end());
    }

    #[test]
    fn split_at_key_round_trip(keys in keys(), split in 0u32..220) {
        let (tree, _) = build(&keys);
        let size = tree.len();
        let split_key = split as f64;

        let (left, right) = tree.clone().split_at_key(split_key);
        left.verify();
        right.verify();
        prop_assert_eq!(left.len() + right.len(), size);
        prop_assert!(left.iter().all(|(k, _)| k <= split_key));
        prop_assert!(right.iter().all(|(k, _)| k > split_key));

        let mut joined = left;
        joined.join(right);
        joined.verify();
        prop_assert_eq!(&joined, &tree);
    }

    #[test]
    fn split_at_rank_round_trip(keys in keys(), rank_seed in any::<u32>()) {
        let (tree, _) = build(&keys);
        let size = tree.len();
        let m = if size == 0 { 0 } else { rank_seed as usize % (size + 1) };

        let (left, right) = tree.clone().split_at_rank(m);
        left.verify();
        right.verify();
        prop_assert_eq!(left.len(), m);
        prop_assert_eq!(right.len(), size - m);
        if let (Some(lmax), Some(rmin)) = (left.last_key(), right.first_key()) {
            prop_assert!(lmax <= rmin);
        }

        let mut joined = left;
        joined.join(right);
        joined.verify();
        // Moving boundary duplicates may permute payloads among equal keys.
        let mut a: Vec<(u64, u32)> = joined.iter().map(|(k, v)| (k.to_bits(), v)).collect();
        let mut b: Vec<(u64, u32)> = tree.iter().map(|(k, v)| (k.to_bits(), v)).collect();
        a.sort_unstable();
        b.sort_unstable();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn bulk_load_equals_incremental(keys in keys()) {
        let mut sorted = keys;
        sorted.sort_unstable();
        let items: Vec<(f64, u32)> = sorted.iter().map(|&k| (k as f64, k)).collect();

        let bulk: Tree = OrderStatTree::bulk_load(items.clone());
        bulk.verify();
        let mut incremental = Tree::new();
        for &(k, v) in &items {
            incremental.insert(k, v);
        }
        prop_assert_eq!(bulk.len(), incremental.len());
        let a: Vec<f64> = bulk.iter().map(|(k, _)| k).collect();
        let b: Vec<f64> = incremental.iter().map(|(k, _)| k).collect();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn interleaved_insert_remove_matches_reference(
        ops in vec((any::<bool>(), 0u32..100, any::<u32>()), 0..400)
    ) {
        let mut tree = Tree::new();
        let mut reference: Vec<f64> = Vec::new();

        for (is_remove, key, rank_seed) in ops {
            if is_remove && !reference.is_empty() {
                let rank = rank_seed as usize % reference.len();
                let expected = reference.remove(rank);
                let (removed, _) = tree.remove_rank(rank);
                prop_assert_eq!(removed, expected);
            } else {
                let key = key as f64;
                tree.insert(key, 0);
                let pos = reference.partition_point(|&k| k <= key);
                reference.insert(pos, key);
            }
        }

        tree.verify();
        prop_assert_eq!(tree.len(), reference.len());
        let iterated: Vec<f64> = tree.iter().map(|(k, _)| k).collect();
        prop_assert_eq!(iterated, reference);
    }
}
