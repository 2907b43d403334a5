//! Structural verification, used by tests and the opt-in self-verify mode.

use super::node::{inner_min, leaf_min, NodeId, NodeRef, Pool, NIL};
use super::OrderStatTree;

impl<V: Copy + Default, const B: usize> OrderStatTree<V, B> {
    /// Recompute subtree sizes from the leaves up and check every structural
    /// invariant: key ordering, occupancy bounds, separator correctness,
    /// level consistency and the leaf chain.  Panics on any violation.
    pub fn verify(&self) {
        let pool = self.pool.borrow();
        let Some(root) = self.root else {
            assert_eq!(self.head, NIL, "empty tree with a head leaf");
            assert_eq!(self.tail, NIL, "empty tree with a tail leaf");
            return;
        };

        let stats = verify_node(&pool, root, true);
        assert_eq!(
            stats.size,
            pool.subtree_size(root),
            "root size cache disagrees with recomputation"
        );

        // The leaf chain must enumerate exactly the in-order leaves.
        let mut in_order = Vec::new();
        collect_leaves(&pool, root, &mut in_order);
        assert_eq!(self.head, in_order[0], "head leaf mismatch");
        assert_eq!(self.tail, *in_order.last().unwrap(), "tail leaf mismatch");
        assert_eq!(pool.leaf(self.head).prev, NIL, "head has a predecessor");
        assert_eq!(pool.leaf(self.tail).next, NIL, "tail has a successor");

        let mut chain = Vec::new();
        let mut id = self.head;
        while id != NIL {
            chain.push(id);
            let leaf = pool.leaf(id);
            if leaf.next != NIL {
                assert_eq!(pool.leaf(leaf.next).prev, id, "broken chain back-link");
                assert!(
                    leaf.max_key().total_cmp(&pool.leaf(leaf.next).keys[0]).is_le(),
                    "leaf chain keys out of order"
                );
            }
            id = leaf.next;
        }
        assert_eq!(chain, in_order, "leaf chain disagrees with tree order");
    }
}

struct SubtreeStats {
    size: u64,
    min: f64,
    max: f64,
    level: u16,
}

fn verify_node<V: Copy + Default, const B: usize>(
    pool: &Pool<V, B>,
    node: NodeRef,
    is_root: bool,
) -> SubtreeStats {
    match node {
        NodeRef::Leaf(id) => {
            let leaf = pool.leaf(id);
            let len = leaf.len();
            assert!(len >= 1, "empty leaf on tree path");
            assert!(
                is_root || len >= leaf_min(B),
                "leaf {id} underfull: {len} < {}",
                leaf_min(B)
            );
            assert!(len <= B, "leaf {id} overfull");
            for w in leaf.keys[..len].windows(2) {
                assert!(w[0].total_cmp(&w[1]).is_le(), "leaf keys out of order");
            }
            SubtreeStats {
                size: len as u64,
                min: leaf.keys[0],
                max: leaf.keys[len - 1],
                level: 0,
            }
        }
        NodeRef::Inner(id) => {
            let inner = pool.inner(id);
            let len = inner.len();
            assert!(len >= 1, "inner node {id} without separators");
            assert!(
                is_root || len >= inner_min(B),
                "inner {id} underfull: {len} < {}",
                inner_min(B)
            );
            assert!(len <= B - 1, "inner {id} overfull");
            for w in inner.keys[..len].windows(2) {
                assert!(w[0].total_cmp(&w[1]).is_le(), "separators out of order");
            }

            let mut size = 0;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for slot in 0..=len {
                let child = verify_node(pool, inner.children[slot], false);
                assert_eq!(
                    child.level,
                    inner.level - 1,
                    "child level skips a level under inner {id}"
                );
                if slot == 0 {
                    min = child.min;
                } else {
                    assert!(
                        inner.keys[slot - 1].total_cmp(&child.min).is_le(),
                        "separator exceeds right child's minimum"
                    );
                }
                if slot < len {
                    assert!(
                        inner.keys[slot].total_cmp(&child.max).is_eq(),
                        "separator {} is not the max of child {slot} ({})",
                        inner.keys[slot],
                        child.max
                    );
                }
                max = child.max;
                size += child.size;
            }
            assert_eq!(
                size, inner.subtree_size,
                "cached subtree size of inner {id} is stale"
            );
            SubtreeStats {
                size,
                min,
                max,
                level: inner.level,
            }
        }
    }
}

fn collect_leaves<V: Copy + Default, const B: usize>(
    pool: &Pool<V, B>,
    node: NodeRef,
    out: &mut Vec<NodeId>,
) {
    match node {
        NodeRef::Leaf(id) => out.push(id),
        NodeRef::Inner(id) => {
            for slot in 0..=pool.inner(id).len() {
                collect_leaves(pool, pool.inner(id).children[slot], out);
            }
        }
    }
}
