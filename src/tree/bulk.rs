//! Linear-time construction from a sorted sequence.

use super::node::{InnerNode, LeafNode, NodeRef, NIL};
use super::OrderStatTree;

impl<V: Copy + Default, const B: usize> OrderStatTree<V, B> {
    /// Build a tree from a non-decreasing key sequence in O(n): leaves are
    /// filled evenly and linked, then the inner levels are built bottom-up
    /// with balanced fan-out.
    pub fn bulk_load<I: IntoIterator<Item = (f64, V)>>(items: I) -> Self {
        let items: Vec<(f64, V)> = items.into_iter().collect();
        debug_assert!(
            items.windows(2).all(|w| w[0].0.total_cmp(&w[1].0).is_le()),
            "bulk_load input must be sorted"
        );

        let mut tree = Self::new();
        let n = items.len();
        if n == 0 {
            return tree;
        }

        let mut pool = tree.pool.borrow_mut();

        // Leaves: ⌈n/B⌉ of them, sizes as even as possible.
        let num_leaves = n.div_ceil(B);
        let base = n / num_leaves;
        let extra = n % num_leaves;
        // (node, max key) per built node of the current level.
        let mut level: Vec<(NodeRef, f64)> = Vec::with_capacity(num_leaves);
        let mut pos = 0;
        let mut prev = NIL;
        for i in 0..num_leaves {
            let take = base + usize::from(i < extra);
            let mut leaf = LeafNode::new();
            for (slot, &(k, v)) in items[pos..pos + take].iter().enumerate() {
                leaf.keys[slot] = k;
                leaf.vals[slot] = v;
            }
            leaf.slotuse = take as u16;
            leaf.prev = prev;
            let id = pool.leaves.alloc(leaf);
            if prev != NIL {
                pool.leaf_mut(prev).next = id;
            } else {
                tree.head = id;
            }
            prev = id;
            pos += take;
            level.push((NodeRef::Leaf(id), pool.leaf(id).max_key()));
        }
        tree.tail = prev;

        // Inner levels, bottom-up with balanced fan-out.
        let mut height = 1;
        while level.len() > 1 {
            let m = level.len();
            let num_parents = m.div_ceil(B);
            let base = m / num_parents;
            let extra = m % num_parents;
            let mut parents = Vec::with_capacity(num_parents);
            let mut pos = 0;
            for i in 0..num_parents {
                let take = base + usize::from(i < extra);
                let group = &level[pos..pos + take];
                let mut inner = InnerNode::new(height);
                let mut size = 0;
                for (slot, &(child, max)) in group.iter().enumerate() {
                    inner.children[slot] = child;
                    if slot + 1 < take {
                        inner.keys[slot] = max;
                    }
                    size += pool.subtree_size(child);
                }
                inner.slotuse = (take - 1) as u16;
                inner.subtree_size = size;
                let id = pool.inners.alloc(inner);
                parents.push((NodeRef::Inner(id), group[take - 1].1));
                pos += take;
            }
            level = parents;
            height += 1;
        }

        tree.root = Some(level[0].0);
        drop(pool);
        tree
    }
}
