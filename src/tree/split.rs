//! Splitting a tree into two trees, by key or by rank.

use super::join::join_refs;
use super::node::{upper_slot, InnerNode, LeafNode, NodeRef, Pool, NIL};
use super::OrderStatTree;

impl<V: Copy + Default, const B: usize> OrderStatTree<V, B> {
    /// Partition into `(left, right)` with `left = {x : x <= key}` and
    /// `right = {x : x > key}`.  Consumes the tree; both results share its
    /// node pool.
    pub fn split_at_key(mut self, key: f64) -> (Self, Self) {
        let mut left = self.empty_like();
        let mut right = self.empty_like();
        let Some(root) = self.root.take() else {
            return (left, right);
        };
        self.head = NIL;
        self.tail = NIL;

        {
            let mut pool = self.pool.borrow_mut();
            let (lroot, rroot) = split_rec(&mut pool, root, key);
            left.root = lroot;
            right.root = rroot;
            if let Some(r) = lroot {
                left.head = pool.leftmost_leaf(r);
                left.tail = pool.rightmost_leaf(r);
            }
            if let Some(r) = rroot {
                right.head = pool.leftmost_leaf(r);
                right.tail = pool.rightmost_leaf(r);
            }
        }

        if self.self_verify {
            left.verify();
            right.verify();
        }
        (left, right)
    }

    /// Partition into `(left, right)` with `left.len() == m`.  With duplicate
    /// keys across the boundary, `left` receives the `m` leftmost entries.
    /// Consumes the tree; both results share its node pool.
    pub fn split_at_rank(self, m: usize) -> (Self, Self) {
        debug_assert!(m <= self.len(), "split_at_rank({m}) out of range");
        if m == 0 {
            let left = self.empty_like();
            return (left, self);
        }
        if m >= self.len() {
            let right = self.empty_like();
            return (self, right);
        }

        let boundary = self.key_at(self.find_rank(m - 1));
        let (mut left, mut right) = self.split_at_key(boundary);

        // All duplicates of the boundary key landed left; move the surplus
        // back one element at a time (almost always zero with double keys).
        while left.len() > m {
            let (k, v) = left.pop_last().expect("left oversized");
            right.insert(k, v);
        }
        debug_assert_eq!(left.len(), m);
        (left, right)
    }
}

/// Recursive split along the path containing `key` (chosen by upper bound).
/// Returns the roots of the left and right halves; the leaf chain is broken
/// at the boundary.
fn split_rec<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    node: NodeRef,
    key: f64,
) -> (Option<NodeRef>, Option<NodeRef>) {
    match node {
        NodeRef::Leaf(id) => split_leaf(pool, id, key),
        NodeRef::Inner(id) => {
            let inner = *pool.inner(id);
            let len = inner.len();
            let slot = upper_slot(&inner.keys[..len], key);
            let path_child = inner.children[slot];

            // Children strictly before the path slot form the left fragment,
            // children strictly after it the right one.  A fragment holding a
            // single child collapses to that child.
            let new_left = match slot {
                0 => None,
                1 => Some(inner.children[0]),
                _ => {
                    let mut n = InnerNode::new(inner.level);
                    n.keys[..slot - 1].copy_from_slice(&inner.keys[..slot - 1]);
                    n.children[..slot].copy_from_slice(&inner.children[..slot]);
                    n.slotuse = (slot - 1) as u16;
                    let nid = pool.inners.alloc(n);
                    super::recompute_size(pool, nid);
                    Some(NodeRef::Inner(nid))
                }
            };
            let new_right = if slot == len {
                None
            } else if slot == len - 1 {
                Some(inner.children[len])
            } else {
                let mut n = InnerNode::new(inner.level);
                let nkeys = len - slot - 1;
                n.keys[..nkeys].copy_from_slice(&inner.keys[slot + 1..len]);
                n.children[..=nkeys].copy_from_slice(&inner.children[slot + 1..=len]);
                n.slotuse = nkeys as u16;
                let nid = pool.inners.alloc(n);
                super::recompute_size(pool, nid);
                Some(NodeRef::Inner(nid))
            };
            pool.inners.dealloc(id);

            let (bottom_left, bottom_right) = split_rec(pool, path_child, key);
            let left = join_refs(pool, new_left, bottom_left);
            let right = join_refs(pool, bottom_right, new_right);
            (left, right)
        }
    }
}

fn split_leaf<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    id: super::node::NodeId,
    key: f64,
) -> (Option<NodeRef>, Option<NodeRef>) {
    let leaf = *pool.leaf(id);
    let len = leaf.len();
    let slot = upper_slot(&leaf.keys[..len], key);

    if slot == 0 {
        // Everything goes right; break the chain before this leaf.
        if leaf.prev != NIL {
            pool.leaf_mut(leaf.prev).next = NIL;
        }
        pool.leaf_mut(id).prev = NIL;
        (None, Some(NodeRef::Leaf(id)))
    } else if slot == len {
        // Everything goes left; break the chain after this leaf.
        if leaf.next != NIL {
            pool.leaf_mut(leaf.next).prev = NIL;
        }
        pool.leaf_mut(id).next = NIL;
        (Some(NodeRef::Leaf(id)), None)
    } else {
        let mut right = LeafNode::new();
        right.keys[..len - slot].copy_from_slice(&leaf.keys[slot..len]);
        right.vals[..len - slot].copy_from_slice(&leaf.vals[slot..len]);
        right.slotuse = (len - slot) as u16;
        right.prev = NIL;
        right.next = leaf.next;
        let right_id = pool.leaves.alloc(right);
        if leaf.next != NIL {
            pool.leaf_mut(leaf.next).prev = right_id;
        }

        let left = pool.leaf_mut(id);
        left.slotuse = slot as u16;
        left.next = NIL;
        (Some(NodeRef::Leaf(id)), Some(NodeRef::Leaf(right_id)))
    }
}
