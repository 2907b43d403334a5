//! Joining trees with disjoint, ordered key ranges.
//!
//! The same-level combine routines either merge two sibling nodes into one
//! (when capacity permits) or redistribute their slots to lift both above
//! minimum occupancy; they are shared with the erase rebalancing path.  When
//! the trees differ in height, the shorter one is attached along the taller
//! one's boundary path, propagating subtree-size increments on the way down
//! and node splits on the way back up.

use super::node::{inner_max, inner_min, leaf_min, NodeId, NodeRef, Pool, NIL};
use super::{copy_subtree, insert_separator_child, recompute_size, OrderStatTree};
use std::rc::Rc;

/// Outcome of combining two same-level sibling nodes.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Combined {
    /// The right node was absorbed into the left and freed.
    Merged,
    /// Both nodes remain; `sep` is the new separator between them.
    Two { sep: f64 },
}

/// Merge or redistribute two adjacent leaves (`l` directly precedes `r`).
pub(crate) fn combine_leaves<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    l: NodeId,
    r: NodeId,
) -> Combined {
    debug_assert_eq!(pool.leaf(l).next, r);
    debug_assert_eq!(pool.leaf(r).prev, l);
    let (llen, rlen) = (pool.leaf(l).len(), pool.leaf(r).len());

    if llen + rlen <= B {
        let right = *pool.leaf(r);
        let leaf = pool.leaf_mut(l);
        leaf.keys[llen..llen + rlen].copy_from_slice(&right.keys[..rlen]);
        leaf.vals[llen..llen + rlen].copy_from_slice(&right.vals[..rlen]);
        leaf.slotuse = (llen + rlen) as u16;
        leaf.next = right.next;
        if right.next != NIL {
            pool.leaf_mut(right.next).prev = l;
        }
        pool.leaves.dealloc(r);
        return Combined::Merged;
    }

    if llen < leaf_min(B) || rlen < leaf_min(B) {
        let (left, right) = (*pool.leaf(l), *pool.leaf(r));
        let mut entries: Vec<(f64, V)> = Vec::with_capacity(llen + rlen);
        entries.extend(left.keys[..llen].iter().copied().zip(left.vals[..llen].iter().copied()));
        entries.extend(right.keys[..rlen].iter().copied().zip(right.vals[..rlen].iter().copied()));

        let a = entries.len() / 2;
        let leaf = pool.leaf_mut(l);
        for (i, &(k, v)) in entries[..a].iter().enumerate() {
            leaf.keys[i] = k;
            leaf.vals[i] = v;
        }
        leaf.slotuse = a as u16;
        let leaf = pool.leaf_mut(r);
        for (i, &(k, v)) in entries[a..].iter().enumerate() {
            leaf.keys[i] = k;
            leaf.vals[i] = v;
        }
        leaf.slotuse = (entries.len() - a) as u16;
    }

    Combined::Two {
        sep: pool.leaf(l).max_key(),
    }
}

/// Merge or redistribute two adjacent same-level inner nodes, where `sep`
/// separates their key ranges (the maximum key under `l`).
pub(crate) fn combine_inners<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    l: NodeId,
    r: NodeId,
    sep: f64,
) -> Combined {
    debug_assert_eq!(pool.inner(l).level, pool.inner(r).level);
    let (llen, rlen) = (pool.inner(l).len(), pool.inner(r).len());

    if llen + rlen + 1 <= inner_max(B) {
        let right = *pool.inner(r);
        let inner = pool.inner_mut(l);
        inner.keys[llen] = sep;
        inner.keys[llen + 1..llen + 1 + rlen].copy_from_slice(&right.keys[..rlen]);
        inner.children[llen + 1..llen + 2 + rlen].copy_from_slice(&right.children[..=rlen]);
        inner.slotuse = (llen + rlen + 1) as u16;
        inner.subtree_size += right.subtree_size;
        pool.inners.dealloc(r);
        return Combined::Merged;
    }

    if llen < inner_min(B) || rlen < inner_min(B) {
        let (left, right) = (*pool.inner(l), *pool.inner(r));
        let mut keys: Vec<f64> = Vec::with_capacity(llen + rlen + 1);
        keys.extend_from_slice(&left.keys[..llen]);
        keys.push(sep);
        keys.extend_from_slice(&right.keys[..rlen]);
        let mut children: Vec<NodeRef> = Vec::with_capacity(llen + rlen + 2);
        children.extend_from_slice(&left.children[..=llen]);
        children.extend_from_slice(&right.children[..=rlen]);

        let h = keys.len() / 2;
        let inner = pool.inner_mut(l);
        inner.keys[..h].copy_from_slice(&keys[..h]);
        inner.children[..=h].copy_from_slice(&children[..=h]);
        inner.slotuse = h as u16;
        let rkeys = keys.len() - h - 1;
        let inner = pool.inner_mut(r);
        inner.keys[..rkeys].copy_from_slice(&keys[h + 1..]);
        inner.children[..=rkeys].copy_from_slice(&children[h + 1..]);
        inner.slotuse = rkeys as u16;
        recompute_size(pool, l);
        recompute_size(pool, r);
        return Combined::Two { sep: keys[h] };
    }

    Combined::Two { sep }
}

/// Join two subtrees whose key ranges are disjoint and ordered (left < right)
/// and whose boundary leaves are already chained.  Returns the joined root.
pub(crate) fn join_refs<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    left: Option<NodeRef>,
    right: Option<NodeRef>,
) -> Option<NodeRef> {
    let (l, r) = match (left, right) {
        (None, r) => return r,
        (l, None) => return l,
        (Some(l), Some(r)) => (l, r),
    };

    let (llevel, rlevel) = (pool.level(l), pool.level(r));
    if llevel == rlevel {
        return Some(join_same_level(pool, l, r));
    }

    if llevel > rlevel {
        let rsize = pool.subtree_size(r);
        let NodeRef::Inner(id) = l else {
            unreachable!("taller tree must have an inner root");
        };
        match attach_right(pool, id, r, rlevel, rsize) {
            None => Some(l),
            Some((sep, node)) => Some(new_parent(pool, l, sep, node)),
        }
    } else {
        let lsize = pool.subtree_size(l);
        let NodeRef::Inner(id) = r else {
            unreachable!("taller tree must have an inner root");
        };
        match attach_left(pool, id, l, llevel, lsize) {
            None => Some(r),
            Some((sep, node)) => Some(new_parent(pool, r, sep, node)),
        }
    }
}

fn join_same_level<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    l: NodeRef,
    r: NodeRef,
) -> NodeRef {
    let combined = match (l, r) {
        (NodeRef::Leaf(a), NodeRef::Leaf(b)) => combine_leaves(pool, a, b),
        (NodeRef::Inner(a), NodeRef::Inner(b)) => {
            let sep = pool.subtree_max(l);
            combine_inners(pool, a, b, sep)
        }
        _ => unreachable!("levels match"),
    };
    match combined {
        Combined::Merged => l,
        Combined::Two { sep } => new_parent(pool, l, sep, r),
    }
}

/// Allocate a fresh root over two same-level subtrees.
fn new_parent<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    left: NodeRef,
    sep: f64,
    right: NodeRef,
) -> NodeRef {
    debug_assert_eq!(pool.level(left), pool.level(right));
    let mut root = super::node::InnerNode::new(pool.level(left) + 1);
    root.keys[0] = sep;
    root.children[0] = left;
    root.children[1] = right;
    root.slotuse = 1;
    root.subtree_size = pool.subtree_size(left) + pool.subtree_size(right);
    NodeRef::Inner(pool.inners.alloc(root))
}

/// Attach `right` (whose keys all exceed this subtree's) below `node` along
/// the rightmost path.  Returns a split propagation, as insertion does.
fn attach_right<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    node: NodeId,
    right: NodeRef,
    right_level: u16,
    right_size: u64,
) -> Option<(f64, NodeRef)> {
    pool.inner_mut(node).subtree_size += right_size;
    let len = pool.inner(node).len();
    let last = pool.inner(node).children[len];

    if pool.inner(node).level > right_level + 1 {
        let NodeRef::Inner(child) = last else {
            unreachable!("levels decrease by one per step");
        };
        match attach_right(pool, child, right, right_level, right_size) {
            None => None,
            Some((sep, newnode)) => {
                insert_separator_child(pool, node, len, sep, len + 1, newnode)
            }
        }
    } else {
        let combined = match (last, right) {
            (NodeRef::Leaf(a), NodeRef::Leaf(b)) => combine_leaves(pool, a, b),
            (NodeRef::Inner(a), NodeRef::Inner(b)) => {
                let sep = pool.subtree_max(last);
                combine_inners(pool, a, b, sep)
            }
            _ => unreachable!("levels match"),
        };
        match combined {
            Combined::Merged => None,
            Combined::Two { sep } => {
                insert_separator_child(pool, node, len, sep, len + 1, right)
            }
        }
    }
}

/// Attach `left` (whose keys all precede this subtree's) below `node` along
/// the leftmost path.
fn attach_left<V: Copy + Default, const B: usize>(
    pool: &mut Pool<V, B>,
    node: NodeId,
    left: NodeRef,
    left_level: u16,
    left_size: u64,
) -> Option<(f64, NodeRef)> {
    pool.inner_mut(node).subtree_size += left_size;
    let first = pool.inner(node).children[0];

    if pool.inner(node).level > left_level + 1 {
        let NodeRef::Inner(child) = first else {
            unreachable!("levels decrease by one per step");
        };
        match attach_left(pool, child, left, left_level, left_size) {
            None => None,
            Some((sep, newnode)) => insert_separator_child(pool, node, 0, sep, 1, newnode),
        }
    } else {
        let combined = match (left, first) {
            (NodeRef::Leaf(a), NodeRef::Leaf(b)) => combine_leaves(pool, a, b),
            (NodeRef::Inner(a), NodeRef::Inner(b)) => {
                let sep = pool.subtree_max(left);
                combine_inners(pool, a, b, sep)
            }
            _ => unreachable!("levels match"),
        };
        match combined {
            Combined::Merged => {
                // `first` was absorbed into the attached subtree's root.
                pool.inner_mut(node).children[0] = left;
                None
            }
            Combined::Two { sep } => insert_separator_child(pool, node, 0, sep, 0, left),
        }
    }
}

impl<V: Copy + Default, const B: usize> OrderStatTree<V, B> {
    /// Concatenate `other` onto this tree.
    ///
    /// Precondition: every key in `other` is `>=` every key in this tree.
    /// Consumes `other`; its elements move into this tree.  Trees from a
    /// different node pool are migrated (deep-copied) first.
    pub fn join(&mut self, mut other: Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            if Rc::ptr_eq(&self.pool, &other.pool) {
                self.root = other.root.take();
                self.head = other.head;
                self.tail = other.tail;
                other.head = NIL;
                other.tail = NIL;
                return;
            }
            // Fall through to the migration path with an empty left side.
        }
        debug_assert!(
            self.is_empty()
                || self
                    .last_key()
                    .zip(other.first_key())
                    .map(|(a, b)| a.total_cmp(&b).is_le())
                    .unwrap_or(true),
            "join requires ordered, disjoint key ranges"
        );

        if !Rc::ptr_eq(&self.pool, &other.pool) {
            other = self.adopt(other);
        }

        if self.is_empty() {
            self.root = other.root.take();
            self.head = other.head;
            self.tail = other.tail;
            other.head = NIL;
            other.tail = NIL;
            return;
        }

        {
            let mut pool = self.pool.borrow_mut();
            pool.leaf_mut(self.tail).next = other.head;
            pool.leaf_mut(other.head).prev = self.tail;
            self.root = join_refs(&mut pool, self.root, other.root.take());
        }
        other.head = NIL;
        other.tail = NIL;

        let root = self.root.expect("join of non-empty trees");
        let pool = self.pool.borrow();
        self.head = pool.leftmost_leaf(root);
        self.tail = pool.rightmost_leaf(root);
    }

    /// Deep-copy `other` into this tree's pool, consuming the original.
    fn adopt(&self, other: Self) -> Self {
        let mut adopted = self.empty_like();
        let Some(root) = other.root else {
            return adopted;
        };

        let mut leaves = Vec::new();
        let new_root = {
            let src = other.pool.borrow();
            let mut dst = self.pool.borrow_mut();
            let new_root = copy_subtree(&src, &mut dst, root, &mut leaves);
            for i in 1..leaves.len() {
                dst.leaf_mut(leaves[i - 1]).next = leaves[i];
                dst.leaf_mut(leaves[i]).prev = leaves[i - 1];
            }
            new_root
        };

        adopted.root = Some(new_root);
        adopted.head = leaves[0];
        adopted.tail = *leaves.last().expect("non-empty tree has leaves");
        adopted
    }
}
