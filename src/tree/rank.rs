//! Rank queries over the cached subtree sizes.

use super::cursor::Cursor;
use super::node::{lower_slot, upper_slot, NodeRef};
use super::OrderStatTree;

impl<V: Copy + Default, const B: usize> OrderStatTree<V, B> {
    /// Cursor to the entry of rank `rank` (0-based); `end()` when
    /// `rank == len()`.
    pub fn find_rank(&self, rank: usize) -> Cursor {
        debug_assert!(rank <= self.len(), "find_rank({rank}) out of range");
        if rank >= self.len() {
            return self.end();
        }

        let pool = self.pool.borrow();
        let mut node = self.root.expect("non-empty tree");
        let mut r = rank as u64;
        loop {
            match node {
                NodeRef::Inner(id) => {
                    let inner = pool.inner(id);
                    let mut slot = 0;
                    loop {
                        let size = pool.subtree_size(inner.children[slot]);
                        if r < size {
                            break;
                        }
                        r -= size;
                        slot += 1;
                    }
                    node = inner.children[slot];
                }
                NodeRef::Leaf(id) => {
                    debug_assert!((r as usize) < pool.leaf(id).len());
                    return Cursor {
                        leaf: id,
                        slot: r as u16,
                    };
                }
            }
        }
    }

    /// Rank of the first entry with key `>= key` (i.e. the number of entries
    /// strictly smaller), plus a cursor to it (`end()` when none).
    pub fn rank_of_lower_bound(&self, key: f64) -> (usize, Cursor) {
        self.rank_of_bound(key, false)
    }

    /// Rank of the first entry with key `> key` (i.e. the number of entries
    /// less than or equal), plus a cursor to it (`end()` when none).
    pub fn rank_of_upper_bound(&self, key: f64) -> (usize, Cursor) {
        self.rank_of_bound(key, true)
    }

    fn rank_of_bound(&self, key: f64, upper: bool) -> (usize, Cursor) {
        let Some(root) = self.root else {
            return (0, Cursor::EMPTY);
        };

        let pool = self.pool.borrow();
        let mut rank: u64 = 0;
        let mut node = root;
        loop {
            match node {
                NodeRef::Inner(id) => {
                    let inner = pool.inner(id);
                    let keys = &inner.keys[..inner.len()];
                    let slot = if upper {
                        upper_slot(keys, key)
                    } else {
                        lower_slot(keys, key)
                    };
                    for child in &inner.children[..slot] {
                        rank += pool.subtree_size(*child);
                    }
                    node = inner.children[slot];
                }
                NodeRef::Leaf(id) => {
                    let leaf = pool.leaf(id);
                    let keys = &leaf.keys[..leaf.len()];
                    let slot = if upper {
                        upper_slot(keys, key)
                    } else {
                        lower_slot(keys, key)
                    };
                    rank += slot as u64;
                    drop(pool);
                    return (rank as usize, self.cursor_at(id, slot));
                }
            }
        }
    }
}
