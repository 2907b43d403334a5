//! Distributed approximate multi-selection.
//!
//! Given one [`OrderStatTree`] per worker and a target rank range
//! `[k_min, k_max]`, a selector locates on every worker a prefix boundary
//! such that the union of the per-worker prefixes is exactly the set of the
//! globally smallest keys, with the total prefix count inside the target
//! range (exactly `k_min` when a tie has to be broken).  No element data
//! moves between workers; the protocol works purely on ranks and pivot keys.
//!
//! Two variants:
//!
//! * [`AmsSelect`] — one randomized pivot per round (Floyd-Rivest/AMS style).
//! * [`AmsSelectMulti`] — `D` pivots per round, evaluated with a single
//!   packed reduction; the principal variant (`D` of 8 to 64 measured).
//!
//! Global order between equal keys is induced by (key, worker rank, local
//! position); the tie at the boundary is resolved with one inclusive scan.

mod helpers;
mod multi;
mod single;

pub use multi::AmsSelectMulti;
pub use single::AmsSelect;

use crate::stats::SelectStats;
use crate::tree::{Cursor, OrderStatTree};
use crate::Error;

/// A per-worker selection result: the prefix `[begin, cursor)` of the local
/// tree holds exactly `count` elements, and the union of these prefixes
/// across all workers is the answer.
#[derive(Clone, Copy, Debug)]
pub struct Splitter {
    pub cursor: Cursor,
    pub count: usize,
}

/// A distributed selector over per-worker trees.
///
/// `select` is a collective: every worker of the group must call it with the
/// same `kmin`/`kmax` in the same batch, and all workers return together.
pub trait Selector {
    fn name(&self) -> String;

    /// Locate the splitter for the `[kmin, kmax]` smallest keys globally.
    ///
    /// Precondition: `kmin <= kmax` and `kmin` is at most the global element
    /// count.  `kmax == 0` yields an empty splitter on every worker.
    fn select<V: Copy + Default, const B: usize>(
        &mut self,
        tree: &OrderStatTree<V, B>,
        kmin: usize,
        kmax: usize,
    ) -> Result<Splitter, Error>;

    fn stats(&self) -> &SelectStats;
}
