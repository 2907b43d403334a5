//! The per-worker reservoir engine.
//!
//! [`Reservoir`] owns one [`OrderStatTree`] holding the worker's candidate
//! sample.  Each batch of (weight, id) items runs through four steps:
//!
//! 1. **Admit locally.** Weights become exponential keys (`Exp(1) / w`, so
//!    the `k` smallest keys form a weight-proportional sample without
//!    replacement).  Once an admission threshold τ is known, whole stretches
//!    of the input are skipped with a single `Exp(τ)` deviate interpreted as
//!    a weight budget, and each admitted item draws a truncated-exponential
//!    key below τ.
//! 2. **Select globally.** The selection protocol locates the rank-`k`
//!    splitter across all workers without moving data.
//! 3. **Trim.** `split_at_rank` discards everything past the splitter.
//! 4. **Update τ.** The new threshold is the max surviving key, max-reduced
//!    over the group.
//!
//! Until the first τ is established, a local threshold λ derived from rank
//! `k` in the local tree bounds per-worker memory.

mod gather;
pub use gather::GatherReservoir;

use crate::comm::Communicator;
use crate::select::{Selector, Splitter};
use crate::stats::OpStats;
use crate::tree::OrderStatTree;
use crate::Error;
use log::{debug, trace};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::mem;
use std::time::Instant;

/// Width of the summed weight windows used by the batched skip.
const SKIP_WINDOW: usize = 32;

/// A distributed weighted reservoir sampler of fixed size `k`.
pub struct Reservoir<V: Copy + Default, S> {
    tree: OrderStatTree<V>,
    selector: S,
    rng: ChaCha8Rng,
    comm: Communicator,
    size: usize,
    threshold: f64,
    batch_id: u64,
    stats: OpStats,
}

impl<V: Copy + Default, S: Selector> Reservoir<V, S> {
    /// Create a reservoir of size `size`.  The engine RNG is seeded
    /// `seed + rank` so workers draw independent streams; the selector is
    /// constructed (and seeded) by the caller.
    pub fn new(comm: Communicator, selector: S, size: usize, seed: u64) -> Self {
        debug_assert!(size > 0, "reservoir size must be positive");
        let rng = ChaCha8Rng::seed_from_u64(seed + comm.rank() as u64);
        Self {
            tree: OrderStatTree::new(),
            selector,
            rng,
            comm,
            size,
            threshold: 0.0,
            batch_id: 0,
            stats: OpStats::new(),
        }
    }

    /// Target sample size `k`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current admission threshold τ; 0 until established.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of candidates currently held by this worker.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn tree(&self) -> &OrderStatTree<V> {
        &self.tree
    }

    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    pub fn select_stats(&self) -> &crate::stats::SelectStats {
        self.selector.stats()
    }

    /// Process one batch of (weight, id) items.  A collective: every worker
    /// must call this once per batch, with its own (possibly empty) input.
    /// Weights must be strictly positive.
    pub fn insert_batch(&mut self, items: &[(f64, V)]) -> Result<(), Error> {
        debug_assert!(items.iter().all(|&(w, _)| w > 0.0), "non-positive weight");
        let t_total = Instant::now();
        let mut t = Instant::now();
        trace!("[res] batch {} beginning", self.batch_id);

        // Step 1: process new items locally.
        let mut pos = 0;
        if self.threshold == 0.0 {
            // Fill without a threshold until the tree is comfortably above k.
            let fill_target = (3 * self.size / 2).max(self.size + 500);
            while pos < items.len() && self.tree.len() < fill_target {
                let (weight, id) = items[pos];
                let key = self.exponential_key(weight);
                self.tree.insert(key, id);
                pos += 1;
            }

            // From here on, maintain a local threshold from rank k and trim
            // whenever the tree grows past the slack bound.
            let trim_bound = (11 * self.size / 10).max(self.size + 250);
            let mut local_threshold = 0.0;
            while pos < items.len() {
                if self.tree.len() >= trim_bound {
                    local_threshold = self.tree.key_at(self.tree.find_rank(self.size));
                    trace!(
                        "[res] local threshold {local_threshold} at tree size {}",
                        self.tree.len()
                    );
                    let (keep, discard) = mem::take(&mut self.tree).split_at_rank(self.size);
                    self.tree = keep;
                    drop(discard);
                }
                debug_assert!(local_threshold > 0.0);
                pos = self.insert_skip(items, pos, local_threshold, false);
            }
        } else {
            let threshold = self.threshold;
            while pos < items.len() {
                pos = self.insert_skip(items, pos, threshold, true);
            }
        }
        self.stats.record("size", self.tree.len() as f64);
        let t_insert = ms(&mut t);
        self.stats.record("insert", t_insert);
        debug!(
            "RESULT op=insert pe={} np={} batchsize={} batch={} samplesize={} time={}",
            self.comm.rank(),
            self.comm.num_workers(),
            items.len(),
            self.batch_id,
            self.size,
            t_insert,
        );

        // Step 2: find the global splitter.  Early batches may hold fewer
        // than k items in total; keep everything in that case.
        let global_size = self.comm.all_reduce_sum(self.tree.len() as i64)?;
        let want = (self.size as i64).min(global_size) as usize;
        let splitter = if want > 0 {
            self.selector.select(&self.tree, want, want)?
        } else {
            Splitter {
                cursor: self.tree.begin(),
                count: 0,
            }
        };
        let t_select = ms(&mut t);
        self.stats.record("select", t_select);
        debug!(
            "RESULT op=select pe={} np={} batchsize={} batch={} samplesize={} time={}",
            self.comm.rank(),
            self.comm.num_workers(),
            items.len(),
            self.batch_id,
            self.size,
            t_select,
        );

        // Step 3: trim to the splitter.
        let (keep, discard) = mem::take(&mut self.tree).split_at_rank(splitter.count);
        self.tree = keep;
        drop(discard);
        let t_split = ms(&mut t);
        self.stats.record("split", t_split);

        // Step 4: the new threshold is the largest surviving key anywhere.
        // While the reservoir is still under-filled, every future item
        // belongs in it, so the threshold stays unset.
        let local_max = self.tree.last_key().unwrap_or(0.0);
        let threshold = self.comm.all_reduce_max(local_max)?;
        self.threshold = if want < self.size { 0.0 } else { threshold };
        trace!("[res] new threshold {}", self.threshold);
        let t_threshold = ms(&mut t);
        self.stats.record("threshold", t_threshold);
        self.stats
            .record("total", t_total.elapsed().as_secs_f64() * 1e3);

        trace!("[res] batch {} done", self.batch_id);
        self.batch_id += 1;
        Ok(())
    }

    /// Visit every (key, id) of the local sample in key order.
    pub fn sample<F: FnMut(f64, V)>(&self, mut callback: F) {
        for (key, id) in self.tree.iter() {
            callback(key, id);
        }
    }

    /// A fresh reservoir key for `weight`: `Exp(1) / weight`, drawn by
    /// inversion from a uniform in (0, 1].  Weights are a caller contract,
    /// checked only by the batch-entry debug assertion.
    fn exponential_key(&mut self, weight: f64) -> f64 {
        let u: f64 = self.rng.gen();
        (-(1.0 - u).ln() / weight).max(f64::MIN_POSITIVE)
    }

    /// Skip-ahead admission: draw one `Exp(threshold)` deviate as a weight
    /// budget, consume input weight until it is exceeded, and admit the item
    /// at that position with a truncated-exponential key below `threshold`.
    /// Returns the position after the admitted item (or the input length).
    fn insert_skip(
        &mut self,
        items: &[(f64, V)],
        pos: usize,
        threshold: f64,
        batched: bool,
    ) -> usize {
        let u: f64 = self.rng.gen();
        let mut skip = -(1.0 - u).ln() / threshold;
        trace!("[res] skip {skip}");
        let mut i = pos;

        if batched {
            // Sum whole windows until the budget overshoots, then back up and
            // scan the window element-wise.
            while i + SKIP_WINDOW <= items.len() {
                let sum: f64 = items[i..i + SKIP_WINDOW].iter().map(|&(w, _)| w).sum();
                if skip < sum {
                    break;
                }
                skip -= sum;
                i += SKIP_WINDOW;
            }
        }

        while i < items.len() {
            let (weight, id) = items[i];
            if skip < weight {
                let key = self.truncated_key(threshold, weight);
                self.tree.insert(key, id);
                return i + 1;
            }
            skip -= weight;
            i += 1;
        }
        items.len()
    }

    /// A key with the conditional distribution of a reservoir key below
    /// `threshold`: draw U uniform in [exp(−τ·w), 1) and return −ln(U)/w.
    fn truncated_key(&mut self, threshold: f64, weight: f64) -> f64 {
        let mut floor = (-threshold * weight).exp();
        if floor >= 1.0 {
            // τ·w rounded to zero; the truncation is vacuous.
            floor = 1.0 - f64::EPSILON;
        }
        let r = self.rng.gen_range(floor..1.0).max(f64::MIN_POSITIVE);
        let key = -r.ln() / weight;
        debug_assert!(key > 0.0);
        key
    }
}

fn ms(t: &mut Instant) -> f64 {
    let elapsed = t.elapsed().as_secs_f64() * 1e3;
    *t = Instant::now();
    elapsed
}
