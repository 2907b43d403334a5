//! Single-pivot randomized selection (the `D = 1` restriction of the
//! multi-pivot protocol, kept separate as the baseline variant).

use super::helpers::{
    geometric_param, local_bounds, resolve_ties, select_minimum, NO_PIVOT_MAX, NO_PIVOT_MIN,
};
use super::{Selector, Splitter};
use crate::comm::Communicator;
use crate::stats::SelectStats;
use crate::tree::OrderStatTree;
use crate::Error;
use log::{debug, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Geometric};
use std::time::Instant;

/// Single-pivot distributed selection.
///
/// The RNG must be seeded identically on every worker of the group so that
/// the per-round geometric draws agree.
pub struct AmsSelect {
    comm: Communicator,
    rng: ChaCha8Rng,
    stats: SelectStats,
}

impl AmsSelect {
    pub fn new(comm: Communicator, seed: u64) -> Self {
        Self {
            comm,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stats: SelectStats::default(),
        }
    }
}

impl Selector for AmsSelect {
    fn name(&self) -> String {
        "ams".to_string()
    }

    fn stats(&self) -> &SelectStats {
        &self.stats
    }

    fn select<V: Copy + Default, const B: usize>(
        &mut self,
        tree: &OrderStatTree<V, B>,
        kmin: usize,
        kmax: usize,
    ) -> Result<Splitter, Error> {
        let start = Instant::now();
        if kmin > kmax || kmax == 0 {
            return Ok(Splitter {
                cursor: tree.begin(),
                count: 0,
            });
        }

        let mut global_size = self.comm.all_reduce_sum(tree.len() as i64)?;
        debug_assert!(kmin as i64 <= global_size, "cannot select {kmin} of {global_size}");
        debug!(
            "[ams] selecting {kmin}..={kmax} of {global_size} over {} workers",
            self.comm.num_workers()
        );

        let mut kmin = kmin as i64;
        let mut kmax = kmax as i64;
        let mut min_idx: i64 = 0;
        let mut max_idx: i64 = tree.len() as i64;

        loop {
            self.stats.next_level();
            let local_size = max_idx - min_idx;
            trace!(
                "[ams] kmin {kmin} kmax {kmax} global {global_size} live {min_idx}..{max_idx}"
            );

            if kmin == 1 || kmax == 1 {
                let result =
                    select_minimum(&self.comm, tree, min_idx, max_idx, &mut self.stats)?;
                self.stats.finish(start);
                return Ok(result);
            }

            // Draw one pivot, biased toward the end of the range the target
            // is closer to, and agree on it with a min/max reduction.
            let case_small = kmin < global_size - kmax;
            let pivot = if case_small {
                self.stats.kcase.add(0.0);
                let p = geometric_param((kmin - 1) as f64 / kmax as f64, kmax - kmin + 1);
                let idx = Geometric::new(p).expect("valid probability").sample(&mut self.rng)
                    as i64;
                let local = if idx < local_size {
                    tree.key_at(tree.find_rank((min_idx + idx) as usize))
                } else {
                    self.stats.pidx_oob += 1;
                    NO_PIVOT_MIN
                };
                self.comm.all_reduce_min(local)?
            } else {
                self.stats.kcase.add(1.0);
                let p = geometric_param(
                    (global_size - kmax) as f64 / (global_size - kmin + 1) as f64,
                    kmax - kmin + 1,
                );
                let idx = Geometric::new(p).expect("valid probability").sample(&mut self.rng)
                    as i64;
                let local = if idx < local_size {
                    tree.key_at(tree.find_rank((max_idx - idx - 1) as usize))
                } else {
                    self.stats.pidx_oob += 1;
                    NO_PIVOT_MAX
                };
                self.comm.all_reduce_max(local)?
            };
            trace!("[ams] pivot {pivot}");

            let min_cursor = tree.find_rank(min_idx as usize);
            let max_cursor = tree.find_rank(max_idx as usize);
            let bound = local_bounds(
                tree, pivot, min_idx, max_idx, min_cursor, max_cursor, &mut self.stats,
            );
            let sums = self
                .comm
                .all_reduce_vec_sum(vec![bound.ub_pos, bound.lb_pos])?;
            let (global_ub, global_lb) = (sums[0], sums[1]);
            trace!(
                "[ams] {global_lb} below, {global_ub} at or below pivot of {global_size}"
            );

            if global_ub < kmin {
                // Everything at or below the pivot is in the result; recurse
                // on the elements above it.
                if global_ub == 0 {
                    self.stats.size_unchanged += 1;
                } else if global_ub * 50 <= global_size || global_ub <= 5 {
                    self.stats.tinychange += 1;
                }
                kmin -= global_ub;
                kmax -= global_ub;
                min_idx += bound.ub_pos;
                global_size -= global_ub;
            } else if global_lb > kmax {
                // Recurse on the elements below the pivot.
                if global_lb == global_size {
                    self.stats.size_unchanged += 1;
                } else if (global_size - global_lb) * 50 <= global_size
                    || global_size - global_lb <= 5
                {
                    self.stats.tinychange += 1;
                }
                max_idx = min_idx + bound.lb_pos;
                global_size = global_lb;
            } else {
                let result = resolve_ties(
                    &self.comm,
                    tree,
                    &bound,
                    min_idx,
                    global_ub,
                    global_lb,
                    kmin - global_lb,
                )?;
                self.stats.finish(start);
                return Ok(result);
            }
        }
    }
}
