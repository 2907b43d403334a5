//! Multi-pivot selection: `D` probes per round, one packed reduction.

use super::helpers::{
    geometric_param, local_bounds, resolve_ties, select_minimum, Bound, NO_PIVOT_MAX,
    NO_PIVOT_MIN,
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

/// Multi-pivot distributed selection with `D` probes per round.
///
/// Each worker draws its own pivot candidates (the RNG is seeded per worker;
/// candidates are filtered through a min/max reduction anyway), then all
/// 2·`D` rank bounds are evaluated with a single sum reduction.
pub struct AmsSelectMulti<const D: usize> {
    comm: Communicator,
    rng: ChaCha8Rng,
    stats: SelectStats,
}

enum Round {
    Done(Splitter),
    Refined {
        kmin: i64,
        kmax: i64,
        min_idx: i64,
        max_idx: i64,
        global_size: i64,
    },
}

impl<const D: usize> AmsSelectMulti<D> {
    pub fn new(comm: Communicator, seed: u64) -> Self {
        Self {
            comm,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stats: SelectStats::default(),
        }
    }

    /// Fallback for a round whose refinement made no progress: probe the live
    /// range's boundary key, which either discards at least one element or
    /// terminates through tie resolution.
    #[allow(clippy::too_many_arguments)]
    fn boundary_round<V: Copy + Default, const B: usize>(
        &mut self,
        tree: &OrderStatTree<V, B>,
        case_small: bool,
        kmin: i64,
        kmax: i64,
        min_idx: i64,
        max_idx: i64,
        global_size: i64,
    ) -> Result<Round, Error> {
        let local_size = max_idx - min_idx;
        let pivot = if case_small {
            let local = if local_size > 0 {
                tree.key_at(tree.find_rank(min_idx as usize))
            } else {
                NO_PIVOT_MIN
            };
            self.comm.all_reduce_min(local)?
        } else {
            let local = if local_size > 0 {
                tree.key_at(tree.find_rank(max_idx as usize - 1))
            } else {
                NO_PIVOT_MAX
            };
            self.comm.all_reduce_max(local)?
        };
        trace!("[amm] boundary pivot {pivot}");

        let min_cursor = tree.find_rank(min_idx as usize);
        let max_cursor = tree.find_rank(max_idx as usize);
        let bound = local_bounds(
            tree, pivot, min_idx, max_idx, min_cursor, max_cursor, &mut self.stats,
        );
        let sums = self
            .comm
            .all_reduce_vec_sum(vec![bound.ub_pos, bound.lb_pos])?;
        let (global_ub, global_lb) = (sums[0], sums[1]);

        if global_ub >= kmin && global_lb <= kmax {
            let splitter = resolve_ties(
                &self.comm,
                tree,
                &bound,
                min_idx,
                global_ub,
                global_lb,
                kmin - global_lb,
            )?;
            return Ok(Round::Done(splitter));
        }

        if global_ub < kmin {
            // The boundary key is an actual live element somewhere, so this
            // discards at least one element.
            debug_assert!(global_ub >= 1);
            Ok(Round::Refined {
                kmin: kmin - global_ub,
                kmax: kmax - global_ub,
                min_idx: min_idx + bound.ub_pos,
                max_idx,
                global_size: global_size - global_ub,
            })
        } else {
            debug_assert!(global_lb > kmax && global_lb < global_size);
            Ok(Round::Refined {
                kmin,
                kmax,
                min_idx,
                max_idx: min_idx + bound.lb_pos,
                global_size: global_lb,
            })
        }
    }
}

impl<const D: usize> Selector for AmsSelectMulti<D> {
    fn name(&self) -> String {
        format!("ams-multi-{D}")
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
            "[amm] selecting {kmin}..={kmax} of {global_size} with {D} pivots over {} workers",
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
                "[amm] kmin {kmin} kmax {kmax} global {global_size} live {min_idx}..{max_idx}"
            );

            if kmin == 1 || kmax == 1 {
                let result =
                    select_minimum(&self.comm, tree, min_idx, max_idx, &mut self.stats)?;
                self.stats.finish(start);
                return Ok(result);
            }

            let case_small = kmin < global_size - kmax;
            let mut pivots = vec![0.0f64; D];
            if case_small {
                self.stats.kcase.add(0.0);
                let p = geometric_param((kmin - 1) as f64 / kmax as f64, kmax - kmin + 1);
                let dist = Geometric::new(p).expect("valid probability");
                for pivot in pivots.iter_mut() {
                    let idx = dist.sample(&mut self.rng) as i64;
                    *pivot = if idx < local_size {
                        tree.key_at(tree.find_rank((min_idx + idx) as usize))
                    } else {
                        self.stats.pidx_oob += 1;
                        NO_PIVOT_MIN
                    };
                }
                pivots = self.comm.all_reduce_vec_min(pivots)?;
            } else {
                self.stats.kcase.add(1.0);
                let p = geometric_param(
                    (global_size - kmax) as f64 / (global_size - kmin + 1) as f64,
                    kmax - kmin + 1,
                );
                let dist = Geometric::new(p).expect("valid probability");
                for pivot in pivots.iter_mut() {
                    let idx = dist.sample(&mut self.rng) as i64;
                    *pivot = if idx < local_size {
                        tree.key_at(tree.find_rank((max_idx - idx - 1) as usize))
                    } else {
                        self.stats.pidx_oob += 1;
                        NO_PIVOT_MAX
                    };
                }
                pivots = self.comm.all_reduce_vec_max(pivots)?;
            }
            trace!("[amm] pivots {pivots:?}");

            // Evaluate all pivots locally, then with one packed reduction.
            let min_cursor = tree.find_rank(min_idx as usize);
            let max_cursor = tree.find_rank(max_idx as usize);
            let bounds: Vec<Bound> = pivots
                .iter()
                .map(|&pivot| {
                    local_bounds(
                        tree, pivot, min_idx, max_idx, min_cursor, max_cursor, &mut self.stats,
                    )
                })
                .collect();
            let mut gbounds = Vec::with_capacity(2 * D);
            for bound in &bounds {
                gbounds.push(bound.ub_pos);
                gbounds.push(bound.lb_pos);
            }
            let gbounds = self.comm.all_reduce_vec_sum(gbounds)?;

            // Hit test: does any pivot's equal-key region contain the target?
            let mut best_ub: Option<usize> = None;
            let mut best_lb: Option<usize> = None;
            let mut best_ub_diff = i64::MAX;
            let mut best_lb_diff = i64::MAX;
            let mut hit = None;
            for i in 0..D {
                let (global_ub, global_lb) = (gbounds[2 * i], gbounds[2 * i + 1]);
                if global_ub >= kmin && global_lb <= kmax {
                    hit = Some(i);
                    break;
                }
                if global_ub < kmin && kmin - global_ub < best_ub_diff {
                    best_ub_diff = kmin - global_ub;
                    best_ub = Some(i);
                }
                if global_lb > kmax && global_lb - kmax < best_lb_diff {
                    best_lb_diff = global_lb - kmax;
                    best_lb = Some(i);
                }
            }
            if let Some(i) = hit {
                let (global_ub, global_lb) = (gbounds[2 * i], gbounds[2 * i + 1]);
                let result = resolve_ties(
                    &self.comm,
                    tree,
                    &bounds[i],
                    min_idx,
                    global_ub,
                    global_lb,
                    kmin - global_lb,
                )?;
                self.stats.finish(start);
                return Ok(result);
            }

            // Refine from below with the tightest under-shooting pivot and
            // from above with the tightest over-shooting one; both may apply.
            let mut new_kmin = kmin;
            let mut new_kmax = kmax;
            let mut new_min_idx = min_idx;
            let mut new_max_idx = max_idx;
            let mut new_global_size = global_size;
            if let Some(i) = best_ub {
                let global_ub = gbounds[2 * i];
                new_min_idx += bounds[i].ub_pos;
                new_kmin -= global_ub;
                new_kmax -= global_ub;
                new_global_size -= global_ub;
            }
            if let Some(i) = best_lb {
                let global_lb = gbounds[2 * i + 1];
                new_max_idx = min_idx + bounds[i].lb_pos;
                new_global_size -= global_size - global_lb;
            }
            debug_assert!(new_global_size > 0 && new_global_size <= global_size);
            trace!(
                "[amm] refined to kmin {new_kmin} kmax {new_kmax} size {new_global_size}"
            );

            if new_global_size == global_size {
                // No pivot discarded anything; a blind retry could loop, so
                // probe the live boundary key instead, which always makes
                // progress.
                self.stats.size_unchanged += 1;
                match self.boundary_round(
                    tree, case_small, kmin, kmax, min_idx, max_idx, global_size,
                )? {
                    Round::Done(splitter) => {
                        self.stats.finish(start);
                        return Ok(splitter);
                    }
                    Round::Refined {
                        kmin: k0,
                        kmax: k1,
                        min_idx: lo,
                        max_idx: hi,
                        global_size: size,
                    } => {
                        kmin = k0;
                        kmax = k1;
                        min_idx = lo;
                        max_idx = hi;
                        global_size = size;
                    }
                }
                continue;
            }
            if (global_size - new_global_size) * 50 <= global_size
                || global_size - new_global_size <= 5
            {
                self.stats.tinychange += 1;
            }

            kmin = new_kmin;
            kmax = new_kmax;
            min_idx = new_min_idx;
            max_idx = new_max_idx;
            global_size = new_global_size;
        }
    }
}
