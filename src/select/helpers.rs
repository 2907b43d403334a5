//! Bound computation and tie resolution shared by both selector variants.

use super::Splitter;
use crate::comm::Communicator;
use crate::stats::SelectStats;
use crate::tree::{Cursor, OrderStatTree};
use crate::CommError;
use log::trace;

/// Local evaluation of one pivot against the live range: positions are
/// relative to `min_idx` and clamped into `[0, local_size]`.
#[derive(Clone, Copy, Debug)]
pub(super) struct Bound {
    /// Number of live elements `<=` the pivot.
    pub ub_pos: i64,
    /// Number of live elements `<` the pivot.
    pub lb_pos: i64,
    /// Absolute cursor one past the last element `<=` the pivot.
    pub ub_cursor: Cursor,
    /// Absolute cursor to the first element `>=` the pivot.
    pub lb_cursor: Cursor,
}

/// Sentinel pivots: a worker with no viable draw reports `+inf` when pivots
/// are min-reduced and `-inf` when they are max-reduced.
pub(super) const NO_PIVOT_MIN: f64 = f64::INFINITY;
pub(super) const NO_PIVOT_MAX: f64 = f64::NEG_INFINITY;

/// Compute the live-range-relative bounds of `pivot`.
///
/// `min_cursor`/`max_cursor` are the live range's boundary positions.
pub(super) fn local_bounds<V: Copy + Default, const B: usize>(
    tree: &OrderStatTree<V, B>,
    pivot: f64,
    min_idx: i64,
    max_idx: i64,
    min_cursor: Cursor,
    max_cursor: Cursor,
    stats: &mut SelectStats,
) -> Bound {
    let local_size = max_idx - min_idx;

    if pivot == NO_PIVOT_MAX {
        // Every worker drew out of range in case 2.
        stats.no_pivot += 1;
        return if local_size == 0 {
            Bound {
                ub_pos: 0,
                lb_pos: 0,
                ub_cursor: min_cursor,
                lb_cursor: min_cursor,
            }
        } else {
            Bound {
                ub_pos: local_size,
                lb_pos: local_size,
                ub_cursor: max_cursor,
                lb_cursor: max_cursor,
            }
        };
    }
    if pivot == NO_PIVOT_MIN {
        // Every worker drew out of range in case 1.
        stats.no_pivot += 1;
        return Bound {
            ub_pos: 0,
            lb_pos: 0,
            ub_cursor: min_cursor,
            lb_cursor: min_cursor,
        };
    }

    let (ub_abs, ub_cursor) = tree.rank_of_upper_bound(pivot);
    let (lb_abs, lb_cursor) = tree.rank_of_lower_bound(pivot);
    let mut bound = Bound {
        ub_pos: ub_abs as i64 - min_idx,
        lb_pos: lb_abs as i64 - min_idx,
        ub_cursor,
        lb_cursor,
    };

    if bound.ub_pos < 0 {
        // All live elements are greater than the pivot.
        stats.neg_split_pos += 1;
        bound.ub_pos = 0;
        bound.lb_pos = 0;
        bound.ub_cursor = min_cursor;
        bound.lb_cursor = min_cursor;
    } else if bound.ub_pos > local_size {
        // All live elements are smaller than the pivot.
        stats.split_pos_oob += 1;
        bound.ub_pos = local_size;
        bound.lb_pos = local_size;
        bound.ub_cursor = max_cursor;
        bound.lb_cursor = max_cursor;
    } else if bound.lb_pos < 0 {
        stats.neg_split_pos += 1;
        bound.lb_pos = 0;
        bound.lb_cursor = min_cursor;
    }

    bound
}

/// The pivot hit the target range: include exactly `want = kmin - L(pivot)`
/// of the key-equal-to-pivot occurrences, distributed over the workers in
/// rank order via an inclusive scan.
pub(super) fn resolve_ties<V: Copy + Default, const B: usize>(
    comm: &Communicator,
    tree: &OrderStatTree<V, B>,
    bound: &Bound,
    min_idx: i64,
    global_ub: i64,
    global_lb: i64,
    want: i64,
) -> Result<Splitter, CommError> {
    if want <= 0 {
        // The strictly-smaller elements already satisfy the target.
        return Ok(Splitter {
            cursor: bound.lb_cursor,
            count: (min_idx + bound.lb_pos) as usize,
        });
    }

    if global_lb + 1 >= global_ub {
        // Unique pivot; `want` can only be 1 here.
        debug_assert_eq!(want, 1);
        return Ok(Splitter {
            cursor: bound.ub_cursor,
            count: (min_idx + bound.ub_pos) as usize,
        });
    }

    let mine = bound.ub_pos - bound.lb_pos;
    debug_assert!(mine >= 0);
    let prefsum = comm.scan_sum(mine)?;
    trace!(
        "[sel] non-unique pivot, global lb {global_lb} ub {global_ub}, \
         have {mine} locally, prefsum {prefsum}"
    );

    if prefsum < want {
        // Take every local occurrence.
        Ok(Splitter {
            cursor: bound.ub_cursor,
            count: (min_idx + bound.ub_pos) as usize,
        })
    } else if prefsum - mine > want {
        // Earlier workers already cover the target; take none.
        Ok(Splitter {
            cursor: bound.lb_cursor,
            count: (min_idx + bound.lb_pos) as usize,
        })
    } else {
        // Take some: the scan is inclusive, so re-add the local count.
        let take = want - (prefsum - mine);
        let count = (min_idx + bound.lb_pos + take) as usize;
        Ok(Splitter {
            cursor: tree.find_rank(count),
            count,
        })
    }
}

/// Termination round for `kmin == 1 || kmax == 1`: agree on the smallest
/// live key and include exactly one element overall.
pub(super) fn select_minimum<V: Copy + Default, const B: usize>(
    comm: &Communicator,
    tree: &OrderStatTree<V, B>,
    min_idx: i64,
    max_idx: i64,
    stats: &mut SelectStats,
) -> Result<Splitter, CommError> {
    let local_size = max_idx - min_idx;
    let local_min = if local_size > 0 {
        tree.key_at(tree.find_rank(min_idx as usize))
    } else {
        NO_PIVOT_MIN
    };
    let pivot = comm.all_reduce_min(local_min)?;
    trace!("[sel] terminating with global live minimum {pivot}");

    let min_cursor = tree.find_rank(min_idx as usize);
    let max_cursor = tree.find_rank(max_idx as usize);
    let bound = local_bounds(tree, pivot, min_idx, max_idx, min_cursor, max_cursor, stats);
    let sums = comm.all_reduce_vec_sum(vec![bound.ub_pos, bound.lb_pos])?;
    // No live element is smaller than the global live minimum.
    debug_assert_eq!(sums[1], 0);
    resolve_ties(comm, tree, &bound, min_idx, sums[0], sums[1], 1)
}

/// Geometric success probability for pivot-index drawing, computed as
/// `1 - exp(ln(base) / n)` for numerical stability and clamped to a valid
/// probability.
pub(super) fn geometric_param(base: f64, n: i64) -> f64 {
    debug_assert!((0.0..=1.0).contains(&base), "geometric base {base}");
    let p = 1.0 - (base.ln() / n as f64).exp();
    p.clamp(1e-12, 1.0)
}

#[cfg(test)]
mod tests {
    use super::geometric_param;

    #[test]
    fn geometric_param_stays_in_range() {
        assert_eq!(geometric_param(0.0, 5), 1.0);
        let p = geometric_param(0.5, 1);
        assert!((p - 0.5).abs() < 1e-12);
        // Near-1 bases underflow toward 0 and must stay positive.
        let p = geometric_param(1.0 - 1e-16, 1_000_000);
        assert!(p >= 1e-12 && p <= 1.0);
    }
}
