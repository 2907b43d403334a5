//! Run statistics: Welford aggregates and per-operation timing tables.
//!
//! Every worker keeps its own statistics; the driver merges them at rank 0
//! after a run.  Aggregates support the parallel-merge form of Welford's
//! update so that merging per-worker results is exact.

use std::fmt::{self, Display, Formatter};
use std::time::Instant;

/// Running count/mean/variance/min/max over a stream of doubles.
#[derive(Clone, Copy, Debug)]
pub struct Aggregate {
    count: u64,
    mean: f64,
    nvar: f64,
    min: f64,
    max: f64,
}

impl Default for Aggregate {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            nvar: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.nvar += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &Aggregate) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let total = (self.count + other.count) as f64;
        let delta = other.mean - self.mean;
        self.nvar += other.nvar + delta * delta * (self.count as f64) * (other.count as f64) / total;
        self.mean += delta * other.count as f64 / total;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample standard deviation.
    pub fn stdev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.nvar / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            write!(
                f,
                "avg={} stdev={} count={} range=[{}..{}]",
                self.mean(),
                self.stdev(),
                self.count,
                self.min,
                self.max
            )
        } else {
            write!(f, "{}", self.mean())
        }
    }
}

/// Named aggregates in insertion order, used for per-operation engine timings
/// (`insert`, `select`, `split`, `threshold`, `total`, ...).
#[derive(Clone, Debug, Default)]
pub struct OpStats {
    entries: Vec<(String, Aggregate)>,
}

impl OpStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: &str, value: f64) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, agg)) => agg.add(value),
            None => {
                let mut agg = Aggregate::new();
                agg.add(value);
                self.entries.push((key.to_string(), agg));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Aggregate> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    pub fn merge(&mut self, other: &OpStats) {
        for (key, agg) in &other.entries {
            match self.entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, mine)) => mine.merge(agg),
                None => self.entries.push((key.clone(), *agg)),
            }
        }
    }

    /// Batches per millisecond of `total` time, or 0 if nothing was recorded.
    pub fn throughput(&self) -> f64 {
        match self.get("total") {
            Some(total) if total.mean() > 0.0 => 1000.0 / total.mean(),
            _ => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Aggregate)> {
        self.entries.iter().map(|(k, a)| (k.as_str(), a))
    }
}

impl Display for OpStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let width = self.entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (i, (key, agg)) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "\t{key}: {:width$}{agg}", "", width = width - key.len())?;
        }
        Ok(())
    }
}

/// Statistics of one selector across all selections it ran.
#[derive(Clone, Debug, Default)]
pub struct SelectStats {
    /// Recursion depth per selection (rounds until the splitter was found).
    pub depth: Aggregate,
    /// Total wall time per selection, milliseconds.
    pub total: Aggregate,
    /// Case-1 (target near the bottom) vs case-2 round counts.
    pub kcase: Aggregate,
    /// Pivot index draws that fell outside the local live range.
    pub pidx_oob: u64,
    /// Rounds in which no worker produced a viable pivot.
    pub no_pivot: u64,
    /// Bound positions that landed below the live range and were clamped.
    pub neg_split_pos: u64,
    /// Bound positions that landed past the live range and were clamped.
    pub split_pos_oob: u64,
    /// Refinement rounds that left the global live range unchanged.
    pub size_unchanged: u64,
    /// Refinement rounds that shrank the range by under 2% (or ≤ 5 elements).
    pub tinychange: u64,

    level: u32,
}

impl SelectStats {
    pub fn next_level(&mut self) {
        self.level += 1;
    }

    /// Close out one selection: record its depth and reset the level counter.
    pub fn finish(&mut self, start: Instant) {
        self.depth.add(self.level as f64);
        self.level = 0;
        self.total.add(start.elapsed().as_secs_f64() * 1e3);
    }

    pub fn merge(&mut self, other: &SelectStats) {
        self.depth.merge(&other.depth);
        self.total.merge(&other.total);
        self.kcase.merge(&other.kcase);
        self.pidx_oob += other.pidx_oob;
        self.no_pivot += other.no_pivot;
        self.neg_split_pos += other.neg_split_pos;
        self.split_pos_oob += other.split_pos_oob;
        self.size_unchanged += other.size_unchanged;
        self.tinychange += other.tinychange;
    }
}

impl Display for SelectStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\ttotal:   {}\n\trecursion depth: {}\n\tk small/large: {}\n\
             \tpivot_idx oob: {}, no pivot: {}\n\
             \tneg split pos: {}, split pos oob: {}\n\
             \tsize unchanged: {}, <2% change: {}",
            self.total, self.depth, self.kcase, self.pidx_oob, self.no_pivot,
            self.neg_split_pos, self.split_pos_oob, self.size_unchanged, self.tinychange
        )
    }
}
