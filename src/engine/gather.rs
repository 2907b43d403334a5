//! The naive gather-to-root baseline.
//!
//! Same admission path as the tree-based engine, but candidates live in a
//! flat vector; each batch every worker pre-selects its `k` smallest
//! candidates, gathers them at rank 0, and rank 0 selects the global sample
//! sequentially and broadcasts the new threshold.  Serves as the correctness
//! oracle and the scalability baseline in benchmarks.

use crate::comm::Communicator;
use crate::stats::OpStats;
use crate::Error;
use log::{debug, trace};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

const SKIP_WINDOW: usize = 32;

/// Gather-based distributed weighted reservoir sampler.
pub struct GatherReservoir<V> {
    /// Per-batch local candidates.
    items: Vec<(f64, V)>,
    /// The reservoir; maintained at rank 0 only.
    all_items: Vec<(f64, V)>,
    rng: ChaCha8Rng,
    comm: Communicator,
    size: usize,
    threshold: f64,
    batch_id: u64,
    stats: OpStats,
}

impl<V: Copy + Send + 'static> GatherReservoir<V> {
    pub fn new(comm: Communicator, size: usize, seed: u64) -> Self {
        debug_assert!(size > 0, "reservoir size must be positive");
        let rng = ChaCha8Rng::seed_from_u64(seed + comm.rank() as u64);
        Self {
            items: Vec::new(),
            all_items: Vec::new(),
            rng,
            comm,
            size,
            threshold: 0.0,
            batch_id: 0,
            stats: OpStats::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    /// Process one batch of (weight, id) items.  A collective.
    pub fn insert_batch(&mut self, input: &[(f64, V)]) -> Result<(), Error> {
        debug_assert!(input.iter().all(|&(w, _)| w > 0.0), "non-positive weight");
        let t_total = Instant::now();
        let mut t = Instant::now();
        self.items.clear();

        // Step 1: local admission.
        if self.threshold == 0.0 {
            for &(weight, id) in input {
                let u: f64 = self.rng.gen();
                let key = (-(1.0 - u).ln() / weight).max(f64::MIN_POSITIVE);
                self.items.push((key, id));
            }
        } else {
            let mut pos = 0;
            while pos < input.len() {
                pos = self.insert_skip(input, pos);
            }
        }

        // Step 1b: keep only the k smallest locally, to bound the transfer.
        if self.items.len() > self.size {
            self.items
                .select_nth_unstable_by(self.size - 1, |a, b| a.0.total_cmp(&b.0));
            self.items.truncate(self.size);
        }
        self.stats.record("size", self.items.len() as f64);
        let t_insert = elapsed_ms(&mut t);
        self.stats.record("insert", t_insert);
        debug!(
            "RESULT op=insert pe={} np={} batchsize={} batch={} samplesize={} time={}",
            self.comm.rank(),
            self.comm.num_workers(),
            input.len(),
            self.batch_id,
            self.size,
            t_insert,
        );

        // Step 2: gather all candidates at rank 0.
        let gathered = self.comm.gather(0, std::mem::take(&mut self.items))?;
        self.stats.record("gather", elapsed_ms(&mut t));

        // Step 3: sequential selection at the root, threshold broadcast.
        let mut local_threshold = 0.0;
        if let Some(batches) = gathered {
            for batch in batches {
                self.all_items.extend(batch);
            }
            trace!(
                "[res] {} items under consideration in batch {}",
                self.all_items.len(),
                self.batch_id
            );
            if self.all_items.len() >= self.size {
                self.all_items
                    .select_nth_unstable_by(self.size - 1, |a, b| a.0.total_cmp(&b.0));
                self.all_items.truncate(self.size);
                local_threshold = self.all_items[self.size - 1].0;
                debug_assert!(local_threshold > 0.0);
            }
        }
        self.threshold = self.comm.broadcast(0, local_threshold)?;
        trace!(
            "[res] threshold {} in batch {}",
            self.threshold,
            self.batch_id
        );
        self.stats.record("select", elapsed_ms(&mut t));
        self.stats
            .record("total", t_total.elapsed().as_secs_f64() * 1e3);

        self.batch_id += 1;
        Ok(())
    }

    /// Visit the sample (meaningful at rank 0 only).
    pub fn sample<F: FnMut(f64, V)>(&self, mut callback: F) {
        for &(key, id) in &self.all_items {
            callback(key, id);
        }
    }

    fn insert_skip(&mut self, input: &[(f64, V)], pos: usize) -> usize {
        let threshold = self.threshold;
        let u: f64 = self.rng.gen();
        let mut skip = -(1.0 - u).ln() / threshold;
        let mut i = pos;

        while i + SKIP_WINDOW <= input.len() {
            let sum: f64 = input[i..i + SKIP_WINDOW].iter().map(|&(w, _)| w).sum();
            if skip < sum {
                break;
            }
            skip -= sum;
            i += SKIP_WINDOW;
        }

        while i < input.len() {
            let (weight, id) = input[i];
            if skip < weight {
                let mut floor = (-threshold * weight).exp();
                if floor >= 1.0 {
                    floor = 1.0 - f64::EPSILON;
                }
                let r = self.rng.gen_range(floor..1.0).max(f64::MIN_POSITIVE);
                self.items.push((-r.ln() / weight, id));
                return i + 1;
            }
            skip -= weight;
            i += 1;
        }
        input.len()
    }
}

fn elapsed_ms(t: &mut Instant) -> f64 {
    let elapsed = t.elapsed().as_secs_f64() * 1e3;
    *t = Instant::now();
    elapsed
}
