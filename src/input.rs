//! Input synthesis for benchmarks and tests: weighted item generators.

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Produces one batch of (weight, id) pairs per round.  Ids are unique per
/// worker across rounds (`round * batch + i`).
pub trait BatchGenerator {
    fn name(&self) -> String;

    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        out: &mut Vec<(f64, u32)>,
        count: usize,
        round: u64,
        rank: usize,
    );
}

/// Uniform weights in [0, 100).
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformWeights;

impl BatchGenerator for UniformWeights {
    fn name(&self) -> String {
        "uni".to_string()
    }

    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        out: &mut Vec<(f64, u32)>,
        count: usize,
        round: u64,
        _rank: usize,
    ) {
        out.clear();
        let id_offset = round * count as u64;
        for i in 0..count {
            let weight = rng.gen::<f64>() * 100.0;
            out.push((weight.max(f64::MIN_POSITIVE), (id_offset + i as u64) as u32));
        }
    }
}

/// Absolute Gaussian weights whose mean may drift with the round and the
/// worker rank, and whose deviation may scale with the group size.
#[derive(Clone, Copy, Debug)]
pub struct GaussianWeights {
    /// Constant term of the mean.
    pub mean_offset: f64,
    /// Weight of the round number on the mean.
    pub batch_weight: f64,
    /// Weight of the worker rank on the mean.
    pub rank_weight: f64,
    /// Standard deviation (constant term plus group-size term, pre-summed).
    pub stdev: f64,
}

impl BatchGenerator for GaussianWeights {
    fn name(&self) -> String {
        format!(
            "gauss({}+{}i+{}r,{})",
            self.mean_offset, self.batch_weight, self.rank_weight, self.stdev
        )
    }

    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        out: &mut Vec<(f64, u32)>,
        count: usize,
        round: u64,
        rank: usize,
    ) {
        out.clear();
        let mean =
            self.mean_offset + self.batch_weight * round as f64 + self.rank_weight * rank as f64;
        let normal = Normal::new(mean, self.stdev).expect("finite parameters");
        let id_offset = round * count as u64;
        for i in 0..count {
            // weights must stay positive
            let weight = normal.sample(rng).abs().max(f64::MIN_POSITIVE);
            out.push((weight, (id_offset + i as u64) as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn uniform_weights_are_positive_and_ids_sequential() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut out = Vec::new();
        UniformWeights.generate(&mut rng, &mut out, 100, 3, 0);
        assert_eq!(out.len(), 100);
        assert!(out.iter().all(|&(w, _)| w > 0.0 && w < 100.0));
        assert_eq!(out[0].1, 300);
        assert_eq!(out[99].1, 399);
    }

    #[test]
    fn gaussian_weights_are_positive() {
        let gen = GaussianWeights {
            mean_offset: 0.0,
            batch_weight: 1.0,
            rank_weight: 0.0,
            stdev: 10.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut out = Vec::new();
        gen.generate(&mut rng, &mut out, 1000, 0, 1);
        assert_eq!(out.len(), 1000);
        assert!(out.iter().all(|&(w, _)| w > 0.0));
    }
}
