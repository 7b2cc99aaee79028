//! Expected-metric objective estimated by Gibbs sampling.
//!
//! Under weights `w` each slot's candidates follow a softmax over model
//! scores at temperature `T`:
//!
//! ```text
//! P(c | slot) = exp(w·f(c) / T) / Σ_c' exp(w·f(c') / T)
//! ```
//!
//! The sampler starts from the argmax selection (which is also the first
//! sample), then performs Gibbs sweeps: every slot is resampled from its
//! conditional and the incremental metric state is updated in place. Samples
//! are drawn in batches until the running mean settles:
//!
//! ```text
//! while (|Δmean| > tight_diff || batch < min_batches) && batch < max_batches
//! ```
//!
//! The objective to *minimize* is `0.5·‖w‖₂² − C·E[metric]` when regularized,
//! otherwise `−E[metric]`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::corpus::Corpus;
use crate::metrics::EvaluationMetric;
use crate::weights::WeightVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct McmcConfig {
    /// Use the sampled expected metric as the search objective.
    pub enabled: bool,
    /// Samples drawn per batch.
    pub batch_size: usize,
    pub min_batches: usize,
    pub max_batches: usize,
    /// Stop once the running mean moves less than this between batches.
    pub tight_diff: f64,
    /// Weight of the expected metric against the L2 regularizer.
    pub c: f64,
    pub temperature: f64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 10,
            min_batches: 0,
            max_batches: 50,
            tight_diff: 1e-6,
            c: 100.0,
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McmcEstimate {
    /// Mean metric over all samples.
    pub expected: f64,
    pub samples: usize,
    pub batches: usize,
    /// Value to minimize.
    pub objective: f64,
}

/// Per-slot softmax, flattened to unnormalized masses plus their sum.
struct SlotDistribution {
    mass: Vec<f64>,
    total: f64,
}

impl SlotDistribution {
    fn new(scores: impl Iterator<Item = f64>, temperature: f64) -> Self {
        let scaled: Vec<f64> = scores.map(|s| s / temperature).collect();
        let peak = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mass: Vec<f64> = scaled.iter().map(|s| (s - peak).exp()).collect();
        let total = mass.iter().sum();
        Self { mass, total }
    }

    fn is_degenerate(&self) -> bool {
        !(self.total > 0.0 && self.total.is_finite())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let n = self.mass.len();
        if self.is_degenerate() {
            return rng.gen_range(0..n);
        }
        let mut remaining = rng.r#gen::<f64>() * self.total;
        for (i, m) in self.mass.iter().enumerate() {
            remaining -= m;
            if remaining <= 0.0 {
                return i;
            }
        }
        // Rounding left a sliver of mass unaccounted for
        rng.gen_range(0..n)
    }
}

pub struct McmcEstimator<'a> {
    corpus: &'a Corpus,
    metric: &'a dyn EvaluationMetric,
    config: &'a McmcConfig,
}

impl<'a> McmcEstimator<'a> {
    pub fn new(corpus: &'a Corpus, metric: &'a dyn EvaluationMetric, config: &'a McmcConfig) -> Self {
        Self {
            corpus,
            metric,
            config,
        }
    }

    /// Estimate the expected metric at `weights` (free weights; `fixed` is merged in for scoring).
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        weights: &WeightVector,
        fixed: &WeightVector,
        regularize: bool,
        rng: &mut R,
    ) -> McmcEstimate {
        let full = weights.merged(fixed);
        let dense = self.corpus.densify(&full);
        let temperature = if self.config.temperature > 0.0 {
            self.config.temperature
        } else {
            1.0
        };

        let distributions: Vec<SlotDistribution> = self
            .corpus
            .slots()
            .iter()
            .map(|set| SlotDistribution::new(set.iter().map(|c| c.dot(&dense)), temperature))
            .collect();
        let degenerate = distributions.iter().filter(|d| d.is_degenerate()).count();
        if degenerate > 0 {
            debug!(slots = degenerate, "zero softmax mass, sampling those slots uniformly");
        }

        let mut current = self.corpus.argmax_indices(&dense);
        let mut state = self.metric.begin(self.corpus.len());
        for (slot, &idx) in current.iter().enumerate() {
            state.set(slot, Some(&self.corpus.slot(slot)[idx]));
        }

        let batch_size = self.config.batch_size.max(1);
        let max_batches = self.config.max_batches.max(1);

        let mut sum = 0.0;
        let mut samples = 0usize;
        let mut batches = 0usize;
        let mut delta = f64::INFINITY;

        while (delta.abs() > self.config.tight_diff || batches < self.config.min_batches) && batches < max_batches {
            let previous = (samples > 0).then(|| sum / samples as f64);

            for _ in 0..batch_size {
                if samples > 0 {
                    for (slot, dist) in distributions.iter().enumerate() {
                        let pick = dist.sample(rng);
                        if pick != current[slot] {
                            current[slot] = pick;
                            state.set(slot, Some(&self.corpus.slot(slot)[pick]));
                        }
                    }
                }
                sum += state.score();
                samples += 1;
            }

            let mean = sum / samples as f64;
            delta = previous.map_or(f64::INFINITY, |prev| prev - mean);
            batches += 1;
            trace!(batch = batches, mean, delta, "mcmc batch");
        }

        let expected = sum / samples as f64;
        let objective = if regularize && self.config.c != 0.0 {
            let l2 = weights.l2_norm();
            0.5 * l2 * l2 - self.config.c * expected
        } else {
            -expected
        };

        debug!(expected, samples, batches, objective, "mcmc estimate");

        McmcEstimate {
            expected,
            samples,
            batches,
            objective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QualitySum;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn wv(pairs: &[(&str, f64)]) -> WeightVector {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn two_candidate_corpus() -> Corpus {
        let mut b = Corpus::builder();
        b.push(0, "low", [("f", 0.0)], vec![0.0])
            .push(0, "high", [("f", 1.0)], vec![1.0]);
        b.build().unwrap()
    }

    #[test]
    fn test_peaked_distribution_matches_argmax() {
        let corpus = two_candidate_corpus();
        let config = McmcConfig::default();
        let est = McmcEstimator::new(&corpus, &QualitySum, &config);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        // exp(-1000) underflows to zero: every sample is the argmax
        let out = est.estimate(&wv(&[("f", 1000.0)]), &WeightVector::new(), false, &mut rng);
        assert_eq!(out.expected, 1.0);
        assert_eq!(out.objective, -1.0);
        assert!(out.batches >= 2);
    }

    #[test]
    fn test_uniform_distribution_mean() {
        let corpus = two_candidate_corpus();
        let config = McmcConfig {
            batch_size: 200,
            min_batches: 20,
            max_batches: 20,
            ..Default::default()
        };
        let est = McmcEstimator::new(&corpus, &QualitySum, &config);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let out = est.estimate(&wv(&[("f", 0.0)]), &WeightVector::new(), false, &mut rng);
        assert_eq!(out.batches, 20);
        assert_eq!(out.samples, 4000);
        assert!((out.expected - 0.5).abs() < 0.05, "expected ~0.5, got {}", out.expected);
    }

    #[test]
    fn test_degenerate_mass_samples_uniformly() {
        let corpus = two_candidate_corpus();
        let config = McmcConfig {
            batch_size: 100,
            min_batches: 10,
            max_batches: 10,
            ..Default::default()
        };
        let est = McmcEstimator::new(&corpus, &QualitySum, &config);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let out = est.estimate(&wv(&[("f", f64::NAN)]), &WeightVector::new(), false, &mut rng);
        assert!(out.expected.is_finite());
        assert!(out.expected > 0.3 && out.expected < 0.7);
    }

    #[test]
    fn test_regularized_objective() {
        let corpus = two_candidate_corpus();
        let config = McmcConfig {
            c: 2.0,
            ..Default::default()
        };
        let est = McmcEstimator::new(&corpus, &QualitySum, &config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let w = wv(&[("f", 1000.0)]);
        let out = est.estimate(&w, &WeightVector::new(), true, &mut rng);
        assert_eq!(out.objective, 0.5 * 1000.0 * 1000.0 - 2.0);
    }

    #[test]
    fn test_same_seed_same_estimate() {
        let corpus = two_candidate_corpus();
        let config = McmcConfig::default();
        let est = McmcEstimator::new(&corpus, &QualitySum, &config);
        let w = wv(&[("f", 0.3)]);

        let a = est.estimate(&w, &WeightVector::new(), false, &mut ChaCha8Rng::seed_from_u64(42));
        let b = est.estimate(&w, &WeightVector::new(), false, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
