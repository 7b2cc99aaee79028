//! Optimizer strategies: how each search step picks its direction(s).

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::corpus::Candidate;
use crate::error::TuneError;
use crate::weights::WeightVector;

use super::SearchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerStrategy {
    /// Line search along every axis, keep the best result.
    #[default]
    Koehn,
    /// Line search along one axis per step, cycling through the keys.
    Coordinate,
    /// Line search along a uniformly random direction.
    Random,
    /// Line search towards a random selection that is no worse under the metric.
    Better,
    /// Random directions judged by the sampled expected metric.
    Mcmc,
}

impl OptimizerStrategy {
    pub const ALL: [OptimizerStrategy; 5] = [Self::Koehn, Self::Coordinate, Self::Random, Self::Better, Self::Mcmc];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Koehn => "koehn",
            Self::Coordinate => "coordinate",
            Self::Random => "random",
            Self::Better => "better",
            Self::Mcmc => "mcmc",
        }
    }

    pub fn uses_mcmc(&self) -> bool {
        matches!(self, Self::Mcmc)
    }

    /// Consecutive non-improving steps after which a point is converged.
    pub fn patience(&self, dims: usize, no_progress_limit: usize) -> usize {
        match self {
            Self::Koehn => 1,
            Self::Coordinate => dims.max(1),
            Self::Random | Self::Better | Self::Mcmc => no_progress_limit.max(1),
        }
    }

    /// Propose the next weights from `state`. Never mutates shared state.
    pub fn step<R: Rng + ?Sized>(&self, ctx: &SearchContext<'_>, state: &SearchState, rng: &mut R) -> WeightVector {
        let searcher = ctx.line_searcher();
        let w = &state.weights;

        match self {
            Self::Koehn => {
                let mut best: Option<(f64, WeightVector)> = None;
                for key in w.keys() {
                    let outcome = searcher.search(w, &axis(key));
                    if best.as_ref().is_none_or(|(score, _)| outcome.score > *score) {
                        best = Some((outcome.score, outcome.weights));
                    }
                }
                best.map_or_else(|| w.clone(), |(_, weights)| weights)
            }
            Self::Coordinate => match w.keys().nth(state.iteration % w.len().max(1)) {
                Some(key) => searcher.search(w, &axis(key)).weights,
                None => w.clone(),
            },
            Self::Random | Self::Mcmc => {
                let direction = random_direction(w, rng);
                searcher.search(w, &direction).weights
            }
            Self::Better => {
                let direction = better_direction(ctx, w, rng);
                searcher.search(w, &direction).weights
            }
        }
    }
}

impl FromStr for OptimizerStrategy {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == lower)
            .ok_or_else(|| TuneError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for OptimizerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress of one starting point.
#[derive(Debug, Clone)]
pub struct SearchState {
    pub weights: WeightVector,
    pub objective: f64,
    pub iteration: usize,
    pub no_progress: usize,
    pub accepted: usize,
}

impl SearchState {
    pub fn new(weights: WeightVector, objective: f64) -> Self {
        Self {
            weights,
            objective,
            iteration: 0,
            no_progress: 0,
            accepted: 0,
        }
    }

    pub fn accept(&mut self, weights: WeightVector, objective: f64) {
        self.weights = weights;
        self.objective = objective;
        self.no_progress = 0;
        self.accepted += 1;
    }

    pub fn reject(&mut self) {
        self.no_progress += 1;
    }
}

fn axis(key: &str) -> WeightVector {
    let mut d = WeightVector::new();
    d.set(key, 1.0);
    d
}

fn random_direction<R: Rng + ?Sized>(weights: &WeightVector, rng: &mut R) -> WeightVector {
    weights
        .keys()
        .map(|k| (k, rng.r#gen::<f64>() * 2.0 - 1.0))
        .collect()
}

/// Per slot, a random candidate whose substitution into the current argmax
/// selection does not lower the metric.
pub fn random_better_selection<'c, R: Rng + ?Sized>(
    ctx: &SearchContext<'c>,
    weights: &WeightVector,
    rng: &mut R,
) -> Vec<&'c Candidate> {
    let corpus = ctx.corpus;
    let dense = corpus.densify(&weights.merged(ctx.fixed));
    let current = corpus.argmax_selection(&dense);

    let mut state = ctx.metric.begin(corpus.len());
    for (slot, cand) in current.iter().enumerate() {
        state.set(slot, Some(*cand));
    }
    let base = state.score();

    let mut picked = Vec::with_capacity(corpus.len());
    for (slot, set) in corpus.slots().iter().enumerate() {
        let mut better: Vec<&Candidate> = Vec::new();
        for cand in set {
            state.set(slot, Some(cand));
            if state.score() >= base {
                better.push(cand);
            }
        }
        state.set(slot, Some(current[slot]));

        let choice = if better.is_empty() {
            current[slot]
        } else {
            better[rng.gen_range(0..better.len())]
        };
        picked.push(choice);
    }
    picked
}

/// Feature difference between a random metric-better selection and the argmax.
fn better_direction<R: Rng + ?Sized>(ctx: &SearchContext<'_>, weights: &WeightVector, rng: &mut R) -> WeightVector {
    let corpus = ctx.corpus;
    let dense = corpus.densify(&weights.merged(ctx.fixed));
    let current = corpus.argmax_selection(&dense);
    let target = random_better_selection(ctx, weights, rng);

    let mut direction = corpus.feature_sum(&target);
    direction.add_scaled(&corpus.feature_sum(&current), -1.0);
    direction.remove_keys(ctx.fixed.keys());
    trace!(direction = %direction, "better-selection direction");
    direction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{EvaluationMetric, QualitySum};
    use crate::search::testing::{toy_corpus, wv};
    use crate::search::{LineSearchConfig, McmcConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_parse_strategies() {
        for s in OptimizerStrategy::ALL {
            assert_eq!(s.name().parse::<OptimizerStrategy>().unwrap(), s);
        }
        assert_eq!("Koehn".parse::<OptimizerStrategy>().unwrap(), OptimizerStrategy::Koehn);
        assert!(matches!(
            "powell".parse::<OptimizerStrategy>(),
            Err(TuneError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_patience() {
        assert_eq!(OptimizerStrategy::Koehn.patience(7, 20), 1);
        assert_eq!(OptimizerStrategy::Coordinate.patience(7, 20), 7);
        assert_eq!(OptimizerStrategy::Coordinate.patience(0, 20), 1);
        assert_eq!(OptimizerStrategy::Random.patience(7, 20), 20);
        assert!(OptimizerStrategy::Mcmc.uses_mcmc());
        assert!(!OptimizerStrategy::Better.uses_mcmc());
    }

    #[test]
    fn test_steps_never_worsen_best_axis() {
        let corpus = toy_corpus();
        let fixed = WeightVector::new();
        let line = LineSearchConfig {
            window: 0,
            ..Default::default()
        };
        let mcmc = McmcConfig::default();
        let ctx = SearchContext {
            corpus: &corpus,
            metric: &QualitySum,
            fixed: &fixed,
            line: &line,
            mcmc: &mcmc,
            no_progress_limit: 20,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let start = wv(&[("good", 0.0), ("noise", 1.0)]);
        let state = SearchState::new(start.clone(), -ctx.evaluate(&start));
        let proposal = OptimizerStrategy::Koehn.step(&ctx, &state, &mut rng);
        // The toy corpus reaches its oracle score of 4 along the `good` axis
        assert_eq!(ctx.evaluate(&proposal), 4.0);
    }

    #[test]
    fn test_coordinate_cycles_axes() {
        let corpus = toy_corpus();
        let fixed = WeightVector::new();
        let line = LineSearchConfig {
            window: 0,
            ..Default::default()
        };
        let mcmc = McmcConfig::default();
        let ctx = SearchContext {
            corpus: &corpus,
            metric: &QualitySum,
            fixed: &fixed,
            line: &line,
            mcmc: &mcmc,
            no_progress_limit: 20,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let start = wv(&[("good", 0.0), ("noise", 1.0)]);
        let mut state = SearchState::new(start.clone(), -ctx.evaluate(&start));
        // Iteration 0 searches `good`, which reaches the oracle
        let first = OptimizerStrategy::Coordinate.step(&ctx, &state, &mut rng);
        assert_eq!(ctx.evaluate(&first), 4.0);

        state.iteration = 1;
        let second = OptimizerStrategy::Coordinate.step(&ctx, &state, &mut rng);
        // Moving only `noise` from zero `good` cannot prefer the good candidates everywhere
        assert!(ctx.evaluate(&second) < 4.0);
    }

    #[test]
    fn test_random_better_selection_never_lowers_metric() {
        let corpus = toy_corpus();
        let fixed = WeightVector::new();
        let line = LineSearchConfig::default();
        let mcmc = McmcConfig::default();
        let ctx = SearchContext {
            corpus: &corpus,
            metric: &QualitySum,
            fixed: &fixed,
            line: &line,
            mcmc: &mcmc,
            no_progress_limit: 20,
        };
        let w = wv(&[("good", 0.0), ("noise", 1.0)]);
        let base = ctx.evaluate(&w);

        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..20 {
            let sel = random_better_selection(&ctx, &w, &mut rng);
            assert_eq!(sel.len(), corpus.len());
            let current = corpus.argmax_selection(&corpus.densify(&w));
            // Each single-slot substitution is no worse than the argmax
            for (slot, cand) in sel.iter().enumerate() {
                let mut swapped = current.clone();
                swapped[slot] = *cand;
                assert!(QualitySum.score(&swapped) >= base);
            }
        }
    }

    #[test]
    fn test_random_direction_covers_keys() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let d = random_direction(&wv(&[("a", 0.0), ("b", 3.0)]), &mut rng);
        assert_eq!(d.len(), 2);
        assert!(d.values().all(|v| (-1.0..1.0).contains(&v)));
    }
}
