//! Weight search: line search, objectives, strategies and the parallel driver.
//!
//! ## Pipeline per starting point
//!
//! ```text
//!                   ┌──────────────────────────┐
//!  start weights ──►│ strategy.step()          │──► proposal
//!                   │   direction(s)           │        │
//!                   │   LineSearcher::search   │        ▼
//!                   └──────────────────────────┘   objective(proposal)
//!                              ▲                          │
//!                              │  accept if improved by   │
//!                              └─── > min_objective_diff ◄┘
//! ```
//!
//! The objective is always *minimized*: `−metric(argmax)` for plain search,
//! the MCMC estimate when the sampled objective is enabled.
//!
//! | Module     | Role                                                      |
//! |------------|-----------------------------------------------------------|
//! | `line`     | exact piecewise-linear line search                        |
//! | `mcmc`     | Gibbs-sampled expected metric                             |
//! | `strategy` | direction generators (koehn, coordinate, random, …)       |
//! | `best`     | shared best-so-far record                                 |
//! | `driver`   | starting points, worker pool, seeding, reporting          |

pub mod best;
pub mod driver;
pub mod line;
pub mod mcmc;
pub mod strategy;

pub use best::GlobalBest;
pub use driver::{PointReport, TuneOutcome, TuneReport, Tuner};
pub use line::{DirectionScan, Interval, LineSearchConfig, LineSearchOutcome, LineSearcher, Smoothing};
pub use mcmc::{McmcConfig, McmcEstimate, McmcEstimator};
pub use strategy::{OptimizerStrategy, SearchState};

use rand::Rng;

use crate::corpus::Corpus;
use crate::metrics::EvaluationMetric;
use crate::weights::WeightVector;

/// Metric of the argmax selection under `weights` merged with `fixed`.
pub fn evaluate_at(corpus: &Corpus, metric: &dyn EvaluationMetric, weights: &WeightVector, fixed: &WeightVector) -> f64 {
    let dense = corpus.densify(&weights.merged(fixed));
    metric.score(&corpus.argmax_selection(&dense))
}

/// Read-only state shared by every step of one search.
pub struct SearchContext<'a> {
    pub corpus: &'a Corpus,
    pub metric: &'a dyn EvaluationMetric,
    /// Weights held constant; merged in before every scoring call.
    pub fixed: &'a WeightVector,
    pub line: &'a LineSearchConfig,
    pub mcmc: &'a McmcConfig,
    pub no_progress_limit: usize,
}

impl<'a> SearchContext<'a> {
    pub fn line_searcher(&self) -> LineSearcher<'a> {
        LineSearcher::new(self.corpus, self.metric, self.fixed, self.line)
    }

    pub fn evaluate(&self, weights: &WeightVector) -> f64 {
        evaluate_at(self.corpus, self.metric, weights, self.fixed)
    }

    /// Value to minimize at `weights`.
    pub fn objective<R: Rng + ?Sized>(&self, weights: &WeightVector, rng: &mut R) -> f64 {
        if self.mcmc.enabled {
            McmcEstimator::new(self.corpus, self.metric, self.mcmc)
                .estimate(weights, self.fixed, true, rng)
                .objective
        } else {
            -self.evaluate(weights)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{toy_corpus, wv};
    use super::*;
    use crate::metrics::QualitySum;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_objective_is_negated_metric() {
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
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let w = wv(&[("good", 1.0)]);
        assert_eq!(ctx.evaluate(&w), 4.0);
        assert_eq!(ctx.objective(&w, &mut rng), -4.0);
    }

    #[test]
    fn test_fixed_weights_enter_evaluation() {
        let corpus = toy_corpus();
        let fixed = wv(&[("noise", 10.0)]);
        // noise dominates: a1, b1, c1
        assert_eq!(evaluate_at(&corpus, &QualitySum, &wv(&[("good", 1.0)]), &fixed), 2.0);
    }
}
