//! Multi-start parallel search driver.
//!
//! ## Flow
//!
//! ```text
//!  initial weights ─┐
//!  previous weights ├─► starting points ─► Mutex<VecDeque<(index, weights)>>
//!  random (seeded) ─┘                                │
//!                        ┌───────────────┬───────────┴───┐
//!                        ▼               ▼               ▼
//!                    worker 0        worker 1   …    worker N-1     (std::thread::scope)
//!                        │ pop point, seed RNG from its values, iterate strategy
//!                        └───────────────┴───────┬───────┘
//!                                                ▼
//!                                   GlobalBest::offer (compare-and-replace)
//! ```
//!
//! Each point's RNG is seeded from the point's own values and the global seed,
//! and ties in the best record go to the lowest point index, so the result is
//! the same for any thread count.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::Xxh64;

use crate::config::TuneConfig;
use crate::corpus::Corpus;
use crate::error::{Result, TuneError};
use crate::metrics::EvaluationMetric;
use crate::weights::WeightVector;

use super::best::GlobalBest;
use super::line::LineSearchConfig;
use super::strategy::{OptimizerStrategy, SearchState};
use super::SearchContext;

/// Seed for one starting point: `xxh64` over its sorted value bits, then the global seed.
pub fn derive_seed(weights: &WeightVector, global_seed: u64) -> u64 {
    let mut hasher = Xxh64::new(0);
    for v in weights.sorted_values() {
        hasher.update(&v.to_bits().to_le_bytes());
    }
    hasher.update(&global_seed.to_le_bytes());
    hasher.digest()
}

/// Summary of one starting point's search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointReport {
    pub point: usize,
    pub start_objective: f64,
    pub final_objective: f64,
    pub final_eval: f64,
    pub iterations: usize,
    pub accepted: usize,
    /// Stopped on patience rather than the iteration cap.
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneReport {
    pub metric: String,
    pub strategy: String,
    pub seed: u64,
    pub threads: usize,
    pub starting_points: usize,
    pub initial_eval: f64,
    pub final_eval: f64,
    pub initial_objective: f64,
    pub final_objective: f64,
    /// Squared distance between the initial and the final weights.
    pub weight_ssd: f64,
    /// Point that produced the final weights, `None` if no point beat the initial weights.
    pub best_point: Option<usize>,
    pub trajectory: Vec<f64>,
    pub points: Vec<PointReport>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct TuneOutcome {
    /// Best weights with the fixed weights merged back in.
    pub weights: WeightVector,
    pub report: TuneReport,
}

/// Multi-start tuner over a shared corpus and metric.
pub struct Tuner<'a> {
    corpus: &'a Corpus,
    metric: &'a dyn EvaluationMetric,
    config: TuneConfig,
    strategy: OptimizerStrategy,
    line: LineSearchConfig,
    fixed: WeightVector,
    seed: u64,
}

impl<'a> Tuner<'a> {
    pub fn new(corpus: &'a Corpus, metric: &'a dyn EvaluationMetric, config: &TuneConfig) -> Result<Self> {
        config.validate()?;
        let strategy: OptimizerStrategy = config.strategy.parse()?;
        let mut config = config.clone();
        if strategy.uses_mcmc() {
            config.mcmc.enabled = true;
        }

        Ok(Self {
            corpus,
            metric,
            line: config.line_search(),
            seed: config.seed_value(),
            strategy,
            config,
            fixed: WeightVector::new(),
        })
    }

    /// Hold these weights constant during search.
    pub fn with_fixed(mut self, fixed: WeightVector) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn strategy(&self) -> OptimizerStrategy {
        self.strategy
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn context(&self) -> SearchContext<'_> {
        SearchContext {
            corpus: self.corpus,
            metric: self.metric,
            fixed: &self.fixed,
            line: &self.line,
            mcmc: &self.config.mcmc,
            no_progress_limit: self.config.no_progress_limit,
        }
    }

    /// Point 0 is the first initial vector, then the other supplied vectors,
    /// then seeded random points over the same keys.
    pub fn starting_points(&self, initial: &[WeightVector]) -> Result<Vec<WeightVector>> {
        let first = initial.first().ok_or(TuneError::NoInitialWeights)?;

        let mut base = first.clone();
        for name in self.corpus.feature_index().names() {
            base.track(name);
        }
        base.remove_keys(self.fixed.keys());

        let mut points = Vec::with_capacity(self.config.starting_points.max(initial.len()));
        points.push(base);
        points.extend(initial.iter().skip(1).map(|w| w.without(&self.fixed)));

        let generative = self.config.generative_set();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        while points.len() < self.config.starting_points {
            let point: WeightVector = points[0]
                .keys()
                .map(|k| {
                    let v = if generative.contains(k) {
                        rng.r#gen::<f64>()
                    } else {
                        rng.r#gen::<f64>() * 2.0 - 1.0
                    };
                    (k.to_string(), v)
                })
                .collect();
            points.push(point);
        }
        Ok(points)
    }

    /// Search every starting point and return the best weights found.
    pub fn run(&self, initial: &[WeightVector]) -> Result<TuneOutcome> {
        let started = Instant::now();
        let points = self.starting_points(initial)?;
        let ctx = self.context();

        let origin = points[0].clone();
        let mut origin_rng = ChaCha8Rng::seed_from_u64(derive_seed(&origin, self.seed));
        let initial_objective = ctx.objective(&origin, &mut origin_rng);
        let initial_eval = ctx.evaluate(&origin);
        info!(
            metric = self.metric.name(),
            strategy = %self.strategy,
            points = points.len(),
            initial_eval,
            initial_objective,
            "starting search"
        );

        let best = GlobalBest::new(origin.clone(), initial_objective);
        let queue: Mutex<VecDeque<(usize, WeightVector)>> = Mutex::new(points.iter().cloned().enumerate().collect());
        let abort = AtomicBool::new(false);
        let threads = self.config.threads.clamp(1, points.len());

        let results: Vec<Result<Vec<PointReport>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let (ctx, queue, best, abort) = (&ctx, &queue, &best, &abort);
                    scope.spawn(move || self.worker(worker, ctx, queue, best, abort))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });

        let mut reports = Vec::with_capacity(points.len());
        for result in results {
            reports.extend(result?);
        }
        reports.sort_by_key(|r| r.point);

        let trajectory = best.trajectory();
        let snapshot = best.into_snapshot();
        let final_eval = ctx.evaluate(&snapshot.weights);
        let report = TuneReport {
            metric: self.metric.name().to_string(),
            strategy: self.strategy.name().to_string(),
            seed: self.seed,
            threads,
            starting_points: points.len(),
            initial_eval,
            final_eval,
            initial_objective,
            final_objective: snapshot.objective,
            weight_ssd: origin.sum_squared_diff(&snapshot.weights),
            best_point: snapshot.point,
            trajectory,
            points: reports,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            final_eval,
            final_objective = snapshot.objective,
            best_point = ?snapshot.point,
            elapsed_secs = report.elapsed_secs,
            "search finished"
        );

        Ok(TuneOutcome {
            weights: snapshot.weights.merged(&self.fixed),
            report,
        })
    }

    fn worker(
        &self,
        worker: usize,
        ctx: &SearchContext<'_>,
        queue: &Mutex<VecDeque<(usize, WeightVector)>>,
        best: &GlobalBest,
        abort: &AtomicBool,
    ) -> Result<Vec<PointReport>> {
        let mut reports = Vec::new();
        while !abort.load(Ordering::Relaxed) {
            let Some((point, start)) = queue.lock().pop_front() else {
                break;
            };
            debug!(worker, point, "claimed starting point");

            match panic::catch_unwind(AssertUnwindSafe(|| self.optimize_point(ctx, point, start))) {
                Ok((report, weights)) => {
                    best.offer(&weights, report.final_objective, point);
                    reports.push(report);
                }
                Err(_) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(TuneError::WorkerFailed { point });
                }
            }
        }
        Ok(reports)
    }

    /// Iterate the strategy from `start` until it stops improving.
    fn optimize_point(&self, ctx: &SearchContext<'_>, point: usize, start: WeightVector) -> (PointReport, WeightVector) {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(&start, self.seed));
        let start_objective = ctx.objective(&start, &mut rng);
        let patience = self.strategy.patience(start.len(), self.config.no_progress_limit);

        let mut state = SearchState::new(start, start_objective);
        let mut converged = false;
        while state.iteration < self.config.max_iterations {
            let proposal = self.strategy.step(ctx, &state, &mut rng);
            state.iteration += 1;

            let objective = ctx.objective(&proposal, &mut rng);
            if state.objective - objective > self.config.min_objective_diff {
                debug!(point, iteration = state.iteration, objective, "accepted step");
                state.accept(proposal, objective);
            } else {
                state.reject();
                if state.no_progress >= patience {
                    converged = true;
                    break;
                }
            }
        }

        let mut weights = state.weights.merged(&self.fixed);
        if self.fixed.is_empty() && !weights.normalize() {
            warn!(point, "search ended on a zero weight vector; leaving it unnormalized");
        }
        weights.remove_keys(self.fixed.keys());

        let final_objective = ctx.objective(&weights, &mut rng);
        let final_eval = ctx.evaluate(&weights);
        info!(
            point,
            iterations = state.iteration,
            accepted = state.accepted,
            final_eval,
            final_objective,
            "starting point done"
        );

        let report = PointReport {
            point,
            start_objective,
            final_objective,
            final_eval,
            iterations: state.iteration,
            accepted: state.accepted,
            converged,
        };
        (report, weights)
    }
}
