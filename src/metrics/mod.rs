//! Corpus-level evaluation metrics, full and incremental.
//!
//! ## Interface
//!
//! The search core only needs two capabilities from a metric:
//!
//! | Call                               | Used by                               |
//! |------------------------------------|---------------------------------------|
//! | `score(selection)`                 | objective at a weight vector          |
//! | `begin()` → `set(slot, cand)` → `score()` | line-search sweep, Gibbs sampler |
//!
//! The incremental form is what makes the line search affordable: a sweep
//! over thousands of breakpoints touches only the slots whose winner changed.
//!
//! ## Exactness
//!
//! For every selection, an incremental state whose slots were set (in any
//! order, with any history) to that selection reports *exactly* the value of
//! `score(selection)`. The shipped metrics get this for free by aggregating
//! through [`StatTree`].
//!
//! ## Shipped metrics
//!
//! | Name               | Metric                                                  |
//! |--------------------|---------------------------------------------------------|
//! | `quality`          | sum of each selected candidate's `stats[0]`             |
//! | `bleu[:N]`         | corpus BLEU from clipped n-gram count statistics        |
//! | `smooth-bleu[:N]`  | add-one smoothed BLEU                                   |
//! | `a+0.5*b`          | linear combination; parts read consecutive stat columns |

pub mod bleu;
pub mod linear;
pub mod quality;
pub mod spec;
pub mod stat_tree;

pub use bleu::Bleu;
pub use linear::LinearCombination;
pub use quality::QualitySum;
pub use spec::MetricSpec;
pub use stat_tree::StatTree;

use crate::corpus::{Candidate, Corpus};
use crate::error::{Result, TuneError};

/// A corpus metric over one selected candidate per slot. Higher is better.
pub trait EvaluationMetric: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum number of statistics each candidate must carry.
    fn required_stats(&self) -> usize;

    /// Fresh incremental state for `slots` slots, all unset, reading each
    /// candidate's statistics from column `offset` onwards.
    fn begin_at(&self, slots: usize, offset: usize) -> Box<dyn IncrementalMetric + '_>;

    /// Fresh incremental state for `slots` slots, all unset.
    fn begin(&self, slots: usize) -> Box<dyn IncrementalMetric + '_> {
        self.begin_at(slots, 0)
    }

    /// Score of a complete selection.
    fn score(&self, selection: &[&Candidate]) -> f64 {
        let mut state = self.begin(selection.len());
        for (slot, cand) in selection.iter().enumerate() {
            state.set(slot, Some(*cand));
        }
        state.score()
    }
}

/// Stateful accumulator supporting single-slot replacement.
pub trait IncrementalMetric {
    /// Select `candidate` for `slot`; `None` marks the slot unset.
    fn set(&mut self, slot: usize, candidate: Option<&Candidate>);

    fn score(&self) -> f64;
}

/// Metrics that are a function of the column sums of per-candidate statistics.
pub trait AdditiveMetric: Send + Sync {
    fn dim(&self) -> usize;

    fn score_totals(&self, totals: &[f64]) -> f64;
}

/// Incremental state shared by every [`AdditiveMetric`].
pub struct AdditiveState<'m, M: AdditiveMetric + ?Sized> {
    metric: &'m M,
    /// First statistics column this state reads.
    offset: usize,
    tree: StatTree,
}

impl<'m, M: AdditiveMetric + ?Sized> AdditiveState<'m, M> {
    pub fn new(metric: &'m M, slots: usize, offset: usize) -> Self {
        Self {
            metric,
            offset,
            tree: StatTree::new(slots, metric.dim()),
        }
    }
}

impl<M: AdditiveMetric + ?Sized> IncrementalMetric for AdditiveState<'_, M> {
    fn set(&mut self, slot: usize, candidate: Option<&Candidate>) {
        let offset = self.offset;
        self.tree
            .set(slot, candidate.map(|c| c.stats().get(offset..).unwrap_or_default()));
    }

    fn score(&self) -> f64 {
        self.metric.score_totals(self.tree.totals())
    }
}

/// Verify every candidate carries the statistics `metric` reads.
///
/// Run once at startup so that a mismatched n-best file fails before any
/// search thread starts.
pub fn check_corpus(metric: &dyn EvaluationMetric, corpus: &Corpus) -> Result<()> {
    let need = metric.required_stats();
    for set in corpus.slots() {
        for cand in set {
            if cand.stats().len() < need {
                return Err(TuneError::InvalidConfig(format!(
                    "metric {} needs {} statistics per candidate, slot {} candidate {} has {}",
                    metric.name(),
                    need,
                    cand.slot(),
                    cand.index(),
                    cand.stats().len()
                )));
            }
        }
    }
    Ok(())
}
