//! Sum of per-candidate quality scores.
//!
//! Each candidate carries a single precomputed quality value in `stats[0]`
//! (for instance a sentence-level score from an external scorer). The corpus
//! score is the sum over the selection.

use super::{AdditiveMetric, AdditiveState, EvaluationMetric, IncrementalMetric};

#[derive(Debug, Clone, Copy, Default)]
pub struct QualitySum;

impl AdditiveMetric for QualitySum {
    fn dim(&self) -> usize {
        1
    }

    fn score_totals(&self, totals: &[f64]) -> f64 {
        totals[0]
    }
}

impl EvaluationMetric for QualitySum {
    fn name(&self) -> &str {
        "quality"
    }

    fn required_stats(&self) -> usize {
        1
    }

    fn begin_at(&self, slots: usize, offset: usize) -> Box<dyn IncrementalMetric + '_> {
        Box::new(AdditiveState::new(self, slots, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;

    #[test]
    fn test_quality_sum() {
        let mut b = Corpus::builder();
        b.push(0, "a", [("f", 1.0)], vec![1.5])
            .push(1, "b", [("f", 1.0)], vec![2.5]);
        let corpus = b.build().unwrap();
        let sel = vec![&corpus.slot(0)[0], &corpus.slot(1)[0]];
        assert_eq!(QualitySum.score(&sel), 4.0);
    }
}
