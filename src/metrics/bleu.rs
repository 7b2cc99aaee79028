//! Corpus BLEU over precomputed n-gram statistics.
//!
//! Candidates carry `2 + 2N` statistics:
//!
//! ```text
//! [hyp_len, ref_len, match_1, total_1, match_2, total_2, …, match_N, total_N]
//! ```
//!
//! where `match_n` is the clipped n-gram match count against the references
//! and `total_n` the number of hypothesis n-grams. Corpus BLEU is
//!
//! ```text
//! BLEU = BP · exp( (1/N) Σₙ ln(matchₙ / totalₙ) )
//! BP   = min(1, exp(1 − ref_len / hyp_len))
//! ```
//!
//! The smoothed variant adds one to numerator and denominator for n > 1 so a
//! single missing 4-gram does not zero the whole corpus.

use super::{AdditiveMetric, AdditiveState, EvaluationMetric, IncrementalMetric};

pub const DEFAULT_ORDER: usize = 4;

#[derive(Debug, Clone)]
pub struct Bleu {
    order: usize,
    smooth: bool,
    name: String,
}

impl Bleu {
    pub fn new(order: usize, smooth: bool) -> Self {
        let order = order.max(1);
        let name = if smooth {
            format!("smooth-bleu:{}", order)
        } else {
            format!("bleu:{}", order)
        };
        Self {
            order,
            smooth,
            name,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

impl Default for Bleu {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER, false)
    }
}

impl AdditiveMetric for Bleu {
    fn dim(&self) -> usize {
        2 + 2 * self.order
    }

    fn score_totals(&self, totals: &[f64]) -> f64 {
        let hyp_len = totals[0];
        let ref_len = totals[1];
        if hyp_len <= 0.0 {
            return 0.0;
        }

        let mut log_precision = 0.0;
        for n in 0..self.order {
            let mut matches = totals[2 + 2 * n];
            let mut total = totals[3 + 2 * n];
            if self.smooth && n > 0 {
                matches += 1.0;
                total += 1.0;
            }
            if matches <= 0.0 || total <= 0.0 {
                return 0.0;
            }
            log_precision += (matches / total).ln();
        }
        log_precision /= self.order as f64;

        let brevity = (1.0 - ref_len / hyp_len).min(0.0);
        (log_precision + brevity).exp()
    }
}

impl EvaluationMetric for Bleu {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_stats(&self) -> usize {
        self.dim()
    }

    fn begin_at(&self, slots: usize, offset: usize) -> Box<dyn IncrementalMetric + '_> {
        Box::new(AdditiveState::new(self, slots, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_match_scores_one() {
        let bleu = Bleu::new(2, false);
        // hyp 4 tokens, ref 4 tokens, all unigrams and bigrams matched
        let score = bleu.score_totals(&[4.0, 4.0, 4.0, 4.0, 3.0, 3.0]);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_brevity_penalty() {
        let bleu = Bleu::new(1, false);
        // Perfect precision but half the reference length
        let score = bleu.score_totals(&[2.0, 4.0, 2.0, 2.0]);
        assert!((score - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_match_order() {
        let plain = Bleu::new(2, false);
        let totals = [3.0, 3.0, 2.0, 3.0, 0.0, 2.0];
        assert_eq!(plain.score_totals(&totals), 0.0);

        let smooth = Bleu::new(2, true);
        let expected = ((2.0f64 / 3.0).ln() / 2.0 + (1.0f64 / 3.0).ln() / 2.0).exp();
        assert!((smooth.score_totals(&totals) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_hypothesis() {
        assert_eq!(Bleu::default().score_totals(&[0.0; 10]), 0.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(Bleu::default().name(), "bleu:4");
        assert_eq!(Bleu::new(3, true).name(), "smooth-bleu:3");
        assert_eq!(Bleu::new(0, false).order(), 1);
    }
}
