//! Weighted sums of metrics, e.g. BLEU plus a scaled external quality score.
//!
//! Parts read consecutive blocks of each candidate's statistics: for
//! `bleu:4+0.5*quality` the row is `[bleu stats (10 columns)…, quality]`.

use crate::corpus::Candidate;

use super::{EvaluationMetric, IncrementalMetric};

pub struct LinearCombination {
    parts: Vec<(f64, Box<dyn EvaluationMetric>)>,
    name: String,
}

impl LinearCombination {
    pub fn new(parts: Vec<(f64, Box<dyn EvaluationMetric>)>) -> Self {
        let name = parts
            .iter()
            .map(|(w, m)| {
                if *w == 1.0 {
                    m.name().to_string()
                } else {
                    format!("{}*{}", w, m.name())
                }
            })
            .collect::<Vec<_>>()
            .join("+");
        Self { parts, name }
    }

    pub fn parts(&self) -> impl Iterator<Item = (f64, &dyn EvaluationMetric)> {
        self.parts.iter().map(|(w, m)| (*w, m.as_ref()))
    }

    /// First statistics column of each part, relative to the combination's own offset.
    pub fn offsets(&self) -> Vec<usize> {
        self.parts
            .iter()
            .scan(0, |next, (_, m)| {
                let at = *next;
                *next += m.required_stats();
                Some(at)
            })
            .collect()
    }
}

struct LinearState<'m> {
    parts: Vec<(f64, Box<dyn IncrementalMetric + 'm>)>,
}

impl IncrementalMetric for LinearState<'_> {
    fn set(&mut self, slot: usize, candidate: Option<&Candidate>) {
        for (_, state) in &mut self.parts {
            state.set(slot, candidate);
        }
    }

    fn score(&self) -> f64 {
        self.parts.iter().map(|(w, state)| w * state.score()).sum()
    }
}

impl EvaluationMetric for LinearCombination {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_stats(&self) -> usize {
        self.parts.iter().map(|(_, m)| m.required_stats()).sum()
    }

    fn begin_at(&self, slots: usize, offset: usize) -> Box<dyn IncrementalMetric + '_> {
        let parts = self
            .parts
            .iter()
            .zip(self.offsets())
            .map(|((w, m), at)| (*w, m.begin_at(slots, offset + at)))
            .collect();
        Box::new(LinearState { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::metrics::{MetricSpec, QualitySum};

    #[test]
    fn test_weighted_sum() {
        let quality = || Box::new(QualitySum) as Box<dyn EvaluationMetric>;
        let parts = vec![(1.0, quality()), (-2.0, quality())];
        let metric = LinearCombination::new(parts);
        assert_eq!(metric.name(), "quality+-2*quality");
        assert_eq!(metric.required_stats(), 2);
        assert_eq!(metric.offsets(), vec![0, 1]);

        let mut b = Corpus::builder();
        b.push(0, "a", [("f", 1.0)], vec![3.0, 1.0]);
        let corpus = b.build().unwrap();
        assert_eq!(metric.score(&[&corpus.slot(0)[0]]), 1.0);
    }

    #[test]
    fn test_parts_read_their_own_columns() {
        let metric = MetricSpec::parse("bleu:1+0.5*quality").unwrap().build();
        assert_eq!(metric.required_stats(), 5);

        // hyp_len 7, ref_len 7, 7 of 7 unigrams matched, then quality 0.25
        let mut b = Corpus::builder();
        b.push(0, "a", [("f", 1.0)], vec![7.0, 7.0, 7.0, 7.0, 0.25]);
        let corpus = b.build().unwrap();
        let sel = [&corpus.slot(0)[0]];
        assert!((metric.score(&sel) - 1.125).abs() < 1e-12);

        let mut state = metric.begin(1);
        state.set(0, Some(sel[0]));
        assert_eq!(state.score().to_bits(), metric.score(&sel).to_bits());
    }

    #[test]
    fn test_nested_offsets_accumulate() {
        let inner = LinearCombination::new(vec![
            (1.0, Box::new(QualitySum) as Box<dyn EvaluationMetric>),
            (10.0, Box::new(QualitySum)),
        ]);
        let outer = LinearCombination::new(vec![
            (1.0, Box::new(QualitySum) as Box<dyn EvaluationMetric>),
            (100.0, Box::new(inner)),
        ]);
        assert_eq!(outer.required_stats(), 3);

        let mut b = Corpus::builder();
        b.push(0, "a", [("f", 1.0)], vec![1.0, 2.0, 3.0]);
        let corpus = b.build().unwrap();
        assert_eq!(outer.score(&[&corpus.slot(0)[0]]), 1.0 + 100.0 * (2.0 + 30.0));
    }
}
