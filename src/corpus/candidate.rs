//! Candidates and per-slot candidate sets.

use super::features::{DenseWeights, FeatureId};

/// Stable identity of a candidate: slot plus position within the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId {
    pub slot: usize,
    pub index: usize,
}

/// One scored hypothesis for a slot.
///
/// The feature vector and metric statistics never change after load. The
/// cached `score` is written only by [`Corpus::rescore`](super::Corpus::rescore),
/// before any search thread exists; workers keep their own scores.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub(crate) id: CandidateId,
    pub(crate) text: String,
    /// Sorted by id, duplicates summed.
    pub(crate) features: Box<[(FeatureId, f64)]>,
    /// Opaque sufficient statistics consumed by the evaluation metric.
    pub(crate) stats: Box<[f64]>,
    pub(crate) score: f64,
}

impl Candidate {
    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.id.slot
    }

    pub fn index(&self) -> usize {
        self.id.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn features(&self) -> &[(FeatureId, f64)] {
        &self.features
    }

    pub fn stats(&self) -> &[f64] {
        &self.stats
    }

    /// Score cached by the last [`Corpus::rescore`](super::Corpus::rescore).
    pub fn cached_score(&self) -> f64 {
        self.score
    }

    #[inline]
    pub fn dot(&self, weights: &DenseWeights) -> f64 {
        weights.dot(&self.features)
    }
}

/// Sum duplicate feature ids and sort by id.
pub(crate) fn canonical_features(mut raw: Vec<(FeatureId, f64)>) -> Box<[(FeatureId, f64)]> {
    raw.sort_by_key(|(id, _)| *id);
    let mut out: Vec<(FeatureId, f64)> = Vec::with_capacity(raw.len());
    for (id, v) in raw {
        match out.last_mut() {
            Some((last, acc)) if *last == id => *acc += v,
            _ => out.push((id, v)),
        }
    }
    out.into_boxed_slice()
}

/// Ordered, non-empty candidates for one slot.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub(crate) candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    /// Index of the highest-scoring candidate; the first one wins ties.
    pub fn argmax(&self, weights: &DenseWeights) -> usize {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, cand) in self.candidates.iter().enumerate() {
            let s = cand.dot(weights);
            if s > best_score {
                best = i;
                best_score = s;
            }
        }
        best
    }
}

impl std::ops::Index<usize> for CandidateSet {
    type Output = Candidate;

    fn index(&self, index: usize) -> &Candidate {
        &self.candidates[index]
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_features_sums_duplicates() {
        let f = canonical_features(vec![
            (FeatureId(2), 1.0),
            (FeatureId(0), 0.5),
            (FeatureId(2), 2.0),
        ]);
        assert_eq!(&*f, &[(FeatureId(0), 0.5), (FeatureId(2), 3.0)]);
    }
}
