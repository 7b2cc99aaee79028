//! Candidate store: per-slot candidate lists with sparse feature vectors.
//!
//! ## Lifecycle
//!
//! ```text
//! n-best file ─► CorpusBuilder ─► Corpus ─► (merge_companion) ─► rescore ─► shared &Corpus
//!                                                                              │
//!                                                  worker threads read-only ◄──┘
//! ```
//!
//! Everything that mutates a `Corpus` takes `&mut self` and happens before the
//! search driver starts; after that the corpus is only ever borrowed shared.

pub mod candidate;
pub mod features;
pub mod nbest;

pub use candidate::{Candidate, CandidateId, CandidateSet};
pub use features::{DenseWeights, FeatureId, FeatureIndex};
pub use nbest::{parse_nbest, read_nbest};

use tracing::{debug, info};

use crate::error::{Result, TuneError};
use crate::weights::WeightVector;

use candidate::canonical_features;

/// Ordered candidate sets, one per slot. The slot index is the position.
#[derive(Debug, Clone)]
pub struct Corpus {
    features: FeatureIndex,
    sets: Vec<CandidateSet>,
}

impl Corpus {
    pub fn builder() -> CorpusBuilder {
        CorpusBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn slots(&self) -> &[CandidateSet] {
        &self.sets
    }

    pub fn slot(&self, slot: usize) -> &CandidateSet {
        &self.sets[slot]
    }

    pub fn feature_index(&self) -> &FeatureIndex {
        &self.features
    }

    pub fn n_candidates(&self) -> usize {
        self.sets.iter().map(CandidateSet::len).sum()
    }

    pub fn densify(&self, weights: &WeightVector) -> DenseWeights {
        self.features.densify(weights)
    }

    /// Per-slot argmax indices under `weights`.
    pub fn argmax_indices(&self, weights: &DenseWeights) -> Vec<usize> {
        self.sets.iter().map(|set| set.argmax(weights)).collect()
    }

    /// The argmax candidate of every slot.
    pub fn argmax_selection(&self, weights: &DenseWeights) -> Vec<&Candidate> {
        self.sets
            .iter()
            .map(|set| &set.candidates[set.argmax(weights)])
            .collect()
    }

    /// Sum of feature vectors over a selection, by name.
    pub fn feature_sum(&self, selection: &[&Candidate]) -> WeightVector {
        let mut sum = WeightVector::new();
        for cand in selection {
            for (id, v) in cand.features() {
                sum.increment(self.features.name(*id), *v);
            }
        }
        sum
    }

    /// Recompute every candidate's cached score under `weights`.
    pub fn rescore(&mut self, weights: &WeightVector) {
        let dense = self.features.densify(weights);
        for set in &mut self.sets {
            for cand in &mut set.candidates {
                cand.score = cand.dot(&dense);
            }
        }
    }

    /// Fold a companion candidate list (same slots, e.g. the latest generation
    /// round) into this corpus.
    ///
    /// With `filter_unreachable`, candidates scoring above the companion's
    /// lowest score under `weights` are treated as unreachable by the current
    /// generator and dropped, and the companion's candidates are appended.
    /// Without it the companion is assumed to already be contained in `self`
    /// and only the slot counts are checked.
    pub fn merge_companion(
        &mut self,
        local: &Corpus,
        weights: &WeightVector,
        filter_unreachable: bool,
    ) -> Result<()> {
        if local.len() != self.len() {
            return Err(TuneError::SlotCountMismatch {
                expected: self.len(),
                found: local.len(),
            });
        }
        if !filter_unreachable {
            return Ok(());
        }

        let dense_self = self.features.densify(weights);
        let dense_local = local.features.densify(weights);

        for (slot, local_set) in local.sets.iter().enumerate() {
            let min_reachable = local_set
                .iter()
                .map(|c| c.dot(&dense_local))
                .fold(f64::INFINITY, f64::min);

            let before = self.sets[slot].len();
            let mut kept: Vec<Candidate> = self.sets[slot]
                .candidates
                .drain(..)
                .filter(|c| c.dot(&dense_self) <= min_reachable)
                .collect();

            for cand in local_set {
                let features = cand
                    .features()
                    .iter()
                    .map(|(id, v)| (self.features.intern(local.features.name(*id)), *v))
                    .collect();
                kept.push(Candidate {
                    id: CandidateId { slot, index: 0 },
                    text: cand.text.clone(),
                    features: canonical_features(features),
                    stats: cand.stats.clone(),
                    score: cand.score,
                });
            }

            for (index, cand) in kept.iter_mut().enumerate() {
                cand.id = CandidateId { slot, index };
            }

            debug!(
                slot,
                before,
                after = kept.len(),
                min_reachable,
                "filtered unreachable candidates"
            );
            self.sets[slot].candidates = kept;
        }

        info!(
            slots = self.len(),
            candidates = self.n_candidates(),
            "merged companion candidate lists"
        );
        Ok(())
    }
}

/// Incremental corpus construction, one candidate at a time.
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    features: FeatureIndex,
    sets: Vec<Vec<Candidate>>,
}

impl CorpusBuilder {
    /// Make sure slots `0..n` exist even if some receive no candidates, so that
    /// `build` can report them as empty.
    pub fn reserve_slots(&mut self, n: usize) -> &mut Self {
        if self.sets.len() < n {
            self.sets.resize_with(n, Vec::new);
        }
        self
    }

    pub fn n_slots(&self) -> usize {
        self.sets.len()
    }

    /// Append a candidate to `slot`. Repeated feature names are summed.
    pub fn push<'a>(
        &mut self,
        slot: usize,
        text: impl Into<String>,
        features: impl IntoIterator<Item = (&'a str, f64)>,
        stats: Vec<f64>,
    ) -> &mut Self {
        self.reserve_slots(slot + 1);
        let raw: Vec<(FeatureId, f64)> = features
            .into_iter()
            .map(|(name, v)| (self.features.intern(name), v))
            .collect();
        let index = self.sets[slot].len();
        self.sets[slot].push(Candidate {
            id: CandidateId { slot, index },
            text: text.into(),
            features: canonical_features(raw),
            stats: stats.into_boxed_slice(),
            score: 0.0,
        });
        self
    }

    /// Finish the corpus. Every slot must hold at least one candidate.
    pub fn build(self) -> Result<Corpus> {
        if self.sets.is_empty() {
            return Err(TuneError::EmptyCorpus);
        }
        if let Some(slot) = self.sets.iter().position(Vec::is_empty) {
            return Err(TuneError::EmptyCandidateSet { slot });
        }
        Ok(Corpus {
            features: self.features,
            sets: self
                .sets
                .into_iter()
                .map(|candidates| CandidateSet { candidates })
                .collect(),
        })
    }
}
