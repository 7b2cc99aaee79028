//! Feature name interning.
//!
//! Candidates store features as `(FeatureId, value)` pairs; weight vectors are
//! keyed by name. Scoring bridges the two by densifying a [`WeightVector`] once
//! per weight change into a flat array indexed by id, so the inner loops of the
//! line search are plain slice lookups.

use std::collections::HashMap;

use crate::weights::WeightVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u32);

impl FeatureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bidirectional name ↔ id map. Ids are assigned in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FeatureIndex {
    names: Vec<String>,
    ids: HashMap<String, FeatureId>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> FeatureId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = FeatureId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<FeatureId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: FeatureId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Flatten `weights` onto this index. Names the corpus never uses are dropped:
    /// they cannot influence any candidate score.
    pub fn densify(&self, weights: &WeightVector) -> DenseWeights {
        let mut values = vec![0.0; self.names.len()];
        for (name, value) in weights.iter() {
            if let Some(id) = self.get(name) {
                values[id.index()] = value;
            }
        }
        DenseWeights(values)
    }
}

/// A weight vector laid out by [`FeatureId`].
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWeights(pub Vec<f64>);

impl DenseWeights {
    #[inline]
    pub fn dot(&self, features: &[(FeatureId, f64)]) -> f64 {
        features
            .iter()
            .map(|(id, v)| self.0.get(id.index()).copied().unwrap_or(0.0) * v)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut idx = FeatureIndex::new();
        let a = idx.intern("lm");
        let b = idx.intern("tm");
        assert_eq!(idx.intern("lm"), a);
        assert_ne!(a, b);
        assert_eq!(idx.name(b), "tm");
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_densify_ignores_unknown_features() {
        let mut idx = FeatureIndex::new();
        let lm = idx.intern("lm");
        let w: WeightVector = [("lm", 2.0), ("unused", 5.0)].into_iter().collect();
        let dense = idx.densify(&w);
        assert_eq!(dense.0, vec![2.0]);
        assert_eq!(dense.dot(&[(lm, 3.0)]), 6.0);
    }
}
