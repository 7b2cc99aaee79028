//! Sparse named weight vectors.
//!
//! Keys are kept in a `BTreeMap` so that every iteration (normalization,
//! seed derivation, coordinate sweeps, serialization) sees the same order
//! from run to run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Mapping from feature name to weight.
///
/// Explicit zero entries are allowed: they mark a feature as tracked, which
/// matters for coordinate search and random restarts, both of which walk the
/// key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector {
    entries: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weight of `feature`, 0.0 when absent.
    pub fn get(&self, feature: &str) -> f64 {
        self.entries.get(feature).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.entries.contains_key(feature)
    }

    pub fn set(&mut self, feature: impl Into<String>, value: f64) {
        self.entries.insert(feature.into(), value);
    }

    /// Add `value` to the weight of `feature`, creating the entry if needed.
    pub fn increment(&mut self, feature: impl Into<String>, value: f64) {
        *self.entries.entry(feature.into()).or_insert(0.0) += value;
    }

    /// Ensure `feature` is tracked without changing an existing value.
    pub fn track(&mut self, feature: &str) {
        if !self.entries.contains_key(feature) {
            self.entries.insert(feature.to_string(), 0.0);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.values().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// `self + scale * other`, leaving both operands untouched.
    pub fn add(&self, other: &WeightVector, scale: f64) -> WeightVector {
        let mut out = self.clone();
        out.add_scaled(other, scale);
        out
    }

    /// In-place `self += scale * other`.
    pub fn add_scaled(&mut self, other: &WeightVector, scale: f64) {
        for (k, v) in &other.entries {
            *self.entries.entry(k.clone()).or_insert(0.0) += scale * v;
        }
    }

    /// In-place multiplication of every entry.
    pub fn scale(&mut self, factor: f64) {
        for v in self.entries.values_mut() {
            *v *= factor;
        }
    }

    pub fn l1_norm(&self) -> f64 {
        self.entries.values().map(|v| v.abs()).sum()
    }

    pub fn l2_norm(&self) -> f64 {
        self.entries.values().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Divide every entry by the L1 norm, in place.
    ///
    /// Returns `false` and leaves the vector untouched when the norm is zero
    /// or not finite; callers decide whether that is worth a warning.
    #[must_use]
    pub fn normalize(&mut self) -> bool {
        let norm = self.l1_norm();
        if norm == 0.0 || !norm.is_finite() {
            return false;
        }
        self.scale(1.0 / norm);
        true
    }

    /// Pure variant of [`normalize`](Self::normalize); `None` in the degenerate case.
    pub fn normalized(&self) -> Option<WeightVector> {
        let mut out = self.clone();
        out.normalize().then_some(out)
    }

    /// Drop every key present in `keys`, in place.
    pub fn remove_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for k in keys {
            self.entries.remove(k);
        }
    }

    /// Copy of `self` without the keys of `other`.
    pub fn without(&self, other: &WeightVector) -> WeightVector {
        let mut out = self.clone();
        out.remove_keys(other.keys());
        out
    }

    /// Copy of `self` with every entry of `other` written over it.
    pub fn merged(&self, other: &WeightVector) -> WeightVector {
        let mut out = self.clone();
        for (k, v) in &other.entries {
            out.entries.insert(k.clone(), *v);
        }
        out
    }

    /// Sum of squared differences over the union of keys; missing keys count as zero.
    pub fn sum_squared_diff(&self, other: &WeightVector) -> f64 {
        let mine: f64 = self
            .entries
            .iter()
            .map(|(k, v)| {
                let d = v - other.get(k);
                d * d
            })
            .sum();
        let theirs: f64 = other
            .entries
            .iter()
            .filter(|(k, _)| !self.entries.contains_key(*k))
            .map(|(_, v)| v * v)
            .sum();
        mine + theirs
    }

    /// Values sorted ascending, as used for seed derivation.
    pub fn sorted_values(&self) -> Vec<f64> {
        let mut v: Vec<f64> = self.values().collect();
        v.sort_by(f64::total_cmp);
        v
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut out = WeightVector::new();
        for (k, v) in iter {
            out.increment(k, v);
        }
        out
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}={:.6}", k, v)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wv(pairs: &[(&str, f64)]) -> WeightVector {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_add_is_pure_and_unions_keys() {
        let a = wv(&[("lm", 1.0), ("tm", 2.0)]);
        let b = wv(&[("tm", 1.0), ("wp", -1.0)]);
        let c = a.add(&b, 2.0);

        assert_eq!(c.get("lm"), 1.0);
        assert_eq!(c.get("tm"), 4.0);
        assert_eq!(c.get("wp"), -2.0);
        // Operands untouched
        assert_eq!(a.get("tm"), 2.0);
        assert!(!a.contains("wp"));
    }

    #[test]
    fn test_l1_normalize() {
        let mut w = wv(&[("a", 2.0), ("b", -6.0)]);
        assert!(w.normalize());
        assert!((w.get("a") - 0.25).abs() < 1e-12);
        assert!((w.get("b") + 0.75).abs() < 1e-12);
        assert!((w.l1_norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_idempotent() {
        let mut w = wv(&[("a", 0.3), ("b", -1.7), ("c", 4.0)]);
        assert!(w.normalize());
        let once = w.clone();
        assert!(w.normalize());
        for (k, v) in once.iter() {
            assert!((w.get(k) - v).abs() < 1e-12);
        }
        assert!((w.l1_norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_zero_vector_is_noop() {
        let mut w = wv(&[("a", 0.0), ("b", 0.0)]);
        assert!(!w.normalize());
        assert_eq!(w, wv(&[("a", 0.0), ("b", 0.0)]));
        assert!(w.normalized().is_none());
        assert!(w.values().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_sum_squared_diff_over_union() {
        let a = wv(&[("x", 1.0), ("y", 2.0)]);
        let b = wv(&[("y", 4.0), ("z", 3.0)]);
        // x: 1, y: 4, z: 9
        assert_eq!(a.sum_squared_diff(&b), 14.0);
        assert_eq!(b.sum_squared_diff(&a), 14.0);
        assert_eq!(a.sum_squared_diff(&a), 0.0);
    }

    #[test]
    fn test_without_and_merged() {
        let w = wv(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let fixed = wv(&[("b", 9.0)]);

        let free = w.without(&fixed);
        assert!(!free.contains("b"));
        assert_eq!(free.len(), 2);

        let full = free.merged(&fixed);
        assert_eq!(full.get("b"), 9.0);
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn test_from_iter_sums_duplicates() {
        let w = wv(&[("a", 1.0), ("a", 0.5)]);
        assert_eq!(w.get("a"), 1.5);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_track_keeps_existing_value() {
        let mut w = wv(&[("a", 1.0)]);
        w.track("a");
        w.track("b");
        assert_eq!(w.get("a"), 1.0);
        assert!(w.contains("b"));
        assert_eq!(w.get("b"), 0.0);
    }
}
