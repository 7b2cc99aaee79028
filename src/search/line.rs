//! Exact line search along a direction in weight space.
//!
//! Along the ray `w + t·d`, every candidate's score is an affine function of
//! the step `t`:
//!
//! ```text
//! score(c, t) = w·f(c) + t · d·f(c)      (intercept + t · slope)
//! ```
//!
//! so each slot's winner as a function of `t` is the upper envelope of a set
//! of lines, and the whole corpus selection is piecewise constant with
//! breakpoints wherever some slot's winner changes. The search:
//!
//! 1. walks each slot's envelope from `t = −∞`, recording `(t, slot, winner)`
//! 2. merges and sorts all breakpoints; consecutive distinct values bound
//!    intervals on which the selection is constant
//! 3. sweeps left to right with one incremental metric state, replacing only
//!    the slots that change at each breakpoint
//! 4. smooths the per-interval scores over a small window (`min` or `avg`)
//! 5. returns the weights at the best interval's checkpoint, L1-normalized
//!    unless fixed weights are present
//!
//! ```text
//!  metric
//!    │      ┌──┐
//!    │   ┌──┘  └─┐    ┌─────
//!    │───┘       └────┘
//!    └───┼──┼──┼──┼────┼─────► t
//!       b1  b2 b3 b4   b5
//! ```
//!
//! The sweep costs one `set` per recorded breakpoint plus one `score` per
//! interval, independent of corpus size.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::Corpus;
use crate::error::TuneError;
use crate::metrics::EvaluationMetric;
use crate::weights::WeightVector;

/// Reducer applied over the smoothing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    /// Worst score in the window: prefers steps that stay good under small perturbation.
    #[default]
    Min,
    /// Mean score in the window.
    Avg,
}

impl FromStr for Smoothing {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "min" => Ok(Self::Min),
            "avg" | "average" => Ok(Self::Avg),
            other => Err(TuneError::InvalidConfig(format!(
                "unknown smoothing '{}' (expected min or avg)",
                other
            ))),
        }
    }
}

impl fmt::Display for Smoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "min"),
            Self::Avg => write!(f, "avg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSearchConfig {
    pub smoothing: Smoothing,
    /// Half-width of the smoothing window, in intervals.
    pub window: usize,
    /// Breakpoints closer than this to the previous one in the same slot are skipped.
    pub min_plateau_gap: f64,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::Min,
            window: 1,
            min_plateau_gap: 0.0,
        }
    }
}

/// Reduce `values[pos - window ..= pos + window]`, clipped to the slice.
pub fn window_smooth(values: &[f64], pos: usize, window: usize, smoothing: Smoothing) -> f64 {
    let start = pos.saturating_sub(window);
    let end = (pos + window + 1).min(values.len());
    let span = &values[start..end];

    match smoothing {
        Smoothing::Min => span.iter().copied().fold(f64::INFINITY, f64::min),
        Smoothing::Avg => span.iter().sum::<f64>() / span.len() as f64,
    }
}

/// One interval of constant selection along the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Representative step inside the interval.
    pub checkpoint: f64,
    /// Raw metric of the interval's selection.
    pub score: f64,
    /// Score after window smoothing.
    pub smoothed: f64,
}

/// Result of scanning one direction.
#[derive(Debug, Clone)]
pub struct DirectionScan {
    pub intervals: Vec<Interval>,
    /// Number of distinct breakpoint values.
    pub breakpoints: usize,
}

impl DirectionScan {
    /// Index of the interval with the highest smoothed score.
    ///
    /// Equal smoothed scores are broken by the raw score, then by position.
    pub fn best(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, iv) in self.intervals.iter().enumerate() {
            let better = match best {
                None => !iv.smoothed.is_nan(),
                Some(b) => {
                    let cur = &self.intervals[b];
                    iv.smoothed > cur.smoothed || (iv.smoothed == cur.smoothed && iv.score > cur.score)
                }
            };
            if better {
                best = Some(i);
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
pub struct LineSearchOutcome {
    /// New free weights (fixed weights excluded). L1-normalized only when
    /// there are no fixed weights, since those pin the scale of the free ones.
    pub weights: WeightVector,
    /// Chosen step, `None` when the direction moves no slot's winner.
    pub step: Option<f64>,
    /// Smoothed score of the chosen interval.
    pub score: f64,
    pub breakpoints: usize,
}

/// Upper envelope of the lines `intercepts[i] + t * slopes[i]`.
///
/// Returns the winner at `t → −∞` and the `(t, new_winner)` transitions in
/// increasing `t`. Ties at `−∞` go to the larger intercept, then the lower
/// index; ties between crossings at the same `t` go to the steeper line.
pub fn upper_envelope(slopes: &[f64], intercepts: &[f64], min_gap: f64) -> (usize, Vec<(f64, usize)>) {
    debug_assert_eq!(slopes.len(), intercepts.len());
    let n = slopes.len();

    let mut first = 0;
    for i in 1..n {
        if slopes[i] < slopes[first] || (slopes[i] == slopes[first] && intercepts[i] > intercepts[first]) {
            first = i;
        }
    }

    let mut transitions = Vec::new();
    let mut current = first;
    let mut limit = f64::NEG_INFINITY;

    loop {
        let mut next: Option<usize> = None;
        let mut nearest = f64::INFINITY;

        for i in 0..n {
            // Only a steeper line can overtake the current winner
            if !(slopes[i] > slopes[current]) {
                continue;
            }
            let t = (intercepts[current] - intercepts[i]) / (slopes[i] - slopes[current]);
            // Also rejects NaN
            if !(t > limit + min_gap) {
                continue;
            }
            let steeper_tie = t == nearest && next.is_some_and(|j| slopes[i] > slopes[j]);
            if t < nearest || steeper_tie {
                nearest = t;
                next = Some(i);
            }
        }

        match next {
            Some(i) if nearest.is_finite() => {
                transitions.push((nearest, i));
                limit = nearest;
                current = i;
            }
            _ => break,
        }
    }

    (first, transitions)
}

/// Line search over a fixed corpus and metric.
pub struct LineSearcher<'a> {
    corpus: &'a Corpus,
    metric: &'a dyn EvaluationMetric,
    fixed: &'a WeightVector,
    config: &'a LineSearchConfig,
}

impl<'a> LineSearcher<'a> {
    pub fn new(
        corpus: &'a Corpus,
        metric: &'a dyn EvaluationMetric,
        fixed: &'a WeightVector,
        config: &'a LineSearchConfig,
    ) -> Self {
        Self {
            corpus,
            metric,
            fixed,
            config,
        }
    }

    /// Score every interval of constant selection along `weights + t·direction`.
    pub fn scan(&self, weights: &WeightVector, direction: &WeightVector) -> DirectionScan {
        let origin = weights.merged(self.fixed);
        let base = self.corpus.densify(&origin);
        let dir = self.corpus.densify(direction);

        let n_slots = self.corpus.len();
        let mut initial = Vec::with_capacity(n_slots);
        let mut breaks: Vec<(f64, usize, usize)> = Vec::new();
        let mut slopes = Vec::new();
        let mut intercepts = Vec::new();

        for (slot, set) in self.corpus.slots().iter().enumerate() {
            slopes.clear();
            intercepts.clear();
            for cand in set {
                slopes.push(cand.dot(&dir));
                intercepts.push(cand.dot(&base));
            }
            let (first, transitions) = upper_envelope(&slopes, &intercepts, self.config.min_plateau_gap);
            initial.push(first);
            breaks.extend(transitions.into_iter().map(|(t, cand)| (t, slot, cand)));
        }

        // Stable: equal breakpoints keep slot order
        breaks.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut state = self.metric.begin(n_slots);
        for (slot, &cand) in initial.iter().enumerate() {
            state.set(slot, Some(&self.corpus.slot(slot)[cand]));
        }

        let mut scores = vec![state.score()];
        let mut distinct: Vec<f64> = Vec::new();
        let mut i = 0;
        while i < breaks.len() {
            let t = breaks[i].0;
            while i < breaks.len() && breaks[i].0 == t {
                let (_, slot, cand) = breaks[i];
                state.set(slot, Some(&self.corpus.slot(slot)[cand]));
                i += 1;
            }
            distinct.push(t);
            scores.push(state.score());
        }

        let k = distinct.len();
        let intervals = (0..=k)
            .map(|i| {
                let checkpoint = if k == 0 {
                    0.0
                } else if i == 0 {
                    distinct[0] - 1.0
                } else if i == k {
                    distinct[k - 1] + 1.0
                } else {
                    let (lo, hi) = (distinct[i - 1], distinct[i]);
                    if lo < 0.0 && hi > 0.0 { 0.0 } else { (lo + hi) / 2.0 }
                };
                Interval {
                    checkpoint,
                    score: scores[i],
                    smoothed: window_smooth(&scores, i, self.config.window, self.config.smoothing),
                }
            })
            .collect();

        DirectionScan {
            intervals,
            breakpoints: k,
        }
    }

    /// Move to the best point along `direction`.
    pub fn search(&self, weights: &WeightVector, direction: &WeightVector) -> LineSearchOutcome {
        let scan = self.scan(weights, direction);

        let best = match scan.best() {
            Some(best) if scan.breakpoints > 0 => best,
            _ => {
                return LineSearchOutcome {
                    weights: weights.clone(),
                    step: None,
                    score: scan.intervals.first().map_or(f64::NEG_INFINITY, |iv| iv.smoothed),
                    breakpoints: scan.breakpoints,
                };
            }
        };

        let chosen = scan.intervals[best];
        debug!(
            breakpoints = scan.breakpoints,
            step = chosen.checkpoint,
            score = chosen.smoothed,
            "line search"
        );

        let mut moved = weights.merged(self.fixed).add(direction, chosen.checkpoint);
        // Fixed weights pin the scale of the free ones; only rescale when there are none
        if self.fixed.is_empty() && !moved.normalize() {
            warn!("line search landed on a zero weight vector; leaving it unnormalized");
        }
        moved.remove_keys(self.fixed.keys());

        LineSearchOutcome {
            weights: moved,
            step: Some(chosen.checkpoint),
            score: chosen.smoothed,
            breakpoints: scan.breakpoints,
        }
    }
}
