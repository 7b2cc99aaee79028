//! Best-so-far weights shared by all search workers.

use parking_lot::Mutex;
use tracing::info;

use crate::weights::WeightVector;

#[derive(Debug, Clone)]
struct Holder {
    weights: WeightVector,
    objective: f64,
    /// Starting point that produced `weights`; `None` for the initial weights.
    point: Option<usize>,
    trajectory: Vec<f64>,
}

/// Snapshot of the current best.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSnapshot {
    pub weights: WeightVector,
    pub objective: f64,
    pub point: Option<usize>,
}

/// Compare-and-replace record of the lowest objective seen.
///
/// An offer wins on a strictly lower objective, or on an equal objective from
/// a lower-numbered starting point than the current holder. The initial
/// weights only yield to strict improvements. Either way the final holder
/// does not depend on the order in which workers finish.
pub struct GlobalBest {
    inner: Mutex<Holder>,
}

impl GlobalBest {
    pub fn new(weights: WeightVector, objective: f64) -> Self {
        Self {
            inner: Mutex::new(Holder {
                weights,
                objective,
                point: None,
                trajectory: vec![objective],
            }),
        }
    }

    /// Offer the result of starting point `point`. Returns whether it was taken.
    pub fn offer(&self, weights: &WeightVector, objective: f64, point: usize) -> bool {
        let mut holder = self.inner.lock();
        let wins = objective < holder.objective
            || (objective == holder.objective && holder.point.is_some_and(|p| point < p));
        if !wins {
            return false;
        }

        info!(
            point,
            objective,
            previous = holder.objective,
            "new global best"
        );
        holder.weights = weights.clone();
        holder.objective = objective;
        holder.point = Some(point);
        holder.trajectory.push(objective);
        true
    }

    pub fn snapshot(&self) -> BestSnapshot {
        let holder = self.inner.lock();
        BestSnapshot {
            weights: holder.weights.clone(),
            objective: holder.objective,
            point: holder.point,
        }
    }

    /// Objectives of every accepted offer, starting with the initial one.
    pub fn trajectory(&self) -> Vec<f64> {
        self.inner.lock().trajectory.clone()
    }

    pub fn into_snapshot(self) -> BestSnapshot {
        let holder = self.inner.into_inner();
        BestSnapshot {
            weights: holder.weights,
            objective: holder.objective,
            point: holder.point,
        }
    }
}
