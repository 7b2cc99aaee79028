//! Segment tree over per-slot sufficient statistics.
//!
//! Additive corpus metrics need the column sums of a `slots × dim` matrix
//! that changes one row at a time. A running sum would make the totals depend
//! on the order of updates (floating point addition is not associative), so
//! a replacement followed by its inverse would not restore the exact value.
//! Every internal node here is recomputed from its two children, which makes
//! the root a pure function of the current leaves: same selection, same bits,
//! regardless of history. Updates cost O(dim · log slots).

#[derive(Debug, Clone)]
pub struct StatTree {
    dim: usize,
    /// Number of leaves, a power of two.
    width: usize,
    /// Heap layout: node `i` has children `2i` and `2i + 1`, root at 1.
    nodes: Vec<f64>,
}

impl StatTree {
    /// All `slots` leaves start unset (zero).
    pub fn new(slots: usize, dim: usize) -> Self {
        let width = slots.max(1).next_power_of_two();
        Self {
            dim,
            width,
            nodes: vec![0.0; 2 * width * dim],
        }
    }

    /// Replace the statistics of `slot`. `None` clears it; short rows are
    /// zero-padded and extra columns ignored.
    pub fn set(&mut self, slot: usize, stats: Option<&[f64]>) {
        debug_assert!(slot < self.width, "slot {} out of range", slot);
        let dim = self.dim;
        let mut node = self.width + slot;

        let leaf = &mut self.nodes[node * dim..(node + 1) * dim];
        leaf.fill(0.0);
        if let Some(stats) = stats {
            for (dst, src) in leaf.iter_mut().zip(stats) {
                *dst = *src;
            }
        }

        while node > 1 {
            node /= 2;
            let (left, right) = (2 * node, 2 * node + 1);
            for d in 0..dim {
                self.nodes[node * dim + d] = self.nodes[left * dim + d] + self.nodes[right * dim + d];
            }
        }
    }

    /// Column sums over all slots.
    pub fn totals(&self) -> &[f64] {
        &self.nodes[self.dim..2 * self.dim]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_track_updates() {
        let mut t = StatTree::new(3, 2);
        assert_eq!(t.totals(), &[0.0, 0.0]);

        t.set(0, Some(&[1.0, 2.0]));
        t.set(2, Some(&[3.0, 4.0]));
        assert_eq!(t.totals(), &[4.0, 6.0]);

        t.set(0, None);
        assert_eq!(t.totals(), &[3.0, 4.0]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut t = StatTree::new(2, 3);
        t.set(1, Some(&[5.0]));
        assert_eq!(t.totals(), &[5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_history_independent() {
        let vals = [0.1, 0.2, 0.3, 1e16, -1e16, 0.7];

        let mut direct = StatTree::new(vals.len(), 1);
        for (i, v) in vals.iter().enumerate() {
            direct.set(i, Some(&[*v]));
        }

        let mut churned = StatTree::new(vals.len(), 1);
        for (i, v) in vals.iter().enumerate().rev() {
            churned.set(i, Some(&[v * 3.0 + 1.0]));
        }
        for (i, v) in vals.iter().enumerate() {
            churned.set(i, Some(&[*v]));
        }

        assert_eq!(direct.totals()[0].to_bits(), churned.totals()[0].to_bits());
    }
}
