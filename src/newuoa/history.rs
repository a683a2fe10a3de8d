//! Bounded record of evaluated points.
//!
//! The history keeps at most `capacity` entries. When it is full, recording a
//! new evaluation drops the oldest one, so the buffer always holds the most
//! recent `min(nf, capacity)` evaluations in the order they were made.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One objective evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The evaluated point
    pub x: Array1<f64>,

    /// The objective value at `x`
    pub f: f64,
}

/// Capped, length-tracked sequence of evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl History {
    /// Creates an empty history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    /// Records an evaluation, evicting the oldest entry when full.
    pub fn record(&mut self, x: &Array1<f64>, f: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { x: x.clone(), f });
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Objective values from oldest to newest.
    pub fn fhist(&self) -> Array1<f64> {
        self.entries.iter().map(|e| e.f).collect()
    }

    /// Points from oldest to newest, one per row.
    pub fn xhist(&self) -> Array2<f64> {
        let n = self.entries.front().map_or(0, |e| e.x.len());
        let mut xhist = Array2::zeros((self.entries.len(), n));
        for (mut row, entry) in xhist.rows_mut().into_iter().zip(self.entries.iter()) {
            row.assign(&entry.x);
        }
        xhist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_records_until_full() {
        let mut history = History::new(3);
        assert!(history.is_empty());

        history.record(&array![0.0, 1.0], 5.0);
        history.record(&array![1.0, 1.0], 4.0);
        assert_eq!(history.len(), 2);
        assert_eq!(history.fhist(), array![5.0, 4.0]);
        assert_eq!(history.iter().last().unwrap().f, 4.0);
    }

    #[test]
    fn test_keeps_most_recent_entries() {
        let mut history = History::new(2);
        for i in 0..5 {
            history.record(&array![i as f64], 10.0 - i as f64);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.capacity(), 2);
        assert_eq!(history.fhist(), array![7.0, 6.0]);
        assert_eq!(history.xhist(), array![[3.0], [4.0]]);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut history = History::new(0);
        history.record(&array![1.0], 1.0);
        assert!(history.is_empty());
        assert_eq!(history.xhist().dim(), (0, 0));
    }
}
