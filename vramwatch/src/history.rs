//! Bounded history buffer for GPU snapshots, plus the rolling statistics over it.

use std::collections::VecDeque;

use crate::types::{Snapshot, Summary, Trend, WindowStats};

/// Number of samples the trend looks back over (newest vs. oldest of the last N).
pub const TREND_SPAN: usize = 5;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    while dq.len() >= cap.max(1) {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Fixed-capacity FIFO of snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Snapshot>,
    cap: usize,
}

impl HistoryBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, snap: Snapshot) {
        push_capped(&mut self.entries, snap, self.cap);
    }

    // Shrinking drops the oldest entries first.
    pub fn set_capacity(&mut self, cap: usize) {
        self.cap = cap.max(1);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Snapshot> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn summary(&self, window: usize) -> Summary {
        let percents: Vec<f64> = self.entries.iter().map(|s| s.percent_used).collect();
        summarize(&percents, window)
    }
}

/// Average/max/min over the last `window` values and the five-sample trend.
/// Stats are omitted when fewer than two values are available.
pub fn summarize(percents: &[f64], window: usize) -> Summary {
    let start = percents.len().saturating_sub(window.max(1));
    let recent = &percents[start..];

    let stats = if percents.len() > 1 && !recent.is_empty() {
        let sum: f64 = recent.iter().sum();
        let max = recent.iter().copied().fold(f64::MIN, f64::max);
        let min = recent.iter().copied().fold(f64::MAX, f64::min);
        Some(WindowStats {
            average: sum / recent.len() as f64,
            max,
            min,
        })
    } else {
        None
    };

    Summary {
        samples: recent.len(),
        stats,
        trend: trend(percents),
    }
}

pub fn trend(percents: &[f64]) -> Trend {
    if percents.len() < TREND_SPAN {
        return Trend::Unknown;
    }
    let newest = percents[percents.len() - 1];
    let base = percents[percents.len() - TREND_SPAN];
    if newest > base {
        Trend::Increasing
    } else if newest < base {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
