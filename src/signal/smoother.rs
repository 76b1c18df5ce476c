use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Average, minimum and maximum over recent smoothed values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmStatistics {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Moving mean over the last `window` accepted candidates.
///
/// Each push also records the smoothed output in a longer bounded history
/// that backs [`BpmSmoother::statistics`].
#[derive(Debug, Clone)]
pub struct BpmSmoother {
    candidates: VecDeque<f64>,
    window: usize,
    history: VecDeque<f64>,
    history_len: usize,
}

impl BpmSmoother {
    pub fn new(window: usize, history_len: usize) -> Self {
        let window = window.max(1);
        let history_len = history_len.max(1);
        Self {
            candidates: VecDeque::with_capacity(window),
            window,
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    /// Add an accepted candidate and return the new smoothed value
    pub fn push(&mut self, bpm: f64) -> f64 {
        if self.candidates.len() == self.window {
            self.candidates.pop_front();
        }
        self.candidates.push_back(bpm);

        let smoothed = mean(&self.candidates);
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(smoothed);
        smoothed
    }

    /// Current smoothed value, None until the first candidate arrives
    pub fn current(&self) -> Option<f64> {
        if self.candidates.is_empty() {
            None
        } else {
            Some(mean(&self.candidates))
        }
    }

    pub fn statistics(&self) -> Option<BpmStatistics> {
        if self.history.is_empty() {
            return None;
        }
        let (min, max) = self
            .history
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Some(BpmStatistics {
            average: mean(&self.history),
            min,
            max,
            count: self.history.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
        self.history.clear();
    }
}

fn mean(values: &VecDeque<f64>) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
