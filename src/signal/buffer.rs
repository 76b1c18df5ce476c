use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// One intensity reading taken from the ROI of a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    /// Seconds since the pipeline epoch
    pub timestamp: f64,
    /// Mean green intensity of the ROI
    pub value: f64,
}

impl SignalSample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Fixed-capacity sliding window of samples with FIFO eviction.
///
/// Timestamps are kept non-decreasing: a sample older than the newest one
/// already held is refused instead of being inserted out of order.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: VecDeque<SignalSample>,
    capacity: usize,
    evicted: u64,
}

impl SignalBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest when full. Returns false if the
    /// sample was refused (non-finite or older than the newest sample).
    pub fn push(&mut self, sample: SignalSample) -> bool {
        if !sample.timestamp.is_finite() || !sample.value.is_finite() {
            warn!("Refusing non-finite signal sample {:?}", sample);
            return false;
        }

        if let Some(last) = self.samples.back() {
            if sample.timestamp < last.timestamp {
                warn!(
                    "Refusing out-of-order signal sample at {:.3}s (newest is {:.3}s)",
                    sample.timestamp, last.timestamp
                );
                return false;
            }
        }

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(sample);
        true
    }

    /// Copy of the most recent `count` samples, oldest first
    pub fn latest(&self, count: usize) -> Vec<SignalSample> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalSample> {
        self.samples.iter()
    }

    /// Sampling rate measured from the buffered timestamps
    pub fn sample_rate(&self) -> Option<f64> {
        measured_sample_rate(self.samples.iter().map(|s| s.timestamp))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples evicted since creation or the last clear
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn fill_percent(&self) -> f64 {
        self.samples.len() as f64 / self.capacity as f64 * 100.0
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }
}

/// `(n - 1) / (t_last - t_first)`: n samples span n - 1 intervals
pub(crate) fn measured_sample_rate<I>(timestamps: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut iter = timestamps.into_iter();
    let first = iter.next()?;
    let (count, last) = iter.fold((1usize, first), |(n, _), t| (n + 1, t));
    let span = last - first;
    if count < 2 || span <= 0.0 {
        return None;
    }
    Some((count - 1) as f64 / span)
}
