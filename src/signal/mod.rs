//! Green-channel signal extraction and heart-rate estimation

pub mod buffer;
pub mod estimator;
pub mod filter;
pub mod roi;
pub mod smoother;
pub mod spectrum;

#[cfg(test)]
mod tests;

pub use buffer::{SignalBuffer, SignalSample};
pub use estimator::{HeartRateEstimator, HeartRateReading, Inconclusive};
pub use filter::ButterworthBandpass;
pub use roi::Roi;
pub use smoother::{BpmSmoother, BpmStatistics};
pub use spectrum::SpectrumBin;

use crate::config::{EstimatorConfig, SignalConfig, SmootherConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Read-only view of the signal path for status displays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub samples: usize,
    pub capacity: usize,
    pub fill_percent: f64,
    pub sample_rate: Option<f64>,
    /// Quality of the most recent evaluated window
    pub quality: Option<f64>,
    /// Band-restricted spectrum of the last accepted window
    pub spectrum: Vec<SpectrumBin>,
    pub bpm: Option<BpmStatistics>,
}

/// Buffer, estimator and smoother wired together.
///
/// Owned by the pipeline worker; nothing else mutates it.
#[derive(Debug)]
pub struct HeartRateTracker {
    buffer: SignalBuffer,
    window: usize,
    estimator: HeartRateEstimator,
    smoother: BpmSmoother,
    evaluations: u64,
    last_quality: Option<f64>,
    last_spectrum: Vec<SpectrumBin>,
}

impl HeartRateTracker {
    pub fn new(
        signal: &SignalConfig,
        estimator: &EstimatorConfig,
        smoother: &SmootherConfig,
    ) -> Self {
        Self {
            buffer: SignalBuffer::new(signal.capacity),
            window: signal.window,
            estimator: HeartRateEstimator::new(estimator.clone()),
            smoother: BpmSmoother::new(smoother.window, smoother.stats_history),
            evaluations: 0,
            last_quality: None,
            last_spectrum: Vec::new(),
        }
    }

    /// Buffer a sample and, once a full window is available, evaluate it.
    ///
    /// Returns None when no evaluation took place.
    pub fn push(&mut self, sample: SignalSample) -> Option<Result<HeartRateReading, Inconclusive>> {
        if !self.buffer.push(sample) || self.buffer.len() < self.window {
            return None;
        }

        let window = self.buffer.latest(self.window);
        let result = self.estimator.estimate(&window, self.smoother.current());
        self.evaluations += 1;

        match &result {
            Ok(reading) => {
                let smoothed = self.smoother.push(reading.bpm);
                debug!(
                    "Heart rate candidate {:.1} BPM (quality {:.2}, fs {:.2} Hz), smoothed {:.1} BPM",
                    reading.bpm, reading.quality, reading.sample_rate, smoothed
                );
                self.last_quality = Some(reading.quality);
                self.last_spectrum = reading.spectrum.clone();
            }
            Err(reason) => {
                trace!("Window inconclusive: {}", reason);
                self.last_quality = reason.quality();
            }
        }

        Some(result)
    }

    /// Current smoothed BPM
    pub fn bpm(&self) -> Option<f64> {
        self.smoother.current()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> SignalStats {
        SignalStats {
            samples: self.buffer.len(),
            capacity: self.buffer.capacity(),
            fill_percent: self.buffer.fill_percent(),
            sample_rate: self.buffer.sample_rate(),
            quality: self.last_quality,
            spectrum: self.last_spectrum.clone(),
            bpm: self.smoother.statistics(),
        }
    }

    /// Drop all buffered samples and smoothing history
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.smoother.reset();
        self.last_quality = None;
        self.last_spectrum.clear();
    }
}
