use super::buffer::{measured_sample_rate, SignalSample};
use super::filter::{ButterworthBandpass, FilterDesignError};
use super::spectrum::{self, SpectrumBin, FLAT_EPSILON};
use crate::config::EstimatorConfig;
use thiserror::Error;

/// Accepted heart-rate candidate for one window
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateReading {
    pub bpm: f64,
    pub frequency_hz: f64,
    /// Peak magnitude over mean magnitude inside the band
    pub quality: f64,
    /// Sampling rate measured from the window's timestamps
    pub sample_rate: f64,
    /// Magnitude spectrum restricted to the physiological band
    pub spectrum: Vec<SpectrumBin>,
}

/// Why a window produced no candidate. These are expected outcomes, not faults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Inconclusive {
    #[error("window has {got} samples, at least {need} required")]
    TooFewSamples { got: usize, need: usize },

    #[error("window timestamps span no time")]
    NoTimeSpan,

    #[error("cannot design bandpass: {0}")]
    Filter(#[from] FilterDesignError),

    #[error("signal is flat")]
    FlatSignal,

    #[error("only {ratio:.4} of signal power lies in band")]
    OutOfBand { ratio: f64 },

    #[error("no spectrum bins inside band")]
    EmptyBand,

    #[error("signal quality {quality:.2} below {threshold:.2}")]
    LowQuality { quality: f64, threshold: f64 },

    #[error("{bpm:.1} BPM outside plausible range")]
    OutOfRange { bpm: f64 },

    #[error("{bpm:.1} BPM jumps more than {limit:.0} from {reference:.1}")]
    Jump { bpm: f64, reference: f64, limit: f64 },
}

impl Inconclusive {
    /// Quality figure when the window got far enough to compute one
    pub fn quality(&self) -> Option<f64> {
        match self {
            Self::LowQuality { quality, .. } => Some(*quality),
            _ => None,
        }
    }
}

/// Shortest window a bandpass of `filter_order` can be run forward-backward over
pub fn min_samples_for_order(filter_order: usize) -> usize {
    3 * (2 * filter_order + 1) + 1
}

/// Spectral heart-rate estimation over a window of green-channel samples.
///
/// Pure: the outcome depends only on the window and the reference BPM.
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    config: EstimatorConfig,
}

impl HeartRateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Fewest samples a window may hold; the zero-phase filter pads by this much
    pub fn min_samples(&self) -> usize {
        min_samples_for_order(self.config.filter_order)
    }

    /// Estimate the heart rate from `window`, rejecting candidates that jump
    /// more than the configured limit away from `reference_bpm`
    pub fn estimate(
        &self,
        window: &[SignalSample],
        reference_bpm: Option<f64>,
    ) -> Result<HeartRateReading, Inconclusive> {
        let cfg = &self.config;

        let need = self.min_samples();
        if window.len() < need {
            return Err(Inconclusive::TooFewSamples {
                got: window.len(),
                need,
            });
        }

        let sample_rate = measured_sample_rate(window.iter().map(|s| s.timestamp))
            .ok_or(Inconclusive::NoTimeSpan)?;
        let filter =
            ButterworthBandpass::design(cfg.filter_order, cfg.low_hz, cfg.high_hz, sample_rate)?;

        let raw: Vec<f64> = window.iter().map(|s| s.value).collect();
        let raw_detrended = spectrum::detrend(&raw);
        if spectrum::mean_std(&raw_detrended).1 < FLAT_EPSILON {
            return Err(Inconclusive::FlatSignal);
        }

        // Mostly out-of-band content leaves only filter leakage in the band
        let raw_spectrum = spectrum::magnitude_spectrum(
            &spectrum::apply_hamming(&raw_detrended),
            sample_rate,
            cfg.min_fft_len,
        );
        let ratio = spectrum::band_power_ratio(&raw_spectrum, cfg.low_hz, cfg.high_hz);
        if ratio < cfg.min_band_energy_ratio {
            return Err(Inconclusive::OutOfBand { ratio });
        }

        let filtered = filter.filtfilt(&raw);
        let normalized =
            spectrum::zscore(&spectrum::detrend(&filtered)).ok_or(Inconclusive::FlatSignal)?;

        let full = spectrum::magnitude_spectrum(
            &spectrum::apply_hamming(&normalized),
            sample_rate,
            cfg.min_fft_len,
        );
        let band = spectrum::band(&full, cfg.low_hz, cfg.high_hz);
        let peak = band
            .iter()
            .copied()
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
            .ok_or(Inconclusive::EmptyBand)?;

        let mean = band.iter().map(|b| b.magnitude).sum::<f64>() / band.len() as f64;
        let quality = if mean > 0.0 { peak.magnitude / mean } else { 0.0 };
        if quality < cfg.min_quality {
            return Err(Inconclusive::LowQuality {
                quality,
                threshold: cfg.min_quality,
            });
        }

        let bpm = peak.frequency_hz * 60.0;
        if !(bpm > cfg.min_bpm && bpm < cfg.max_bpm) {
            return Err(Inconclusive::OutOfRange { bpm });
        }

        if let Some(reference) = reference_bpm {
            if (bpm - reference).abs() > cfg.max_jump_bpm {
                return Err(Inconclusive::Jump {
                    bpm,
                    reference,
                    limit: cfg.max_jump_bpm,
                });
            }
        }

        Ok(HeartRateReading {
            bpm,
            frequency_hz: peak.frequency_hz,
            quality,
            sample_rate,
            spectrum: band,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn window_of<F: FnMut(f64) -> f64>(n: usize, fs: f64, mut f: F) -> Vec<SignalSample> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                SignalSample::new(t, f(t))
            })
            .collect()
    }

    fn estimator() -> HeartRateEstimator {
        HeartRateEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn test_clean_sinusoid_recovered() {
        for &hz in &[1.0, 1.2, 1.5, 2.0] {
            let window = window_of(240, 30.0, |t| 100.0 + (2.0 * PI * hz * t).sin());
            let reading = estimator().estimate(&window, None).unwrap();
            assert!(
                (reading.bpm - hz * 60.0).abs() <= 2.0,
                "{} Hz gave {} BPM",
                hz,
                reading.bpm
            );
            assert!((reading.sample_rate - 30.0).abs() < 1e-9);
            assert!(reading.quality >= 2.0);
            assert!(reading
                .spectrum
                .iter()
                .all(|b| (0.75..=3.0).contains(&b.frequency_hz)));
        }
    }

    #[test]
    fn test_uses_measured_sample_rate() {
        // 25 fps timestamps with a 1.25 Hz pulse
        let window = window_of(240, 25.0, |t| 80.0 + 0.5 * (2.0 * PI * 1.25 * t).sin());
        let reading = estimator().estimate(&window, None).unwrap();
        assert!((reading.sample_rate - 25.0).abs() < 1e-9);
        assert!((reading.bpm - 75.0).abs() <= 2.0);
    }

    #[test]
    fn test_flat_signal_is_inconclusive() {
        let window = window_of(240, 30.0, |_| 128.0);
        assert_eq!(
            estimator().estimate(&window, None),
            Err(Inconclusive::FlatSignal)
        );
    }

    #[test]
    fn test_out_of_band_tones_are_inconclusive() {
        for &hz in &[0.3, 5.0] {
            let window = window_of(240, 30.0, |t| 100.0 + 2.0 * (2.0 * PI * hz * t).sin());
            let result = estimator().estimate(&window, None);
            assert!(result.is_err(), "{} Hz produced {:?}", hz, result);
        }
    }

    #[test]
    fn test_jump_against_reference_rejected() {
        let window = window_of(240, 30.0, |t| 100.0 + (2.0 * PI * 2.0 * t).sin());
        let err = estimator().estimate(&window, Some(70.0)).unwrap_err();
        assert!(matches!(err, Inconclusive::Jump { reference, .. } if reference == 70.0));

        // Within the limit it passes
        assert!(estimator().estimate(&window, Some(110.0)).is_ok());
    }

    #[test]
    fn test_short_or_timeless_window() {
        let short = window_of(10, 30.0, |t| t.sin());
        assert!(matches!(
            estimator().estimate(&short, None),
            Err(Inconclusive::TooFewSamples { got: 10, .. })
        ));

        let frozen: Vec<SignalSample> = (0..240)
            .map(|i| SignalSample::new(5.0, i as f64))
            .collect();
        assert_eq!(
            estimator().estimate(&frozen, None),
            Err(Inconclusive::NoTimeSpan)
        );
    }

    #[test]
    fn test_sample_rate_below_band_rejected() {
        // 4 fps cannot carry a 3 Hz upper edge
        let window = window_of(240, 4.0, |t| (2.0 * PI * 1.0 * t).sin());
        assert!(matches!(
            estimator().estimate(&window, None),
            Err(Inconclusive::Filter(_))
        ));
    }

    #[test]
    fn test_noise_like_window_has_low_quality_or_is_rejected() {
        // Deterministic broadband sequence
        let mut state = 0x2545_f491_u64;
        let window = window_of(240, 30.0, |_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1000) as f64 / 100.0
        });
        let strict = HeartRateEstimator::new(EstimatorConfig {
            min_quality: 50.0,
            ..EstimatorConfig::default()
        });
        let err = strict.estimate(&window, None).unwrap_err();
        assert!(err.quality().is_some_and(|q| q < 50.0));
    }
}
