use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Standard deviations below this count as a flat signal
pub const FLAT_EPSILON: f64 = 1e-9;

/// One bin of a one-sided magnitude spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumBin {
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Remove the least-squares linear trend
pub fn detrend(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let t_mean = (n - 1) as f64 / 2.0;
    let v_mean = values.iter().sum::<f64>() / n as f64;
    let (mut cov, mut var) = (0.0, 0.0);
    for (i, v) in values.iter().enumerate() {
        let dt = i as f64 - t_mean;
        cov += dt * (v - v_mean);
        var += dt * dt;
    }
    let slope = cov / var;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| v - (v_mean + slope * (i as f64 - t_mean)))
        .collect()
}

/// Zero mean, unit variance. None for a flat input.
pub fn zscore(values: &[f64]) -> Option<Vec<f64>> {
    let (mean, std) = mean_std(values);
    if std < FLAT_EPSILON {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / std).collect())
}

/// Symmetric Hamming window
pub fn hamming(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Multiply by a Hamming window of the same length
pub fn apply_hamming(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(hamming(values.len()))
        .map(|(v, w)| v * w)
        .collect()
}

/// FFT length for `len` samples: next power of two, never below `min_len`
pub fn fft_len(len: usize, min_len: usize) -> usize {
    len.max(min_len).max(1).next_power_of_two()
}

/// One-sided magnitude spectrum of a real signal, zero-padded to `fft_len(values.len(), min_len)`
pub fn magnitude_spectrum(values: &[f64], sample_rate: f64, min_len: usize) -> Vec<SpectrumBin> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = fft_len(values.len(), min_len);
    let mut buffer: Vec<Complex64> = values
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .chain(std::iter::repeat(Complex64::new(0.0, 0.0)))
        .take(n)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let resolution = sample_rate / n as f64;
    buffer
        .iter()
        .take(n / 2 + 1)
        .enumerate()
        .map(|(k, c)| SpectrumBin {
            frequency_hz: k as f64 * resolution,
            magnitude: c.norm(),
        })
        .collect()
}

/// Bins whose frequency lies inside `[low_hz, high_hz]`
pub fn band(spectrum: &[SpectrumBin], low_hz: f64, high_hz: f64) -> Vec<SpectrumBin> {
    spectrum
        .iter()
        .filter(|b| b.frequency_hz >= low_hz && b.frequency_hz <= high_hz)
        .copied()
        .collect()
}

/// Share of non-DC power that falls inside `[low_hz, high_hz]`
pub fn band_power_ratio(spectrum: &[SpectrumBin], low_hz: f64, high_hz: f64) -> f64 {
    let (mut in_band, mut total) = (0.0, 0.0);
    for bin in spectrum.iter().skip(1) {
        let power = bin.magnitude * bin.magnitude;
        total += power;
        if bin.frequency_hz >= low_hz && bin.frequency_hz <= high_hz {
            in_band += power;
        }
    }
    if total <= 0.0 {
        0.0
    } else {
        in_band / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detrend_removes_line() {
        let line: Vec<f64> = (0..50).map(|i| 3.0 + 0.25 * i as f64).collect();
        assert!(detrend(&line).iter().all(|v| v.abs() < 1e-9));
        assert_eq!(detrend(&[5.0]), vec![0.0]);
    }

    #[test]
    fn test_zscore_normalizes_or_rejects_flat() {
        let z = zscore(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let (mean, std) = mean_std(&z);
        assert!(mean.abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
        assert!(zscore(&[4.2; 10]).is_none());
    }

    #[test]
    fn test_hamming_endpoints_and_peak() {
        let w = hamming(11);
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[10] - 0.08).abs() < 1e-12);
        assert!((w[5] - 1.0).abs() < 1e-12);
        assert_eq!(hamming(1), vec![1.0]);
        assert!(hamming(0).is_empty());
    }

    #[test]
    fn test_fft_len_padding() {
        assert_eq!(fft_len(240, 1024), 1024);
        assert_eq!(fft_len(1500, 1024), 2048);
        assert_eq!(fft_len(0, 0), 1);
    }

    #[test]
    fn test_spectrum_peak_at_tone_frequency() {
        let fs = 30.0;
        let tone: Vec<f64> = (0..240)
            .map(|i| (2.0 * PI * 2.0 * i as f64 / fs).sin())
            .collect();
        let spectrum = magnitude_spectrum(&apply_hamming(&tone), fs, 1024);
        assert_eq!(spectrum.len(), 513);

        let peak = spectrum
            .iter()
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
            .unwrap();
        assert!((peak.frequency_hz - 2.0).abs() < fs / 1024.0);

        let in_band = band(&spectrum, 1.5, 2.5);
        assert!(in_band.iter().all(|b| (1.5..=2.5).contains(&b.frequency_hz)));
        assert!(band_power_ratio(&spectrum, 1.5, 2.5) > 0.95);
        assert!(band_power_ratio(&spectrum, 5.0, 6.0) < 0.01);
    }
}
