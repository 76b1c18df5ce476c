//! Butterworth bandpass design and zero-phase filtering.
//!
//! The filter is designed in zero/pole/gain form (analog prototype, lowpass to
//! bandpass transform, bilinear transform with pre-warping) and realised as a
//! cascade of second-order sections, which stays well conditioned at orders
//! where the expanded transfer-function polynomials do not.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;
use thiserror::Error;

/// Imaginary parts below this are treated as real poles when pairing sections
const REAL_POLE_EPS: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterDesignError {
    #[error("filter order must be at least 1")]
    ZeroOrder,

    #[error("band {low_hz}..{high_hz} Hz is not inside (0, {nyquist_hz}) Hz")]
    InvalidBand {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },
}

/// Second-order section in transposed direct form II, `a[0] == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// DC gain of the section
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (self.a[0] + self.a[1] + self.a[2])
    }

    /// Delay-line state for which a unit constant input is already at steady state
    fn steady_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * g;
        let z1 = self.b[1] + self.b[2] - (self.a[1] + self.a[2]) * g;
        [z1, z2]
    }

    fn run(&self, signal: &mut [f64], mut z: [f64; 2]) {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        for x in signal.iter_mut() {
            let input = *x;
            let y = b0 * input + z[0];
            z[0] = b1 * input - a1 * y + z[1];
            z[1] = b2 * input - a2 * y;
            *x = y;
        }
    }
}

/// Digital Butterworth bandpass as a cascade of biquads
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthBandpass {
    sections: Vec<Biquad>,
}

impl ButterworthBandpass {
    /// Design an `order`-th order bandpass (2 × order poles) for a signal sampled at `sample_rate`
    pub fn design(
        order: usize,
        low_hz: f64,
        high_hz: f64,
        sample_rate: f64,
    ) -> Result<Self, FilterDesignError> {
        if order == 0 {
            return Err(FilterDesignError::ZeroOrder);
        }

        let nyquist_hz = sample_rate / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist_hz) {
            return Err(FilterDesignError::InvalidBand {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }

        // Work on the normalized axis (Nyquist == 1, i.e. fs == 2), bilinear constant 2 * fs
        let fs2 = 4.0;
        let warp = |wn: f64| fs2 * (PI * wn / 2.0).tan();
        let warped_low = warp(low_hz / nyquist_hz);
        let warped_high = warp(high_hz / nyquist_hz);
        let bandwidth = warped_high - warped_low;
        let centre_sq = warped_low * warped_high;

        // Analog lowpass prototype poles on the unit circle, left half-plane
        let prototype = (0..order).map(|k| {
            let m = 2.0 * k as f64 - (order as f64 - 1.0);
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        });

        // Lowpass -> bandpass: each prototype pole splits in two, `order` zeros land at s = 0
        let mut analog_poles = Vec::with_capacity(2 * order);
        for p in prototype {
            let scaled = p * (bandwidth / 2.0);
            let root = (scaled * scaled - centre_sq).sqrt();
            analog_poles.push(scaled + root);
            analog_poles.push(scaled - root);
        }

        // Bilinear transform: s = 0 zeros map to z = 1, zeros at infinity to z = -1
        let fs2_c = Complex64::new(fs2, 0.0);
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2_c + p) / (fs2_c - p))
            .collect();
        let denominator: Complex64 = analog_poles.iter().map(|&p| fs2_c - p).product();
        let gain = ((bandwidth * fs2).powi(order as i32) / denominator).re;

        let mut sections = pair_poles(&digital_poles)
            .into_iter()
            .map(|a| Biquad {
                b: [1.0, 0.0, -1.0],
                a,
            })
            .collect::<Vec<_>>();

        if let Some(first) = sections.first_mut() {
            for coeff in first.b.iter_mut() {
                *coeff *= gain;
            }
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Single forward pass starting from rest
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        for section in &self.sections {
            section.run(&mut out, [0.0, 0.0]);
        }
        out
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The input is extended at both ends by odd reflection and each pass starts
    /// from the steady state of its first sample, which keeps start-up
    /// transients out of the returned span.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }

        let padlen = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let mut extended = Vec::with_capacity(n + 2 * padlen);
        let first = signal[0];
        let last = signal[n - 1];
        extended.extend((1..=padlen).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=padlen).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.run_with_steady_state(&mut extended);
        extended.reverse();
        self.run_with_steady_state(&mut extended);
        extended.reverse();

        extended[padlen..padlen + n].to_vec()
    }

    fn run_with_steady_state(&self, signal: &mut [f64]) {
        let Some(&x0) = signal.first() else {
            return;
        };
        let mut level = x0;
        for section in &self.sections {
            let [z1, z2] = section.steady_state();
            section.run(signal, [z1 * level, z2 * level]);
            level *= section.dc_gain();
        }
    }
}

/// Group poles into denominators `[1, a1, a2]`: conjugate pairs first, then real poles two at a time
fn pair_poles(poles: &[Complex64]) -> Vec<[f64; 3]> {
    let mut denominators = Vec::with_capacity(poles.len() / 2);

    for p in poles.iter().filter(|p| p.im > REAL_POLE_EPS) {
        denominators.push([1.0, -2.0 * p.re, p.norm_sqr()]);
    }

    let mut reals: Vec<f64> = poles
        .iter()
        .filter(|p| p.im.abs() <= REAL_POLE_EPS)
        .map(|p| p.re)
        .collect();
    reals.sort_by(|a, b| a.total_cmp(b));
    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => denominators.push([1.0, -(r1 + r2), r1 * r2]),
            [r] => denominators.push([1.0, -r, 0.0]),
            _ => {}
        }
    }

    denominators
}
