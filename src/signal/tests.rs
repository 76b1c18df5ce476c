use super::*;
use crate::config::RppgConfig;
use std::f64::consts::PI;

fn tracker() -> HeartRateTracker {
    let config = RppgConfig::default();
    HeartRateTracker::new(&config.signal, &config.estimator, &config.smoother)
}

/// 72 BPM pulse riding on a bright baseline with linear drift and slow wander
fn synthetic_forehead(i: usize, fs: f64) -> SignalSample {
    let t = i as f64 / fs;
    let value = 120.0
        + (2.0 * PI * 1.2 * t).sin()
        + 0.01 * i as f64
        + 0.5 * (2.0 * PI * 0.1 * t).sin();
    SignalSample::new(t, value)
}

#[test]
fn test_end_to_end_72_bpm_within_three_evaluations() {
    let mut tracker = tracker();
    let fs = 30.0;

    let mut outcomes = Vec::new();
    for i in 0..300 {
        if let Some(outcome) = tracker.push(synthetic_forehead(i, fs)) {
            outcomes.push(outcome);
        }
        if outcomes.len() == 3 {
            break;
        }
    }

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()), "{:?}", outcomes);

    let bpm = tracker.bpm().unwrap();
    assert!((bpm - 72.0).abs() <= 2.0, "smoothed {} BPM", bpm);
}

#[test]
fn test_no_evaluation_before_window_fills() {
    let mut tracker = tracker();
    for i in 0..239 {
        assert!(tracker.push(synthetic_forehead(i, 30.0)).is_none());
    }
    assert_eq!(tracker.evaluations(), 0);
    assert!(tracker.bpm().is_none());

    assert!(tracker.push(synthetic_forehead(239, 30.0)).is_some());
    assert_eq!(tracker.evaluations(), 1);
}

#[test]
fn test_flat_input_never_produces_bpm() {
    let mut tracker = tracker();
    for i in 0..300 {
        if let Some(outcome) = tracker.push(SignalSample::new(i as f64 / 30.0, 90.0)) {
            assert_eq!(outcome, Err(Inconclusive::FlatSignal));
        }
    }
    assert!(tracker.bpm().is_none());
    assert!(tracker.stats().bpm.is_none());
}

#[test]
fn test_buffer_capped_and_stats_reported() {
    let mut tracker = tracker();
    for i in 0..400 {
        tracker.push(synthetic_forehead(i, 30.0));
    }

    let stats = tracker.stats();
    assert_eq!(stats.samples, 300);
    assert_eq!(stats.capacity, 300);
    assert!((stats.fill_percent - 100.0).abs() < 1e-9);
    assert!((stats.sample_rate.unwrap() - 30.0).abs() < 1e-6);
    assert!(stats.quality.unwrap() >= 2.0);
    assert!(!stats.spectrum.is_empty());

    let bpm = stats.bpm.unwrap();
    assert!(bpm.min <= bpm.average && bpm.average <= bpm.max);
    assert!(bpm.count <= 30);
}

#[test]
fn test_reset_clears_buffer_and_history() {
    let mut tracker = tracker();
    for i in 0..260 {
        tracker.push(synthetic_forehead(i, 30.0));
    }
    assert!(tracker.bpm().is_some());

    tracker.reset();
    assert_eq!(tracker.sample_count(), 0);
    assert!(tracker.bpm().is_none());
    assert_eq!(tracker.stats(), SignalStats {
        capacity: 300,
        ..SignalStats::default()
    });
}
