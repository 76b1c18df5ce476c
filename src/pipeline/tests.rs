use super::*;
use crate::config::RppgConfig;
use crate::detection::{DetectorFactory, DetectorSet, FaceBox, FaceDetector, PoseDetector};
use crate::error::{RecordingError, Result, RppgError};
use crate::landmarks::{Landmark, LandmarkSet};
use image::{codecs::png::PngEncoder, ImageEncoder, Rgb, RgbImage};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decrements the shared live count when a detector is dropped
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TestPose {
    _live: LiveGuard,
    landmarks: Option<LandmarkSet>,
    panics_left: usize,
    delay: Duration,
}

impl PoseDetector for TestPose {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>> {
        if self.panics_left > 0 {
            self.panics_left -= 1;
            panic!("pose model crashed");
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.landmarks.clone())
    }
}

struct TestFace {
    _live: LiveGuard,
    face: Option<FaceBox>,
}

impl FaceDetector for TestFace {
    fn detect(&mut self, _image: &RgbImage) -> Result<Option<FaceBox>> {
        Ok(self.face)
    }
}

#[derive(Default)]
struct TestFactory {
    live: Arc<AtomicUsize>,
    face: Option<FaceBox>,
    landmarks: Option<LandmarkSet>,
    panic_frames: usize,
    pose_delay: Duration,
    fail: bool,
}

impl DetectorFactory for TestFactory {
    fn create(&self) -> Result<DetectorSet> {
        if self.fail {
            return Err(RppgError::resource_init("pose", "model file missing"));
        }
        Ok(DetectorSet::new(
            Box::new(TestPose {
                _live: LiveGuard::new(&self.live),
                landmarks: self.landmarks.clone(),
                panics_left: self.panic_frames,
                delay: self.pose_delay,
            }),
            Box::new(TestFace {
                _live: LiveGuard::new(&self.live),
                face: self.face,
            }),
        ))
    }
}

fn whole_frame_face() -> Option<FaceBox> {
    Some(FaceBox::from_relative([0.0, 0.0, 1.0, 1.0]))
}

fn pose() -> LandmarkSet {
    (0..33)
        .map(|id| Landmark::new(id, 0.5, 0.5, 0.0, 0.9))
        .collect()
}

fn png(green: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 32, Rgb([90, green, 70]));
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), 32, 32, image::ColorType::Rgb8)
        .unwrap();
    buf
}

fn setup(factory: TestFactory) -> (Arc<PipelineContext>, PipelineWorker, Arc<AtomicUsize>) {
    setup_with(RppgConfig::default(), factory)
}

fn setup_with(
    config: RppgConfig,
    factory: TestFactory,
) -> (Arc<PipelineContext>, PipelineWorker, Arc<AtomicUsize>) {
    let live = Arc::clone(&factory.live);
    let context = Arc::new(PipelineContext::new(&config));
    let worker = PipelineWorker::new(Arc::clone(&context), config, Arc::new(factory));
    (context, worker, live)
}

/// Submit until the queue accepts the frame
fn submit_blocking(context: &PipelineContext, bytes: Vec<u8>, captured_at: Instant) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !context.submit_frame_at(bytes.clone(), captured_at) {
        assert!(Instant::now() < deadline, "queue never drained");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_start_stop_releases_detectors() {
    let (_context, mut worker, live) = setup(TestFactory::default());
    assert_eq!(worker.state(), ComponentState::Stopped);

    worker.start().unwrap();
    assert_eq!(worker.state(), ComponentState::Running);
    assert_eq!(live.load(Ordering::SeqCst), 2);

    // Second start is a no-op
    worker.start().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 2);

    let started = Instant::now();
    worker.stop().unwrap();
    assert!(started.elapsed() < RppgConfig::default().worker.join_timeout());
    assert_eq!(worker.state(), ComponentState::Stopped);
    assert_eq!(live.load(Ordering::SeqCst), 0);

    // Stopping twice is harmless
    worker.stop().unwrap();
}

#[test]
fn test_stop_while_frame_in_flight() {
    let (context, mut worker, live) = setup(TestFactory {
        pose_delay: Duration::from_millis(300),
        ..TestFactory::default()
    });
    worker.start().unwrap();

    assert!(context.submit_frame(png(90)));
    assert!(wait_until(Duration::from_secs(1), || context
        .queue_status()
        .frame_queue_size
        == 0));

    // A second frame waits behind the one in flight
    assert!(context.submit_frame(png(91)));

    let started = Instant::now();
    worker.stop().unwrap();
    assert!(started.elapsed() < RppgConfig::default().worker.join_timeout());
    assert_eq!(worker.state(), ComponentState::Stopped);
    assert_eq!(live.load(Ordering::SeqCst), 0);

    // The frame in hand is finished; the waiting one is discarded on shutdown
    let status = context.queue_status();
    assert_eq!(status.frames_processed, 1);
    assert_eq!(status.frame_queue_size, 0);
}

#[test]
fn test_restart_waits_for_timed_out_thread() {
    let mut config = RppgConfig::default();
    config.worker.join_timeout_ms = 250;
    let (context, mut worker, live) = setup_with(
        config,
        TestFactory {
            pose_delay: Duration::from_millis(800),
            ..TestFactory::default()
        },
    );
    worker.start().unwrap();

    assert!(context.submit_frame(png(90)));
    assert!(wait_until(Duration::from_secs(1), || context
        .queue_status()
        .frame_queue_size
        == 0));

    assert!(worker.stop().is_err());
    assert_eq!(worker.state(), ComponentState::Failed);

    // The slow thread still owns its detectors; no second consumer may start
    assert!(worker.start().is_err());
    assert_eq!(live.load(Ordering::SeqCst), 2);

    assert!(wait_until(Duration::from_secs(2), || live
        .load(Ordering::SeqCst)
        == 0));
    worker.stop().unwrap();
    assert_eq!(worker.state(), ComponentState::Stopped);

    worker.start().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 2);
    worker.stop().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_detector_init_failure_surfaces_from_start() {
    let (context, mut worker, live) = setup(TestFactory {
        fail: true,
        ..TestFactory::default()
    });

    let err = worker.start().unwrap_err();
    assert!(matches!(err, RppgError::ResourceInit { .. }));
    assert_eq!(worker.state(), ComponentState::Failed);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(!context.queue_status().processing_active);
}

#[test]
fn test_drop_stops_worker() {
    let (context, mut worker, live) = setup(TestFactory::default());
    worker.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || context
        .queue_status()
        .processing_active));

    drop(worker);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert!(!context.queue_status().processing_active);
}

#[test]
fn test_end_to_end_72_bpm() {
    let (context, mut worker, live) = setup(TestFactory {
        face: whole_frame_face(),
        ..TestFactory::default()
    });
    worker.start().unwrap();

    assert!(context.bpm().detecting);
    let base = Instant::now();
    let mut submitted = 0;
    for i in 0..300u32 {
        let t = i as f64 / 30.0;
        let green = (120.0 + 10.0 * (2.0 * PI * 1.2 * t).sin()).round() as u8;
        submit_blocking(&context, png(green), base + Duration::from_secs_f64(t));
        submitted += 1;
        if context.bpm().value.is_some() {
            break;
        }
    }

    assert!(wait_until(Duration::from_secs(5), || context
        .bpm()
        .value
        .is_some()));
    // Window fills at frame 240; allow three evaluations plus the queued backlog
    assert!(submitted <= 250, "took {} frames", submitted);

    let bpm = context.bpm().value.unwrap();
    assert!((bpm - 72.0).abs() <= 2.0, "estimated {} BPM", bpm);

    let latest = context.latest_result();
    assert_eq!(latest.status, ResultStatus::Success);
    assert!(latest.face.is_some());
    let jpeg = latest.annotated_image.unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let stats = context.signal_stats();
    assert!(stats.samples >= 240);
    assert!((stats.sample_rate.unwrap() - 30.0).abs() < 0.1);

    worker.stop().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panicking_frame_does_not_stop_worker() {
    let (context, mut worker, _live) = setup(TestFactory {
        panic_frames: 1,
        landmarks: Some(pose()),
        ..TestFactory::default()
    });
    worker.start().unwrap();

    let base = Instant::now();
    for i in 0..3u64 {
        submit_blocking(&context, png(100), base + Duration::from_millis(33 * i));
    }

    assert!(wait_until(Duration::from_secs(5), || {
        let status = context.queue_status();
        status.frame_errors == 1 && status.frames_processed == 2
    }));
    assert!(worker.is_running());
    assert!(context.last_landmarks().is_some());

    worker.stop().unwrap();
}

#[test]
fn test_undecodable_frame_is_skipped() {
    let (context, mut worker, _live) = setup(TestFactory::default());
    worker.start().unwrap();

    assert!(context.submit_frame(vec![1, 2, 3]));
    assert!(wait_until(Duration::from_secs(5), || context
        .queue_status()
        .frame_errors
        == 1));
    assert_eq!(context.latest_result().status, ResultStatus::Processing);

    submit_blocking(&context, png(80), Instant::now());
    assert!(wait_until(Duration::from_secs(5), || context
        .latest_result()
        .status
        == ResultStatus::Success));

    worker.stop().unwrap();
}

#[test]
fn test_recording_captures_landmark_frames() {
    let (context, mut worker, _live) = setup(TestFactory {
        landmarks: Some(pose()),
        face: whole_frame_face(),
        ..TestFactory::default()
    });
    worker.start().unwrap();

    assert_eq!(
        context.stop_recording().unwrap_err(),
        RecordingError::NotActive
    );
    context.start_recording().unwrap();
    assert_eq!(
        context.start_recording().unwrap_err(),
        RecordingError::AlreadyActive
    );

    let base = Instant::now();
    for i in 0..10u64 {
        submit_blocking(&context, png(100), base + Duration::from_millis(33 * i));
    }
    assert!(wait_until(Duration::from_secs(5), || context
        .queue_status()
        .frames_processed
        == 10));

    let status = context.recording_status();
    assert!(status.active);
    assert_eq!(status.frame_count, 10);
    assert!(status.elapsed_seconds.is_some());

    let handoff = context.stop_recording().unwrap();
    assert_eq!(handoff.frame_count, 10);
    assert_eq!(handoff.frames.len(), 10);
    assert_eq!(handoff.heart_rate_bpm, 0.0);
    assert!(handoff
        .frames
        .windows(2)
        .all(|w| w[0].elapsed_seconds <= w[1].elapsed_seconds));
    assert_eq!(handoff.frames[0].landmarks[13].name, "LEFT_ELBOW");

    assert!(!context.recording_status().active);
    assert_eq!(
        context.stop_recording().unwrap_err(),
        RecordingError::NotActive
    );

    worker.stop().unwrap();
}

#[test]
fn test_reset_signal_clears_buffer() {
    let (context, mut worker, _live) = setup(TestFactory {
        face: whole_frame_face(),
        ..TestFactory::default()
    });
    worker.start().unwrap();

    let base = Instant::now();
    for i in 0..20u64 {
        submit_blocking(&context, png(100 + i as u8), base + Duration::from_millis(33 * i));
    }
    assert!(wait_until(Duration::from_secs(5), || context
        .queue_status()
        .heart_rate_samples
        == 20));

    context.reset_signal();
    assert!(wait_until(Duration::from_secs(5), || context
        .signal_stats()
        .samples
        == 0));
    assert!(context.bpm().detecting);

    worker.stop().unwrap();
}

#[test]
fn test_queue_status_counts_drops_without_worker() {
    let (context, _worker, _live) = setup(TestFactory::default());
    for _ in 0..5 {
        context.submit_frame(png(10));
    }

    let status = context.queue_status();
    assert_eq!(status.frame_queue_size, 3);
    assert_eq!(status.frame_queue_capacity, 3);
    assert_eq!(status.frames_accepted, 3);
    assert_eq!(status.frames_dropped, 2);
    assert!(!status.processing_active);
    assert_eq!(status.heart_rate_samples, 0);
}
