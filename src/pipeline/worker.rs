use super::context::PipelineContext;
use super::snapshot::{LatestResult, PipelineSnapshot, ResultStatus};
use crate::config::RppgConfig;
use crate::detection::{DetectorFactory, DetectorSet};
use crate::error::{Result, RppgError};
use crate::frame::Frame;
use crate::landmarks::LandmarkSet;
use crate::overlay::{OverlayContent, OverlayRenderer};
use crate::signal::{roi, HeartRateTracker, SignalSample};
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Handle to the single consumer thread of the pipeline
pub struct PipelineWorker {
    context: Arc<PipelineContext>,
    config: RppgConfig,
    factory: Arc<dyn DetectorFactory>,
    state: Mutex<ComponentState>,
    running: Option<RunningWorker>,
}

struct RunningWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    /// Disconnects once the thread has exited
    done: channel::Receiver<()>,
}

impl PipelineWorker {
    pub fn new(
        context: Arc<PipelineContext>,
        config: RppgConfig,
        factory: Arc<dyn DetectorFactory>,
    ) -> Self {
        Self {
            context,
            config,
            factory,
            state: Mutex::new(ComponentState::Stopped),
            running: None,
        }
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ComponentState::Running
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Spawn the worker thread and wait for its detectors to come up.
    ///
    /// Calling this while already running is a no-op. Detector creation
    /// failures are returned here and leave the worker `Failed`. A thread that
    /// outlived a timed-out stop blocks a restart until it has exited.
    pub fn start(&mut self) -> Result<()> {
        if let Some(running) = &self.running {
            if self.state() != ComponentState::Failed {
                debug!("Pipeline worker already running");
                return Ok(());
            }
            if !running.handle.is_finished() {
                return Err(RppgError::component(
                    "pipeline worker",
                    "previous worker thread has not exited yet",
                ));
            }
            // The timed-out thread has finished since; reap it before respawning
            if let Some(stale) = self.running.take() {
                if let Err(panic) = stale.handle.join() {
                    warn!(
                        "Previous pipeline worker thread panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        self.set_state(ComponentState::Starting);
        info!("Starting pipeline worker");

        let cancel = CancellationToken::new();
        let (init_tx, init_rx) = channel::bounded::<Result<()>>(1);
        let (done_tx, done_rx) = channel::bounded::<()>(1);

        let context = Arc::clone(&self.context);
        let config = self.config.clone();
        let factory = Arc::clone(&self.factory);
        let thread_cancel = cancel.clone();

        let spawned = std::thread::Builder::new()
            .name("rppg-worker".to_string())
            .spawn(move || {
                let _done = done_tx;

                let mut detectors = match factory.create() {
                    Ok(detectors) => detectors,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                let mut processor = FrameProcessor::new(&config, Arc::clone(&context));
                context.set_processing_active(true);
                processor.run(&mut detectors, &thread_cancel);
                context.set_processing_active(false);

                let discarded = context.queue().clear();
                if discarded > 0 {
                    debug!("Discarded {} queued frames on shutdown", discarded);
                }

                drop(detectors);
                debug!("Pipeline worker released detectors");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(ComponentState::Failed);
                return Err(RppgError::resource_init(
                    "pipeline worker",
                    &format!("Failed to spawn worker thread: {}", e),
                ));
            }
        };

        match init_rx.recv_timeout(self.config.worker.init_timeout()) {
            Ok(Ok(())) => {
                self.running = Some(RunningWorker {
                    cancel,
                    handle,
                    done: done_rx,
                });
                self.set_state(ComponentState::Running);
                info!("Pipeline worker started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.set_state(ComponentState::Failed);
                error!("Pipeline worker failed to initialize: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread exits as soon as detector creation returns
                cancel.cancel();
                self.running = Some(RunningWorker {
                    cancel,
                    handle,
                    done: done_rx,
                });
                self.set_state(ComponentState::Failed);
                error!("Pipeline worker initialization timed out");
                Err(RppgError::resource_init("detectors", "initialization timed out"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = match handle.join() {
                    Err(panic) => panic_message(panic.as_ref()),
                    Ok(()) => "worker exited during initialization".to_string(),
                };
                self.set_state(ComponentState::Failed);
                error!("Pipeline worker failed to initialize: {}", reason);
                Err(RppgError::resource_init("detectors", &reason))
            }
        }
    }

    /// Cancel the worker and wait up to the configured join timeout
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            debug!("Pipeline worker not running");
            return Ok(());
        };

        self.set_state(ComponentState::Stopping);
        info!("Stopping pipeline worker");
        running.cancel.cancel();

        let timeout = self.config.worker.join_timeout();
        match running.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                // Keep the handle so no second consumer starts while this one lives
                self.running = Some(running);
                self.set_state(ComponentState::Failed);
                error!("Pipeline worker did not stop within {:?}", timeout);
                Err(RppgError::component(
                    "pipeline worker",
                    &format!("did not stop within {:?}", timeout),
                ))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Err(panic) = running.handle.join() {
                    warn!(
                        "Pipeline worker thread panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
                self.set_state(ComponentState::Stopped);
                info!("Pipeline worker stopped");
                Ok(())
            }
        }
    }

    fn set_state(&self, new_state: ComponentState) {
        let mut state = self.state.lock();
        if *state != new_state {
            debug!("Pipeline worker state changed to: {:?}", new_state);
            *state = new_state;
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(e) = self.stop() {
                warn!("Pipeline worker shutdown on drop failed: {}", e);
            }
        }
    }
}

/// Per-thread processing state
struct FrameProcessor {
    context: Arc<PipelineContext>,
    tracker: HeartRateTracker,
    renderer: OverlayRenderer,
    center_weighted: bool,
    take_timeout: Duration,
    idle_backoff: Duration,
    epoch: Instant,
    last_landmarks: Option<Arc<LandmarkSet>>,
}

impl FrameProcessor {
    fn new(config: &RppgConfig, context: Arc<PipelineContext>) -> Self {
        Self {
            context,
            tracker: HeartRateTracker::new(&config.signal, &config.estimator, &config.smoother),
            renderer: OverlayRenderer::new(&config.overlay),
            center_weighted: config.signal.center_weighted,
            take_timeout: config.queue.take_timeout(),
            idle_backoff: config.queue.idle_backoff(),
            epoch: Instant::now(),
            last_landmarks: None,
        }
    }

    fn run(&mut self, detectors: &mut DetectorSet, cancel: &CancellationToken) {
        info!("Pipeline worker running");

        while !cancel.is_cancelled() {
            if self.context.take_reset_request() {
                self.reset();
            }

            let Some(frame) = self.context.queue().take(self.take_timeout) else {
                std::thread::sleep(self.idle_backoff);
                continue;
            };

            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.process(detectors, &frame)));
            match outcome {
                Ok(Ok(())) => self.context.frame_processed(),
                Ok(Err(e)) => {
                    self.context.frame_failed();
                    if e.is_transient() {
                        debug!("Skipping frame {}: {}", frame.id, e);
                    } else {
                        warn!("Frame {} failed: {}", frame.id, e);
                    }
                }
                Err(panic) => {
                    self.context.frame_failed();
                    error!(
                        "Frame {} processing panicked: {}",
                        frame.id,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        info!("Pipeline worker loop exited");
    }

    fn process(&mut self, detectors: &mut DetectorSet, frame: &Frame) -> Result<()> {
        trace!("Processing frame {} ({:?} after capture)", frame.id, frame.age());
        let image = frame.decode()?;
        let (width, height) = image.dimensions();

        let landmarks = detectors.pose.detect(&image)?.map(Arc::new);
        let face = detectors.face.detect(&image)?;
        let processed_at = Instant::now();

        if let Some(landmarks) = &landmarks {
            self.last_landmarks = Some(Arc::clone(landmarks));
            self.context.record_landmarks(processed_at, Arc::clone(landmarks));
        }

        let face_rect = face.as_ref().and_then(|f| roi::face_rect(f, width, height));
        let forehead = face.as_ref().and_then(|f| roi::forehead(f, width, height));
        if let Some(green) = forehead.and_then(|r| roi::mean_green(&image, &r, self.center_weighted))
        {
            let timestamp = frame
                .captured_at
                .saturating_duration_since(self.epoch)
                .as_secs_f64();
            self.tracker.push(SignalSample::new(timestamp, green));
        }

        let bpm = self.tracker.bpm();
        let signal = self.tracker.stats();
        let mut annotated = image;
        self.renderer.render(
            &mut annotated,
            &OverlayContent {
                landmarks: landmarks.as_deref(),
                face: face_rect,
                roi: forehead,
                bpm,
                quality: signal.quality,
            },
        );
        let jpeg = self.renderer.encode_jpeg(&annotated)?;

        self.context.publish(PipelineSnapshot {
            latest: LatestResult {
                frame_id: Some(frame.id),
                annotated_image: Some(Arc::new(jpeg)),
                landmarks,
                face: face_rect,
                bpm,
                status: ResultStatus::Success,
            },
            last_landmarks: self.last_landmarks.clone(),
            bpm,
            signal,
        });

        Ok(())
    }

    fn reset(&mut self) {
        self.tracker.reset();
        let previous = self.context.snapshot();
        self.context.publish(PipelineSnapshot {
            latest: LatestResult {
                bpm: None,
                ..previous.latest.clone()
            },
            last_landmarks: previous.last_landmarks.clone(),
            bpm: None,
            signal: self.tracker.stats(),
        });
        info!("Signal buffer and heart rate history cleared");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
