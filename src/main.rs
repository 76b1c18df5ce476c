use anyhow::Result;
use clap::Parser;
use rppg_monitor::detection::factory_from_config;
use rppg_monitor::recording::save_handoff;
use rppg_monitor::replay::replay_directory;
use rppg_monitor::{PipelineContext, PipelineWorker, RppgConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(2);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "rppg-monitor")]
#[command(about = "Contactless heart-rate estimation with pose landmark recording")]
#[command(version)]
#[command(long_about = "Estimates heart rate from the green channel of a face's forehead \
region (remote photoplethysmography), overlays pose landmarks on each frame, and records \
upper-body landmark sessions as JSON.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rppg.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the pipeline")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Directory of frames to replay through the pipeline
    #[arg(long, value_name = "DIR", help = "Replay image files from DIR in name order")]
    frames: Option<PathBuf>,

    /// Record landmarks for the whole run
    #[arg(long, help = "Record landmark frames and export them as JSON on exit")]
    record: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting rPPG monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match RppgConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let context = Arc::new(PipelineContext::new(&config));
    let factory = factory_from_config(&config)?;
    info!("Detection backend: {}", config.detection.backend.as_str());
    let mut worker = PipelineWorker::new(Arc::clone(&context), config.clone(), factory);

    tokio::task::block_in_place(|| worker.start()).map_err(|e| {
        error!("Failed to start pipeline: {}", e);
        e
    })?;

    if args.record {
        context.start_recording()?;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    let status_task = spawn_status_logger(Arc::clone(&context), cancel.clone());

    let run_result = match &args.frames {
        Some(dir) => run_replay(&context, dir, config.replay.fps, &cancel).await,
        None => {
            info!("No frame source given, waiting for Ctrl-C");
            cancel.cancelled().await;
            Ok(())
        }
    };

    cancel.cancel();
    let _ = status_task.await;

    if context.recording_status().active {
        let handoff = context.stop_recording()?;
        let output_dir = Path::new(&config.recording.output_dir);
        match save_handoff(&handoff, output_dir).await {
            Ok(path) => info!(
                "Saved {} recorded frames to {}",
                handoff.frame_count,
                path.display()
            ),
            Err(e) => error!("Failed to save recording: {}", e),
        }
    }

    tokio::task::block_in_place(|| worker.stop())?;

    let status = context.queue_status();
    info!(
        "Processed {} frames ({} errors, {} dropped), final heart rate: {}",
        status.frames_processed,
        status.frame_errors,
        status.frames_dropped,
        context
            .bpm()
            .value
            .map(|bpm| format!("{:.1} BPM", bpm))
            .unwrap_or_else(|| "not detected".to_string())
    );

    run_result
}

async fn run_replay(
    context: &PipelineContext,
    dir: &Path,
    fps: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    replay_directory(context, dir, fps, cancel).await?;

    // Let the worker finish the queued backlog
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while context.queue_status().frame_queue_size > 0 && !cancel.is_cancelled() {
        if tokio::time::Instant::now() >= deadline {
            warn!("Frame queue did not drain within {:?}", DRAIN_TIMEOUT);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        cancel.cancel();
    });
}

fn spawn_status_logger(
    context: Arc<PipelineContext>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let bpm = context.bpm();
                    let queue = context.queue_status();
                    let recording = context.recording_status();
                    info!(
                        bpm = ?bpm.value,
                        detecting = bpm.detecting,
                        queue = queue.frame_queue_size,
                        dropped = queue.frames_dropped,
                        samples = queue.heart_rate_samples,
                        recording = recording.active,
                        recorded_frames = recording.frame_count,
                        "Pipeline status"
                    );
                }
            }
        }
    })
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rppg_monitor={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_names(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# rPPG monitor configuration");
    println!("# Every key is optional; RPPG_<SECTION>__<KEY> environment variables override the file");
    println!();
    print!("{}", RppgConfig::default().to_toml()?);
    Ok(())
}
