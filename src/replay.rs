use crate::error::{Result, RppgError};
use crate::pipeline::PipelineContext;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub offered: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub unreadable: u64,
}

/// Image files in `dir`, sorted by name
pub async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        RppgError::component(
            "replay",
            &format!("Failed to read frame directory {}: {}", dir.display(), e),
        )
    })?;

    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_frame {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

/// Offer every frame in `dir` to the pipeline at `fps`, stopping early on cancellation
pub async fn replay_directory(
    context: &PipelineContext,
    dir: &Path,
    fps: u32,
    cancel: &CancellationToken,
) -> Result<ReplayStats> {
    let frames = list_frames(dir).await?;
    info!(
        "Replaying {} frames from {} at {} fps",
        frames.len(),
        dir.display(),
        fps
    );

    let mut ticker = interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stats = ReplayStats::default();
    for path in frames {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Replay cancelled after {} frames", stats.offered);
                break;
            }
            _ = ticker.tick() => {}
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", path.display(), e);
                stats.unreadable += 1;
                continue;
            }
        };

        stats.offered += 1;
        if context.submit_frame(bytes) {
            stats.accepted += 1;
        } else {
            stats.dropped += 1;
            debug!("Frame {} dropped by full queue", path.display());
        }
    }

    info!(
        "Replay finished: {} offered, {} accepted, {} dropped",
        stats.offered, stats.accepted, stats.dropped
    );
    Ok(stats)
}
