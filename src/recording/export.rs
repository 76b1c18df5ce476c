use super::handoff::RecordingHandoff;
use crate::error::{Result, RppgError};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid recording timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Write the handoff as pretty JSON into `output_dir`, returning the file path
pub async fn save_handoff(handoff: &RecordingHandoff, output_dir: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(handoff)?;

    fs::create_dir_all(output_dir).await.map_err(|e| {
        RppgError::component(
            "recording",
            &format!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            ),
        )
    })?;

    let path = output_dir.join(format!("recording_{}.json", handoff.session_timestamp));
    fs::write(&path, json).await.map_err(|e| {
        RppgError::component(
            "recording",
            &format!("Failed to write {}: {}", path.display(), e),
        )
    })?;

    debug!("Saved recording handoff to {}", path.display());
    Ok(path)
}
