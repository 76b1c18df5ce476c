use thiserror::Error;

#[derive(Error, Debug)]
pub enum RppgError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame decode failed: {details}")]
    Decode { details: String },

    #[error("Detector '{detector}' failed: {details}")]
    Detector { detector: String, details: String },

    #[error("Overlay rendering failed: {details}")]
    Render { details: String },

    #[error("Failed to initialize {component}: {message}")]
    ResourceInit { component: String, message: String },

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Mode-transition conflicts on the recording session. State is unchanged when
/// one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingError {
    #[error("Recording is already active")]
    AlreadyActive,

    #[error("Recording is not active")]
    NotActive,
}

impl RppgError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn detector<S: Into<String>>(detector: S, details: S) -> Self {
        Self::Detector {
            detector: detector.into(),
            details: details.into(),
        }
    }

    pub fn resource_init<S: Into<String>>(component: S, message: S) -> Self {
        Self::ResourceInit {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Errors confined to a single frame; the worker logs them and moves on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Detector { .. } | Self::Render { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RppgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RppgError::Decode {
            details: "truncated".to_string()
        }
        .is_transient());
        assert!(RppgError::detector("pose", "bad tensor").is_transient());
        assert!(!RppgError::resource_init("face", "model missing").is_transient());
        assert!(!RppgError::from(RecordingError::NotActive).is_transient());
    }

    #[test]
    fn test_recording_error_messages() {
        assert_eq!(
            RecordingError::AlreadyActive.to_string(),
            "Recording is already active"
        );
        let wrapped: RppgError = RecordingError::NotActive.into();
        assert_eq!(wrapped.to_string(), "Recording is not active");
    }
}
