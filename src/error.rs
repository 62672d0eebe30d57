//! Error types for playback sessions

use std::path::PathBuf;

/// Error type for session operations
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The tune could not be loaded into the decode engine
    #[error("Track load failed: {0}")]
    TrackLoadFailed(String),

    /// The duration database could not be read; lengths fall back to the configured default
    #[error("Duration database unavailable at {}: {reason}", path.display())]
    DatabaseUnavailable {
        /// Location that was tried
        path: PathBuf,
        /// Why the read failed
        reason: String,
    },

    /// Discard-decode ran out of samples before reaching the seek target
    #[error("Seek target {target_ms} ms unreachable (stopped at {reached_ms} ms)")]
    SeekUnreachable {
        /// Requested position in milliseconds
        target_ms: u64,
        /// Position the partial decode reached
        reached_ms: u64,
    },

    /// The decode engine refused its configuration
    #[error("Engine initialization failed: {0}")]
    EngineInitFailed(String),

    /// Subsong index outside the track
    #[error("Invalid subsong index {index} (available: 1-{available})")]
    InvalidSubsong {
        /// Requested subsong index (1-based)
        index: usize,
        /// Number of available subsongs
        available: usize,
    },

    /// Operation needs an open track
    #[error("No track is open")]
    NoTrackOpen,

    /// A second track was opened before closing the first
    #[error("A track is already open; close it first")]
    TrackAlreadyOpen,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from the settings file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be (de)serialized
    #[error("Settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SessionError {
    fn from(msg: String) -> Self {
        SessionError::Other(msg)
    }
}

impl From<&str> for SessionError {
    fn from(msg: &str) -> Self {
        SessionError::Other(msg.to_string())
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_subsong_message() {
        let err = SessionError::InvalidSubsong {
            index: 7,
            available: 3,
        };
        assert_eq!(err.to_string(), "Invalid subsong index 7 (available: 1-3)");
    }

    #[test]
    fn test_string_conversion_goes_to_other() {
        let err: SessionError = "boom".into();
        assert!(matches!(err, SessionError::Other(ref m) if m == "boom"));
    }

    #[test]
    fn test_database_unavailable_shows_path() {
        let err = SessionError::DatabaseUnavailable {
            path: PathBuf::from("/hvsc/DOCUMENTS/Songlengths.md5"),
            reason: "not found".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Songlengths.md5"));
        assert!(text.contains("not found"));
    }
}
