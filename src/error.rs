// Habitat Cam Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HabitatError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to open video source: {0}")]
    OpenFailure(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("FFprobe error: {0}")]
    FFprobe(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Camera file counts differ: {0}")]
    CameraFileMismatch(String),

    #[error("Progress must be between 0 and 100, got {0}")]
    InvalidProgress(i64),

    #[error("Processor is not idle: {0}")]
    InvalidState(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for HabitatError {
    fn from(err: anyhow::Error) -> Self {
        HabitatError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HabitatError>;

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
