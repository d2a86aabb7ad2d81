// Metadata extraction module

pub mod ffprobe;

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{HabitatError, Result};

/// Stream properties of a recorded video file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_ms: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
    pub codec: Option<String>,
}

impl MediaMetadata {
    /// Duration in seconds, falling back to frame_count / fps when the
    /// container does not report one.
    pub fn duration_secs(&self) -> Option<f64> {
        if let Some(ms) = self.duration_ms {
            return Some(ms as f64 / 1000.0);
        }
        match (self.frame_count, self.fps) {
            (Some(frames), Some(fps)) if fps > 0.0 => Some(frames as f64 / fps),
            _ => None,
        }
    }
}

/// Something that can tell how long a recording is.
pub trait MediaProbe: Send + Sync {
    fn duration_secs(&self, path: &Path) -> Result<f64>;
}

/// Probe backed by the ffprobe binary
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeProbe;

impl MediaProbe for FfprobeProbe {
    fn duration_secs(&self, path: &Path) -> Result<f64> {
        let meta = ffprobe::probe(path)?;
        meta.duration_secs().ok_or_else(|| {
            HabitatError::FFprobe(format!("No duration reported for {}", path.display()))
        })
    }
}

/// Check whether a path has the given extension, ignoring case
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_prefers_container_value() {
        let meta = MediaMetadata {
            duration_ms: Some(60_000),
            fps: Some(15.0),
            frame_count: Some(10),
            ..Default::default()
        };
        assert_eq!(meta.duration_secs(), Some(60.0));
    }

    #[test]
    fn test_duration_from_frame_count() {
        let meta = MediaMetadata {
            fps: Some(15.0),
            frame_count: Some(75),
            ..Default::default()
        };
        assert_eq!(meta.duration_secs(), Some(5.0));
        assert_eq!(MediaMetadata::default().duration_secs(), None);
    }

    #[test]
    fn test_has_extension_ignores_case() {
        assert!(has_extension(Path::new("/a/clip.MP4"), "mp4"));
        assert!(has_extension(Path::new("clip.mp4"), "mp4"));
        assert!(!has_extension(Path::new("clip.mov"), "mp4"));
        assert!(!has_extension(Path::new("mp4"), "mp4"));
    }
}
