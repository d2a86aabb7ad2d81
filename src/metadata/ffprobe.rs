// FFprobe wrapper for metadata extraction

use std::path::Path;
use std::process::Command;
use serde::Deserialize;
use crate::error::{HabitatError, Result};
use crate::metadata::MediaMetadata;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
}

/// Run ffprobe on a file and extract metadata
pub fn probe(path: &Path) -> Result<MediaMetadata> {
    probe_with(&crate::tools::ffprobe_path(), path)
}

/// Same as [`probe`] with an explicit ffprobe binary
pub fn probe_with(ffprobe: &Path, path: &Path) -> Result<MediaMetadata> {
    let output = Command::new(ffprobe)
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| HabitatError::FFprobe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HabitatError::FFprobe(format!("ffprobe failed on {}: {}", path.display(), stderr)));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<MediaMetadata> {
    let probe_output: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| HabitatError::FFprobe(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut meta = MediaMetadata::default();

    if let Some(ref streams) = probe_output.streams {
        // First video stream wins
        if let Some(stream) = streams.iter().find(|s| s.codec_type.as_deref() == Some("video")) {
            meta.codec = stream.codec_name.clone();
            meta.width = stream.width;
            meta.height = stream.height;
            meta.fps = parse_frame_rate(stream.r_frame_rate.as_deref());
            meta.frame_count = stream.nb_frames.as_ref().and_then(|s| s.parse().ok());
            meta.duration_ms = parse_duration_ms(stream.duration.as_deref());
        }
    }

    if let Some(ref format) = probe_output.format {
        if meta.duration_ms.is_none() {
            meta.duration_ms = parse_duration_ms(format.duration.as_deref());
        }
    }

    if meta.frame_count.is_none() {
        if let (Some(ms), Some(fps)) = (meta.duration_ms, meta.fps) {
            meta.frame_count = Some(((ms as f64 / 1000.0) * fps).round() as u64);
        }
    }

    Ok(meta)
}

/// Parse frame rate string like "30000/1001" to f64
fn parse_frame_rate(rate_str: Option<&str>) -> Option<f64> {
    let rate_str = rate_str?;
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok()
}

/// Parse duration string to milliseconds
fn parse_duration_ms(duration_str: Option<&str>) -> Option<i64> {
    let duration_str = duration_str?;
    let seconds: f64 = duration_str.parse().ok()?;
    Some((seconds * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate(Some("15/1")), Some(15.0));
        assert!((parse_frame_rate(Some("30000/1001")).unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate(Some("0/0")), None);
        assert_eq!(parse_frame_rate(Some("25")), Some(25.0));
        assert_eq!(parse_frame_rate(None), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "15/1", "nb_frames": "900", "duration": "60.000000"}
            ],
            "format": {"duration": "60.050000"}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.codec.as_deref(), Some("h264"));
        assert_eq!(meta.width, Some(1920));
        assert_eq!(meta.fps, Some(15.0));
        assert_eq!(meta.frame_count, Some(900));
        assert_eq!(meta.duration_ms, Some(60_000));
    }

    #[test]
    fn test_frame_count_estimated_from_duration() {
        let json = br#"{
            "streams": [{"codec_type": "video", "r_frame_rate": "15/1"}],
            "format": {"duration": "5.0"}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.duration_ms, Some(5000));
        assert_eq!(meta.frame_count, Some(75));
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        assert!(matches!(parse_probe_output(b"not json"), Err(HabitatError::FFprobe(_))));
    }
}
