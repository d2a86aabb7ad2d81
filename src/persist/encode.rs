// Segment encoding
// Pipes raw rgb24 frames into ffmpeg and writes an H.264 mp4.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Result};

use crate::constants::{ENCODE_CODEC, ENCODE_CRF, ENCODE_PIXEL_FORMAT, ENCODE_PRESET};
use crate::detect::Frame;
use crate::tools::StderrCollector;

const EVEN_SIZE_FILTER: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";

/// Encode `frames` at `fps` into `output_path`.
///
/// All frames must share the first frame's dimensions.
pub fn encode_segment(frames: &[Frame], fps: u32, output_path: &Path) -> Result<()> {
    let first = frames.first().ok_or_else(|| anyhow!("No frames to encode"))?;
    let (width, height) = first.dimensions();
    if let Some(bad) = frames.iter().position(|f| f.dimensions() != (width, height)) {
        return Err(anyhow!(
            "Frame {} is {:?}, expected {}x{}",
            bad, frames[bad].dimensions(), width, height
        ));
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use temp file for atomic write
    let tmp_path = output_path.with_extension("tmp.mp4");
    let size = format!("{}x{}", width, height);

    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.args([
        "-y",
        "-v", "error",
        "-f", "rawvideo",
        "-pix_fmt", "rgb24",
        "-s", &size,
        "-r", &fps.max(1).to_string(),
        "-i", "pipe:0",
        // yuv420p needs even dimensions
        "-vf", EVEN_SIZE_FILTER,
        "-c:v", ENCODE_CODEC,
        "-preset", ENCODE_PRESET,
        "-crf", &ENCODE_CRF.to_string(),
        "-pix_fmt", ENCODE_PIXEL_FORMAT,
        "-movflags", "+faststart",
    ])
    .arg(&tmp_path)
    .stdin(Stdio::piped())
    .stdout(Stdio::null())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| anyhow!("Failed to spawn ffmpeg: {}", e))?;
    let stderr = StderrCollector::spawn(child.stderr.take());

    let write_result = match child.stdin.take() {
        Some(mut stdin) => frames.iter().try_for_each(|frame| stdin.write_all(frame.as_raw())),
        None => Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "ffmpeg stdin unavailable")),
    };
    // stdin is dropped by now so ffmpeg sees EOF

    let status = child.wait()?;
    let stderr = stderr.finish();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(anyhow!("Writing frames to ffmpeg failed: {} {}", e, stderr));
    }

    if !status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(anyhow!("FFmpeg segment encode failed ({}): {}", status, stderr));
    }

    std::fs::rename(&tmp_path, output_path)?;

    let written = std::fs::metadata(output_path)?.len();
    if written == 0 {
        let _ = std::fs::remove_file(output_path);
        return Err(anyhow!("Encoded segment is empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_frames_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = encode_segment(&[], 15, &dir.path().join("out.mp4"));
        assert!(result.is_err());
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[test]
    fn test_mixed_frame_sizes_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let frames = vec![Frame::new(4, 4), Frame::new(8, 8)];
        let err = encode_segment(&frames, 15, &dir.path().join("out.mp4")).unwrap_err();
        assert!(err.to_string().contains("Frame 1"));
    }

    #[test]
    fn test_encode_writes_playable_file() {
        if !crate::tools::Tool::Ffmpeg.is_available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("camera1").join("seg.mp4");
        let frames: Vec<Frame> = (0..15).map(|_| Frame::new(64, 48)).collect();

        encode_segment(&frames, 15, &out).unwrap();
        assert!(out.exists());
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
        assert!(!out.with_extension("tmp.mp4").exists());
    }

    #[test]
    fn test_odd_frame_size_encodes() {
        if !crate::tools::Tool::Ffmpeg.is_available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("odd.mp4");
        let frames: Vec<Frame> = (0..5).map(|_| Frame::new(33, 25)).collect();

        encode_segment(&frames, 15, &out).unwrap();
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn test_large_segment_does_not_stall_on_stderr() {
        if !crate::tools::Tool::Ffmpeg.is_available() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("long.mp4");
        let frames: Vec<Frame> = (0..300).map(|_| Frame::new(64, 48)).collect();

        encode_segment(&frames, 15, &out).unwrap();
        assert!(out.exists());
    }
}
