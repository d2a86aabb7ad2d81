// Video sources
//
// A source yields decoded frames in order. `Ok(None)` is the normal end of the
// stream; `Err` means the stream broke mid-way.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::detect::Frame;
use crate::error::{HabitatError, Result};
use crate::metadata::ffprobe;
use crate::tools::{StderrCollector, Tool};

pub trait VideoSource: Send {
    fn is_opened(&self) -> bool;
    fn fps(&self) -> f64;
    fn frame_count(&self) -> u64;
    fn read_frame(&mut self) -> Result<Option<Frame>>;
    /// Free the underlying decoder. Safe to call more than once.
    fn release(&mut self);
}

/// Decodes a file through an `ffmpeg` child process writing raw RGB frames to a pipe.
/// Frames are scaled to the requested size by ffmpeg.
pub struct FfmpegSource {
    path: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u64,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<StderrCollector>,
    finished: bool,
}

impl FfmpegSource {
    /// Probe and start decoding `path`. Failure leaves the source unopened
    /// rather than returning an error; check `is_opened()`.
    pub fn open(path: &Path, width: u32, height: u32) -> Self {
        Self::open_with(path, width, height, &Tool::Ffmpeg.path(), &Tool::Ffprobe.path())
    }

    /// Like [`FfmpegSource::open`] with explicit tool binaries.
    pub fn open_with(path: &Path, width: u32, height: u32, ffmpeg: &Path, ffprobe: &Path) -> Self {
        let mut source = Self {
            path: path.to_path_buf(),
            width,
            height,
            fps: 0.0,
            frame_count: 0,
            child: None,
            stdout: None,
            stderr: None,
            finished: false,
        };

        match source.spawn_decoder(ffmpeg, ffprobe) {
            Ok(()) => log::info!("Opened video source {}", path.display()),
            Err(e) => log::error!("Failed to open video source {}: {}", path.display(), e),
        }
        source
    }

    fn spawn_decoder(&mut self, ffmpeg: &Path, ffprobe: &Path) -> Result<()> {
        if !self.path.is_file() {
            return Err(HabitatError::OpenFailure(format!("{} is not a file", self.path.display())));
        }

        let meta = ffprobe::probe_with(ffprobe, &self.path)?;
        self.fps = meta.fps.unwrap_or(0.0);
        self.frame_count = meta.frame_count.unwrap_or(0);

        let scale = format!("scale={}:{}", self.width, self.height);
        let mut child = Command::new(ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-vf", &scale, "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HabitatError::FFmpeg(format!("Failed to spawn ffmpeg: {}", e)))?;

        self.stderr = Some(StderrCollector::spawn(child.stderr.take()));
        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }

    /// Reap the decoder once its output is exhausted. A non-zero exit means
    /// the file did not decode to the end, even if the pipe closed cleanly.
    fn finish_decoder(&mut self, kill: bool) -> Result<()> {
        self.finished = true;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if kill {
            let _ = child.kill();
        }
        let status = child.wait();
        let stderr = self.stderr.take().map(StderrCollector::finish).unwrap_or_default();
        let status = status
            .map_err(|e| HabitatError::Decode(format!("waiting for ffmpeg on {}: {}", self.path.display(), e)))?;

        if status.success() {
            return Ok(());
        }
        Err(HabitatError::Decode(format!(
            "ffmpeg exited with {} on {}: {}",
            status,
            self.path.display(),
            stderr
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fill `buf` from `reader`. Returns the number of bytes read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one raw rgb24 frame. A clean EOF before the first byte ends the stream;
/// a short frame is a decode fault.
pub fn read_raw_frame<R: Read>(reader: &mut R, width: u32, height: u32) -> Result<Option<Frame>> {
    let frame_len = (width as usize) * (height as usize) * 3;
    let mut buf = vec![0u8; frame_len];
    let filled = read_full(reader, &mut buf)?;

    if filled == 0 {
        return Ok(None);
    }
    if filled < frame_len {
        return Err(HabitatError::Decode(format!(
            "truncated frame: got {} of {} bytes",
            filled, frame_len
        )));
    }

    Frame::from_raw(width, height, buf)
        .map(Some)
        .ok_or_else(|| HabitatError::Decode("frame buffer size mismatch".to_string()))
}

impl VideoSource for FfmpegSource {
    fn is_opened(&self) -> bool {
        self.stdout.is_some()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| HabitatError::Decode("video source is not open".to_string()))?;

        match read_raw_frame(stdout, self.width, self.height) {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => self.finish_decoder(false).map(|()| None),
            Err(e) => match self.finish_decoder(true) {
                Err(HabitatError::Decode(exit)) => Err(HabitatError::Decode(format!("{}; {}", e, exit))),
                _ => Err(e),
            },
        }
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Already exited at end of stream; kill covers early stops
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("Released video source {}", self.path.display());
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.finish();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}
