// Media tools: locating ffmpeg/ffprobe and collecting their diagnostics
//
// Lookup order, first hit wins:
// 1) HABITAT_FFMPEG_PATH / HABITAT_FFPROBE_PATH, when it names an existing file
// 2) next to the running binary, then in its bin/ folder
// 3) the bare name, left to PATH

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command};
use std::thread::JoinHandle;

use crate::constants::STDERR_TAIL_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    /// Everything `habitatcam process` shells out to
    pub const REQUIRED: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    pub fn env_key(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "HABITAT_FFMPEG_PATH",
            Tool::Ffprobe => "HABITAT_FFPROBE_PATH",
        }
    }

    pub fn path(&self) -> PathBuf {
        let override_path = env::var_os(self.env_key()).map(PathBuf::from);
        resolve(override_path.as_deref(), exe_dir().as_deref(), self.binary_name())
    }

    /// True when the resolved binary exists or answers `-version`.
    pub fn is_available(&self) -> bool {
        let path = self.path();
        if path.is_file() {
            return true;
        }
        Command::new(&path)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

fn platform_file_name(binary: &str) -> String {
    if cfg!(windows) && !binary.to_lowercase().ends_with(".exe") {
        format!("{}.exe", binary)
    } else {
        binary.to_string()
    }
}

fn resolve(override_path: Option<&Path>, exe_dir: Option<&Path>, binary: &str) -> PathBuf {
    if let Some(p) = override_path.filter(|p| p.is_file()) {
        return p.to_path_buf();
    }

    let file_name = platform_file_name(binary);
    let bundled = exe_dir
        .into_iter()
        .flat_map(|dir| [dir.join(&file_name), dir.join("bin").join(&file_name)]);
    for candidate in bundled {
        if candidate.is_file() {
            return candidate;
        }
    }

    PathBuf::from(binary)
}

pub fn ffprobe_path() -> PathBuf {
    Tool::Ffprobe.path()
}

pub fn ffmpeg_path() -> PathBuf {
    Tool::Ffmpeg.path()
}

/// Required tools that cannot be run from here.
pub fn missing_tools() -> Vec<Tool> {
    Tool::REQUIRED.into_iter().filter(|t| !t.is_available()).collect()
}

/// Reads a child's stderr on its own thread so the child never stalls on a
/// full pipe. Keeps only the tail.
pub struct StderrCollector {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrCollector {
    pub fn spawn(stderr: Option<ChildStderr>) -> Self {
        let handle = stderr.and_then(|mut pipe| {
            std::thread::Builder::new()
                .name("tool-stderr".into())
                .spawn(move || {
                    let mut tail = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        match pipe.read(&mut chunk) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                tail.extend_from_slice(&chunk[..n]);
                                if tail.len() > STDERR_TAIL_BYTES {
                                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                                }
                            }
                        }
                    }
                    tail
                })
                .ok()
        });
        Self { handle }
    }

    /// Wait for the pipe to close and return what was captured.
    pub fn finish(mut self) -> String {
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default()
    }
}
