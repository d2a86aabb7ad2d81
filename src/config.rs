// Pipeline configuration
// Defaults come from constants.rs; a JSON file may override any subset of fields.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{HabitatError, Result};

/// Tunables for the per-frame detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorParams {
    pub history: u32,
    pub var_threshold: f64,
    pub kernel_size: u32,
    pub distance_threshold: f64,
    pub flow: FlowParams,
    pub annotate: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            history: BACKGROUND_HISTORY,
            var_threshold: BACKGROUND_VAR_THRESHOLD,
            kernel_size: MORPH_KERNEL_SIZE,
            distance_threshold: BLOB_DISTANCE_THRESHOLD,
            flow: FlowParams::default(),
            annotate: true,
        }
    }
}

/// Pyramidal Lucas-Kanade parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowParams {
    pub window_size: u32,
    pub max_level: u32,
    pub max_iterations: u32,
    pub epsilon: f64,
    pub min_eigen_threshold: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            window_size: FLOW_WINDOW_SIZE,
            max_level: FLOW_MAX_LEVEL,
            max_iterations: FLOW_MAX_ITERATIONS,
            epsilon: FLOW_EPSILON,
            min_eigen_threshold: FLOW_MIN_EIGEN_THRESHOLD,
        }
    }
}

/// Everything a batch run needs besides the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Where processed videos and the database live
    pub library_root: PathBuf,
    pub fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub segment_capacity: usize,
    pub save_queue_capacity: usize,
    pub stop_timeout_secs: u64,
    pub worker_fraction: f64,
    /// Fixed pool size; overrides worker_fraction when set
    pub workers: Option<usize>,
    pub detector: DetectorParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("."),
            fps: CAPTURE_FPS,
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            segment_capacity: SEGMENT_BUFFER_CAPACITY,
            save_queue_capacity: SAVE_QUEUE_CAPACITY,
            stop_timeout_secs: STOP_JOIN_TIMEOUT_SECS,
            worker_fraction: WORKER_CPU_FRACTION,
            workers: None,
            detector: DetectorParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with. Frame sizes must be even
    /// for the yuv420p encoder.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(HabitatError::InvalidConfig(msg)) };

        if self.fps == 0 {
            return invalid("fps must be positive".to_string());
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return invalid(format!("frame size {}x{} is empty", self.frame_width, self.frame_height));
        }
        if self.frame_width % 2 != 0 || self.frame_height % 2 != 0 {
            return invalid(format!(
                "frame size {}x{} must have even width and height",
                self.frame_width, self.frame_height
            ));
        }
        if self.segment_capacity == 0 {
            return invalid("segmentCapacity must be positive".to_string());
        }
        if self.save_queue_capacity == 0 {
            return invalid("saveQueueCapacity must be positive".to_string());
        }
        if !self.worker_fraction.is_finite() || self.worker_fraction < 0.0 {
            return invalid(format!("workerFraction {} is out of range", self.worker_fraction));
        }
        Ok(())
    }

    /// Load `<library>/.habitat/config.json` if present, defaults otherwise.
    pub fn for_library(library_root: &Path) -> Result<Self> {
        let path = library_root.join(HABITAT_FOLDER).join(CONFIG_FILENAME);
        let mut config = if path.exists() {
            log::info!("Loading config from {}", path.display());
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.library_root = library_root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Worker pool size: a fraction of available parallelism, never below one.
    pub fn worker_count(&self) -> usize {
        if let Some(n) = self.workers {
            return n.max(1);
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ((cpus as f64 * self.worker_fraction).floor() as usize).max(1)
    }
}
