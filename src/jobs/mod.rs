// Job system module
//
// A job is one recording session: three camera folders processed in parallel,
// one work unit per video file.

pub mod plan;
pub mod progress;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::camera::CameraId;
use crate::config::PipelineConfig;
use crate::constants::JOB_FINISHED_MESSAGE;
use crate::error::Result;
use crate::metadata::MediaProbe;
use crate::persist::SegmentSink;
use crate::processor::StreamProcessor;
use crate::video::{FfmpegSource, VideoSource};

pub use plan::{build_work_units, discover_camera_files};
pub use progress::ProgressState;
pub use worker::UnitOutcome;

/// A recording session to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingJob {
    pub root_path: PathBuf,
    /// Wall-clock start of the first file of every camera
    pub nominal_start: NaiveDateTime,
}

/// One video file of one camera with its real start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub video_path: PathBuf,
    pub real_start: NaiveDateTime,
    pub camera: CameraId,
}

/// Runs a single work unit to completion.
pub trait UnitRunner: Send + Sync {
    fn run_unit(&self, unit: &WorkUnit) -> Result<()>;
}

/// Opens a video file for decoding.
pub trait SourceFactory: Send + Sync {
    fn open(&self, path: &Path) -> Box<dyn VideoSource>;
}

/// ffmpeg-backed sources scaled to the capture resolution
#[derive(Debug, Clone, Copy)]
pub struct FfmpegSourceFactory {
    pub width: u32,
    pub height: u32,
}

impl SourceFactory for FfmpegSourceFactory {
    fn open(&self, path: &Path) -> Box<dyn VideoSource> {
        Box::new(FfmpegSource::open(path, self.width, self.height))
    }
}

/// Runs each unit through a Stream Processor and waits for it to finish.
pub struct StreamUnitRunner {
    config: PipelineConfig,
    sources: Arc<dyn SourceFactory>,
    sink: Arc<dyn SegmentSink>,
}

impl StreamUnitRunner {
    pub fn new(config: PipelineConfig, sources: Arc<dyn SourceFactory>, sink: Arc<dyn SegmentSink>) -> Self {
        Self { config, sources, sink }
    }
}

impl UnitRunner for StreamUnitRunner {
    fn run_unit(&self, unit: &WorkUnit) -> Result<()> {
        let source = self.sources.open(&unit.video_path);
        let processor = StreamProcessor::new(
            unit.camera,
            source,
            unit.real_start,
            &self.config,
            Arc::clone(&self.sink),
        );
        processor.start()?;
        processor.wait()?;
        log::info!(
            "[{}] Finished {} ({} frames)",
            unit.camera, unit.video_path.display(), processor.frames_processed()
        );
        Ok(())
    }
}

/// Outcome of a whole job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub statuses: Vec<String>,
    pub message: String,
}

pub struct JobOrchestrator {
    workers: usize,
    probe: Arc<dyn MediaProbe>,
    runner: Arc<dyn UnitRunner>,
}

impl JobOrchestrator {
    pub fn new(workers: usize, probe: Arc<dyn MediaProbe>, runner: Arc<dyn UnitRunner>) -> Self {
        Self { workers: workers.max(1), probe, runner }
    }

    /// Process every file of the job, reporting whole-number progress after
    /// each completed unit. Unit failures are collected, not returned.
    pub fn run(&self, job: &RecordingJob, progress: &mut dyn FnMut(u8)) -> Result<JobSummary> {
        let units = build_work_units(job, self.probe.as_ref())?;
        let total = units.len();
        log::info!("Processing {} work units on {} workers", total, self.workers);

        if total == 0 {
            progress(100);
        }

        let outcomes = worker::run_pool(units, self.workers, Arc::clone(&self.runner), |outcome, done| {
            let status = outcome.status();
            if outcome.is_success() {
                log::info!("{}", status);
            } else {
                log::error!("{}", status);
            }
            progress(progress::percent(done, total));
        });

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let failed = total - succeeded;
        let statuses: Vec<String> = outcomes.iter().map(UnitOutcome::status).collect();

        let mut message = statuses.join("\n");
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(&format!(
            "{} ({} succeeded, {} failed)",
            JOB_FINISHED_MESSAGE, succeeded, failed
        ));
        log::info!("{} ({} succeeded, {} failed)", JOB_FINISHED_MESSAGE, succeeded, failed);

        Ok(JobSummary { total, succeeded, failed, statuses, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use crate::detect::Frame;
    use crate::error::HabitatError;
    use crate::segment::Segment;

    struct FixedProbe(f64);

    impl MediaProbe for FixedProbe {
        fn duration_secs(&self, _path: &Path) -> Result<f64> {
            Ok(self.0)
        }
    }

    /// Sources of black frames; files named `broken*` do not open and files
    /// named `crash*` panic halfway through.
    struct BlackFrames {
        frames: usize,
    }

    struct BlackSource {
        remaining: usize,
        opened: bool,
        crash_at: Option<usize>,
    }

    impl VideoSource for BlackSource {
        fn is_opened(&self) -> bool {
            self.opened
        }
        fn fps(&self) -> f64 {
            15.0
        }
        fn frame_count(&self) -> u64 {
            self.remaining as u64
        }
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            if Some(self.remaining) == self.crash_at {
                panic!("decoder crashed");
            }
            self.remaining -= 1;
            Ok(Some(Frame::new(32, 24)))
        }
        fn release(&mut self) {
            self.opened = false;
        }
    }

    impl SourceFactory for BlackFrames {
        fn open(&self, path: &Path) -> Box<dyn VideoSource> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            Box::new(BlackSource {
                remaining: self.frames,
                opened: !name.starts_with("broken"),
                crash_at: name.starts_with("crash").then_some(self.frames / 2),
            })
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        segments: Mutex<Vec<(CameraId, usize, NaiveDateTime)>>,
    }

    impl SegmentSink for CollectingSink {
        fn persist(&self, segment: &Segment, _fps: u32) -> Result<PathBuf> {
            self.segments
                .lock()
                .unwrap()
                .push((segment.camera, segment.len(), segment.start_time));
            Ok(PathBuf::from("out.mp4"))
        }
    }

    fn nominal() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn session(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        for camera in CameraId::ALL {
            let cam_dir = dir.path().join(camera.folder_name());
            std::fs::create_dir_all(&cam_dir).unwrap();
            for name in names {
                std::fs::write(cam_dir.join(name), b"").unwrap();
            }
        }
        dir
    }

    fn orchestrator(sink: Arc<CollectingSink>, workers: usize) -> JobOrchestrator {
        let mut config = PipelineConfig::default();
        config.detector.annotate = false;
        let runner = StreamUnitRunner::new(config, Arc::new(BlackFrames { frames: 75 }), sink);
        JobOrchestrator::new(workers, Arc::new(FixedProbe(5.0)), Arc::new(runner))
    }

    #[test]
    fn test_three_cameras_one_file_each() {
        let dir = session(&["rec.mp4"]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };
        let mut reported = Vec::new();

        let summary = orchestrator(sink.clone(), 3).run(&job, &mut |p| reported.push(p)).unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert!(summary.message.contains("All video processing finished"));
        assert_eq!(reported, vec![33, 66, 100]);

        let mut segments = sink.segments.lock().unwrap().clone();
        segments.sort();
        assert_eq!(
            segments,
            vec![
                (CameraId::Cam1, 75, nominal()),
                (CameraId::Cam2, 75, nominal()),
                (CameraId::Cam3, 75, nominal()),
            ]
        );
    }

    #[test]
    fn test_second_file_starts_after_reference_duration() {
        let dir = session(&["01.mp4", "02.mp4"]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };

        let summary = orchestrator(sink.clone(), 2).run(&job, &mut |_| {}).unwrap();
        assert_eq!(summary.succeeded, 6);

        let later = sink
            .segments
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, start)| *start == nominal() + chrono::Duration::seconds(5))
            .count();
        assert_eq!(later, 3);
    }

    #[test]
    fn test_unit_failure_is_reported_not_fatal() {
        let dir = session(&["broken.mp4"]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };

        let summary = orchestrator(sink.clone(), 1).run(&job, &mut |_| {}).unwrap();
        assert_eq!(summary.failed, 3);
        assert!(summary.statuses.iter().all(|s| s.starts_with("Failed: ")));
        assert!(summary.message.contains("All video processing finished"));
        assert!(sink.segments.lock().unwrap().is_empty());
    }

    #[test]
    fn test_capture_panic_fails_unit_but_keeps_frames() {
        let dir = session(&["crash.mp4"]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };

        let summary = orchestrator(sink.clone(), 3).run(&job, &mut |_| {}).unwrap();
        assert_eq!(summary.failed, 3);
        assert!(summary
            .statuses
            .iter()
            .all(|s| s.starts_with("Failed: ") && s.contains("decoder crashed")));

        // 75 frames, crash with 37 left: 38 frames per camera were read
        let segments = sink.segments.lock().unwrap();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|(_, len, _)| *len == 38));
    }

    #[test]
    fn test_empty_job_reports_complete() {
        let dir = session(&[]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };
        let mut reported = Vec::new();

        let summary = orchestrator(sink, 2).run(&job, &mut |p| reported.push(p)).unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(reported, vec![100]);
    }

    #[test]
    fn test_mismatch_runs_nothing() {
        let dir = session(&["01.mp4"]);
        std::fs::write(dir.path().join("Camera2").join("02.mp4"), b"").unwrap();
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };

        let result = orchestrator(sink.clone(), 2).run(&job, &mut |_| {});
        assert!(matches!(result, Err(HabitatError::CameraFileMismatch(_))));
        assert!(sink.segments.lock().unwrap().is_empty());
    }

    #[test]
    fn test_progress_state_as_callback() {
        let dir = session(&["rec.mp4"]);
        let sink = Arc::new(CollectingSink::default());
        let job = RecordingJob { root_path: dir.path().to_path_buf(), nominal_start: nominal() };
        let state = ProgressState::new();
        let sink_state = state.clone();

        orchestrator(sink, 3)
            .run(&job, &mut |p| sink_state.set(p as i64).unwrap())
            .unwrap();
        assert_eq!(state.get(), 100);
    }
}
