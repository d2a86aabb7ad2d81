// Segment buffering
//
// A stream appends (frame, observation) pairs under one lock. Sealing moves the
// buffered contents out and resets the buffer in the same critical section, so a
// frame is never owned by the buffer and a sealed segment at the same time.

use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::camera::CameraId;
use crate::detect::{Detection, Frame};

/// Per-frame tracking record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    pub timestamp: NaiveDateTime,
    pub is_active: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub camera: CameraId,
}

/// A contiguous run of frames with their observations, index-aligned.
#[derive(Debug, Clone)]
pub struct Segment {
    pub camera: CameraId,
    pub frames: Vec<Frame>,
    pub observations: Vec<FrameObservation>,
    pub start_time: NaiveDateTime,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_secs(&self, fps: u32) -> f64 {
        self.frames.len() as f64 / fps.max(1) as f64
    }
}

/// Offset of frame `index` from the start of a run at `fps`.
pub fn frame_offset(index: usize, fps: u32) -> Duration {
    let nanos = (index as i128 * 1_000_000_000) / fps.max(1) as i128;
    Duration::nanoseconds(nanos as i64)
}

struct BufferState {
    frames: Vec<Frame>,
    observations: Vec<FrameObservation>,
    segment_start: NaiveDateTime,
    total_frames: u64,
}

pub struct SegmentBuffer {
    camera: CameraId,
    fps: u32,
    capacity: usize,
    state: Mutex<BufferState>,
}

impl SegmentBuffer {
    pub fn new(camera: CameraId, start: NaiveDateTime, fps: u32, capacity: usize) -> Self {
        Self {
            camera,
            fps,
            capacity: capacity.max(1),
            state: Mutex::new(BufferState {
                frames: Vec::new(),
                observations: Vec::new(),
                segment_start: start,
                total_frames: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        // A panic while holding the lock leaves plain data behind; keep using it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a frame and its detection result, stamping it with the current
    /// video time. Returns true once the buffer has reached capacity.
    pub fn push(&self, frame: Frame, detection: &Detection) -> bool {
        let mut state = self.lock();
        let timestamp = state.segment_start + frame_offset(state.frames.len(), self.fps);
        state.observations.push(FrameObservation {
            timestamp,
            is_active: detection.activity,
            x: detection.x,
            y: detection.y,
            camera: self.camera,
        });
        state.frames.push(frame);
        state.total_frames += 1;
        state.frames.len() >= self.capacity
    }

    /// Video time of the next frame to be appended.
    pub fn current_time(&self) -> NaiveDateTime {
        let state = self.lock();
        state.segment_start + frame_offset(state.frames.len(), self.fps)
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_frames(&self) -> u64 {
        self.lock().total_frames
    }

    /// Take everything buffered as a segment and start the next one at the
    /// current video time. `None` when nothing is buffered.
    pub fn seal(&self) -> Option<Segment> {
        let mut state = self.lock();
        if state.frames.is_empty() {
            return None;
        }

        let start_time = state.segment_start;
        let frames = std::mem::take(&mut state.frames);
        let observations = std::mem::take(&mut state.observations);
        state.segment_start = start_time + frame_offset(frames.len(), self.fps);

        log::debug!(
            "[{}] Sealed segment from {} with {} frames",
            self.camera, start_time, frames.len()
        );

        Some(Segment {
            camera: self.camera,
            frames,
            observations,
            start_time,
        })
    }
}
