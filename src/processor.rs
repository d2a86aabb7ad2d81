// Stream processor
//
// Owns one video source and runs capture -> detect -> buffer on a dedicated
// thread. Sealed segments go to the camera's persistence queue. Whatever way the
// capture loop ends, panics included, the tail of the buffer is sealed, the source
// is released and the queue is drained.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::camera::CameraId;
use crate::config::{DetectorParams, PipelineConfig};
use crate::detect::{FrameDetector, TrackingState};
use crate::error::{panic_message, HabitatError, Result};
use crate::persist::{PersistQueue, SegmentSink};
use crate::segment::SegmentBuffer;
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the capture thread needs, moved into it on start.
struct CaptureContext {
    camera: CameraId,
    source: Box<dyn VideoSource>,
    detector: FrameDetector,
    buffer: Arc<SegmentBuffer>,
    queue: Arc<PersistQueue>,
    stop_requested: Arc<AtomicBool>,
    state: Arc<Mutex<ProcessorState>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl CaptureContext {
    fn run(mut self) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.capture_loop())) {
            let msg = panic_message(payload.as_ref());
            log::error!("[{}] Capture loop {}, sealing buffered frames", self.camera, msg);
            *lock(&self.fault) = Some(msg);
        }
        self.finish();
    }

    fn capture_loop(&mut self) {
        let mut background = self.detector.new_background();
        let mut tracking = TrackingState::default();

        while !self.stop_requested.load(Ordering::SeqCst) {
            let mut frame = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("[{}] End of stream", self.camera);
                    break;
                }
                Err(e) => {
                    log::error!("[{}] Decode fault, ending stream: {}", self.camera, e);
                    break;
                }
            };

            let detection = match self.detector.detect(&mut frame, &mut background, tracking) {
                Ok(d) => d,
                Err(e) => {
                    log::error!("[{}] Decode fault in detector, ending stream: {}", self.camera, e);
                    break;
                }
            };

            let full = self.buffer.push(frame, &detection);
            tracking = detection.tracking;

            if full {
                if let Some(segment) = self.buffer.seal() {
                    self.queue.enqueue(segment);
                }
            }
        }
    }

    fn finish(&mut self) {
        if let Some(segment) = self.buffer.seal() {
            self.queue.enqueue(segment);
        }

        let source = &mut self.source;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| source.release())) {
            let msg = panic_message(payload.as_ref());
            log::error!("[{}] Releasing video source {}", self.camera, msg);
            lock(&self.fault).get_or_insert(msg);
        }
        self.queue.stop();

        *lock(&self.state) = ProcessorState::Stopped;
        log::info!(
            "[{}] Stream processor finished after {} frames",
            self.camera, self.buffer.total_frames()
        );
    }
}

pub struct StreamProcessor {
    camera: CameraId,
    params: DetectorParams,
    stop_timeout: Duration,
    state: Arc<Mutex<ProcessorState>>,
    stop_requested: Arc<AtomicBool>,
    source: Mutex<Option<Box<dyn VideoSource>>>,
    buffer: Arc<SegmentBuffer>,
    queue: Arc<PersistQueue>,
    handle: Mutex<Option<JoinHandle<()>>>,
    done: Mutex<Option<Receiver<()>>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl StreamProcessor {
    pub fn new(
        camera: CameraId,
        source: Box<dyn VideoSource>,
        real_start: NaiveDateTime,
        config: &PipelineConfig,
        sink: Arc<dyn SegmentSink>,
    ) -> Self {
        Self {
            camera,
            params: config.detector.clone(),
            stop_timeout: config.stop_timeout(),
            state: Arc::new(Mutex::new(ProcessorState::Idle)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            source: Mutex::new(Some(source)),
            buffer: Arc::new(SegmentBuffer::new(
                camera,
                real_start,
                config.fps,
                config.segment_capacity,
            )),
            queue: Arc::new(PersistQueue::new(camera, sink, config.fps, config.save_queue_capacity)),
            handle: Mutex::new(None),
            done: Mutex::new(None),
            fault: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn state(&self) -> ProcessorState {
        *lock(&self.state)
    }

    /// Frames appended to the buffer so far.
    pub fn frames_processed(&self) -> u64 {
        self.buffer.total_frames()
    }

    pub fn start(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if *state != ProcessorState::Idle {
            return Err(HabitatError::InvalidState(format!("{} is {:?}", self.camera, *state)));
        }

        let mut slot = lock(&self.source);
        match slot.as_ref() {
            Some(source) if source.is_opened() => {}
            _ => {
                return Err(HabitatError::OpenFailure(format!(
                    "{} video source is not open",
                    self.camera
                )))
            }
        }
        let source = slot
            .take()
            .ok_or_else(|| HabitatError::OpenFailure(self.camera.to_string()))?;

        self.queue.start()?;

        let (done_tx, done_rx) = mpsc::channel();
        let context = CaptureContext {
            camera: self.camera,
            source,
            detector: FrameDetector::new(self.params.clone()),
            buffer: Arc::clone(&self.buffer),
            queue: Arc::clone(&self.queue),
            stop_requested: Arc::clone(&self.stop_requested),
            state: Arc::clone(&self.state),
            fault: Arc::clone(&self.fault),
        };

        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", self.camera.output_folder()))
            .spawn(move || {
                context.run();
                let _ = done_tx.send(());
            })
            .map_err(|e| HabitatError::Other(format!("Failed to spawn capture thread: {}", e)))?;

        *lock(&self.handle) = Some(handle);
        *lock(&self.done) = Some(done_rx);
        *state = ProcessorState::Running;
        log::info!("[{}] Stream processor started", self.camera);
        Ok(())
    }

    /// Ask the capture loop to finish and wait up to the stop timeout for it.
    /// A timeout is logged, not returned. Calling it again is harmless.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);

        {
            let mut state = lock(&self.state);
            match *state {
                ProcessorState::Idle => {
                    // Never started: nothing runs, just free the source
                    if let Some(mut source) = lock(&self.source).take() {
                        source.release();
                    }
                    self.queue.stop();
                    *state = ProcessorState::Stopped;
                    return;
                }
                ProcessorState::Stopped => {
                    drop(state);
                    self.join();
                    return;
                }
                ProcessorState::Running => *state = ProcessorState::Stopping,
                ProcessorState::Stopping => {}
            }
        }

        let finished = match lock(&self.done).as_ref() {
            Some(done) => match done.recv_timeout(self.stop_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                Err(RecvTimeoutError::Timeout) => false,
            },
            None => true,
        };

        if finished {
            self.join();
        } else {
            log::warn!(
                "[{}] Shutdown timeout: capture thread still running after {:?}",
                self.camera, self.stop_timeout
            );
        }
    }

    /// Block until the capture loop has ended on its own. Frames buffered
    /// before a panic are still persisted, but the run counts as failed.
    pub fn wait(&self) -> Result<()> {
        self.join();
        match lock(&self.fault).clone() {
            Some(msg) => Err(HabitatError::Capture(format!("{}: {}", self.camera, msg))),
            None => Ok(()),
        }
    }

    fn join(&self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(payload) = handle.join() {
                let msg = panic_message(payload.as_ref());
                log::error!("[{}] Capture thread {}", self.camera, msg);
                lock(&self.fault).get_or_insert(msg);
            }
        }
        // Covers a capture thread that died before draining
        self.queue.stop();
        *lock(&self.done) = None;
        *lock(&self.state) = ProcessorState::Stopped;
    }
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        if self.state() != ProcessorState::Stopped {
            self.stop();
        }
    }
}
