// Bounded persistence queue with a drop-on-full policy
//
// Capture never waits on persistence: a full queue rejects the new segment.
// A single drain thread hands segments to the sink one at a time, outside the
// queue lock, and keeps going after sink failures.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::camera::CameraId;
use crate::error::{HabitatError, Result};
use crate::segment::Segment;

use super::SegmentSink;

struct QueueState {
    pending: VecDeque<Segment>,
    running: bool,
}

struct Shared {
    camera: CameraId,
    fps: u32,
    capacity: usize,
    sink: Arc<dyn SegmentSink>,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, segment: &Segment) {
        match self.sink.persist(segment, self.fps) {
            Ok(path) => log::info!(
                "[{}] Saved segment of {} frames to {}",
                self.camera, segment.len(), path.display()
            ),
            Err(e) => log::error!(
                "[{}] Error saving segment starting {}: {}",
                self.camera, segment.start_time, e
            ),
        }
    }

    fn drain_loop(&self) {
        loop {
            let next = {
                let mut state = self.lock();
                while state.pending.is_empty() && state.running {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                match state.pending.pop_front() {
                    Some(segment) => segment,
                    // Not running and nothing left
                    None => break,
                }
            };
            self.save(&next);
        }
        log::debug!("[{}] Save queue drained", self.camera);
    }
}

pub struct PersistQueue {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PersistQueue {
    pub fn new(camera: CameraId, sink: Arc<dyn SegmentSink>, fps: u32, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                camera,
                fps,
                capacity: capacity.max(1),
                sink,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: true,
                }),
                available: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the drain thread. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|p| p.into_inner());
        if handle.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("save-{}", self.shared.camera.output_folder()))
            .spawn(move || shared.drain_loop())
            .map_err(|e| HabitatError::Other(format!("Failed to spawn save thread: {}", e)))?;
        *handle = Some(spawned);
        Ok(())
    }

    /// Hand a segment over for saving. Returns false when it was dropped.
    pub fn enqueue(&self, segment: Segment) -> bool {
        let mut state = self.shared.lock();
        if !state.running {
            log::warn!("[{}] Save queue stopped, dropping segment", self.shared.camera);
            return false;
        }
        if state.pending.len() >= self.shared.capacity {
            log::warn!(
                "[{}] Save queue full, dropping segment of {} frames starting {}",
                self.shared.camera, segment.len(), segment.start_time
            );
            return false;
        }
        state.pending.push_back(segment);
        self.shared.available.notify_one();
        true
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Stop accepting segments, drain what is pending, and wait for the drain
    /// thread to exit. Without a drain thread the backlog is saved inline.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            self.shared.available.notify_all();
        }

        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("[{}] Save thread panicked", self.shared.camera);
                }
            }
            None => self.shared.drain_loop(),
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::Duration;

    use chrono::NaiveDate;

    use crate::detect::Frame;

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<usize>>,
        fail_first: bool,
    }

    impl SegmentSink for RecordingSink {
        fn persist(&self, segment: &Segment, _fps: u32) -> Result<PathBuf> {
            let mut saved = self.saved.lock().unwrap();
            saved.push(segment.len());
            if self.fail_first && saved.len() == 1 {
                return Err(HabitatError::Persist("disk full".to_string()));
            }
            Ok(PathBuf::from(format!("segment_{}.mp4", saved.len())))
        }
    }

    /// Blocks in persist until released
    struct GatedSink {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl SegmentSink for GatedSink {
        fn persist(&self, _segment: &Segment, _fps: u32) -> Result<PathBuf> {
            self.entered.lock().unwrap().send(()).ok();
            self.release.lock().unwrap().recv().ok();
            Ok(PathBuf::from("gated.mp4"))
        }
    }

    fn segment(frames: usize) -> Segment {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        Segment {
            camera: CameraId::Cam1,
            frames: (0..frames).map(|_| Frame::new(1, 1)).collect(),
            observations: Vec::new(),
            start_time: start,
        }
    }

    #[test]
    fn test_overflow_rejects_without_blocking() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PersistQueue::new(CameraId::Cam1, sink.clone(), 15, 3);

        let accepted: Vec<bool> = (1..=4).map(|n| queue.enqueue(segment(n))).collect();
        assert_eq!(accepted, vec![true, true, true, false]);
        assert_eq!(queue.pending(), 3);

        queue.start().unwrap();
        queue.stop();
        assert_eq!(*sink.saved.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_stop_drains_everything_accepted() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PersistQueue::new(CameraId::Cam2, sink.clone(), 15, 3);
        queue.start().unwrap();

        for n in 1..=3 {
            assert!(queue.enqueue(segment(n)));
        }
        queue.stop();
        assert_eq!(sink.saved.lock().unwrap().len(), 3);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_sink_failure_does_not_stop_draining() {
        let sink = Arc::new(RecordingSink { fail_first: true, ..Default::default() });
        let queue = PersistQueue::new(CameraId::Cam3, sink.clone(), 15, 3);
        queue.enqueue(segment(5));
        queue.enqueue(segment(6));
        queue.start().unwrap();
        queue.stop();
        assert_eq!(*sink.saved.lock().unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_enqueue_after_stop_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PersistQueue::new(CameraId::Cam1, sink.clone(), 15, 3);
        queue.start().unwrap();
        queue.stop();
        assert!(!queue.enqueue(segment(1)));
        queue.stop();
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_without_start_saves_inline() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PersistQueue::new(CameraId::Cam1, sink.clone(), 15, 3);
        queue.enqueue(segment(2));
        queue.stop();
        assert_eq!(*sink.saved.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_enqueue_does_not_wait_for_slow_sink() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(GatedSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let queue = PersistQueue::new(CameraId::Cam1, sink, 15, 1);
        queue.start().unwrap();

        assert!(queue.enqueue(segment(1)));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Sink is busy with the first segment; one slot free, then full
        assert!(queue.enqueue(segment(2)));
        assert!(!queue.enqueue(segment(3)));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        queue.stop();
    }
}
