// Work unit pool
//
// A fixed number of worker threads pull units from a shared queue until it is
// empty. Each unit runs under catch_unwind so one bad recording never takes a
// worker down; outcomes stream back to the caller as they complete.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::error::panic_message;

use super::{UnitRunner, WorkUnit};

/// Result of one work unit.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub unit: WorkUnit,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `Success: <path>` or `Failed: <path>, <error>`
    pub fn status(&self) -> String {
        match &self.error {
            None => format!("Success: {}", self.unit.video_path.display()),
            Some(e) => format!("Failed: {}, {}", self.unit.video_path.display(), e),
        }
    }
}

fn run_one(runner: &dyn UnitRunner, unit: WorkUnit) -> UnitOutcome {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runner.run_unit(&unit)));
    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };
    UnitOutcome { unit, error }
}

/// Run every unit on `workers` threads. `on_complete` is called on the calling
/// thread once per finished unit, with the number completed so far.
pub fn run_pool(
    units: Vec<WorkUnit>,
    workers: usize,
    runner: Arc<dyn UnitRunner>,
    mut on_complete: impl FnMut(&UnitOutcome, usize),
) -> Vec<UnitOutcome> {
    let total = units.len();
    let workers = workers.max(1).min(total.max(1));
    let queue = Arc::new(Mutex::new(VecDeque::from(units)));
    let (tx, rx) = mpsc::channel::<UnitOutcome>();

    let mut outcomes = Vec::with_capacity(total);
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let runner = Arc::clone(&runner);
            let tx = tx.clone();
            scope.spawn(move || loop {
                let next = queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
                let Some(unit) = next else { break };
                log::info!("[{}] Processing {}", unit.camera, unit.video_path.display());
                if tx.send(run_one(runner.as_ref(), unit)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        for outcome in rx {
            outcomes.push(outcome);
            on_complete(&outcomes[outcomes.len() - 1], outcomes.len());
        }
    });
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraId;
    use crate::error::{HabitatError, Result};
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRunner {
        calls: AtomicUsize,
    }

    impl UnitRunner for ScriptedRunner {
        fn run_unit(&self, unit: &WorkUnit) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = unit.video_path.file_name().unwrap().to_str().unwrap();
            match name {
                "bad.mp4" => Err(HabitatError::OpenFailure("bad.mp4".to_string())),
                "panic.mp4" => panic!("decoder exploded"),
                _ => Ok(()),
            }
        }
    }

    fn unit(name: &str) -> WorkUnit {
        WorkUnit {
            video_path: PathBuf::from("/rec/Camera1").join(name),
            real_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            camera: CameraId::Cam1,
        }
    }

    #[test]
    fn test_pool_runs_every_unit_and_captures_failures() {
        let runner = Arc::new(ScriptedRunner { calls: AtomicUsize::new(0) });
        let units = vec![unit("a.mp4"), unit("bad.mp4"), unit("panic.mp4"), unit("b.mp4")];
        let mut seen = Vec::new();

        let outcomes = run_pool(units, 3, runner.clone(), |_, done| seen.push(done));

        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);

        let mut statuses: Vec<String> = outcomes.iter().map(|o| o.status()).collect();
        statuses.sort();
        assert_eq!(statuses[0], "Failed: /rec/Camera1/bad.mp4, Failed to open video source: bad.mp4");
        assert_eq!(statuses[1], "Failed: /rec/Camera1/panic.mp4, panicked: decoder exploded");
        assert_eq!(statuses[2], "Success: /rec/Camera1/a.mp4");
    }

    #[test]
    fn test_empty_pool() {
        let runner = Arc::new(ScriptedRunner { calls: AtomicUsize::new(0) });
        let outcomes = run_pool(Vec::new(), 4, runner, |_, _| panic!("no units"));
        assert!(outcomes.is_empty());
    }
}
