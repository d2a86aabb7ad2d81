// Job progress tracking

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{HabitatError, Result};

/// Whole-number percentage of `completed` out of `total`.
/// A job with nothing to do is complete.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

/// Latest progress of the running job, shared between the orchestrator's
/// callback and whoever displays it.
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    inner: Arc<Mutex<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub progress: u8,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u8 {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Set the percentage. Values outside 0..=100 are rejected and the
    /// previous value is kept.
    pub fn set(&self, value: i64) -> Result<()> {
        if !(0..=100).contains(&value) {
            return Err(HabitatError::InvalidProgress(value));
        }
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = value as u8;
        Ok(())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot { progress: self.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_progress_state_validates() {
        let state = ProgressState::new();
        state.set(42).unwrap();
        assert_eq!(state.get(), 42);

        assert!(matches!(state.set(101), Err(HabitatError::InvalidProgress(101))));
        assert!(matches!(state.set(-1), Err(HabitatError::InvalidProgress(-1))));
        assert_eq!(state.get(), 42);

        let shared = state.clone();
        shared.set(100).unwrap();
        assert_eq!(state.snapshot(), ProgressSnapshot { progress: 100 });
    }
}
