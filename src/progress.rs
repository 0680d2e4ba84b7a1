//! Progress reporting for remeshing runs.
//!
//! The pipeline reports once per stage it enters, so callers can drive a
//! progress bar or log without enabling `tracing`.
//!
//! # Example
//!
//! ```
//! use quadflow::progress::Progress;
//! use quadflow::RemeshOptions;
//!
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! });
//!
//! let options = RemeshOptions::new(500).with_progress(progress);
//! ```

use std::sync::Arc;

use crate::pipeline::Stage;

/// A progress callback that receives updates while a run advances.
///
/// The callback receives:
/// - `current`: 1-based position of the stage just entered
/// - `total`: number of stages in a full run
/// - `message`: name of the stage
#[derive(Clone)]
pub struct Progress {
    callback: Arc<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Report that `stage` has been entered.
    #[inline]
    pub fn report(&self, stage: Stage) {
        (self.callback)(stage.ordinal() + 1, Stage::ALL.len(), stage.name());
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_passes_stage_position() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |current, total, message| {
            sink.lock().unwrap().push((current, total, message.to_string()));
        });

        progress.report(Stage::Configured);
        progress.report(Stage::IndexMapped);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (1, 12, "configuration".to_string()));
        assert_eq!(seen[1], (12, 12, "index map".to_string()));
    }
}
