use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

/// Cooperative cancellation, polled by the algorithms at phase boundaries.
pub trait TerminationFlag: Send + Sync {
    fn is_running(&self) -> Result<bool>;
}

/// Stop switch with an optional deadline.
///
/// Timeouts are layered on top of the algorithms through the deadline, the algorithms
/// themselves only ever ask whether they may keep running.
#[derive(Debug)]
pub struct RunningFlag {
    running: AtomicBool,
    deadline: Option<Instant>,
}

impl RunningFlag {
    /// A flag that keeps running until `stop` is called.
    pub fn always() -> Self {
        Self {
            running: AtomicBool::new(true),
            deadline: None,
        }
    }

    /// A flag that trips once `timeout` elapsed, or earlier on `stop`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            running: AtomicBool::new(true),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::always()
    }
}

impl TerminationFlag for RunningFlag {
    fn is_running(&self) -> Result<bool> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(match self.deadline {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        })
    }
}
