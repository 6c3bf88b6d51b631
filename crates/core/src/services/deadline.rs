//! Cancellation and wall-clock budget shared by the stages of a pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation flag plus optional wall-clock deadline for one pass.
///
/// Clones share the flag, so a handle kept by the caller can cancel a pass
/// running elsewhere. Checked between states, between walked entries and
/// between directory slots while parsing.
#[derive(Debug, Clone, Default)]
pub struct PassDeadline {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl PassDeadline {
    /// No deadline; only explicit cancellation stops the pass.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { cancelled: Arc::default(), deadline: Some(Instant::now() + timeout) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancelled explicitly or past the deadline.
    pub fn expired(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_deadline_is_expired() {
        let deadline = PassDeadline::new();
        let handle = deadline.clone();
        assert!(!deadline.expired());
        handle.cancel();
        assert!(deadline.expired());
        assert!(PassDeadline::with_timeout(Duration::ZERO).expired());
    }

    #[test]
    fn generous_timeout_is_not_expired() {
        let deadline = PassDeadline::with_timeout(Duration::from_secs(3600));
        assert!(!deadline.expired());
        assert!(!deadline.is_cancelled());
    }
}
