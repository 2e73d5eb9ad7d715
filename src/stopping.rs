//! Cooperative cancellation for in-flight generation.
//!
//! The decode loop polls the flag between token-producing steps and halts as
//! soon as it observes the set state, leaving already-produced output intact.
//! Interruption is a normal completion path, never an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stopping flag threaded through generation calls.
///
/// One instance lives for the worker's lifetime; it is cleared at the start
/// of each generation request and set by an interrupt request. Clones share
/// the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct StoppingCriteria {
    interrupted: Arc<AtomicBool>,
}

impl StoppingCriteria {
    /// Create a new, unset stopping flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the stop condition. Idempotent.
    pub fn reset(&self) {
        self.interrupted.store(false, Ordering::Relaxed);
    }

    /// Set the stop condition. Idempotent.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    /// Whether an interrupt has been requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn starts_cleared() {
        let flag = StoppingCriteria::new();
        assert!(!flag.is_interrupted());
    }

    #[test]
    fn interrupt_and_reset_are_idempotent() {
        let flag = StoppingCriteria::new();
        flag.interrupt();
        flag.interrupt();
        assert!(flag.is_interrupted());
        flag.reset();
        flag.reset();
        assert!(!flag.is_interrupted());
    }

    #[test]
    fn clones_share_the_flag() {
        let flag = StoppingCriteria::new();
        let observer = flag.clone();
        flag.interrupt();
        assert!(observer.is_interrupted());
        observer.reset();
        assert!(!flag.is_interrupted());
    }

    #[test]
    fn reset_after_interrupt_leaves_no_residue() {
        // reset → generate must behave like a fresh flag's first generate.
        let flag = StoppingCriteria::new();
        flag.interrupt();
        flag.reset();
        assert!(!flag.is_interrupted());
        assert_eq!(
            flag.is_interrupted(),
            StoppingCriteria::new().is_interrupted()
        );
    }
}
