//! Cancellable delayed inputs.
//!
//! Retry and reconnect delays are tokio tasks that sleep and then deliver a
//! value into the bridge loop. Dropping or cancelling the [`ScheduledTask`]
//! aborts the sleep.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// TimerKind
// ============================================================================

/// Which delay fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delay between failed primary attempts.
    Retry,
    /// Delay after an established primary socket dropped.
    Reconnect,
}

// ============================================================================
// ScheduledTask
// ============================================================================

/// Handle to a pending delayed delivery. Aborts on drop.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancels the delivery if it has not happened yet.
    #[inline]
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the value was delivered or the task was cancelled.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Delivers values into an unbounded channel after a delay.
#[derive(Debug)]
pub struct Scheduler<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Creates a scheduler delivering into `tx`.
    #[inline]
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<T>) -> Self {
        Self { tx }
    }

    /// Sends `value` after `delay`.
    #[must_use = "dropping the task cancels the delivery"]
    pub fn schedule(&self, delay: Duration, value: T) -> ScheduledTask {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(value);
        });

        ScheduledTask { handle }
    }
}

// ============================================================================
// Tests
// ============================================================================
