//! Hooks for watching a retry loop
//!
//! Every attempt slot of a [`Retry`](super::Retry) call reports to a
//! [`RetryObserver`]. [`TracingObserver`] turns those reports into `tracing`
//! events; [`StatsObserver`] counts them.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives one callback per slot event of a retried call
///
/// A slot is either an operation attempt or, when the before-retry hook
/// fails, the hook's failure standing in for that attempt. Causes arrive as
/// `&dyn Debug` so one observer serves every operation error type.
///
/// ```rust
/// use std::fmt::Debug;
/// use std::time::Duration;
/// use repeater::retry::RetryObserver;
///
/// struct SlowCallAlarm {
///     threshold: Duration,
/// }
///
/// impl RetryObserver for SlowCallAlarm {
///     fn on_attempt_start(&self, _attempt: u32, _budget: u32) {}
///
///     fn on_attempt_failed(&self, _attempt: u32, _cause: &dyn Debug) {}
///
///     fn on_success(&self, attempt: u32, total_duration: Duration) {
///         if total_duration > self.threshold {
///             eprintln!("slow call settled on attempt {}", attempt);
///         }
///     }
///
///     fn on_exhausted(&self, attempts: u32, final_cause: &dyn Debug) {
///         eprintln!("gave up after {} slots: {:?}", attempts, final_cause);
///     }
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// The operation is about to run for slot `attempt` of `budget`
    fn on_attempt_start(&self, attempt: u32, budget: u32);

    /// Slot `attempt` failed and a later slot remains
    fn on_attempt_failed(&self, attempt: u32, cause: &dyn Debug);

    /// The before-retry hook failed and took slot `attempt`
    ///
    /// The operation is not invoked for that slot.
    fn on_hook_failed(&self, attempt: u32, cause: &dyn Debug) {
        let _ = (attempt, cause);
    }

    /// Slot `attempt` produced an accepted value, `total_duration` after the call began
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// The last of `attempts` slots failed; the call rejects
    fn on_exhausted(&self, attempts: u32, final_cause: &dyn Debug);
}

/// Ignores every event; the default for [`RetryOptions`](super::RetryOptions)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _budget: u32) {}

    fn on_attempt_failed(&self, _attempt: u32, _cause: &dyn Debug) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_cause: &dyn Debug) {}
}

/// Emits a `tracing` event per slot, tagged with an operation name
///
/// Slot starts and first-try successes log at DEBUG, failed slots and hook
/// failures at WARN, a success after retrying at INFO, exhaustion at ERROR.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    /// Tag events with `operation`
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// The tag carried by every event
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, budget: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            budget = budget,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, attempt: u32, cause: &dyn Debug) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            cause = ?cause,
            "attempt failed, will retry"
        );
    }

    fn on_hook_failed(&self, attempt: u32, cause: &dyn Debug) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            cause = ?cause,
            "before-retry hook failed, attempt skipped"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        let elapsed_ms = total_duration.as_millis() as u64;
        if attempt == 1 {
            tracing::debug!(operation = %self.operation, elapsed_ms, "succeeded on first attempt");
        } else {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                elapsed_ms,
                "succeeded after retry"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_cause: &dyn Debug) {
        tracing::error!(
            operation = %self.operation,
            attempts = attempts,
            cause = ?final_cause,
            "all retry attempts exhausted"
        );
    }
}

/// Counts slot events; handy in tests
///
/// Share it through an `Arc` to read the counts after the call.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    hook_failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation invocations
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Failed slots followed by another slot
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Slots taken by a failing before-retry hook
    pub fn hook_failures(&self) -> u32 {
        self.hook_failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _budget: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, _attempt: u32, _cause: &dyn Debug) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_hook_failed(&self, _attempt: u32, _cause: &dyn Debug) {
        self.hook_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _attempts: u32, _final_cause: &dyn Debug) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }
}

impl<O: RetryObserver + ?Sized> RetryObserver for Arc<O> {
    fn on_attempt_start(&self, attempt: u32, budget: u32) {
        (**self).on_attempt_start(attempt, budget)
    }

    fn on_attempt_failed(&self, attempt: u32, cause: &dyn Debug) {
        (**self).on_attempt_failed(attempt, cause)
    }

    fn on_hook_failed(&self, attempt: u32, cause: &dyn Debug) {
        (**self).on_hook_failed(attempt, cause)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_cause: &dyn Debug) {
        (**self).on_exhausted(attempts, final_cause)
    }
}
