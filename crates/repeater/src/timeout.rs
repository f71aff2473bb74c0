//! Deadline guard for asynchronous operations
//!
//! [`timeout`] wraps an operation so that a pending result races a timer.
//! Results that are already available pass through untouched: there is
//! nothing left to preempt.

use std::fmt::Debug;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::resolve::Resolvable;
use crate::task::{Operation, Task};

/// Best-effort cancellation, run after the deadline wins
pub type CancelHook<C, E> = Arc<dyn Fn(&C) -> Result<(), E> + Send + Sync>;

type SharedOperation<C, A, T, E> = Arc<dyn Operation<C, A, Output = T, Error = E>>;

/// Guard `operation` with a deadline
///
/// `duration` is fixed or resolved per call against the call's context. The
/// operation's error type must absorb [`Error`] so that a timeout can be
/// reported through it.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use repeater::task::{delay_then, Task};
/// use repeater::timeout::timeout;
/// use repeater::Error;
///
/// # async fn example() {
/// let slow = timeout(Duration::from_millis(5), |_ctx: &(), _: ()| -> Task<u32, Error> {
///     delay_then(Duration::from_secs(2), || Task::ok(1))
/// });
///
/// let err = slow.call(&(), ()).await.unwrap_err();
/// assert!(err.is_timeout());
/// # }
/// ```
pub fn timeout<C, A, T, E, Op>(
    duration: impl Into<Resolvable<C, Duration>>,
    operation: Op,
) -> TimeoutGuard<C, A, T, E>
where
    Op: Operation<C, A, Output = T, Error = E> + 'static,
{
    TimeoutGuard {
        inner: Arc::new(GuardInner {
            duration: duration.into(),
            operation: Arc::new(operation),
            on_cancel: None,
        }),
    }
}

/// An operation raced against a deadline
///
/// Created by [`timeout`]. Clones share configuration.
pub struct TimeoutGuard<C, A, T, E> {
    inner: Arc<GuardInner<C, A, T, E>>,
}

struct GuardInner<C, A, T, E> {
    duration: Resolvable<C, Duration>,
    operation: SharedOperation<C, A, T, E>,
    on_cancel: Option<CancelHook<C, E>>,
}

impl<C, A, T, E> Clone for TimeoutGuard<C, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, A, T, E> TimeoutGuard<C, A, T, E> {
    /// Run `hook` when the deadline wins
    ///
    /// The operation's future has already been dropped by then. A failing
    /// hook is logged and otherwise ignored; the call still fails with the
    /// timeout.
    pub fn on_cancel<F>(self, hook: F) -> Self
    where
        F: Fn(&C) -> Result<(), E> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(GuardInner {
                duration: self.inner.duration.clone(),
                operation: Arc::clone(&self.inner.operation),
                on_cancel: Some(Arc::new(hook)),
            }),
        }
    }
}

impl<C, A, T, E> TimeoutGuard<C, A, T, E>
where
    C: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: From<Error> + Debug + Send + 'static,
{
    /// Invoke the operation under the deadline
    ///
    /// A ready result, success or failure, is returned as is and the
    /// duration is never resolved. A pending result is raced against the
    /// timer; whichever finishes first decides the outcome and the loser is
    /// dropped.
    pub fn call(&self, ctx: &C, args: A) -> Task<T, E> {
        let pending = match self.inner.operation.call(ctx, args).into_ready() {
            Ok(settled) => return Task::Ready(settled),
            Err(pending) => pending,
        };

        let limit = match self.inner.duration.resolve(ctx) {
            Ok(limit) => limit,
            Err(err) => return Task::err(err.into()),
        };

        let cancel = self
            .inner
            .on_cancel
            .clone()
            .map(|hook| (hook, ctx.clone()));

        Task::pending(async move {
            match tokio::time::timeout(limit, pending.into_future()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let elapsed_ms = limit.as_millis() as u64;

                    if let Some((hook, ctx)) = cancel {
                        if let Err(err) = hook(&ctx) {
                            tracing::debug!(error = ?err, "cancellation after timeout failed");
                        }
                    }

                    tracing::warn!(timeout_ms = elapsed_ms, "operation timed out");
                    Err(Error::timeout(elapsed_ms).into())
                }
            }
        })
    }
}

impl<C, A, T, E> Operation<C, A> for TimeoutGuard<C, A, T, E>
where
    C: Clone + Send + Sync + 'static,
    T: Send + 'static,
    E: From<Error> + Debug + Send + 'static,
{
    type Output = T;
    type Error = E;

    fn call(&self, ctx: &C, args: A) -> Task<T, E> {
        TimeoutGuard::call(self, ctx, args)
    }
}
