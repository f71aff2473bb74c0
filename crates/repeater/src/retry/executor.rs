//! Retry execution engine
//!
//! This module provides the core retry execution logic: attempt budgets,
//! success predicates, before-retry hooks, and error collection.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use crate::resolve::Resolvable;
use crate::task::{Operation, Task};

use super::error::{Cause, ErrorLog, RetryError};
use super::observer::{NoOpObserver, RetryObserver, TracingObserver};
use super::strategies::{backoff_hook, RetryPolicy};

/// Decides whether a nominally successful value really counts as success
///
/// `Ok(false)` turns the value into a failure carrying the value itself;
/// `Err(e)` turns it into a failure carrying `e`.
pub type SuccessPredicate<C, T, E> = Arc<dyn Fn(&C, &T) -> Result<bool, E> + Send + Sync>;

/// Runs between a failed slot and the next attempt
///
/// Receives the cause of the failed slot and that slot's attempt number.
/// A failing hook fills the next slot with its own cause.
pub type BeforeRetry<C, T, E> = Arc<dyn Fn(&C, &Cause<T, E>, u32) -> Task<(), E> + Send + Sync>;

type SharedOperation<C, A, T, E> = Arc<dyn Operation<C, A, Output = T, Error = E>>;

/// Optional behaviour of a retried operation
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use repeater::retry::{RetryOptions, TracingObserver};
/// use repeater::task::delay;
///
/// let options: RetryOptions<(), u32, String> = RetryOptions::new()
///     .success_predicate(|_ctx: &(), value: &u32| Ok(*value > 10))
///     .before_retry(|_ctx: &(), _cause, _attempt| delay(Duration::from_millis(50)))
///     .provide_all_errors(true)
///     .observer(TracingObserver::new("fetch"));
/// ```
pub struct RetryOptions<C, T, E> {
    success_predicate: Option<SuccessPredicate<C, T, E>>,
    before_retry: Option<BeforeRetry<C, T, E>>,
    provide_all_errors: bool,
    observer: Arc<dyn RetryObserver>,
}

impl<C, T, E> Default for RetryOptions<C, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, T, E> Clone for RetryOptions<C, T, E> {
    fn clone(&self) -> Self {
        Self {
            success_predicate: self.success_predicate.clone(),
            before_retry: self.before_retry.clone(),
            provide_all_errors: self.provide_all_errors,
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<C, T, E> RetryOptions<C, T, E> {
    /// No predicate, no hook, last error only, no observation
    pub fn new() -> Self {
        Self {
            success_predicate: None,
            before_retry: None,
            provide_all_errors: false,
            observer: Arc::new(NoOpObserver),
        }
    }

    /// Set the success predicate
    pub fn success_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&C, &T) -> Result<bool, E> + Send + Sync + 'static,
    {
        self.success_predicate = Some(Arc::new(predicate));
        self
    }

    /// Set the hook run before every retry (never before the first attempt)
    ///
    /// A pending task returned from the hook is awaited before the next
    /// attempt, which makes the hook the place to put delays.
    pub fn before_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &Cause<T, E>, u32) -> Task<(), E> + Send + Sync + 'static,
    {
        self.before_retry = Some(Arc::new(hook));
        self
    }

    /// Report every failure in order instead of only the last one
    pub fn provide_all_errors(mut self, provide_all_errors: bool) -> Self {
        self.provide_all_errors = provide_all_errors;
        self
    }

    /// Set the observer
    ///
    /// The observer receives callbacks during retry execution.
    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: RetryObserver + 'static,
    {
        self.observer = Arc::new(observer);
        self
    }

    /// Check if every failure will be reported
    pub fn provides_all_errors(&self) -> bool {
        self.provide_all_errors
    }
}

/// Decorate `operation` so that each call retries it up to `budget` times
///
/// `budget` is a fixed count or a resolver evaluated once per call against
/// the call's context. Budgets below 2 make exactly one attempt.
///
/// # Example
///
/// ```rust
/// use repeater::retry::{retry, RetryOptions};
/// use repeater::task::Task;
///
/// # async fn example() {
/// let fetch = retry(
///     3,
///     |_ctx: &(), id: u32| -> Task<String, String> { Task::ok(format!("item {}", id)) },
///     RetryOptions::new(),
/// );
///
/// let item = fetch.call(&(), 7).await;
/// assert_eq!(item.unwrap(), "item 7");
/// # }
/// ```
pub fn retry<C, A, T, E, Op>(
    budget: impl Into<Resolvable<C, u32>>,
    operation: Op,
    options: RetryOptions<C, T, E>,
) -> Retry<C, A, T, E>
where
    Op: Operation<C, A, Output = T, Error = E> + 'static,
{
    Retry {
        inner: Arc::new(RetryInner {
            budget: budget.into(),
            operation: Arc::new(operation),
            options,
        }),
    }
}

/// Retry an operation according to a policy
///
/// This is a convenience function for configuration-driven retries: the
/// budget is the policy's `max_attempts`, delays between attempts follow the
/// policy's backoff strategy, and attempts are logged through a
/// [`TracingObserver`].
///
/// # Example
///
/// ```rust,no_run
/// use repeater::retry::{retry_with_policy, RetryPolicy};
/// use repeater::task::Task;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///
///     let download = retry_with_policy(&policy, |_ctx: &(), url: &'static str| {
///         // Simulated operation that might fail
///         Task::<_, std::io::Error>::ok(url.len())
///     });
///
///     let result = download.call(&(), "https://example.com").await;
/// }
/// ```
pub fn retry_with_policy<C, A, T, E, Op>(policy: &RetryPolicy, operation: Op) -> Retry<C, A, T, E>
where
    Op: Operation<C, A, Output = T, Error = E> + 'static,
    C: 'static,
    T: 'static,
    E: Send + 'static,
{
    let options = RetryOptions::new()
        .before_retry(backoff_hook(policy))
        .provide_all_errors(policy.provide_all_errors)
        .observer(TracingObserver::default());

    retry(policy.max_attempts, operation, options)
}

/// A retried operation
///
/// Created by [`retry`]. Cloning is cheap and clones share configuration;
/// every call gets its own attempt counter and error log.
pub struct Retry<C, A, T, E> {
    inner: Arc<RetryInner<C, A, T, E>>,
}

struct RetryInner<C, A, T, E> {
    budget: Resolvable<C, u32>,
    operation: SharedOperation<C, A, T, E>,
    options: RetryOptions<C, T, E>,
}

impl<C, A, T, E> Clone for Retry<C, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, A, T, E> Retry<C, A, T, E>
where
    A: Clone,
    T: Debug,
    E: Debug,
{
    /// Run the retry loop against a borrowed context
    ///
    /// # Returns
    ///
    /// The first value that passes the success predicate, or a `RetryError`
    /// once every attempt slot has failed.
    pub async fn execute(&self, ctx: &C, args: A) -> Result<T, RetryError<T, E>> {
        let inner = &*self.inner;
        let observer = &inner.options.observer;

        let budget = inner
            .budget
            .resolve(ctx)
            .map_err(RetryError::Budget)?
            .max(1);

        let start = Instant::now();
        // Grows per failure; budgets may be huge
        let mut errors = ErrorLog::new();
        let mut attempt = 1;
        let mut outcome = inner.attempt(ctx, args.clone(), attempt, budget).await;

        loop {
            let cause = match outcome {
                Ok(value) => {
                    observer.on_success(attempt, start.elapsed());
                    // The first accepted value ends the call, so no later attempt is validated again
                    return Ok(value);
                }
                Err(cause) => cause,
            };

            if attempt >= budget {
                observer.on_exhausted(attempt, &cause);
                errors.push(cause);
                return Err(RetryError::from_log(
                    attempt,
                    errors,
                    inner.options.provide_all_errors,
                ));
            }

            observer.on_attempt_failed(attempt, &cause);

            let hook = inner
                .options
                .before_retry
                .as_ref()
                .map(|hook| hook(ctx, &cause, attempt));
            errors.push(cause);
            attempt += 1;

            outcome = match hook {
                Some(task) => match task.await {
                    Ok(()) => inner.attempt(ctx, args.clone(), attempt, budget).await,
                    Err(err) => {
                        let cause = Cause::Hook(err);
                        observer.on_hook_failed(attempt, &cause);
                        Err(cause)
                    }
                },
                None => inner.attempt(ctx, args.clone(), attempt, budget).await,
            };
        }
    }
}

impl<C, A, T, E> Retry<C, A, T, E>
where
    C: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Debug + Send + 'static,
    E: Debug + Send + 'static,
{
    /// Start a retried call
    ///
    /// The context is cloned into the returned task so the task can outlive
    /// the borrow; share expensive contexts through an `Arc`.
    pub fn call(&self, ctx: &C, args: A) -> Task<T, RetryError<T, E>> {
        let this = self.clone();
        let ctx = ctx.clone();
        Task::pending(async move { this.execute(&ctx, args).await })
    }
}

impl<C, A, T, E> RetryInner<C, A, T, E> {
    async fn attempt(&self, ctx: &C, args: A, attempt: u32, budget: u32) -> Result<T, Cause<T, E>> {
        self.options.observer.on_attempt_start(attempt, budget);

        let value = self
            .operation
            .call(ctx, args)
            .await
            .map_err(Cause::Operation)?;

        match &self.options.success_predicate {
            None => Ok(value),
            Some(predicate) => match predicate(ctx, &value) {
                Ok(true) => Ok(value),
                Ok(false) => Err(Cause::Rejected(value)),
                Err(err) => Err(Cause::Predicate(err)),
            },
        }
    }
}

impl<C, A, T, E> Operation<C, A> for Retry<C, A, T, E>
where
    C: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Debug + Send + 'static,
    E: Debug + Send + 'static,
{
    type Output = T;
    type Error = RetryError<T, E>;

    fn call(&self, ctx: &C, args: A) -> Task<T, RetryError<T, E>> {
        Retry::call(self, ctx, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::observer::StatsObserver;
    use crate::retry::strategies::RetryStrategy;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::FixedDelay,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    fn timed_out() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "timeout")
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let observer = Arc::new(StatsObserver::new());

        let result = retry(
            3,
            |_: &(), _: ()| -> Task<&str, io::Error> { Task::ok("success") },
            RetryOptions::new().observer(observer.clone()),
        )
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let observer = Arc::new(StatsObserver::new());
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry(
            3,
            move |_: &(), _: ()| -> Task<&str, io::Error> {
                let attempts = attempts_clone.clone();
                Task::pending(async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < 2 {
                        Err(timed_out())
                    } else {
                        Ok("success")
                    }
                })
            },
            RetryOptions::new().observer(observer.clone()),
        )
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.failures(), 1);
        assert_eq!(observer.successes(), 1);
    }

    #[tokio::test]
    async fn test_all_attempts_exhausted() {
        let observer = Arc::new(StatsObserver::new());

        let result = retry(
            3,
            |_: &(), _: ()| -> Task<(), io::Error> {
                Task::err(io::Error::new(io::ErrorKind::TimedOut, "always fails"))
            },
            RetryOptions::new().observer(observer.clone()),
        )
        .call(&(), ())
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(observer.attempt_starts(), 3);
        assert_eq!(observer.failures(), 2); // Only failures followed by a retry
        assert_eq!(observer.exhaustions(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt() {
        let observer = Arc::new(StatsObserver::new());

        let result = retry(
            1,
            |_: &(), _: ()| -> Task<(), io::Error> { Task::err(io::Error::other("error")) },
            RetryOptions::new().observer(observer.clone()),
        )
        .execute(&(), ())
        .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.failures(), 0); // No failures, only exhaustion
    }

    #[tokio::test]
    async fn test_zero_budget_still_attempts_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(
            0,
            move |_: &(), _: ()| -> Task<(), &'static str> {
                counter.fetch_add(1, Ordering::SeqCst);
                Task::err("nope")
            },
            RetryOptions::new(),
        )
        .execute(&(), ())
        .await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_huge_budget_succeeds_without_reserving_slots() {
        let result = retry(
            u32::MAX,
            |_: &(), _: ()| -> Task<u64, u64> { Task::ok(1) },
            RetryOptions::new(),
        )
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_huge_resolved_budget_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(
            Resolvable::from_fn(|_: &()| u32::MAX),
            move |_: &(), _: ()| -> Task<u32, u32> {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Task::err(call)
                } else {
                    Task::ok(call)
                }
            },
            RetryOptions::new(),
        )
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_accepted_value_is_validated_once() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = checks.clone();

        let result = retry(
            4,
            |_: &(), _: ()| -> Task<u32, ()> { Task::ok(8) },
            RetryOptions::new().success_predicate(move |_: &(), _: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
        )
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), 8);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_failure_is_observed() {
        let observer = Arc::new(StatsObserver::new());

        let result = retry(
            2,
            |_: &(), _: ()| -> Task<(), &'static str> { Task::err("op") },
            RetryOptions::new()
                .before_retry(|_: &(), _: &Cause<(), &'static str>, _| Task::err("hook"))
                .observer(observer.clone()),
        )
        .execute(&(), ())
        .await;

        assert_eq!(result.unwrap_err().into_cause(), Some(Cause::Hook("hook")));
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.hook_failures(), 1);
        assert_eq!(observer.exhaustions(), 1);
    }

    #[tokio::test]
    async fn test_retry_with_policy_convenience() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_policy(&quick_policy(3), move |_: &(), _: ()| -> Task<&str, io::Error> {
            let attempt = attempts_clone.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 2 {
                Task::err(timed_out())
            } else {
                Task::ok("success")
            }
        })
        .call(&(), ())
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_with_policy_reports_all_errors() {
        let policy = RetryPolicy {
            provide_all_errors: true,
            ..quick_policy(2)
        };

        let err = retry_with_policy(&policy, |_: &(), n: u32| -> Task<(), u32> { Task::err(n) })
            .call(&(), 5)
            .await
            .unwrap_err();

        let errors = err.into_errors().unwrap().into_vec();
        assert_eq!(errors, vec![Cause::Operation(5), Cause::Operation(5)]);
    }
}
