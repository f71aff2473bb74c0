//! Deferred computations shared by every combinator
//!
//! An operation handed to a combinator may produce its result immediately,
//! fail immediately, or settle later. [`Task`] captures all three so the
//! combinators can treat them uniformly:
//!
//! - a plain value is `Task::Ready(Ok(value))`
//! - a synchronous failure is `Task::Ready(Err(error))`
//! - anything asynchronous is `Task::Pending(future)`
//!
//! A `Task` can be awaited directly. Code that wants to see whether a result
//! is already available (the timeout guard does) can match on it instead.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::time::Duration;

use futures::future::{self, BoxFuture, Either, Ready};

/// A one-shot computation that settles exactly once as success or failure
pub enum Task<T, E> {
    /// Already settled
    Ready(Result<T, E>),
    /// Settles when the future completes
    Pending(BoxFuture<'static, Result<T, E>>),
}

impl<T, E> Task<T, E> {
    /// An already fulfilled task
    pub fn ok(value: T) -> Self {
        Task::Ready(Ok(value))
    }

    /// An already rejected task
    pub fn err(error: E) -> Self {
        Task::Ready(Err(error))
    }

    /// A task that settles when `future` completes
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Task::Pending(Box::pin(future))
    }

    /// Check if the outcome is already available
    pub fn is_ready(&self) -> bool {
        matches!(self, Task::Ready(_))
    }

    /// Check if the task still has to be awaited
    pub fn is_pending(&self) -> bool {
        matches!(self, Task::Pending(_))
    }

    /// Take the outcome if it is already available, or hand the task back
    pub fn into_ready(self) -> Result<Result<T, E>, Self> {
        match self {
            Task::Ready(result) => Ok(result),
            pending => Err(pending),
        }
    }

    /// Map the error type, keeping a ready task ready
    pub fn map_err<F, E2>(self, f: F) -> Task<T, E2>
    where
        F: FnOnce(E) -> E2 + Send + 'static,
        T: 'static,
        E: 'static,
        E2: 'static,
    {
        match self {
            Task::Ready(result) => Task::Ready(result.map_err(f)),
            Task::Pending(fut) => Task::pending(async move { fut.await.map_err(f) }),
        }
    }
}

impl<T, E> From<Result<T, E>> for Task<T, E> {
    fn from(result: Result<T, E>) -> Self {
        Task::Ready(result)
    }
}

impl<T, E> IntoFuture for Task<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Either<Ready<Result<T, E>>, BoxFuture<'static, Result<T, E>>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Task::Ready(result) => Either::Left(future::ready(result)),
            Task::Pending(fut) => Either::Right(fut),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Ready(result) => f.debug_tuple("Task::Ready").field(result).finish(),
            Task::Pending(_) => f.write_str("Task::Pending"),
        }
    }
}

/// Something the combinators can invoke
///
/// `ctx` is the receiver the operation runs against. It is passed explicitly
/// to every operation and hook so that context flow stays visible.
///
/// Any `Fn(&C, A) -> Task<T, E>` closure is an operation. The combinators
/// implement this trait themselves, which lets them nest: a retried
/// timeout-guarded call, or a sequence step that is itself a retry.
///
/// Closures need an annotated context parameter (`|host: &Host, n: u32| ..`)
/// so that they accept a reference of any lifetime.
pub trait Operation<C, A>: Send + Sync {
    /// Success type
    type Output;
    /// Failure type
    type Error;

    /// Start the operation
    fn call(&self, ctx: &C, args: A) -> Task<Self::Output, Self::Error>;
}

impl<C, A, T, E, F> Operation<C, A> for F
where
    F: Fn(&C, A) -> Task<T, E> + Send + Sync,
{
    type Output = T;
    type Error = E;

    fn call(&self, ctx: &C, args: A) -> Task<T, E> {
        self(ctx, args)
    }
}

/// A task that fulfills after `duration`
///
/// Returned from a `before_retry` hook it spaces out attempts.
pub fn delay<E>(duration: Duration) -> Task<(), E>
where
    E: Send + 'static,
{
    Task::pending(async move {
        tokio::time::sleep(duration).await;
        Ok(())
    })
}

/// A task that waits `duration`, then runs `f` and settles with its outcome
pub fn delay_then<F, T, E>(duration: Duration, f: F) -> Task<T, E>
where
    F: FnOnce() -> Task<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Task::pending(async move {
        tokio::time::sleep(duration).await;
        f().await
    })
}
