//! Resumable multi-step pipelines
//!
//! A [`ResumableSequence`] threads a value through an ordered list of steps.
//! When a step fails the sequence keeps its place: the next invocation runs
//! the failed step again with the same input instead of starting over. Once
//! every step has succeeded, further invocations resolve immediately with
//! the final value.
//!
//! Only one invocation may be in flight at a time. A second invocation
//! issued before the first settles (or is dropped) fails with
//! [`SequenceError::Busy`] and leaves the state alone.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::task::{Operation, Task};

/// One step of a sequence: takes the previous value, produces the next
pub type Step<C, V, E> = Arc<dyn Operation<C, V, Output = V, Error = E>>;

/// Observes step failures without changing them
pub type ErrorHook<C, E> = Arc<dyn Fn(&C, &E) + Send + Sync>;

/// Box an operation as a sequence step
///
/// Any operation fits, including a [`Retry`](crate::retry::Retry) or a
/// [`TimeoutGuard`](crate::timeout::TimeoutGuard) whose input and output
/// types agree.
pub fn sequence_step<C, V, E, Op>(operation: Op) -> Step<C, V, E>
where
    Op: Operation<C, V, Output = V, Error = E> + 'static,
{
    Arc::new(operation)
}

/// Options of a resumable sequence
pub struct SequenceOptions<C, V, E> {
    initial_arg: V,
    on_error: Option<ErrorHook<C, E>>,
}

impl<C, V, E> SequenceOptions<C, V, E> {
    /// Feed `initial_arg` into the first step
    pub fn new(initial_arg: V) -> Self {
        Self {
            initial_arg,
            on_error: None,
        }
    }

    /// Call `hook` with the context and the cause whenever a step fails
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C, &E) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl<C, V: Default, E> Default for SequenceOptions<C, V, E> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

/// Errors returned by a sequence invocation
#[derive(Debug)]
pub enum SequenceError<E> {
    /// A step failed; the sequence will resume at this step
    Step {
        /// Zero-based index of the failed step
        index: usize,
        /// The step's own error
        source: E,
    },

    /// Another invocation of the same sequence is still in flight
    Busy,
}

impl<E> SequenceError<E> {
    /// Index of the failed step, if a step failed
    pub fn index(&self) -> Option<usize> {
        match self {
            SequenceError::Step { index, .. } => Some(*index),
            SequenceError::Busy => None,
        }
    }

    /// Check if the invocation was turned away
    pub fn is_busy(&self) -> bool {
        matches!(self, SequenceError::Busy)
    }

    /// Consume this error, returning the failed step's error
    pub fn into_source(self) -> Option<E> {
        match self {
            SequenceError::Step { source, .. } => Some(source),
            SequenceError::Busy => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for SequenceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::Step { index, source } => {
                write!(f, "Sequence step {} failed: {}", index, source)
            }
            SequenceError::Busy => write!(f, "Sequence is already running"),
        }
    }
}

impl<E: Error + 'static> Error for SequenceError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SequenceError::Step { source, .. } => Some(source),
            SequenceError::Busy => None,
        }
    }
}

/// Create a resumable sequence bound to `context`
///
/// # Example
///
/// ```rust
/// use repeater::sequence::{resumable, sequence_step, SequenceOptions};
/// use repeater::task::Task;
///
/// # async fn example() {
/// let pipeline = resumable(
///     (),
///     vec![
///         sequence_step(|_: &(), n: u32| -> Task<u32, String> { Task::ok(n + 1) }),
///         sequence_step(|_: &(), n: u32| -> Task<u32, String> { Task::ok(n * 2) }),
///     ],
///     SequenceOptions::new(1),
/// );
///
/// assert_eq!(pipeline.invoke().await.unwrap(), 4);
/// assert!(pipeline.is_complete());
/// # }
/// ```
pub fn resumable<C, V, E>(
    context: C,
    steps: Vec<Step<C, V, E>>,
    options: SequenceOptions<C, V, E>,
) -> ResumableSequence<C, V, E>
where
    V: Clone,
{
    let state = SequenceState {
        progress: 0,
        last_result: options.initial_arg.clone(),
        initial_arg: options.initial_arg,
        in_flight: false,
    };

    ResumableSequence {
        inner: Arc::new(SequenceInner {
            context,
            steps,
            on_error: options.on_error,
            state: Mutex::new(state),
        }),
    }
}

/// A pipeline that resumes at its last failed step
///
/// Created by [`resumable`]. Clones share progress.
pub struct ResumableSequence<C, V, E> {
    inner: Arc<SequenceInner<C, V, E>>,
}

struct SequenceInner<C, V, E> {
    context: C,
    steps: Vec<Step<C, V, E>>,
    on_error: Option<ErrorHook<C, E>>,
    state: Mutex<SequenceState<V>>,
}

/// Progress shared by every invocation
///
/// `last_result` is the input of the step at `progress`, or the final
/// value once `progress` equals the step count.
struct SequenceState<V> {
    progress: usize,
    last_result: V,
    initial_arg: V,
    in_flight: bool,
}

impl<C, V, E> SequenceInner<C, V, E> {
    fn lock(&self) -> MutexGuard<'_, SequenceState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C, V, E> Clone for ResumableSequence<C, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, V, E> ResumableSequence<C, V, E> {
    /// Number of steps
    pub fn len(&self) -> usize {
        self.inner.steps.len()
    }

    /// Check if the sequence has no steps
    pub fn is_empty(&self) -> bool {
        self.inner.steps.is_empty()
    }

    /// Index of the next step to run
    pub fn progress(&self) -> usize {
        self.inner.lock().progress
    }

    /// Check if every step has succeeded
    pub fn is_complete(&self) -> bool {
        self.progress() >= self.len()
    }

    /// Check if an invocation is in flight
    pub fn is_running(&self) -> bool {
        self.inner.lock().in_flight
    }

    /// The context every step runs against
    pub fn context(&self) -> &C {
        &self.inner.context
    }
}

impl<C, V: Clone, E> ResumableSequence<C, V, E> {
    /// The input of the pending step, or the final value once complete
    pub fn last_result(&self) -> V {
        self.inner.lock().last_result.clone()
    }

    /// Start over from the first step with the initial argument
    pub fn reset(&self) -> Result<(), SequenceError<E>> {
        let mut state = self.inner.lock();
        if state.in_flight {
            return Err(SequenceError::Busy);
        }
        let initial_arg = state.initial_arg.clone();
        state.progress = 0;
        state.last_result = initial_arg;
        Ok(())
    }
}

impl<C, V, E> ResumableSequence<C, V, E>
where
    C: Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Send + 'static,
{
    /// Run the remaining steps
    ///
    /// A complete sequence settles at once with its final value. Otherwise
    /// the returned task runs from the current step; on failure the step
    /// and its input are kept for the next invocation.
    pub fn invoke(&self) -> Task<V, SequenceError<E>> {
        let mut state = self.inner.lock();

        if state.in_flight {
            return Task::err(SequenceError::Busy);
        }

        if state.progress >= self.inner.steps.len() {
            debug!(steps = self.inner.steps.len(), "sequence already complete");
            return Task::ok(state.last_result.clone());
        }

        state.in_flight = true;
        drop(state);

        let flight = InFlight {
            inner: Arc::clone(&self.inner),
        };
        Task::pending(async move { flight.run().await })
    }
}

/// Owns an invocation; clears the in-flight flag when dropped
struct InFlight<C, V, E> {
    inner: Arc<SequenceInner<C, V, E>>,
}

impl<C, V: Clone, E> InFlight<C, V, E> {
    async fn run(&self) -> Result<V, SequenceError<E>> {
        let inner = &*self.inner;
        let (mut index, mut arg) = {
            let state = inner.lock();
            (state.progress, state.last_result.clone())
        };

        while index < inner.steps.len() {
            {
                let mut state = inner.lock();
                state.progress = index;
                state.last_result = arg.clone();
            }

            debug!(step = index, total = inner.steps.len(), "running sequence step");

            match inner.steps[index].call(&inner.context, arg).await {
                Ok(next) => {
                    arg = next;
                    index += 1;
                }
                Err(err) => {
                    warn!(step = index, "sequence step failed, will resume here");
                    if let Some(hook) = &inner.on_error {
                        hook(&inner.context, &err);
                    }
                    return Err(SequenceError::Step { index, source: err });
                }
            }
        }

        let mut state = inner.lock();
        state.progress = index;
        state.last_result = arg.clone();
        debug!(steps = index, "sequence complete");

        Ok(arg)
    }
}

impl<C, V, E> Drop for InFlight<C, V, E> {
    fn drop(&mut self) {
        self.inner.lock().in_flight = false;
    }
}

impl<C, V, E> Operation<(), ()> for ResumableSequence<C, V, E>
where
    C: Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Send + 'static,
{
    type Output = V;
    type Error = SequenceError<E>;

    fn call(&self, _ctx: &(), _args: ()) -> Task<V, SequenceError<E>> {
        self.invoke()
    }
}
