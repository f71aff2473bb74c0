//! # repeater
//!
//! Async combinators for fallible operations:
//! - Retry executor with attempt budgets, success predicates, and before-retry hooks
//! - Timeout guard racing pending operations against a deadline
//! - Resumable sequences that pick up at the step that last failed
//! - YAML-configurable retry and timeout policies
//!
//! Every combinator takes the calling context as an explicit `&C` and is an
//! [`Operation`] itself, so they nest freely.

pub mod error;
pub mod resolve;
pub mod retry;
pub mod sequence;
pub mod task;
pub mod timeout;

pub use error::{Error, Result, TIMEOUT_ERROR_NAME};
pub use resolve::{Resolvable, MAX_RESOLVE_DEPTH};
pub use retry::{retry, retry_with_policy, Cause, Retry, RetryError, RetryOptions, RetryPolicy};
pub use sequence::{resumable, sequence_step, ResumableSequence, SequenceError, SequenceOptions};
pub use task::{delay, delay_then, Operation, Task};
pub use timeout::{timeout, TimeoutGuard};
