//! Retry executor with budgets, success predicates, and before-retry hooks
//!
//! [`retry`] decorates an operation so that each call makes up to a budget
//! of attempts. Every failed attempt slot is recorded; when the budget runs
//! out the call fails with either the last cause or all of them.
//!
//! # Features
//!
//! - Fixed or context-resolved attempt budgets
//! - Success predicates that can downgrade a value into a failure
//! - Before-retry hooks for delays and logging; a failing hook uses up the
//!   attempt it was guarding
//! - Policy-driven backoff (None, Fixed, Exponential, Linear) with jitter
//! - Observable retry attempts via the `RetryObserver` trait
//!
//! # Example
//!
//! ```rust,no_run
//! use repeater::retry::{retry, RetryError, RetryOptions};
//! use repeater::task::Task;
//!
//! async fn example() -> Result<String, RetryError<String, std::io::Error>> {
//!     let fetch = retry(
//!         3,
//!         |_ctx: &(), _: ()| -> Task<String, std::io::Error> {
//!             // Your fallible operation here
//!             Task::ok("success".to_string())
//!         },
//!         RetryOptions::new(),
//!     );
//!
//!     fetch.call(&(), ()).await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::{Cause, ErrorLog, RetryError};
pub use executor::{retry, retry_with_policy, BeforeRetry, Retry, RetryOptions, SuccessPredicate};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{backoff_hook, calculate_delay, RetryPolicy, RetryStrategy, TimeoutPolicy};
