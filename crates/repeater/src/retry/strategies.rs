//! Retry policies and backoff delays
//!
//! A [`RetryPolicy`] describes how many attempts to make and how long to
//! wait between them. Policies deserialize from YAML, so retry behaviour can
//! live in configuration files. [`backoff_hook`] turns a policy into a
//! before-retry hook that sleeps for the computed delay.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resolve::Resolvable;
use crate::task::{delay, Task};

use super::error::Cause;

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Add up to 25% random variation to each delay, still capped at `max_delay_ms`
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Report every failure instead of only the last one
    #[serde(default)]
    pub provide_all_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
            provide_all_errors: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_jitter() -> bool {
    true
}

impl RetryPolicy {
    /// Parse and validate a policy from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let policy: RetryPolicy = serde_yaml_ng::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate a policy from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Check the policy for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_policy("max-attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
            return Err(Error::invalid_policy(format!(
                "backoff-multiplier must be a non-negative number, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(Error::invalid_policy(format!(
                "initial-delay-ms ({}) exceeds max-delay-ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry immediately
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Deadline configuration for a timeout guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeoutPolicy {
    /// Deadline in milliseconds
    pub timeout_ms: u64,
}

impl TimeoutPolicy {
    /// The deadline as a duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl<C> From<TimeoutPolicy> for Resolvable<C, Duration> {
    fn from(policy: TimeoutPolicy) -> Self {
        Resolvable::Value(policy.duration())
    }
}

/// Calculate the delay before the next retry attempt
///
/// # Arguments
///
/// * `policy` - The retry policy containing strategy and timing parameters
/// * `attempt` - The attempt number that just failed (1-indexed)
/// * `jitter` - Whether to apply random jitter to the delay
///
/// # Example
///
/// ```rust
/// use repeater::retry::{calculate_delay, RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     strategy: RetryStrategy::ExponentialBackoff,
///     initial_delay_ms: 1000,
///     ..RetryPolicy::default()
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,

        RetryStrategy::FixedDelay => policy.initial_delay_ms,

        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            (policy.initial_delay_ms as f64 * multiplier) as u64
        }

        RetryStrategy::LinearBackoff => policy
            .initial_delay_ms
            .saturating_mul(attempt_index as u64 + 1),
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let jittered_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        let jitter_value = rand::rng().random_range(0..=jitter_range);
        capped_delay_ms.saturating_add(jitter_value)
    } else {
        capped_delay_ms
    };

    // Jitter never pushes past the cap
    Duration::from_millis(jittered_delay_ms.min(policy.max_delay_ms))
}

/// A before-retry hook that waits out the policy's backoff delay
///
/// The hook never fails, so it never consumes an attempt slot on its own.
pub fn backoff_hook<C, T, E>(
    policy: &RetryPolicy,
) -> impl Fn(&C, &Cause<T, E>, u32) -> Task<(), E> + Send + Sync + 'static
where
    C: 'static,
    T: 'static,
    E: Send + 'static,
{
    let policy = policy.clone();
    move |_ctx: &C, _cause: &Cause<T, E>, attempt: u32| {
        let wait = calculate_delay(&policy, attempt, policy.jitter);
        if wait.is_zero() {
            Task::ok(())
        } else {
            delay(wait)
        }
    }
}
