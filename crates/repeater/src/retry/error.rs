//! Error types for the retry executor
//!
//! Every failed attempt slot is recorded as a [`Cause`]. A retry that runs
//! out of attempts reports either the last cause or the whole ordered
//! [`ErrorLog`], depending on how it was configured.

use std::error::Error;
use std::fmt;

use crate::error::Error as CoreError;

/// Why a single attempt slot failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause<T, E> {
    /// The operation itself failed
    Operation(E),

    /// The operation succeeded but the success predicate returned false
    ///
    /// Carries the value that was rejected.
    Rejected(T),

    /// The success predicate failed while checking a value
    Predicate(E),

    /// The before-retry hook failed
    ///
    /// The hook's failure takes the place of the attempt it was guarding.
    Hook(E),
}

impl<T, E> Cause<T, E> {
    /// The error carried by this cause, if it carries one
    pub fn error(&self) -> Option<&E> {
        match self {
            Cause::Operation(e) | Cause::Predicate(e) | Cause::Hook(e) => Some(e),
            Cause::Rejected(_) => None,
        }
    }

    /// The value the success predicate turned down, if that is what happened
    pub fn rejected_value(&self) -> Option<&T> {
        match self {
            Cause::Rejected(value) => Some(value),
            _ => None,
        }
    }

    /// Consume the cause, returning its error if it carries one
    pub fn into_error(self) -> Option<E> {
        match self {
            Cause::Operation(e) | Cause::Predicate(e) | Cause::Hook(e) => Some(e),
            Cause::Rejected(_) => None,
        }
    }

    /// Check if the success predicate was responsible
    pub fn is_validation(&self) -> bool {
        matches!(self, Cause::Rejected(_) | Cause::Predicate(_))
    }

    /// Check if the before-retry hook was responsible
    pub fn is_hook(&self) -> bool {
        matches!(self, Cause::Hook(_))
    }
}

impl<T: fmt::Debug, E: fmt::Display> fmt::Display for Cause<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Operation(e) => write!(f, "operation failed: {}", e),
            Cause::Rejected(value) => write!(f, "result rejected by success predicate: {:?}", value),
            Cause::Predicate(e) => write!(f, "success predicate failed: {}", e),
            Cause::Hook(e) => write!(f, "before-retry hook failed: {}", e),
        }
    }
}

/// Ordered failure causes of one retry invocation, one per failed slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog<T, E> {
    causes: Vec<Cause<T, E>>,
}

impl<T, E> Default for ErrorLog<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ErrorLog<T, E> {
    /// Create an empty log
    pub fn new() -> Self {
        Self { causes: Vec::new() }
    }

    /// Append the cause of the latest failed slot
    pub fn push(&mut self, cause: Cause<T, E>) {
        self.causes.push(cause);
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// Check if nothing failed yet
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    /// The most recent failure
    pub fn last(&self) -> Option<&Cause<T, E>> {
        self.causes.last()
    }

    /// Iterate failures oldest first
    pub fn iter(&self) -> std::slice::Iter<'_, Cause<T, E>> {
        self.causes.iter()
    }

    /// View the failures as a slice, oldest first
    pub fn as_slice(&self) -> &[Cause<T, E>] {
        &self.causes
    }

    /// Take the failures, oldest first
    pub fn into_vec(self) -> Vec<Cause<T, E>> {
        self.causes
    }

    pub(crate) fn pop(&mut self) -> Option<Cause<T, E>> {
        self.causes.pop()
    }
}

impl<T, E> IntoIterator for ErrorLog<T, E> {
    type Item = Cause<T, E>;
    type IntoIter = std::vec::IntoIter<Cause<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.causes.into_iter()
    }
}

impl<'a, T, E> IntoIterator for &'a ErrorLog<T, E> {
    type Item = &'a Cause<T, E>;
    type IntoIter = std::slice::Iter<'a, Cause<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.causes.iter()
    }
}

/// Errors returned by a retried operation
///
/// The error type is generic over `T` and `E`, the success and error types of
/// the operation being retried. `T` shows up because a value turned down by
/// the success predicate is reported as a failure.
#[derive(Debug)]
pub enum RetryError<T, E> {
    /// All attempts failed; carries the cause of the final slot
    Exhausted {
        /// Number of attempt slots used
        attempts: u32,
        /// Cause of the final failure
        cause: Cause<T, E>,
    },

    /// All attempts failed; carries every cause in order
    ///
    /// Returned instead of `Exhausted` when all errors were requested.
    ExhaustedAll {
        /// Number of attempt slots used
        attempts: u32,
        /// One cause per slot, oldest first
        errors: ErrorLog<T, E>,
    },

    /// The attempt budget could not be resolved
    Budget(CoreError),
}

impl<T, E> RetryError<T, E> {
    /// Build the final rejection from a completed log
    pub(crate) fn from_log(attempts: u32, mut errors: ErrorLog<T, E>, provide_all: bool) -> Self {
        if provide_all {
            return RetryError::ExhaustedAll { attempts, errors };
        }
        match errors.pop() {
            Some(cause) => RetryError::Exhausted { attempts, cause },
            None => RetryError::ExhaustedAll { attempts, errors },
        }
    }

    /// Get the number of attempt slots used
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::ExhaustedAll { attempts, .. } => *attempts,
            RetryError::Budget(_) => 0,
        }
    }

    /// Check if this error indicates all attempts were used up
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            RetryError::Exhausted { .. } | RetryError::ExhaustedAll { .. }
        )
    }

    /// The most recent failure cause
    pub fn cause(&self) -> Option<&Cause<T, E>> {
        match self {
            RetryError::Exhausted { cause, .. } => Some(cause),
            RetryError::ExhaustedAll { errors, .. } => errors.last(),
            RetryError::Budget(_) => None,
        }
    }

    /// The full failure log, when every cause was kept
    pub fn errors(&self) -> Option<&ErrorLog<T, E>> {
        match self {
            RetryError::ExhaustedAll { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Consume this error, returning the most recent failure cause
    pub fn into_cause(self) -> Option<Cause<T, E>> {
        match self {
            RetryError::Exhausted { cause, .. } => Some(cause),
            RetryError::ExhaustedAll { mut errors, .. } => errors.pop(),
            RetryError::Budget(_) => None,
        }
    }

    /// Consume this error, returning the full failure log if it was kept
    pub fn into_errors(self) -> Option<ErrorLog<T, E>> {
        match self {
            RetryError::ExhaustedAll { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Map the error type using a closure
    pub fn map_err<F, E2>(self, mut f: F) -> RetryError<T, E2>
    where
        F: FnMut(E) -> E2,
    {
        let mut map_cause = |cause: Cause<T, E>| match cause {
            Cause::Operation(e) => Cause::Operation(f(e)),
            Cause::Rejected(value) => Cause::Rejected(value),
            Cause::Predicate(e) => Cause::Predicate(f(e)),
            Cause::Hook(e) => Cause::Hook(f(e)),
        };

        match self {
            RetryError::Exhausted { attempts, cause } => RetryError::Exhausted {
                attempts,
                cause: map_cause(cause),
            },
            RetryError::ExhaustedAll { attempts, errors } => RetryError::ExhaustedAll {
                attempts,
                errors: ErrorLog {
                    causes: errors.into_iter().map(map_cause).collect(),
                },
            },
            RetryError::Budget(err) => RetryError::Budget(err),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Display> fmt::Display for RetryError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, cause } => {
                write!(f, "retry exhausted after {} attempts: {}", attempts, cause)
            }
            RetryError::ExhaustedAll { attempts, errors } => {
                write!(f, "retry exhausted after {} attempts", attempts)?;
                for (slot, cause) in errors.iter().enumerate() {
                    write!(f, "\n  attempt {}: {}", slot + 1, cause)?;
                }
                Ok(())
            }
            RetryError::Budget(err) => write!(f, "could not resolve attempt budget: {}", err),
        }
    }
}

impl<T: fmt::Debug, E: Error + 'static> Error for RetryError<T, E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Budget(err) => Some(err),
            _ => self.cause().and_then(|c| c.error()).map(|e| e as &(dyn Error + 'static)),
        }
    }
}
