//! Error types for repeater

use thiserror::Error;

/// Result type alias using repeater's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name carried by every timeout error, independent of its message
pub const TIMEOUT_ERROR_NAME: &str = "TimeoutError";

/// Core error types for repeater
///
/// Operations keep their own error types. This enum covers failures the
/// combinators raise themselves: elapsed deadlines, runaway resolver chains,
/// and bad policy configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A timeout guard's deadline fired before the operation settled
    #[error("TimeoutError: operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// A resolver kept returning resolvers
    #[error("Resolver chain exceeded {limit} levels without producing a value")]
    ResolveDepth { limit: usize },

    /// Retry policy failed validation
    #[error("Invalid retry policy: {message}")]
    InvalidPolicy { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a timeout error for a deadline of `elapsed_ms` milliseconds
    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::Timeout { elapsed_ms }
    }

    /// Create a resolver depth error
    pub fn resolve_depth(limit: usize) -> Self {
        Self::ResolveDepth { limit }
    }

    /// Create an invalid policy error
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }

    /// Discriminable name of this error kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => TIMEOUT_ERROR_NAME,
            Self::ResolveDepth { .. } => "ResolveDepthError",
            Self::InvalidPolicy { .. } => "InvalidPolicyError",
            Self::YamlParse(_) => "YamlParseError",
            Self::Io(_) => "IoError",
        }
    }

    /// Check if this error is an elapsed deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
