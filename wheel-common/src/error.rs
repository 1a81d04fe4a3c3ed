//! Error types shared across the wheel screener crates.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the common error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for application-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration section failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream quota exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// External service error
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::WithContext { source, .. } => source.is_rate_limited(),
            _ => false,
        }
    }

    /// Check if retrying the operation may succeed.
    ///
    /// Retries belong to the I/O collaborators, never to the scoring logic.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout | Self::External(_) => true,
            Self::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
