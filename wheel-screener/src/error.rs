//! Screener error type.

use thiserror::Error;
use wheel_common::ValidationError;

use crate::data::ProviderError;

/// Errors that abort a universe build or a screening run.
///
/// Sparse per-ticker data never lands here; it is attached as a warning
/// to the affected entity instead.
#[derive(Debug, Error)]
pub enum ScreenerError {
    /// A scoring metric is missing for too many rows to rank reliably.
    #[error(
        "Schema mismatch: {metric} missing for {missing_pct:.1}% of rows (threshold {threshold_pct:.1}%)"
    )]
    SchemaMismatch {
        metric: String,
        missing_pct: f64,
        threshold_pct: f64,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ValidationError),
}

impl ScreenerError {
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}

/// Result type alias using ScreenerError.
pub type Result<T> = std::result::Result<T, ScreenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_display() {
        let err = ScreenerError::SchemaMismatch {
            metric: "current_ratio".into(),
            missing_pct: 12.5,
            threshold_pct: 10.0,
        };
        assert!(err.is_schema_mismatch());
        assert_eq!(
            err.to_string(),
            "Schema mismatch: current_ratio missing for 12.5% of rows (threshold 10.0%)"
        );
    }

    #[test]
    fn test_provider_error_converts() {
        let err: ScreenerError = ProviderError::Network("reset".into()).into();
        assert!(matches!(err, ScreenerError::Provider(_)));
        assert!(!err.is_schema_mismatch());
    }
}
