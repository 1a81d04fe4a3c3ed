//! Configuration validation.
//!
//! Provides the `Validate` trait and range-check helpers used by the
//! screener configuration sections.

use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Fold a list of errors into a single result.
pub fn collect_errors(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

/// Check that `min <= max` for a named range.
pub fn check_range(field: &str, min: f64, max: f64) -> ValidationResult<()> {
    if min > max {
        return Err(ValidationError::Conflict {
            reason: format!("{field}: minimum {min} exceeds maximum {max}"),
        });
    }
    Ok(())
}

/// Check that a fraction lies in (0, 1].
pub fn check_fraction(field: &str, value: f64) -> ValidationResult<()> {
    if value.is_nan() || value <= 0.0 || value > 1.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("{value} must be within (0, 1]"),
        });
    }
    Ok(())
}

/// Check that a value is strictly positive.
pub fn check_positive(field: &str, value: f64) -> ValidationResult<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("{value} must be greater than 0"),
        });
    }
    Ok(())
}
