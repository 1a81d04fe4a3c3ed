//! Wheel Common - Shared utilities for the wheel screener workspace.
//!
//! This crate provides:
//! - Error types and handling utilities
//! - Logging setup with noise filtering
//! - JSON configuration file loading with deep merge
//! - Configuration validation

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config_loader::load_typed_config;
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config_loader::{config_dir, load_config_files};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::{generate_run_id, init_logging};
    pub use crate::validation::{Validate, ValidationError};
}
