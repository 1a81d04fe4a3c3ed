//! Logging utilities for the wheel screener.
//!
//! Provides structured JSON or human-readable logging on top of
//! `tracing-subscriber`.
//!
//! # Noise Filtering
//!
//! Data-provider clients usually sit on an HTTP stack. Those library
//! modules are set to `warn` so screening logs stay readable.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Library modules that are filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
];

/// Build the EnvFilter directive string for a base level.
fn build_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);

    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }

    directives
}

/// Build the default EnvFilter with noise suppression.
///
/// `RUST_LOG` takes precedence when set.
fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(build_directives(log_level))
}

/// Initialize logging with the given configuration.
///
/// # Arguments
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - Output format: "json" for structured JSON, anything else for pretty output
///
/// Calling this more than once is harmless; later calls keep the first subscriber.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate an identifier for one screening run or universe build.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"rustls"));
    }

    #[test]
    fn test_build_directives_suppresses_noise() {
        let directives = build_directives("debug");
        assert!(directives.starts_with("debug"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert_eq!(directives.matches("=warn").count(), NOISY_MODULES.len());
    }

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("info", "pretty");
        init_logging("debug", "json");
    }
}
