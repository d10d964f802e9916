//! Log subscriber setup
//!
//! Installs a `tracing` subscriber built from an [`EnvFilter`] and a fmt
//! layer:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else logging.level)
//!   └── Fmt Layer (json, pretty or compact)
//! ```
//!
//! Logs go to stderr; stdout carries command output.
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::config::LoggingConfig;
//! use resumable_uploadr::telemetry::init_subscriber;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_subscriber(&LoggingConfig::default())?;
//! tracing::info!("Subscriber is now active");
//! # Ok(())
//! # }
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur while installing the subscriber
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter from RUST_LOG, falling back to the configured level
pub fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|_| TelemetryError::InvalidFilter(level.into())),
    }
}

/// Install the global subscriber
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format.as_str() {
        "pretty" => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .pretty()
                    .with_target(true)
                    .with_line_number(true),
            ),
        ),
        "compact" => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_target(true),
            ),
        ),
        _ => tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true),
            ),
        ),
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_build_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("resumable_uploadr=trace,reqwest=warn").is_ok());
    }

    #[test]
    #[serial_test::serial]
    fn test_build_filter_rejects_garbage() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            build_filter("resumable_uploadr=notalevel"),
            Err(TelemetryError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_subscriber_init() {
        let result = init_subscriber(&LoggingConfig::default());
        // May fail if subscriber already initialized, but that's ok for this test
        let _ = result;
    }
}
