//! Tracing subscriber installation.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryInitError(String);

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over [`LoggingConfig::level`]; an unparsable level falls
/// back to `info`.
///
/// # Errors
///
/// Returns [`TelemetryInitError`] when a global subscriber already exists.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| TelemetryInitError(err.to_string()))
}
