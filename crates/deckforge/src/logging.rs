//! Global `tracing` subscriber setup.
//!
//! Output goes to stdout, either as human-readable lines or as one JSON
//! object per event. The filter comes from `RUST_LOG` when set, otherwise
//! from the configured level. Records emitted through the `log` facade are
//! forwarded into `tracing`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::schema::LoggingConfig;
use crate::error::LoggingError;

/// Installs the global subscriber. Call once, early in `main`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config, std::env::var("RUST_LOG").ok().as_deref())?;

    let json_layer = config.json.then(|| fmt::layer().json().with_current_span(true));
    let plain_layer = (!config.json).then(|| fmt::layer().with_target(true));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

/// Builds the event filter, preferring an explicit directive string
/// (normally `RUST_LOG`) over the configured level.
pub fn build_filter(
    config: &LoggingConfig,
    directives: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    let filter = match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => directives.to_string(),
        None => config.level.clone(),
    };

    EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
        filter,
        reason: e.to_string(),
    })
}
