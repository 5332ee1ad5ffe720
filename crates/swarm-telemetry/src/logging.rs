//! Structured logging setup.
//!
//! Console output is either human-readable (development) or JSON with
//! consistent fields for log shippers:
//! - `timestamp`, `level`, `target`, `threadId`
//! - `module`: module name, when the event concerns one module
//! - `topic`: bus topic, when the event concerns a message

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global `tracing` subscriber.
///
/// Fails if the filter directive is invalid or a global subscriber is already
/// set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;

    let console_layer = if !config.console_output {
        None
    } else if config.json_logs {
        // JSON output for containers/production
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        // Pretty output for development
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Logging initialized"
    );

    Ok(())
}

/// Route logs through the test harness' captured output.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Helper to create structured log entries tagged with a module name.
#[macro_export]
macro_rules! log_event {
    (info, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };

    (error, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };
}
