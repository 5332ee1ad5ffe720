//! # Swarm Telemetry
//!
//! Logging bootstrap shared by the host binary and the test suite.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swarm_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config)?;
//!
//!     // Application code; `tracing` events are now printed.
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SWARM_SERVICE_NAME` | `swarm-host` | Service name in the startup line |
//! | `SWARM_LOG_LEVEL` | `info` | Filter directive (falls back to `RUST_LOG`) |
//! | `SWARM_CONSOLE_OUTPUT` | `true` | Print to stdout |
//! | `SWARM_JSON_LOGS` | `false` | JSON lines (defaults to true in containers) |

mod config;
mod logging;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}
