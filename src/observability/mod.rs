//! Logging and security events
//!
//! Application code only uses `tracing` macros and [`security_event!`];
//! the subscriber is installed once by [`init`].
//!
//! ```ignore
//! use warden::observability::{init, ObservabilityConfig};
//!
//! init(ObservabilityConfig::from_env())?;
//! ```

mod config;
mod events;
mod providers;

pub use config::{LogFormat, ObservabilityConfig, ObservabilityConfigBuilder};
pub use events::{security_event, SecurityEvent, Severity};

use thiserror::Error;
use tracing::info;

/// Initialize logging.
///
/// Must be called once at startup, before any logging occurs.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init(config: ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(&config)?;

    info!(
        log_format = ?config.log_format,
        log_filter = %config.log_filter,
        "Observability initialized"
    );

    Ok(())
}

/// Observability initialization errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Invalid configuration
    #[error("Observability config error: {0}")]
    Config(String),
    /// Subscriber installation failed
    #[error("Provider error: {0}")]
    Provider(String),
}
