//! Tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{LogFormat, ObservabilityConfig, ObservabilityError};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when both are present.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| ObservabilityError::Config(format!("Invalid log filter: {}", e)))?;

    let subscriber = tracing_subscriber::registry().with(filter);
    let location = config.with_source_location;

    let result = match config.log_format {
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(location)
                    .with_line_number(location),
            )
            .try_init(),
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(location)
                    .with_line_number(location),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    };

    result.map_err(|e| ObservabilityError::Provider(format!("Failed to init tracing: {}", e)))
}
