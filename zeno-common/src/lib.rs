//! ZENO Common Library
//!
//! Shared types and utilities for the ZENO telemetry sidecar and its
//! consumers:
//!
//! - [`telemetry`] - Wire format pushed to clients ([`MetricSnapshot`],
//!   [`GpuSnapshot`])
//! - [`config`] - Logging configuration

pub mod config;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig};
pub use telemetry::{
    BYTES_PER_GIB, CpuMetrics, GpuSnapshot, MetricSnapshot, RamMetrics, current_timestamp_secs,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    }
}
