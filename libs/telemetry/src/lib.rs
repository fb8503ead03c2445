//! Telemetry helpers shared by the payment terminal bridge services.
//! Installs the tracing subscriber (JSON or plain fmt, optional OTLP span export)
//! and exposes the outcome counters recorded by the exchange core.

use anyhow::Result;

mod config;
mod counters;
mod tracing_init;

pub use config::{TelemetryConfig, TelemetryProtocol};
pub use counters::{
    CALLBACK_COUNTER, EXCHANGE_COUNTER, PUBLISH_COUNTER, record_callback,
    record_exchange_outcome, record_publish,
};
pub use tracing_init::{init_telemetry, shutdown, telemetry_enabled};

/// Installs the subscriber configured from `RUST_LOG`, `LOG_FORMAT` and the
/// `OTEL_*` variables.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
