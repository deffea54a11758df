//! Structured logging setup.
//!
//! Grounded on the facilitator's own `Telemetry` initializer, trimmed to the
//! `tracing` + `tracing-subscriber` layer: this process has no OTLP collector
//! to export to, so the OpenTelemetry exporter layers are dropped (see
//! DESIGN.md). `LOG_LEVEL` drives the `EnvFilter` the way the original uses
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber from `LOG_LEVEL` (default `info`).
pub struct Telemetry;

impl Telemetry {
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_new("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Telemetry
    }
}
