//! Telemetry module
//!
//! Structured logging and oracle counters

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{
    increment_counter, provider_failure, record_skipped_blocks, record_tick_latency, CounterMetric,
};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)
}
