//! Oracle counters
//!
//! Thin emitters over `tracing`; a metrics backend can hook these in one
//! place without touching the engine.

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Tick completed successfully
    TickSuccess,
    /// Tick failed
    TickFailure,
    /// Ticks processed, success or failure
    NumTicks,
    /// Vote accepted by the chain
    BroadcastSuccess,
    /// Vote rejected or broadcast failed
    BroadcastFailure,
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::TickSuccess => "feeder_tick_success",
        CounterMetric::TickFailure => "feeder_tick_failure",
        CounterMetric::NumTicks => "feeder_ticks_total",
        CounterMetric::BroadcastSuccess => "feeder_broadcast_success",
        CounterMetric::BroadcastFailure => "feeder_broadcast_failure",
    };

    tracing::debug!(metric = metric_name, "incrementing counter");
}

/// Record how long a tick took
pub fn record_tick_latency(duration: Duration) {
    tracing::debug!(
        metric = "feeder_tick_latency_ms",
        value_ms = duration.as_millis() as u64,
        "recording latency"
    );
}

/// Record block heights that arrived without being ticked
pub fn record_skipped_blocks(count: u64) {
    tracing::debug!(
        metric = "feeder_skipped_blocks",
        value = count,
        "recording skipped blocks"
    );
}

/// Record a per-provider failure with its reason and optional pair labels
pub fn provider_failure(
    reason: &str,
    provider: &str,
    base: Option<&str>,
    price_type: Option<&str>,
) {
    tracing::debug!(
        metric = "feeder_provider_failure",
        reason = reason,
        provider = provider,
        base = base.unwrap_or(""),
        price_type = price_type.unwrap_or(""),
        "recording provider failure"
    );
}
