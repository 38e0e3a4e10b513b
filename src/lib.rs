//! price-feeder: validator-side price oracle feeder
//!
//! This library provides the core components for:
//! - Multi-exchange price collection with per-provider timeouts
//! - Cross-quote USD conversion and deviation filtering
//! - TVWAP/VWAP aggregation with exact decimal arithmetic
//! - Voting-window synchronization against the chain
//! - Aggregate exchange-rate vote construction and broadcast
//! - Post-broadcast healthcheck pings
//! - Structured logging and oracle counters

pub mod chain;
pub mod cli;
pub mod config;
pub mod healthcheck;
pub mod oracle;
pub mod provider;
pub mod telemetry;
pub mod types;
