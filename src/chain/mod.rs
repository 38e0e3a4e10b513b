//! Chain client interface
//!
//! The oracle engine talks to the chain exclusively through [`ChainClient`]:
//! a block-height event stream, oracle module param and jail-status queries,
//! and vote broadcast. Production transports plug in behind this trait; the
//! crate ships [`sim::SimChainClient`] for paper runs.

mod sim;

pub use sim::SimChainClient;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Oracle module parameters, cached and refreshed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleParams {
    /// Number of blocks in one voting window
    pub vote_period: u64,
    /// Chain denominations the oracle module accepts votes for
    pub whitelist: Vec<String>,
}

impl OracleParams {
    /// Whether a chain denomination is accepted by the oracle module
    pub fn whitelisted(&self, denom: &str) -> bool {
        self.whitelist.iter().any(|d| d == denom)
    }
}

/// Result of a vote broadcast
#[derive(Debug, Clone)]
pub struct TxResponse {
    /// Chain response code, 0 on acceptance
    pub code: u32,
    pub tx_hash: String,
}

/// Aggregate exchange-rate vote payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MsgAggregateExchangeRateVote {
    /// Canonical comma-joined `<amount><denom>` string, sorted by denom
    pub exchange_rates: String,
    pub feeder: String,
    pub validator: String,
}

/// Access to the target chain
///
/// Block heights delivered by [`block_height_events`] are monotonically
/// non-decreasing. Query and broadcast failures are transient from the
/// engine's point of view: the current tick fails and the next block
/// retries.
///
/// [`block_height_events`]: ChainClient::block_height_events
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to new block heights
    async fn block_height_events(&self) -> anyhow::Result<mpsc::Receiver<i64>>;

    /// Query the oracle module params at the given height
    async fn query_oracle_params(&self, height: i64) -> anyhow::Result<OracleParams>;

    /// Query whether the validator is jailed at the given height
    async fn query_jail_status(&self, height: i64, validator: &str) -> anyhow::Result<bool>;

    /// Broadcast an aggregate exchange-rate vote
    async fn broadcast_vote(&self, msg: MsgAggregateExchangeRateVote) -> anyhow::Result<TxResponse>;

    /// The validator this feeder votes for (bech32)
    fn validator_address(&self) -> &str;

    /// The feeder account submitting votes (bech32)
    fn feeder_address(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitelist_membership() {
        let params = OracleParams {
            vote_period: 10,
            whitelist: vec!["uatom".to_string(), "akii".to_string()],
        };

        assert!(params.whitelisted("uatom"));
        assert!(!params.whitelisted("uusdt"));
    }
}
