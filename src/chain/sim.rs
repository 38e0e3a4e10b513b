//! Simulated chain client for paper runs
//!
//! Produces block heights on a fixed interval, serves static oracle params,
//! never jails the validator, and accepts every vote. Lets the feeder run
//! end-to-end without a live chain.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{ChainClient, MsgAggregateExchangeRateVote, OracleParams, TxResponse};

pub struct SimChainClient {
    params: OracleParams,
    block_time: Duration,
    validator_address: String,
    feeder_address: String,
    broadcasts: AtomicU64,
}

impl SimChainClient {
    pub fn new(
        params: OracleParams,
        block_time: Duration,
        validator_address: impl Into<String>,
        feeder_address: impl Into<String>,
    ) -> Self {
        Self {
            params,
            block_time,
            validator_address: validator_address.into(),
            feeder_address: feeder_address.into(),
            broadcasts: AtomicU64::new(0),
        }
    }

    /// Number of votes accepted so far
    pub fn broadcast_count(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChainClient for SimChainClient {
    async fn block_height_events(&self) -> anyhow::Result<mpsc::Receiver<i64>> {
        let (tx, rx) = mpsc::channel(32);
        let block_time = self.block_time;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_time);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut height: i64 = 0;

            loop {
                interval.tick().await;
                height += 1;
                if tx.send(height).await.is_err() {
                    tracing::debug!("block height receiver dropped, stopping producer");
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn query_oracle_params(&self, _height: i64) -> anyhow::Result<OracleParams> {
        Ok(self.params.clone())
    }

    async fn query_jail_status(&self, _height: i64, _validator: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn broadcast_vote(&self, msg: MsgAggregateExchangeRateVote) -> anyhow::Result<TxResponse> {
        let seq = self.broadcasts.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            exchange_rates = %msg.exchange_rates,
            validator = %msg.validator,
            "simulated vote accepted"
        );

        Ok(TxResponse {
            code: 0,
            tx_hash: format!("{seq:016X}"),
        })
    }

    fn validator_address(&self) -> &str {
        &self.validator_address
    }

    fn feeder_address(&self) -> &str {
        &self.feeder_address
    }
}
