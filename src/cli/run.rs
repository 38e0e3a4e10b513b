//! Run command: supervise the oracle engine
//!
//! Builds the chain client and the engine, runs the tick loop, and turns
//! Ctrl-C into a graceful shutdown. Paper mode runs against the simulated
//! chain client; a production transport plugs in behind the `ChainClient`
//! trait.

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::chain::{OracleParams, SimChainClient};
use crate::config::Config;
use crate::oracle::Oracle;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Log each computed price snapshot
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> Result<()> {
        tracing::info!(
            pairs = config.currency_pairs.len(),
            providers = config.provider_endpoints.len(),
            "starting price feeder"
        );

        // paper mode: simulated chain accepting every configured denom
        let params = OracleParams {
            vote_period: config.chain.vote_period,
            whitelist: config
                .currency_pairs
                .iter()
                .map(|p| p.chain_denom.clone())
                .collect(),
        };
        let chain_client = Arc::new(SimChainClient::new(
            params,
            Duration::from_millis(config.chain.block_time_ms),
            config.account.validator_address.clone(),
            config.account.feeder_address.clone(),
        ));

        let mut oracle = Oracle::new(chain_client, &config);
        let price_store = oracle.price_store();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = tokio::spawn(async move { oracle.start(shutdown_rx).await });

        if self.verbose {
            let store = price_store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(10));
                loop {
                    interval.tick().await;
                    let prices = store.prices().await;
                    if !prices.is_empty() {
                        tracing::info!(?prices, "current computed prices");
                    }
                }
            });
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown requested");

        // stop the engine and wait for it to drain the current tick
        shutdown_tx.send(true)?;
        engine.await??;

        Ok(())
    }
}
