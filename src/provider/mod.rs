//! Exchange price providers
//!
//! Each adapter exposes ticker and candle lookups for the pairs it was
//! configured with. Adapters tolerate being asked for pairs they have no
//! data for: they return a partial map keyed by `pair.symbol()`, and only
//! error when the whole call failed.

mod binance;
mod mock;

pub use binance::BinanceProvider;
pub use mock::MockProvider;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ProviderEndpoint;
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

pub const PROVIDER_BINANCE: &str = "binance";
pub const PROVIDER_MOCK: &str = "mock";

/// Provider names accepted in configuration
pub const SUPPORTED_PROVIDERS: [&str; 2] = [PROVIDER_BINANCE, PROVIDER_MOCK];

/// Provider failures, isolated to one provider and never fatal to a tick
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {0} not found")]
    Unknown(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed at first init (skipping provider): {0}")]
    SkippedAfterInitFailure(String),
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Provider")
    }
}

/// One exchange's price interface
#[async_trait]
pub trait Provider: Send + Sync {
    /// Latest ticker per requested pair, keyed by `pair.symbol()`
    async fn get_ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> anyhow::Result<HashMap<String, TickerPrice>>;

    /// Recent closed candles per requested pair, keyed by `pair.symbol()`
    async fn get_candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> anyhow::Result<HashMap<String, Vec<CandlePrice>>>;

    /// Add pairs to an existing stream subscription
    async fn subscribe_currency_pairs(&self, pairs: &[CurrencyPair]) -> anyhow::Result<()>;
}

/// Construct a provider adapter by configured name
pub async fn new_provider(
    name: &str,
    endpoint: Option<&ProviderEndpoint>,
    pairs: &[CurrencyPair],
) -> Result<Arc<dyn Provider>, ProviderError> {
    match name {
        PROVIDER_BINANCE => {
            let provider = BinanceProvider::new(endpoint, pairs)
                .await
                .map_err(|e| ProviderError::Connection(e.to_string()))?;
            Ok(Arc::new(provider))
        }
        PROVIDER_MOCK => Ok(Arc::new(MockProvider::seeded(pairs))),
        other => Err(ProviderError::Unknown(other.to_string())),
    }
}
