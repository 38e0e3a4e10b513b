//! Deterministic in-memory provider
//!
//! Selectable from configuration under the name `mock`. Serves preset
//! tickers and synthesizes fresh candles around them, which keeps paper
//! runs and tests independent of any live exchange.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::Provider;
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

/// Synthesized candles per pair, spaced one minute apart
const SEEDED_CANDLE_COUNT: i64 = 3;

pub struct MockProvider {
    tickers: RwLock<HashMap<String, TickerPrice>>,
    candles: RwLock<HashMap<String, Vec<CandlePrice>>>,
    /// Pairs whose candles are synthesized at call time
    seeded_pairs: Vec<CurrencyPair>,
}

impl MockProvider {
    /// An empty provider; tests fill it with `set_ticker`/`set_candles`
    pub fn new() -> Self {
        Self {
            tickers: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            seeded_pairs: Vec::new(),
        }
    }

    /// A provider pre-filled with a deterministic price per pair
    pub fn seeded(pairs: &[CurrencyPair]) -> Self {
        let mut tickers = HashMap::new();
        for pair in pairs {
            tickers.insert(
                pair.symbol(),
                TickerPrice {
                    price: Self::seed_price(&pair.base),
                    volume: dec!(100),
                },
            );
        }

        Self {
            tickers: RwLock::new(tickers),
            candles: RwLock::new(HashMap::new()),
            seeded_pairs: pairs.to_vec(),
        }
    }

    /// Stable per-base price derived from the ticker's bytes
    fn seed_price(base: &str) -> Decimal {
        let seed: u32 = base.bytes().map(u32::from).sum();
        Decimal::from(seed) / dec!(10)
    }

    pub async fn set_ticker(&self, pair: &CurrencyPair, ticker: TickerPrice) {
        self.tickers.write().await.insert(pair.symbol(), ticker);
    }

    pub async fn set_candles(&self, pair: &CurrencyPair, candles: Vec<CandlePrice>) {
        self.candles.write().await.insert(pair.symbol(), candles);
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn get_ticker_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> anyhow::Result<HashMap<String, TickerPrice>> {
        let tickers = self.tickers.read().await;
        let mut result = HashMap::new();
        for pair in pairs {
            if let Some(ticker) = tickers.get(&pair.symbol()) {
                result.insert(pair.symbol(), ticker.clone());
            }
        }
        Ok(result)
    }

    async fn get_candle_prices(
        &self,
        pairs: &[CurrencyPair],
    ) -> anyhow::Result<HashMap<String, Vec<CandlePrice>>> {
        let candles = self.candles.read().await;
        let tickers = self.tickers.read().await;
        let now_ms = Utc::now().timestamp_millis();

        let mut result = HashMap::new();
        for pair in pairs {
            if let Some(series) = candles.get(&pair.symbol()) {
                result.insert(pair.symbol(), series.clone());
                continue;
            }

            // seeded pairs synthesize fresh candles around the ticker price
            if self.seeded_pairs.contains(pair) {
                if let Some(ticker) = tickers.get(&pair.symbol()) {
                    let series = (0..SEEDED_CANDLE_COUNT)
                        .map(|i| CandlePrice {
                            price: ticker.price,
                            volume: ticker.volume,
                            timestamp_ms: now_ms - i * 60_000,
                        })
                        .collect();
                    result.insert(pair.symbol(), series);
                }
            }
        }
        Ok(result)
    }

    async fn subscribe_currency_pairs(&self, _pairs: &[CurrencyPair]) -> anyhow::Result<()> {
        Ok(())
    }
}
