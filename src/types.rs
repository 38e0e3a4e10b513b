//! Market data types shared by providers and the oracle engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A base/quote asset pair, e.g. `ATOM` priced in `USDT`.
///
/// Tickers are uppercase ASCII. Pairs are immutable once built from
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    /// Create a new pair, normalizing both tickers to uppercase
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Concatenated symbol used as the key in provider responses,
    /// e.g. `ATOMUSDT`
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

/// Last trade price and recent volume as reported by one exchange.
///
/// The volume window is exchange-defined, typically 24h. Both fields are
/// non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerPrice {
    pub price: Decimal,
    pub volume: Decimal,
}

/// A single closed candle of short duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlePrice {
    pub price: Decimal,
    pub volume: Decimal,
    /// Candle close time, UNIX milliseconds
    pub timestamp_ms: i64,
}

/// Tick-scoped ticker observations: provider name -> base -> ticker
pub type AggregatedProviderPrices = HashMap<String, HashMap<String, TickerPrice>>;

/// Tick-scoped candle observations: provider name -> base -> candles
pub type AggregatedProviderCandles = HashMap<String, HashMap<String, Vec<CandlePrice>>>;

/// Currency pairs each provider is configured to serve
pub type ProviderPairs = HashMap<String, Vec<CurrencyPair>>;

/// Base ticker -> chain-side denomination (e.g. `ATOM` -> `uatom`)
pub type ChainDenomMapping = HashMap<String, String>;
