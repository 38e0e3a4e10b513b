//! Binance websocket provider
//!
//! Subscribes to the combined `@ticker` and `@kline_1m` streams and keeps
//! the latest ticker plus a short window of closed candles per symbol in
//! memory. Lookups never touch the network.

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::Provider;
use crate::types::{CandlePrice, CurrencyPair, TickerPrice};

/// Binance combined-stream base URL
const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";

/// Maximum reconnection attempts before giving up
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial reconnection delay
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnection delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Candles older than this are dropped from the cache
const CANDLE_RETENTION_MS: i64 = 10 * 60 * 1000;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Latest tickers keyed by symbol
type TickerCache = Arc<RwLock<HashMap<String, TickerPrice>>>;

/// Candles keyed by symbol, then by kline open time
type CandleCache = Arc<RwLock<HashMap<String, BTreeMap<i64, CandlePrice>>>>;

/// Combined stream wrapper: `{"stream":"atomusdt@ticker","data":{...}}`
#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[allow(dead_code)]
    stream: String,
    data: serde_json::Value,
}

/// 24h rolling ticker event
#[derive(Debug, Deserialize)]
struct TickerEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    /// Last trade price
    #[serde(rename = "c")]
    last_price: String,
    /// 24h base asset volume
    #[serde(rename = "v")]
    volume: String,
}

/// Kline event wrapper
#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: Kline,
}

#[derive(Debug, Deserialize)]
struct Kline {
    /// Open time (ms)
    #[serde(rename = "t")]
    open_ms: i64,
    /// Close time (ms)
    #[serde(rename = "T")]
    close_ms: i64,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    /// Whether this kline is closed
    #[serde(rename = "x")]
    #[allow(dead_code)]
    closed: bool,
}

/// A parsed cache update
#[derive(Debug, Clone, PartialEq)]
enum BinanceUpdate {
    Ticker {
        symbol: String,
        ticker: TickerPrice,
    },
    Candle {
        symbol: String,
        open_ms: i64,
        candle: CandlePrice,
    },
}

pub struct BinanceProvider {
    tickers: TickerCache,
    candles: CandleCache,
    subscribe_tx: mpsc::Sender<Vec<String>>,
}

impl BinanceProvider {
    /// Connect to the combined stream for the given pairs.
    ///
    /// The first connection is attempted eagerly so a bad endpoint fails
    /// provider initialization; afterwards a background task keeps the
    /// stream alive with reconnection backoff.
    pub async fn new(
        endpoint: Option<&crate::config::ProviderEndpoint>,
        pairs: &[CurrencyPair],
    ) -> anyhow::Result<Self> {
        let base_url = endpoint
            .filter(|e| !e.websocket.is_empty())
            .map(|e| e.websocket.clone())
            .unwrap_or_else(|| BINANCE_WS_URL.to_string());

        let streams: Vec<String> = pairs.iter().flat_map(Self::stream_names).collect();
        anyhow::ensure!(!streams.is_empty(), "no pairs configured for binance");

        let url = Self::build_stream_url(&base_url, &streams);
        tracing::info!(url = %base_url, pairs = pairs.len(), "connecting to binance websocket");
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .context("binance websocket connection failed")?;

        let tickers: TickerCache = Arc::new(RwLock::new(HashMap::new()));
        let candles: CandleCache = Arc::new(RwLock::new(HashMap::new()));
        let (subscribe_tx, subscribe_rx) = mpsc::channel(8);

        tokio::spawn(Self::run_connection_loop(
            base_url,
            streams,
            ws_stream,
            tickers.clone(),
            candles.clone(),
            subscribe_rx,
        ));

        Ok(Self {
            tickers,
            candles,
            subscribe_tx,
        })
    }

    /// Stream names for one pair: ticker plus 1m klines
    fn stream_names(pair: &CurrencyPair) -> Vec<String> {
        let symbol = pair.symbol().to_lowercase();
        vec![format!("{symbol}@ticker"), format!("{symbol}@kline_1m")]
    }

    fn build_stream_url(base_url: &str, streams: &[String]) -> String {
        format!("{}?streams={}", base_url, streams.join("/"))
    }

    /// Parse a combined-stream message into a cache update
    fn parse_message(msg: &str) -> Option<BinanceUpdate> {
        let wrapper: StreamMessage = serde_json::from_str(msg).ok()?;

        let event_type = wrapper.data.get("e")?.as_str()?;
        match event_type {
            "24hrTicker" => {
                let event: TickerEvent = serde_json::from_value(wrapper.data).ok()?;
                if event.event_type != "24hrTicker" {
                    return None;
                }
                Some(BinanceUpdate::Ticker {
                    symbol: event.symbol,
                    ticker: TickerPrice {
                        price: Decimal::from_str(&event.last_price).ok()?,
                        volume: Decimal::from_str(&event.volume).ok()?,
                    },
                })
            }
            "kline" => {
                let event: KlineEvent = serde_json::from_value(wrapper.data).ok()?;
                if event.event_type != "kline" {
                    return None;
                }
                Some(BinanceUpdate::Candle {
                    symbol: event.symbol,
                    open_ms: event.kline.open_ms,
                    candle: CandlePrice {
                        price: Decimal::from_str(&event.kline.close).ok()?,
                        volume: Decimal::from_str(&event.kline.volume).ok()?,
                        timestamp_ms: event.kline.close_ms,
                    },
                })
            }
            _ => None,
        }
    }

    /// Apply a parsed update to the caches
    async fn apply_update(tickers: &TickerCache, candles: &CandleCache, update: BinanceUpdate) {
        match update {
            BinanceUpdate::Ticker { symbol, ticker } => {
                tickers.write().await.insert(symbol, ticker);
            }
            BinanceUpdate::Candle {
                symbol,
                open_ms,
                candle,
            } => {
                let cutoff = candle.timestamp_ms - CANDLE_RETENTION_MS;
                let mut cache = candles.write().await;
                let series = cache.entry(symbol).or_default();
                series.insert(open_ms, candle);
                series.retain(|_, c| c.timestamp_ms > cutoff);
            }
        }
    }

    /// Keep the stream alive, reconnecting with exponential backoff
    async fn run_connection_loop(
        base_url: String,
        mut streams: Vec<String>,
        first_stream: WsStream,
        tickers: TickerCache,
        candles: CandleCache,
        mut subscribe_rx: mpsc::Receiver<Vec<String>>,
    ) {
        let mut reconnect_attempts = 0;
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
        let mut stream = Some(first_stream);

        loop {
            let ws_stream = match stream.take() {
                Some(s) => s,
                None => {
                    let url = Self::build_stream_url(&base_url, &streams);
                    match connect_async(url.as_str()).await {
                        Ok((s, _)) => {
                            reconnect_attempts = 0;
                            reconnect_delay = INITIAL_RECONNECT_DELAY;
                            s
                        }
                        Err(e) => {
                            reconnect_attempts += 1;
                            tracing::warn!(
                                error = %e,
                                attempt = reconnect_attempts,
                                "binance reconnection failed"
                            );
                            if reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                                tracing::error!("max binance reconnection attempts reached, giving up");
                                return;
                            }
                            sleep(reconnect_delay).await;
                            reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
                            continue;
                        }
                    }
                }
            };

            match Self::stream_messages(ws_stream, &tickers, &candles, &mut streams, &mut subscribe_rx)
                .await
            {
                Ok(()) => {
                    tracing::info!("binance websocket closed cleanly");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "binance websocket error, reconnecting");
                }
            }
        }
    }

    /// Pump one connection until it closes or errors
    async fn stream_messages(
        ws_stream: WsStream,
        tickers: &TickerCache,
        candles: &CandleCache,
        streams: &mut Vec<String>,
        subscribe_rx: &mut mpsc::Receiver<Vec<String>>,
    ) -> anyhow::Result<()> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut subscribe_id: u64 = 0;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(update) = Self::parse_message(&text) {
                                Self::apply_update(tickers, candles, update).await;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            anyhow::bail!("websocket error: {e}");
                        }
                        None => {
                            anyhow::bail!("websocket stream ended unexpectedly");
                        }
                        _ => {}
                    }
                }

                Some(new_streams) = subscribe_rx.recv() => {
                    subscribe_id += 1;
                    let payload = serde_json::json!({
                        "method": "SUBSCRIBE",
                        "params": new_streams,
                        "id": subscribe_id,
                    });
                    write.send(Message::Text(payload.to_string())).await?;
                    // remember the streams so reconnects pick them up
                    streams.extend(new_streams);
                }

                _ = ping_interval.tick() => {
                    write.send(Message::Ping(vec![])).await?;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for BinanceProvider {
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
        let mut result = HashMap::new();
        for pair in pairs {
            if let Some(series) = candles.get(&pair.symbol()) {
                if !series.is_empty() {
                    result.insert(pair.symbol(), series.values().cloned().collect());
                }
            }
        }
        Ok(result)
    }

    async fn subscribe_currency_pairs(&self, pairs: &[CurrencyPair]) -> anyhow::Result<()> {
        let streams: Vec<String> = pairs.iter().flat_map(Self::stream_names).collect();
        self.subscribe_tx
            .send(streams)
            .await
            .context("binance connection task is gone")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stream_names() {
        let pair = CurrencyPair::new("ATOM", "USDT");
        assert_eq!(
            BinanceProvider::stream_names(&pair),
            vec!["atomusdt@ticker", "atomusdt@kline_1m"]
        );
    }

    #[test]
    fn test_build_stream_url() {
        let streams = vec!["atomusdt@ticker".to_string(), "atomusdt@kline_1m".to_string()];
        assert_eq!(
            BinanceProvider::build_stream_url(BINANCE_WS_URL, &streams),
            "wss://stream.binance.com:9443/stream?streams=atomusdt@ticker/atomusdt@kline_1m"
        );
    }

    #[test]
    fn test_parse_ticker_message() {
        let msg = r#"{
            "stream": "atomusdt@ticker",
            "data": {
                "e": "24hrTicker",
                "s": "ATOMUSDT",
                "c": "11.50",
                "v": "123456.7"
            }
        }"#;

        let update = BinanceProvider::parse_message(msg).unwrap();
        assert_eq!(
            update,
            BinanceUpdate::Ticker {
                symbol: "ATOMUSDT".to_string(),
                ticker: TickerPrice {
                    price: dec!(11.50),
                    volume: dec!(123456.7),
                },
            }
        );
    }

    #[test]
    fn test_parse_kline_message() {
        let msg = r#"{
            "stream": "atomusdt@kline_1m",
            "data": {
                "e": "kline",
                "s": "ATOMUSDT",
                "k": {
                    "t": 1704067200000,
                    "T": 1704067259999,
                    "c": "11.52",
                    "v": "98.5",
                    "x": true
                }
            }
        }"#;

        let update = BinanceProvider::parse_message(msg).unwrap();
        assert_eq!(
            update,
            BinanceUpdate::Candle {
                symbol: "ATOMUSDT".to_string(),
                open_ms: 1704067200000,
                candle: CandlePrice {
                    price: dec!(11.52),
                    volume: dec!(98.5),
                    timestamp_ms: 1704067259999,
                },
            }
        );
    }

    #[test]
    fn test_parse_ignores_other_events() {
        let msg = r#"{
            "stream": "atomusdt@trade",
            "data": { "e": "trade", "s": "ATOMUSDT", "p": "11.50" }
        }"#;
        assert!(BinanceProvider::parse_message(msg).is_none());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(BinanceProvider::parse_message("not valid json").is_none());
    }

    #[tokio::test]
    async fn test_candle_cache_trims_old_entries() {
        let tickers: TickerCache = Arc::new(RwLock::new(HashMap::new()));
        let candles: CandleCache = Arc::new(RwLock::new(HashMap::new()));

        let old = BinanceUpdate::Candle {
            symbol: "ATOMUSDT".to_string(),
            open_ms: 0,
            candle: CandlePrice {
                price: dec!(10),
                volume: dec!(1),
                timestamp_ms: 59_999,
            },
        };
        let fresh = BinanceUpdate::Candle {
            symbol: "ATOMUSDT".to_string(),
            open_ms: CANDLE_RETENTION_MS,
            candle: CandlePrice {
                price: dec!(11),
                volume: dec!(1),
                timestamp_ms: CANDLE_RETENTION_MS + 59_999,
            },
        };

        BinanceProvider::apply_update(&tickers, &candles, old).await;
        BinanceProvider::apply_update(&tickers, &candles, fresh).await;

        let cache = candles.read().await;
        let series = &cache["ATOMUSDT"];
        assert_eq!(series.len(), 1);
        assert_eq!(series[&CANDLE_RETENTION_MS].price, dec!(11));
    }
}
