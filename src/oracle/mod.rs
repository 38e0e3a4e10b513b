//! Oracle engine
//!
//! Consumes block-height events, collects prices from every configured
//! provider concurrently, aggregates them into one USD price per base, and
//! submits an aggregate exchange-rate vote once per voting window. A tick
//! failure is logged and counted; the loop always continues to the next
//! block.

mod aggregate;
mod cache;
mod convert;
mod vote;

pub use aggregate::{compute_tvwap, compute_vwap, standard_deviation, TVWAP_CANDLE_PERIOD_MS};
pub use cache::{JailCache, ParamCache, JAIL_REFRESH_INTERVAL, PARAM_REFRESH_INTERVAL};
pub use vote::{build_vote, exchange_rates_string, DecCoin};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::chain::{ChainClient, OracleParams};
use crate::config::{Config, ProviderEndpoint};
use crate::healthcheck::HealthPinger;
use crate::provider::{self, Provider, ProviderError};
use crate::telemetry::{self, CounterMetric};
use crate::types::{
    AggregatedProviderCandles, AggregatedProviderPrices, CandlePrice, ChainDenomMapping,
    CurrencyPair, ProviderPairs, TickerPrice,
};

/// Tick-level failures
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("expected positive block height, got {0}")]
    InvalidBlockHeight(i64),
    #[error("validator {0} is jailed")]
    ValidatorJailed(String),
    #[error("chain query failed: {0}")]
    ChainQuery(String),
    #[error("missing required rate: {0}")]
    MissingRequiredRate(String),
    #[error("vote broadcast failed: {0}")]
    Broadcast(String),
}

/// Snapshot of the last successful collection
#[derive(Debug, Default)]
struct PriceSnapshot {
    /// Base ticker -> USD price
    prices: HashMap<String, Decimal>,
    last_sync: Option<DateTime<Utc>>,
}

/// Cloneable read handle over the engine's computed prices.
///
/// The snapshot is replaced atomically at the end of each successful
/// collection; readers never observe a partial update.
#[derive(Clone)]
pub struct PriceStore {
    snapshot: Arc<RwLock<PriceSnapshot>>,
    chain_denoms: Arc<ChainDenomMapping>,
}

impl PriceStore {
    fn new(chain_denoms: Arc<ChainDenomMapping>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(PriceSnapshot::default())),
            chain_denoms,
        }
    }

    /// Last computed prices keyed by chain denom
    pub async fn prices(&self) -> HashMap<String, Decimal> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .prices
            .iter()
            .filter_map(|(base, price)| {
                self.chain_denoms
                    .get(base)
                    .map(|denom| (denom.clone(), *price))
            })
            .collect()
    }

    /// When the most recent successful collection finished
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.last_sync
    }

    async fn base_prices(&self) -> HashMap<String, Decimal> {
        self.snapshot.read().await.prices.clone()
    }

    async fn replace(&self, prices: HashMap<String, Decimal>, at: DateTime<Utc>) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.prices = prices;
        snapshot.last_sync = Some(at);
    }
}

/// The per-block voting engine
pub struct Oracle {
    chain_client: Arc<dyn ChainClient>,
    provider_pairs: ProviderPairs,
    chain_denoms: Arc<ChainDenomMapping>,
    deviations: HashMap<String, Decimal>,
    endpoints: HashMap<String, ProviderEndpoint>,
    provider_timeouts: HashMap<String, Duration>,
    /// Lazily initialized adapters, cached for the process lifetime
    providers: HashMap<String, Arc<dyn Provider>>,
    /// Providers whose creation failed once; skipped thereafter
    failed_providers: HashMap<String, String>,
    previous_vote_period: Option<i64>,
    param_cache: ParamCache,
    jail_cache: JailCache,
    price_store: PriceStore,
    health_pinger: HealthPinger,
}

impl Oracle {
    pub fn new(chain_client: Arc<dyn ChainClient>, config: &Config) -> Self {
        let (chain_denoms, provider_pairs) = config.mappings();
        let chain_denoms = Arc::new(chain_denoms);

        let provider_timeouts = provider_pairs
            .keys()
            .map(|name| (name.clone(), config.provider_timeout_for(name)))
            .collect();

        let endpoints = config
            .provider_endpoints
            .iter()
            .map(|e| (e.name.clone(), e.clone()))
            .collect();

        Self {
            chain_client,
            provider_pairs,
            chain_denoms: chain_denoms.clone(),
            deviations: config.deviation_map(),
            endpoints,
            provider_timeouts,
            providers: HashMap::new(),
            failed_providers: HashMap::new(),
            previous_vote_period: None,
            param_cache: ParamCache::default(),
            jail_cache: JailCache::default(),
            price_store: PriceStore::new(chain_denoms),
            health_pinger: HealthPinger::new(&config.healthchecks),
        }
    }

    /// Read handle over the computed prices, usable while the engine runs
    pub fn price_store(&self) -> PriceStore {
        self.price_store.clone()
    }

    /// Process block-height events until shutdown is signalled or the
    /// event stream ends. One tick per event, strictly serial.
    pub async fn start(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut events = self.chain_client.block_height_events().await?;
        let mut previous_height: i64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("oracle shutting down");
                    break;
                }

                event = events.recv() => {
                    let Some(height) = event else {
                        tracing::info!("block height stream ended");
                        break;
                    };

                    let started = Instant::now();
                    match self.tick(height).await {
                        Ok(()) => telemetry::increment_counter(CounterMetric::TickSuccess),
                        Err(err) => {
                            telemetry::increment_counter(CounterMetric::TickFailure);
                            tracing::warn!(height, error = %err, "oracle tick failed");
                        }
                    }
                    telemetry::record_tick_latency(started.elapsed());
                    telemetry::increment_counter(CounterMetric::NumTicks);

                    if previous_height > 0 && height > previous_height + 1 {
                        telemetry::record_skipped_blocks((height - previous_height - 1) as u64);
                    }
                    previous_height = height;
                }
            }
        }

        Ok(())
    }

    /// One tick: jail check, param refresh, price collection, and a vote
    /// if a new voting window has begun
    async fn tick(&mut self, height: i64) -> Result<(), OracleError> {
        let started = Instant::now();
        tracing::debug!(height, "executing oracle tick");

        if height < 1 {
            return Err(OracleError::InvalidBlockHeight(height));
        }

        if self.jailed_state(height).await? {
            return Err(OracleError::ValidatorJailed(
                self.chain_client.validator_address().to_string(),
            ));
        }

        let params = self.oracle_params(height).await?;

        self.set_prices(&params).await?;

        let vote_period = (params.vote_period.max(1)) as i64;
        let current_period = (height + 1) / vote_period;
        if self.previous_vote_period == Some(current_period) {
            tracing::info!(
                vote_period,
                current_period,
                tick_ms = started.elapsed().as_millis() as u64,
                "skipping until next voting period"
            );
            return Ok(());
        }

        let coins = vote::to_dec_coins(&self.price_store.base_prices().await, &self.chain_denoms);
        let filtered = vote::filter_by_whitelist(coins, &params.whitelist);
        let msg = vote::build_vote(
            filtered,
            self.chain_client.feeder_address(),
            self.chain_client.validator_address(),
        );

        tracing::info!(
            exchange_rates = %msg.exchange_rates,
            validator = %msg.validator,
            feeder = %msg.feeder,
            current_period,
            tick_ms = started.elapsed().as_millis() as u64,
            "broadcasting vote"
        );

        let response = self.chain_client.broadcast_vote(msg).await;
        match response {
            Ok(resp) if resp.code == 0 => {
                tracing::info!(
                    height,
                    response_code = resp.code,
                    tx_hash = %resp.tx_hash,
                    tick_ms = started.elapsed().as_millis() as u64,
                    "vote broadcast succeeded"
                );
                telemetry::increment_counter(CounterMetric::BroadcastSuccess);
                self.previous_vote_period = Some(current_period);

                if !self.health_pinger.is_empty() {
                    let pinger = self.health_pinger.clone();
                    tokio::spawn(async move { pinger.ping_all().await });
                }
                Ok(())
            }
            Ok(resp) => {
                tracing::error!(
                    height,
                    response_code = resp.code,
                    tx_hash = %resp.tx_hash,
                    "vote rejected by chain"
                );
                telemetry::increment_counter(CounterMetric::BroadcastFailure);
                Err(OracleError::Broadcast(format!(
                    "tx rejected with code {}",
                    resp.code
                )))
            }
            Err(err) => {
                tracing::error!(height, error = %err, "vote broadcast failed");
                telemetry::increment_counter(CounterMetric::BroadcastFailure);
                Err(OracleError::Broadcast(err.to_string()))
            }
        }
    }

    /// Jail status, refreshed every [`JAIL_REFRESH_INTERVAL`] blocks
    async fn jailed_state(&mut self, height: i64) -> Result<bool, OracleError> {
        if self.jail_cache.needs_refresh(height) {
            let jailed = self
                .chain_client
                .query_jail_status(height, self.chain_client.validator_address())
                .await
                .map_err(|e| OracleError::ChainQuery(e.to_string()))?;
            self.jail_cache.update(height, jailed);
        }
        Ok(self.jail_cache.is_jailed())
    }

    /// Oracle module params, refreshed every [`PARAM_REFRESH_INTERVAL`]
    /// blocks
    async fn oracle_params(&mut self, height: i64) -> Result<OracleParams, OracleError> {
        if self.param_cache.needs_refresh(height) {
            let params = self
                .chain_client
                .query_oracle_params(height)
                .await
                .map_err(|e| OracleError::ChainQuery(e.to_string()))?;
            self.param_cache.update(height, params);
        }

        // the cache was just populated above
        self.param_cache
            .params()
            .cloned()
            .ok_or_else(|| OracleError::ChainQuery("param cache empty after refresh".to_string()))
    }

    /// Fan out to every provider, aggregate the results, and replace the
    /// stored prices. Fails only when a whitelisted base is missing.
    async fn set_prices(&mut self, params: &OracleParams) -> Result<(), OracleError> {
        let mut tasks: Vec<JoinHandle<Option<ProviderFetch>>> = Vec::new();
        let mut required_rates: HashSet<String> = HashSet::new();

        let provider_names: Vec<String> = self.provider_pairs.keys().cloned().collect();
        for provider_name in provider_names {
            let pairs = self.provider_pairs[&provider_name].clone();

            for pair in &pairs {
                if let Some(denom) = self.chain_denoms.get(&pair.base) {
                    if params.whitelisted(denom) {
                        required_rates.insert(pair.base.clone());
                    }
                }
            }

            let provider = match self.provider_for(&provider_name).await {
                Ok(provider) => provider,
                Err(err) => {
                    telemetry::provider_failure("init", &provider_name, None, None);
                    tracing::debug!(
                        provider = %provider_name,
                        error = %err,
                        "failed to initialize provider"
                    );
                    continue; // don't block everything on one provider having an issue
                }
            };

            let timeout = self
                .provider_timeouts
                .get(&provider_name)
                .copied()
                .unwrap_or(Duration::from_secs(2));

            tasks.push(tokio::spawn(fetch_provider_prices(
                provider_name,
                provider,
                pairs,
                timeout,
            )));
        }

        // merging in the awaiting task serializes map mutation; provider
        // completion order stays non-deterministic
        let mut provider_prices = AggregatedProviderPrices::new();
        let mut provider_candles = AggregatedProviderCandles::new();

        for task in tasks {
            let fetch = match task.await {
                Ok(Some(fetch)) => fetch,
                Ok(None) => continue, // timed out, peers unaffected
                Err(err) => {
                    tracing::error!(error = %err, "provider fetch task panicked");
                    continue;
                }
            };

            for pair in &fetch.pairs {
                let symbol = pair.symbol();
                let ticker = fetch.tickers.get(&symbol);
                let candles = fetch.candles.get(&symbol);

                if ticker.is_none() && candles.is_none() {
                    telemetry::provider_failure(
                        "set-prices",
                        &fetch.provider,
                        Some(&pair.base),
                        None,
                    );
                    continue;
                }

                if let Some(ticker) = ticker {
                    provider_prices
                        .entry(fetch.provider.clone())
                        .or_default()
                        .insert(pair.base.clone(), ticker.clone());
                }
                if let Some(candles) = candles {
                    provider_candles
                        .entry(fetch.provider.clone())
                        .or_default()
                        .insert(pair.base.clone(), candles.clone());
                }
            }
        }

        let computed = compute_prices(
            &provider_candles,
            &provider_prices,
            &self.provider_pairs,
            &self.deviations,
            &required_rates,
            Utc::now().timestamp_millis(),
        );

        for base in &required_rates {
            if !computed.contains_key(base) {
                return Err(OracleError::MissingRequiredRate(base.clone()));
            }
        }

        self.price_store.replace(computed, Utc::now()).await;
        Ok(())
    }

    /// Get or lazily create the adapter for one provider.
    ///
    /// Creation failures are sticky: the provider is skipped for the rest
    /// of the process.
    async fn provider_for(&mut self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(err) = self.failed_providers.get(name) {
            return Err(ProviderError::SkippedAfterInitFailure(err.clone()));
        }

        if let Some(provider) = self.providers.get(name) {
            return Ok(provider.clone());
        }

        let pairs = self.provider_pairs.get(name).cloned().unwrap_or_default();
        match provider::new_provider(name, self.endpoints.get(name), &pairs).await {
            Ok(provider) => {
                self.providers.insert(name.to_string(), provider.clone());
                Ok(provider)
            }
            Err(err) => {
                self.failed_providers
                    .insert(name.to_string(), err.to_string());
                Err(err)
            }
        }
    }
}

/// One provider's tick-scoped fetch results
struct ProviderFetch {
    provider: String,
    pairs: Vec<CurrencyPair>,
    tickers: HashMap<String, TickerPrice>,
    candles: HashMap<String, Vec<CandlePrice>>,
}

/// Fetch tickers and candles from one provider, bounded by its timeout.
///
/// Runs under the tick's context but with a task-local deadline: a slow
/// provider is abandoned without cancelling its peers. Partial data is
/// fine; per-pair gaps are reported to telemetry.
async fn fetch_provider_prices(
    provider_name: String,
    provider: Arc<dyn Provider>,
    pairs: Vec<CurrencyPair>,
    timeout: Duration,
) -> Option<ProviderFetch> {
    let fetch = tokio::time::timeout(timeout, async {
        let tickers = match provider.get_ticker_prices(&pairs).await {
            Ok(tickers) => tickers,
            Err(err) => {
                tracing::debug!(
                    provider = %provider_name,
                    error = %err,
                    "failed to get ticker prices from provider"
                );
                HashMap::new()
            }
        };
        report_missing_pairs(&provider_name, "ticker", &tickers, &pairs);

        let candles = match provider.get_candle_prices(&pairs).await {
            Ok(candles) => candles,
            Err(err) => {
                tracing::debug!(
                    provider = %provider_name,
                    error = %err,
                    "failed to get candle prices from provider"
                );
                HashMap::new()
            }
        };
        report_missing_pairs(&provider_name, "candle", &candles, &pairs);

        (tickers, candles)
    })
    .await;

    match fetch {
        Ok((tickers, candles)) => Some(ProviderFetch {
            provider: provider_name,
            pairs,
            tickers,
            candles,
        }),
        Err(_) => {
            telemetry::provider_failure("timeout", &provider_name, None, None);
            tracing::error!(provider = %provider_name, "provider timed out");
            None
        }
    }
}

/// Report a telemetry counter for each expected pair absent from a result
fn report_missing_pairs<V>(
    provider: &str,
    price_type: &str,
    results: &HashMap<String, V>,
    expected: &[CurrencyPair],
) {
    for pair in expected {
        if !results.contains_key(&pair.symbol()) {
            telemetry::provider_failure("error", provider, Some(&pair.base), Some(price_type));
        }
    }
}

/// Aggregate provider observations into one USD price per base.
///
/// Candle TVWAP is preferred; ticker VWAP fills only the bases candles
/// could not produce. Empty inputs produce an empty result.
pub fn compute_prices(
    provider_candles: &AggregatedProviderCandles,
    provider_prices: &AggregatedProviderPrices,
    provider_pairs: &ProviderPairs,
    deviations: &HashMap<String, Decimal>,
    required_rates: &HashSet<String>,
    now_ms: i64,
) -> HashMap<String, Decimal> {
    if tracing::enabled!(tracing::Level::DEBUG) {
        log_provider_coverage(provider_prices, provider_candles);
    }

    let converted_candles =
        convert::convert_candles_to_usd(provider_candles, provider_pairs, deviations, now_ms);
    let filtered_candles = convert::filter_candle_deviations(&converted_candles, deviations);
    let mut computed = compute_tvwap(&filtered_candles, now_ms);

    let all_required_present = required_rates.iter().all(|base| computed.contains_key(base));
    if !all_required_present {
        tracing::debug!("required rates missing from candles, evaluating tickers");

        let converted_tickers =
            convert::convert_tickers_to_usd(provider_prices, provider_pairs, deviations);
        let filtered_tickers = convert::filter_ticker_deviations(&converted_tickers, deviations);
        let vwap_prices = compute_vwap(&filtered_tickers);

        for (base, price) in vwap_prices {
            computed.entry(base).or_insert(price);
        }
    }

    computed
}

/// Debug-level view of which providers covered which assets this tick
fn log_provider_coverage(
    provider_prices: &AggregatedProviderPrices,
    provider_candles: &AggregatedProviderCandles,
) {
    let mut ticker_coverage: HashMap<&str, Vec<&str>> = HashMap::new();
    for (provider, by_base) in provider_prices {
        for base in by_base.keys() {
            ticker_coverage.entry(base).or_default().push(provider);
        }
    }

    let mut candle_coverage: HashMap<&str, Vec<&str>> = HashMap::new();
    for (provider, by_base) in provider_candles {
        for base in by_base.keys() {
            candle_coverage.entry(base).or_default().push(provider);
        }
    }

    if let (Ok(tickers), Ok(candles)) = (
        serde_json::to_string(&ticker_coverage),
        serde_json::to_string(&candle_coverage),
    ) {
        tracing::debug!(tickers = %tickers, candles = %candles, "asset provider coverage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MsgAggregateExchangeRateVote, TxResponse};
    use crate::provider::MockProvider;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct MockChainClient {
        params: OracleParams,
        jailed: AtomicBool,
        fail_broadcast: AtomicBool,
        broadcasts: Mutex<Vec<MsgAggregateExchangeRateVote>>,
        jail_queries: AtomicUsize,
        param_queries: AtomicUsize,
    }

    impl MockChainClient {
        fn new(whitelist: &[&str]) -> Self {
            Self {
                params: OracleParams {
                    vote_period: 10,
                    whitelist: whitelist.iter().map(|d| d.to_string()).collect(),
                },
                jailed: AtomicBool::new(false),
                fail_broadcast: AtomicBool::new(false),
                broadcasts: Mutex::new(Vec::new()),
                jail_queries: AtomicUsize::new(0),
                param_queries: AtomicUsize::new(0),
            }
        }

        fn broadcasts(&self) -> Vec<MsgAggregateExchangeRateVote> {
            self.broadcasts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn block_height_events(&self) -> anyhow::Result<mpsc::Receiver<i64>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn query_oracle_params(&self, _height: i64) -> anyhow::Result<OracleParams> {
            self.param_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.params.clone())
        }

        async fn query_jail_status(&self, _height: i64, _validator: &str) -> anyhow::Result<bool> {
            self.jail_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.jailed.load(Ordering::SeqCst))
        }

        async fn broadcast_vote(
            &self,
            msg: MsgAggregateExchangeRateVote,
        ) -> anyhow::Result<TxResponse> {
            if self.fail_broadcast.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            self.broadcasts.lock().unwrap().push(msg);
            Ok(TxResponse {
                code: 0,
                tx_hash: "ABCD".to_string(),
            })
        }

        fn validator_address(&self) -> &str {
            "valaddr"
        }

        fn feeder_address(&self) -> &str {
            "feederaddr"
        }
    }

    /// A provider that never answers within any reasonable timeout
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        async fn get_ticker_prices(
            &self,
            _pairs: &[CurrencyPair],
        ) -> anyhow::Result<HashMap<String, TickerPrice>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(HashMap::new())
        }

        async fn get_candle_prices(
            &self,
            _pairs: &[CurrencyPair],
        ) -> anyhow::Result<HashMap<String, Vec<CandlePrice>>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(HashMap::new())
        }

        async fn subscribe_currency_pairs(&self, _pairs: &[CurrencyPair]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        toml::from_str(
            r#"
                provider_timeout_ms = 100

                [[currency_pairs]]
                base = "ATOM"
                quote = "USDT"
                chain_denom = "uatom"
                providers = ["mock", "binance"]

                [[currency_pairs]]
                base = "USDT"
                quote = "USD"
                chain_denom = "uusdt"
                providers = ["mock"]

                [account]
                validator_address = "valaddr"
                feeder_address = "feederaddr"
            "#,
        )
        .unwrap()
    }

    async fn seeded_mock() -> Arc<MockProvider> {
        let mock = Arc::new(MockProvider::new());
        mock.set_ticker(
            &CurrencyPair::new("ATOM", "USDT"),
            TickerPrice {
                price: dec!(10),
                volume: dec!(100),
            },
        )
        .await;
        mock.set_ticker(
            &CurrencyPair::new("USDT", "USD"),
            TickerPrice {
                price: dec!(1),
                volume: dec!(1000),
            },
        )
        .await;
        mock
    }

    async fn seeded_binance() -> Arc<MockProvider> {
        let binance = Arc::new(MockProvider::new());
        binance
            .set_ticker(
                &CurrencyPair::new("ATOM", "USDT"),
                TickerPrice {
                    price: dec!(12),
                    volume: dec!(300),
                },
            )
            .await;
        binance
    }

    async fn test_oracle(chain: Arc<MockChainClient>) -> Oracle {
        let mut oracle = Oracle::new(chain, &test_config());
        oracle
            .providers
            .insert("mock".to_string(), seeded_mock().await);
        oracle
            .providers
            .insert("binance".to_string(), seeded_binance().await);
        oracle
    }

    #[tokio::test]
    async fn test_tick_computes_prices_and_votes() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = test_oracle(chain.clone()).await;

        oracle.tick(9).await.unwrap();

        // VWAP over (10, 100) and (12, 300) = 11.5
        let prices = oracle.price_store().prices().await;
        assert_eq!(prices["uatom"], dec!(11.5));
        assert_eq!(prices["uusdt"], dec!(1));
        assert!(oracle.price_store().last_sync_time().await.is_some());

        let broadcasts = chain.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].exchange_rates, "11.5uatom,1uusdt");
        assert_eq!(broadcasts[0].feeder, "feederaddr");
        assert_eq!(broadcasts[0].validator, "valaddr");
        assert_eq!(oracle.previous_vote_period, Some(1));
    }

    #[tokio::test]
    async fn test_vote_stable_across_equal_ticks() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = test_oracle(chain.clone()).await;

        oracle.tick(9).await.unwrap();
        oracle.tick(19).await.unwrap();

        let broadcasts = chain.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].exchange_rates, broadcasts[1].exchange_rates);
    }

    #[tokio::test]
    async fn test_voting_window_gate() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = test_oracle(chain.clone()).await;

        // (140 + 1) / 10 = 14: first vote
        oracle.tick(140).await.unwrap();
        assert_eq!(oracle.previous_vote_period, Some(14));

        // heights 141..=148 stay in period 14 and skip voting
        for height in 141..=148 {
            oracle.tick(height).await.unwrap();
            assert_eq!(chain.broadcasts().len(), 1);
        }

        // (149 + 1) / 10 = 15: new window, vote again
        oracle.tick(149).await.unwrap();
        assert_eq!(chain.broadcasts().len(), 2);
        assert_eq!(oracle.previous_vote_period, Some(15));
    }

    #[tokio::test]
    async fn test_jailed_validator_skips_tick() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        chain.jailed.store(true, Ordering::SeqCst);
        let mut oracle = test_oracle(chain.clone()).await;

        let err = oracle.tick(9).await.unwrap_err();
        assert!(matches!(err, OracleError::ValidatorJailed(addr) if addr == "valaddr"));
        assert!(chain.broadcasts().is_empty());
        assert_eq!(oracle.previous_vote_period, None);
    }

    #[tokio::test]
    async fn test_invalid_block_height() {
        let chain = Arc::new(MockChainClient::new(&["uatom"]));
        let mut oracle = test_oracle(chain).await;

        let err = oracle.tick(0).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidBlockHeight(0)));
    }

    #[tokio::test]
    async fn test_missing_required_rate_fails_tick() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = Oracle::new(chain.clone(), &test_config());
        // providers exist but have no data at all
        oracle
            .providers
            .insert("mock".to_string(), Arc::new(MockProvider::new()));
        oracle
            .providers
            .insert("binance".to_string(), Arc::new(MockProvider::new()));

        let err = oracle.tick(9).await.unwrap_err();
        assert!(matches!(err, OracleError::MissingRequiredRate(_)));
        assert!(chain.broadcasts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_is_isolated() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = Oracle::new(chain.clone(), &test_config());
        oracle
            .providers
            .insert("mock".to_string(), seeded_mock().await);
        oracle
            .providers
            .insert("binance".to_string(), Arc::new(HangingProvider));

        oracle.tick(9).await.unwrap();

        // only the fast provider contributed: ATOM = 10 from "mock" alone
        let prices = oracle.price_store().prices().await;
        assert_eq!(prices["uatom"], dec!(10));
        assert_eq!(chain.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_keeps_period() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = test_oracle(chain.clone()).await;

        chain.fail_broadcast.store(true, Ordering::SeqCst);
        let err = oracle.tick(9).await.unwrap_err();
        assert!(matches!(err, OracleError::Broadcast(_)));
        assert_eq!(oracle.previous_vote_period, None);

        // the next block in the same window retries and succeeds
        chain.fail_broadcast.store(false, Ordering::SeqCst);
        oracle.tick(10).await.unwrap();
        assert_eq!(chain.broadcasts().len(), 1);
        assert_eq!(oracle.previous_vote_period, Some(1));
    }

    #[tokio::test]
    async fn test_caches_refresh_on_interval() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "uusdt"]));
        let mut oracle = test_oracle(chain.clone()).await;

        oracle.tick(1).await.unwrap();
        oracle.tick(2).await.unwrap();
        assert_eq!(chain.jail_queries.load(Ordering::SeqCst), 1);
        assert_eq!(chain.param_queries.load(Ordering::SeqCst), 1);

        // jail interval (50) elapsed, param interval (200) not yet
        oracle.tick(51).await.unwrap();
        assert_eq!(chain.jail_queries.load(Ordering::SeqCst), 2);
        assert_eq!(chain.param_queries.load(Ordering::SeqCst), 1);

        oracle.tick(201).await.unwrap();
        assert_eq!(chain.param_queries.load(Ordering::SeqCst), 2);
    }

    fn three_pair_config() -> Config {
        toml::from_str(
            r#"
                provider_timeout_ms = 100

                [[currency_pairs]]
                base = "ATOM"
                quote = "USDT"
                chain_denom = "uatom"
                providers = ["mock"]

                [[currency_pairs]]
                base = "KII"
                quote = "USDT"
                chain_denom = "ukii"
                providers = ["mock"]

                [[currency_pairs]]
                base = "USDT"
                quote = "USD"
                chain_denom = "uusdt"
                providers = ["mock"]

                [account]
                validator_address = "valaddr"
                feeder_address = "feederaddr"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tvwap_preferred_vwap_fills_gaps() {
        let chain = Arc::new(MockChainClient::new(&["uatom", "ukii", "uusdt"]));
        let mut oracle = Oracle::new(chain.clone(), &three_pair_config());

        let now_ms = Utc::now().timestamp_millis();
        let mock = seeded_mock().await;
        // KII has a ticker but no candles: it can only come from VWAP
        mock.set_ticker(
            &CurrencyPair::new("KII", "USDT"),
            TickerPrice {
                price: dec!(0.5),
                volume: dec!(10),
            },
        )
        .await;
        // candles say 20 while the ticker says 10: candles win for ATOM
        mock.set_candles(
            &CurrencyPair::new("ATOM", "USDT"),
            vec![CandlePrice {
                price: dec!(20),
                volume: dec!(100),
                timestamp_ms: now_ms - 60_000,
            }],
        )
        .await;
        mock.set_candles(
            &CurrencyPair::new("USDT", "USD"),
            vec![CandlePrice {
                price: dec!(1),
                volume: dec!(1000),
                timestamp_ms: now_ms - 60_000,
            }],
        )
        .await;
        oracle.providers.insert("mock".to_string(), mock);

        oracle.tick(9).await.unwrap();

        let prices = oracle.price_store().prices().await;
        assert_eq!(prices["uatom"], dec!(20));
        assert_eq!(prices["ukii"], dec!(0.5));
        assert_eq!(prices["uusdt"], dec!(1));
    }

    #[tokio::test]
    async fn test_unknown_provider_failure_is_sticky() {
        let chain = Arc::new(MockChainClient::new(&[]));
        let mut oracle = Oracle::new(chain, &test_config());

        // no injected providers: "binance" would dial out, so probe the
        // sticky-failure path with a name the factory rejects
        oracle.provider_pairs.insert(
            "unknown".to_string(),
            vec![CurrencyPair::new("ATOM", "USDT")],
        );

        let err = oracle.provider_for("unknown").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unknown(_)));

        let err = oracle.provider_for("unknown").await.unwrap_err();
        assert!(matches!(err, ProviderError::SkippedAfterInitFailure(_)));
    }

    #[test]
    fn test_compute_prices_empty_inputs() {
        let computed = compute_prices(
            &AggregatedProviderCandles::new(),
            &AggregatedProviderPrices::new(),
            &ProviderPairs::new(),
            &HashMap::new(),
            &HashSet::new(),
            1_000_000,
        );
        assert!(computed.is_empty());
    }
}
