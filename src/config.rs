//! Configuration types for the price feeder

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::provider::SUPPORTED_PROVIDERS;
use crate::types::{ChainDenomMapping, CurrencyPair, ProviderPairs};

/// Largest accepted deviation threshold, in standard deviations
const MAX_DEVIATION_THRESHOLD: Decimal = dec!(3);

/// Configuration errors, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no currency pairs configured")]
    NoCurrencyPairs,
    #[error("currency pair has an empty base or quote")]
    EmptyPairField,
    #[error("currency pair {0} has no providers")]
    NoProviders(String),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("provider endpoint {0} is missing a rest or websocket url")]
    IncompleteEndpoint(String),
    #[error("no conversion path to USD for quote {0}")]
    UnconvertibleQuote(String),
    #[error("deviation threshold for {base} must be in (0, 3], got {threshold}")]
    InvalidDeviationThreshold { base: String, threshold: Decimal },
    #[error("account is missing a validator or feeder address")]
    MissingAccount,
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock budget for each provider within a tick
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    pub currency_pairs: Vec<CurrencyPairConfig>,
    #[serde(default)]
    pub deviation_thresholds: Vec<DeviationThreshold>,
    #[serde(default)]
    pub provider_endpoints: Vec<ProviderEndpoint>,
    #[serde(default)]
    pub healthchecks: Vec<HealthcheckConfig>,
    pub account: AccountConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// One currency pair with its chain denomination and serving providers
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyPairConfig {
    pub base: String,
    pub quote: String,
    pub chain_denom: String,
    pub providers: Vec<String>,
}

/// Per-base deviation filter threshold, as a multiplier of sigma
#[derive(Debug, Clone, Deserialize)]
pub struct DeviationThreshold {
    pub base: String,
    pub threshold: Decimal,
}

/// Per-provider endpoint override
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    #[serde(default)]
    pub rest: String,
    #[serde(default)]
    pub websocket: String,
    /// Overrides the global provider timeout when set
    pub timeout_ms: Option<u64>,
}

/// Healthcheck ping target
#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    pub url: String,
    pub timeout_ms: u64,
}

/// Feeder account addresses (bech32)
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub validator_address: String,
    pub feeder_address: String,
}

/// Chain parameters for the simulated paper-mode client
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    #[serde(default = "default_vote_period")]
    pub vote_period: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_time_ms: default_block_time_ms(),
            vote_period: default_vote_period(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_provider_timeout_ms() -> u64 {
    2000
}

fn default_block_time_ms() -> u64 {
    1000
}

fn default_vote_period() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning the first violation found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency_pairs.is_empty() {
            return Err(ConfigError::NoCurrencyPairs);
        }

        for pair in &self.currency_pairs {
            if pair.base.is_empty() || pair.quote.is_empty() {
                return Err(ConfigError::EmptyPairField);
            }
            if pair.providers.is_empty() {
                return Err(ConfigError::NoProviders(format!(
                    "{}{}",
                    pair.base, pair.quote
                )));
            }
            for provider in &pair.providers {
                if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
                    return Err(ConfigError::UnsupportedProvider(provider.clone()));
                }
            }
        }

        for endpoint in &self.provider_endpoints {
            if !SUPPORTED_PROVIDERS.contains(&endpoint.name.as_str()) {
                return Err(ConfigError::UnsupportedProvider(endpoint.name.clone()));
            }
            if endpoint.rest.is_empty() && endpoint.websocket.is_empty() {
                return Err(ConfigError::IncompleteEndpoint(endpoint.name.clone()));
            }
        }

        // every quote must reach USD through the configured pair graph
        for pair in &self.currency_pairs {
            if !self.quote_reaches_usd(&pair.quote, &mut HashSet::new()) {
                return Err(ConfigError::UnconvertibleQuote(pair.quote.clone()));
            }
        }

        for deviation in &self.deviation_thresholds {
            if deviation.threshold <= Decimal::ZERO || deviation.threshold > MAX_DEVIATION_THRESHOLD
            {
                return Err(ConfigError::InvalidDeviationThreshold {
                    base: deviation.base.clone(),
                    threshold: deviation.threshold,
                });
            }
        }

        if self.account.validator_address.is_empty() || self.account.feeder_address.is_empty() {
            return Err(ConfigError::MissingAccount);
        }

        Ok(())
    }

    fn quote_reaches_usd(&self, quote: &str, visited: &mut HashSet<String>) -> bool {
        if quote == "USD" {
            return true;
        }
        if !visited.insert(quote.to_string()) {
            return false;
        }
        self.currency_pairs
            .iter()
            .filter(|p| p.base == quote)
            .any(|p| self.quote_reaches_usd(&p.quote, visited))
    }

    /// Global per-provider timeout
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Timeout for one provider, preferring its endpoint override
    pub fn provider_timeout_for(&self, provider: &str) -> Duration {
        self.provider_endpoints
            .iter()
            .find(|e| e.name == provider)
            .and_then(|e| e.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.provider_timeout())
    }

    /// Endpoint override for one provider, if configured
    pub fn endpoint_for(&self, provider: &str) -> Option<&ProviderEndpoint> {
        self.provider_endpoints.iter().find(|e| e.name == provider)
    }

    /// Derive the provider -> pairs and base -> chain denom mappings
    pub fn mappings(&self) -> (ChainDenomMapping, ProviderPairs) {
        let mut chain_denoms = ChainDenomMapping::new();
        let mut provider_pairs = ProviderPairs::new();

        for pair in &self.currency_pairs {
            for provider in &pair.providers {
                provider_pairs
                    .entry(provider.clone())
                    .or_default()
                    .push(CurrencyPair::new(&pair.base, &pair.quote));
            }
            chain_denoms.insert(pair.base.clone(), pair.chain_denom.clone());
        }

        (chain_denoms, provider_pairs)
    }

    /// Deviation thresholds keyed by base
    pub fn deviation_map(&self) -> std::collections::HashMap<String, Decimal> {
        self.deviation_thresholds
            .iter()
            .map(|d| (d.base.clone(), d.threshold))
            .collect()
    }
}
