//! End-to-end integration tests

use price_feeder::chain::{OracleParams, SimChainClient};
use price_feeder::config::Config;
use price_feeder::oracle::{build_vote, DecCoin, Oracle};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[test]
fn test_example_config_loads() {
    let config = Config::load("config.toml.example").unwrap();

    assert!(!config.currency_pairs.is_empty());
    assert_eq!(config.currency_pairs[0].base, "ATOM");
    assert_eq!(config.chain.vote_period, 10);
}

fn paper_config() -> Config {
    let toml = r#"
        provider_timeout_ms = 500

        [[currency_pairs]]
        base = "ATOM"
        quote = "USDT"
        chain_denom = "uatom"
        providers = ["mock"]

        [[currency_pairs]]
        base = "USDT"
        quote = "USD"
        chain_denom = "uusdt"
        providers = ["mock"]

        [account]
        validator_address = "valaddr"
        feeder_address = "feederaddr"

        [chain]
        block_time_ms = 20
        vote_period = 1
    "#;

    let config: Config = toml::from_str(toml).unwrap();
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn test_feeder_runs_against_simulated_chain() {
    let config = paper_config();

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
        "valaddr",
        "feederaddr",
    ));

    let mut oracle = Oracle::new(chain_client.clone(), &config);
    let price_store = oracle.price_store();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = tokio::spawn(async move { oracle.start(shutdown_rx).await });

    // let a handful of blocks tick through
    tokio::time::sleep(Duration::from_millis(400)).await;

    shutdown_tx.send(true).unwrap();
    engine.await.unwrap().unwrap();

    let prices = price_store.prices().await;
    assert!(prices.contains_key("uatom"), "prices: {prices:?}");
    assert!(prices.contains_key("uusdt"));
    assert!(prices.values().all(|p| *p > dec!(0)));
    assert!(price_store.last_sync_time().await.is_some());
    assert!(chain_client.broadcast_count() > 0);
}

#[test]
fn test_vote_is_stable_across_input_orderings() {
    let coins = || {
        vec![
            DecCoin {
                denom: "uusdt".to_string(),
                amount: dec!(1.001),
            },
            DecCoin {
                denom: "uatom".to_string(),
                amount: dec!(11.5),
            },
            DecCoin {
                denom: "akii".to_string(),
                amount: dec!(0.05),
            },
        ]
    };

    let mut reversed = coins();
    reversed.reverse();

    let a = build_vote(coins(), "feederaddr", "valaddr");
    let b = build_vote(reversed, "feederaddr", "valaddr");

    assert_eq!(a.exchange_rates, "0.05akii,11.5uatom,1.001uusdt");
    assert_eq!(a, b);
    assert_eq!(a.exchange_rates.as_bytes(), b.exchange_rates.as_bytes());
}
