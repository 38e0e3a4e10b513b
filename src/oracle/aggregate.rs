//! Volume-weighted price aggregation
//!
//! VWAP over point-in-time tickers, TVWAP over recent candles with a
//! linear time ramp favoring newer candles, and the per-base dispersion
//! statistics the deviation filters are built on.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::types::{AggregatedProviderCandles, AggregatedProviderPrices};

/// Candle window considered by TVWAP
pub const TVWAP_CANDLE_PERIOD_MS: i64 = 5 * 60 * 1000;

/// Weight given to the oldest candle in a provider's window; candles at
/// `now` weigh 1
const MINIMUM_TIME_WEIGHT: Decimal = dec!(0.2);

/// Observations below this count are too few for a meaningful sigma
const MIN_DEVIATION_SAMPLES: usize = 3;

/// Divide weighted price sums by volume sums, skipping zero-volume bases
fn vwap(
    weighted_prices: HashMap<String, Decimal>,
    volume_sums: &HashMap<String, Decimal>,
) -> HashMap<String, Decimal> {
    let mut result = HashMap::new();

    for (base, weighted) in weighted_prices {
        match volume_sums.get(&base) {
            Some(volume) if !volume.is_zero() => {
                result.insert(base, weighted / volume);
            }
            _ => {}
        }
    }

    result
}

/// Volume-weighted average price per base across all providers:
/// `Σ(price · volume) / Σ volume`
pub fn compute_vwap(prices: &AggregatedProviderPrices) -> HashMap<String, Decimal> {
    let mut weighted_prices: HashMap<String, Decimal> = HashMap::new();
    let mut volume_sums: HashMap<String, Decimal> = HashMap::new();

    for provider_prices in prices.values() {
        for (base, ticker) in provider_prices {
            *weighted_prices.entry(base.clone()).or_insert(Decimal::ZERO) +=
                ticker.price * ticker.volume;
            *volume_sums.entry(base.clone()).or_insert(Decimal::ZERO) += ticker.volume;
        }
    }

    vwap(weighted_prices, &volume_sums)
}

/// Time-volume-weighted average price per base over candles within the
/// last [`TVWAP_CANDLE_PERIOD_MS`] of `now_ms`.
///
/// Per provider and base, the oldest candle anchors
/// `period = now − oldest_timestamp`; each included candle weighs
/// `weight_unit · (period − time_diff) + MINIMUM_TIME_WEIGHT`, a ramp from
/// [`MINIMUM_TIME_WEIGHT`] at the oldest candle to 1 at `now`. Bases whose
/// weighted volume sums to zero are omitted.
pub fn compute_tvwap(
    candles: &AggregatedProviderCandles,
    now_ms: i64,
) -> HashMap<String, Decimal> {
    let mut weighted_prices: HashMap<String, Decimal> = HashMap::new();
    let mut volume_sums: HashMap<String, Decimal> = HashMap::new();
    let window_start = now_ms - TVWAP_CANDLE_PERIOD_MS;

    for provider_candles in candles.values() {
        for (base, series) in provider_candles {
            let mut series = series.clone();
            series.sort_by_key(|c| c.timestamp_ms);

            let Some(oldest) = series.first() else {
                continue;
            };
            let period = Decimal::from(now_ms - oldest.timestamp_ms);

            let weight_unit = if period.is_zero() {
                Decimal::ZERO
            } else {
                (Decimal::ONE - MINIMUM_TIME_WEIGHT) / period
            };

            for candle in &series {
                if candle.timestamp_ms <= window_start {
                    continue;
                }

                let time_diff = Decimal::from(now_ms - candle.timestamp_ms);
                let weight = weight_unit * (period - time_diff) + MINIMUM_TIME_WEIGHT;
                debug_assert!(weight >= Decimal::ZERO, "negative tvwap weight");

                let weighted_volume = candle.volume * weight;
                *volume_sums.entry(base.clone()).or_insert(Decimal::ZERO) += weighted_volume;
                *weighted_prices.entry(base.clone()).or_insert(Decimal::ZERO) +=
                    candle.price * weighted_volume;
            }
        }
    }

    vwap(weighted_prices, &volume_sums)
}

/// Per-base standard deviation and mean across provider observations.
///
/// Bases with fewer than [`MIN_DEVIATION_SAMPLES`] observations are
/// skipped entirely. Returns `(deviations, means)`.
pub fn standard_deviation(
    prices: &HashMap<String, HashMap<String, Decimal>>,
) -> (HashMap<String, Decimal>, HashMap<String, Decimal>) {
    let mut samples: HashMap<String, Vec<Decimal>> = HashMap::new();
    for provider_prices in prices.values() {
        for (base, price) in provider_prices {
            samples.entry(base.clone()).or_default().push(*price);
        }
    }

    let mut deviations = HashMap::new();
    let mut means = HashMap::new();

    for (base, prices) in samples {
        if prices.len() < MIN_DEVIATION_SAMPLES {
            continue;
        }

        let count = Decimal::from(prices.len());
        let mean = prices.iter().sum::<Decimal>() / count;

        let variance = prices
            .iter()
            .map(|p| (*p - mean) * (*p - mean))
            .sum::<Decimal>()
            / count;

        let Some(sigma) = variance.sqrt() else {
            continue;
        };

        deviations.insert(base.clone(), sigma);
        means.insert(base, mean);
    }

    (deviations, means)
}
