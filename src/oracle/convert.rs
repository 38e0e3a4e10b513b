//! Cross-quote USD conversion and deviation filtering
//!
//! Providers quote assets in different currencies. Before averaging, every
//! observation is converted into USD by resolving the quote's own USD rate
//! over the configured pair graph; observations whose quote has no path to
//! USD are dropped. Outliers beyond `threshold * sigma` of the per-base
//! mean are filtered out, for tickers and for each provider's latest
//! candle price.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::aggregate::{compute_tvwap, compute_vwap, standard_deviation};
use crate::types::{AggregatedProviderCandles, AggregatedProviderPrices, ProviderPairs, TickerPrice};

const USD: &str = "USD";

/// The quote configured for `base` on `provider`
fn pair_quote<'a>(provider_pairs: &'a ProviderPairs, provider: &str, base: &str) -> Option<&'a str> {
    provider_pairs
        .get(provider)?
        .iter()
        .find(|p| p.base == base)
        .map(|p| p.quote.as_str())
}

/// Distinct quotes under which `base` is observed, USD-quoted pairs first
fn next_quotes<F>(
    provider_pairs: &ProviderPairs,
    base: &str,
    mut observed: F,
) -> Vec<String>
where
    F: FnMut(&str, &str) -> bool,
{
    let mut quotes: Vec<String> = Vec::new();
    for (provider, pairs) in provider_pairs {
        for pair in pairs {
            if pair.base == base && observed(provider.as_str(), base) && !quotes.contains(&pair.quote)
            {
                quotes.push(pair.quote.clone());
            }
        }
    }
    quotes.sort_by(|a, b| (a != USD).cmp(&(b != USD)).then_with(|| a.cmp(b)));
    quotes
}

/// Resolve `quote`'s USD rate from ticker observations, recursively
fn ticker_usd_rate(
    quote: &str,
    prices: &AggregatedProviderPrices,
    provider_pairs: &ProviderPairs,
    thresholds: &HashMap<String, Decimal>,
    visited: &mut HashSet<String>,
) -> Option<Decimal> {
    if quote == USD {
        return Some(Decimal::ONE);
    }
    if !visited.insert(quote.to_string()) {
        return None;
    }

    let candidates = next_quotes(provider_pairs, quote, |provider, base| {
        prices
            .get(provider)
            .is_some_and(|by_base| by_base.contains_key(base))
    });

    for next in candidates {
        let Some(next_rate) =
            ticker_usd_rate(&next, prices, provider_pairs, thresholds, visited)
        else {
            continue;
        };

        // observations of `quote` priced in `next`, across providers
        let mut sub = AggregatedProviderPrices::new();
        for (provider, by_base) in prices {
            if pair_quote(provider_pairs, provider, quote) == Some(next.as_str()) {
                if let Some(ticker) = by_base.get(quote) {
                    sub.entry(provider.clone())
                        .or_default()
                        .insert(quote.to_string(), ticker.clone());
                }
            }
        }
        if sub.is_empty() {
            continue;
        }

        let filtered = filter_ticker_deviations(&sub, thresholds);
        if let Some(rate) = compute_vwap(&filtered).get(quote) {
            visited.remove(quote);
            return Some(rate * next_rate);
        }
    }

    visited.remove(quote);
    None
}

/// Resolve `quote`'s USD rate from candle observations, recursively
fn candle_usd_rate(
    quote: &str,
    candles: &AggregatedProviderCandles,
    provider_pairs: &ProviderPairs,
    thresholds: &HashMap<String, Decimal>,
    now_ms: i64,
    visited: &mut HashSet<String>,
) -> Option<Decimal> {
    if quote == USD {
        return Some(Decimal::ONE);
    }
    if !visited.insert(quote.to_string()) {
        return None;
    }

    let candidates = next_quotes(provider_pairs, quote, |provider, base| {
        candles
            .get(provider)
            .is_some_and(|by_base| by_base.contains_key(base))
    });

    for next in candidates {
        let Some(next_rate) =
            candle_usd_rate(&next, candles, provider_pairs, thresholds, now_ms, visited)
        else {
            continue;
        };

        let mut sub = AggregatedProviderCandles::new();
        for (provider, by_base) in candles {
            if pair_quote(provider_pairs, provider, quote) == Some(next.as_str()) {
                if let Some(series) = by_base.get(quote) {
                    sub.entry(provider.clone())
                        .or_default()
                        .insert(quote.to_string(), series.clone());
                }
            }
        }
        if sub.is_empty() {
            continue;
        }

        let filtered = filter_candle_deviations(&sub, thresholds);
        if let Some(rate) = compute_tvwap(&filtered, now_ms).get(quote) {
            visited.remove(quote);
            return Some(rate * next_rate);
        }
    }

    visited.remove(quote);
    None
}

/// Convert every ticker observation into USD.
///
/// Observations whose quote cannot be resolved to USD are dropped without
/// error. Volumes are left in base units.
pub fn convert_tickers_to_usd(
    prices: &AggregatedProviderPrices,
    provider_pairs: &ProviderPairs,
    thresholds: &HashMap<String, Decimal>,
) -> AggregatedProviderPrices {
    let mut rates: HashMap<String, Option<Decimal>> = HashMap::new();
    let mut converted = AggregatedProviderPrices::new();

    for (provider, by_base) in prices {
        for (base, ticker) in by_base {
            let Some(quote) = pair_quote(provider_pairs, provider, base) else {
                continue;
            };

            let rate = rates
                .entry(quote.to_string())
                .or_insert_with(|| {
                    ticker_usd_rate(quote, prices, provider_pairs, thresholds, &mut HashSet::new())
                })
                .to_owned();

            match rate {
                Some(rate) => {
                    converted.entry(provider.clone()).or_default().insert(
                        base.clone(),
                        TickerPrice {
                            price: ticker.price * rate,
                            volume: ticker.volume,
                        },
                    );
                }
                None => {
                    tracing::debug!(
                        provider = %provider,
                        base = %base,
                        quote = %quote,
                        "no conversion path to USD, dropping ticker"
                    );
                }
            }
        }
    }

    converted
}

/// Convert every candle observation into USD, dropping quotes with no path
pub fn convert_candles_to_usd(
    candles: &AggregatedProviderCandles,
    provider_pairs: &ProviderPairs,
    thresholds: &HashMap<String, Decimal>,
    now_ms: i64,
) -> AggregatedProviderCandles {
    let mut rates: HashMap<String, Option<Decimal>> = HashMap::new();
    let mut converted = AggregatedProviderCandles::new();

    for (provider, by_base) in candles {
        for (base, series) in by_base {
            let Some(quote) = pair_quote(provider_pairs, provider, base) else {
                continue;
            };

            let rate = rates
                .entry(quote.to_string())
                .or_insert_with(|| {
                    candle_usd_rate(
                        quote,
                        candles,
                        provider_pairs,
                        thresholds,
                        now_ms,
                        &mut HashSet::new(),
                    )
                })
                .to_owned();

            match rate {
                Some(rate) => {
                    let converted_series = series
                        .iter()
                        .map(|c| crate::types::CandlePrice {
                            price: c.price * rate,
                            volume: c.volume,
                            timestamp_ms: c.timestamp_ms,
                        })
                        .collect();
                    converted
                        .entry(provider.clone())
                        .or_default()
                        .insert(base.clone(), converted_series);
                }
                None => {
                    tracing::debug!(
                        provider = %provider,
                        base = %base,
                        quote = %quote,
                        "no conversion path to USD, dropping candles"
                    );
                }
            }
        }
    }

    converted
}

/// Whether an observation survives the deviation band around the mean
fn within_band(
    price: Decimal,
    base: &str,
    deviations: &HashMap<String, Decimal>,
    means: &HashMap<String, Decimal>,
    thresholds: &HashMap<String, Decimal>,
) -> bool {
    match (deviations.get(base), means.get(base)) {
        (Some(sigma), Some(mean)) => {
            let threshold = thresholds.get(base).copied().unwrap_or(Decimal::ONE);
            let band = threshold * sigma;
            price >= *mean - band && price <= *mean + band
        }
        // fewer than three observations: nothing to filter against
        _ => true,
    }
}

/// Drop ticker observations further than `threshold * sigma` from the mean
pub fn filter_ticker_deviations(
    prices: &AggregatedProviderPrices,
    thresholds: &HashMap<String, Decimal>,
) -> AggregatedProviderPrices {
    let mut observations: HashMap<String, HashMap<String, Decimal>> = HashMap::new();
    for (provider, by_base) in prices {
        for (base, ticker) in by_base {
            observations
                .entry(provider.clone())
                .or_default()
                .insert(base.clone(), ticker.price);
        }
    }
    let (deviations, means) = standard_deviation(&observations);

    let mut filtered = AggregatedProviderPrices::new();
    for (provider, by_base) in prices {
        for (base, ticker) in by_base {
            if within_band(ticker.price, base, &deviations, &means, thresholds) {
                filtered
                    .entry(provider.clone())
                    .or_default()
                    .insert(base.clone(), ticker.clone());
            } else {
                tracing::debug!(
                    provider = %provider,
                    base = %base,
                    price = %ticker.price,
                    "filtered deviant ticker price"
                );
            }
        }
    }

    filtered
}

/// Drop a provider's candles for a base when its latest candle price is
/// further than `threshold * sigma` from the cross-provider mean
pub fn filter_candle_deviations(
    candles: &AggregatedProviderCandles,
    thresholds: &HashMap<String, Decimal>,
) -> AggregatedProviderCandles {
    let mut observations: HashMap<String, HashMap<String, Decimal>> = HashMap::new();
    for (provider, by_base) in candles {
        for (base, series) in by_base {
            if let Some(latest) = series.iter().max_by_key(|c| c.timestamp_ms) {
                observations
                    .entry(provider.clone())
                    .or_default()
                    .insert(base.clone(), latest.price);
            }
        }
    }
    let (deviations, means) = standard_deviation(&observations);

    let mut filtered = AggregatedProviderCandles::new();
    for (provider, by_base) in candles {
        for (base, series) in by_base {
            let Some(latest) = series.iter().max_by_key(|c| c.timestamp_ms) else {
                continue;
            };
            if within_band(latest.price, base, &deviations, &means, thresholds) {
                filtered
                    .entry(provider.clone())
                    .or_default()
                    .insert(base.clone(), series.clone());
            } else {
                tracing::debug!(
                    provider = %provider,
                    base = %base,
                    price = %latest.price,
                    "filtered deviant candle series"
                );
            }
        }
    }

    filtered
}
