//! Benchmarks for the price aggregation hot path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use price_feeder::oracle::{compute_tvwap, compute_vwap};
use price_feeder::types::{
    AggregatedProviderCandles, AggregatedProviderPrices, CandlePrice, TickerPrice,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const NOW_MS: i64 = 1_700_000_000_000;

fn sample_prices() -> AggregatedProviderPrices {
    let mut prices = AggregatedProviderPrices::new();
    for p in 0..8 {
        let by_base = prices.entry(format!("provider{p}")).or_default();
        for b in 0..16 {
            by_base.insert(
                format!("ASSET{b}"),
                TickerPrice {
                    price: dec!(10) + Decimal::from(p * b),
                    volume: dec!(100) + Decimal::from(p),
                },
            );
        }
    }
    prices
}

fn sample_candles() -> AggregatedProviderCandles {
    let mut candles = AggregatedProviderCandles::new();
    for p in 0..8 {
        let by_base = candles.entry(format!("provider{p}")).or_default();
        for b in 0..16 {
            let series = (0..5)
                .map(|i| CandlePrice {
                    price: dec!(10) + Decimal::from(p * b),
                    volume: dec!(100),
                    timestamp_ms: NOW_MS - i * 60_000,
                })
                .collect();
            by_base.insert(format!("ASSET{b}"), series);
        }
    }
    candles
}

fn benchmark_vwap(c: &mut Criterion) {
    let prices = sample_prices();

    c.bench_function("compute_vwap", |b| {
        b.iter(|| compute_vwap(black_box(&prices)))
    });
}

fn benchmark_tvwap(c: &mut Criterion) {
    let candles = sample_candles();

    c.bench_function("compute_tvwap", |b| {
        b.iter(|| compute_tvwap(black_box(&candles), black_box(NOW_MS)))
    });
}

criterion_group!(benches, benchmark_vwap, benchmark_tvwap);
criterion_main!(benches);
