//! Vote construction
//!
//! Turns computed prices into the canonical aggregate exchange-rate vote.
//! The exchange-rate string must be byte-identical for equal inputs: the
//! chain verifies pre-vote commitments against it.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::chain::MsgAggregateExchangeRateVote;
use crate::types::ChainDenomMapping;

/// A price denominated in a chain denom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Decimal,
}

/// Map base-keyed prices into chain-denom coins.
///
/// Bases without a configured denom mapping are skipped.
pub fn to_dec_coins(
    prices: &HashMap<String, Decimal>,
    chain_denoms: &ChainDenomMapping,
) -> Vec<DecCoin> {
    prices
        .iter()
        .filter_map(|(base, price)| {
            chain_denoms.get(base).map(|denom| DecCoin {
                denom: denom.clone(),
                amount: *price,
            })
        })
        .collect()
}

/// Keep only coins whose denom the oracle module accepts, so extra prices
/// are not penalized
pub fn filter_by_whitelist(coins: Vec<DecCoin>, whitelist: &[String]) -> Vec<DecCoin> {
    coins
        .into_iter()
        .filter(|c| whitelist.iter().any(|d| d == &c.denom))
        .collect()
}

/// Canonical exchange-rate string: coins sorted bytewise by denom,
/// rendered as comma-joined `<amount><denom>` units.
///
/// Amounts are normalized so equal values always render the same bytes.
pub fn exchange_rates_string(mut coins: Vec<DecCoin>) -> String {
    coins.sort_by(|a, b| a.denom.cmp(&b.denom));
    coins
        .iter()
        .map(|c| format!("{}{}", c.amount.normalize(), c.denom))
        .collect::<Vec<_>>()
        .join(",")
}

/// Assemble the vote payload
pub fn build_vote(coins: Vec<DecCoin>, feeder: &str, validator: &str) -> MsgAggregateExchangeRateVote {
    MsgAggregateExchangeRateVote {
        exchange_rates: exchange_rates_string(coins),
        feeder: feeder.to_string(),
        validator: validator.to_string(),
    }
}
