//! Recover the reference-currency price hidden behind converted charges
//!
//! A service priced at $9.99 but billed to a UAH card shows up as a slightly
//! different UAH amount every month. Converting each charge back with the
//! historical rate of its date makes the amounts cluster around one price,
//! which is then snapped to the nearest "nice" price point.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::config::BaseCurrencyConfig;
use crate::exchange::ExchangeRateLookup;
use crate::models::{Entry, Money};

/// Reference currency checked for a given account currency
pub fn reference_currency(account_currency: &str) -> &'static str {
    match account_currency.to_uppercase().as_str() {
        "UAH" => "USD",
        "USD" => "UAH",
        _ => "USD",
    }
}

/// Detect the reference-currency price of a series of charges
pub fn detect(
    entries: &[Entry],
    account_currency: &str,
    rates: &dyn ExchangeRateLookup,
    config: &BaseCurrencyConfig,
) -> Option<Money> {
    let reference = reference_currency(account_currency);

    if entries.len() < 2 {
        return None;
    }

    let raw: Vec<Decimal> = entries.iter().map(|e| e.amount.abs()).collect();
    let cv = coefficient_of_variation(&raw)?;
    if cv <= config.variance_threshold {
        debug!("Amounts stable (cv={:.4}), no hidden conversion", cv);
        return None;
    }

    let converted: Vec<Decimal> = entries
        .iter()
        .filter_map(|entry| {
            let rate = rates
                .rate(reference, &entry.currency, entry.date)
                .filter(|r| !r.is_zero())?;
            Some(round_cents(entry.amount.abs() / rate))
        })
        .collect();

    let clustered = clustered_amount(&converted, config.cluster_threshold)?;

    let snapped = if reference == "UAH" {
        snap_uah(clustered, config)
    } else {
        snap_nice_price(clustered, config.nice_price_tolerance)
    }?;

    debug!(
        "Detected base price {} {} (clustered {})",
        snapped, reference, clustered
    );

    Some(Money {
        currency: reference.to_string(),
        amount: snapped,
    })
}

/// Population standard deviation over |mean|, None when the mean is zero
fn coefficient_of_variation(amounts: &[Decimal]) -> Option<f64> {
    let values: Vec<f64> = amounts.iter().filter_map(|a| a.to_f64()).collect();
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean.abs())
}

/// Mean of the amounts if every amount lies within `threshold` of it
fn clustered_amount(amounts: &[Decimal], threshold: Decimal) -> Option<Decimal> {
    if amounts.len() < 2 {
        return None;
    }

    let mean = amounts.iter().sum::<Decimal>() / Decimal::from(amounts.len());
    if mean.is_zero() {
        return None;
    }

    let limit = mean.abs() * threshold;
    amounts
        .iter()
        .all(|a| (*a - mean).abs() <= limit)
        .then_some(mean)
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Snap to an X.99, X.49 or X.00 price within tolerance
///
/// Endings are tried in that order. For endings below .50 the next whole
/// number is tried as well, since the floor may sit one below the real price.
pub fn snap_nice_price(amount: Decimal, tolerance: Decimal) -> Option<Decimal> {
    let base = amount.floor();
    let endings = [Decimal::new(99, 2), Decimal::new(49, 2), Decimal::ZERO];

    for ending in endings {
        let mut candidates = vec![base + ending];
        if ending < Decimal::new(50, 2) {
            candidates.push(base + Decimal::ONE + ending);
        }

        if let Some(nice) = candidates
            .into_iter()
            .find(|c| (amount - *c).abs() <= tolerance)
        {
            return Some(nice.round_dp(2));
        }
    }

    None
}

/// Snap a UAH amount to a round price
///
/// Multiples of 100, then 50, then 10 are accepted within the round tolerance;
/// otherwise the nearest whole hryvnia within the integer tolerance.
pub fn snap_uah(amount: Decimal, config: &BaseCurrencyConfig) -> Option<Decimal> {
    for step in [100, 50, 10] {
        let step = Decimal::from(step);
        let nearest = (amount / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            * step;
        if !nearest.is_zero() && (amount - nearest).abs() <= config.uah_round_tolerance {
            return Some(nearest);
        }
    }

    let nearest = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    ((amount - nearest).abs() <= config.uah_integer_tolerance && !nearest.is_zero())
        .then_some(nearest)
}
