//! Suggestion lifecycle of a recurring pattern
//!
//! ```text
//!   none ──suggest──▶ suggested ──approve──▶ confirmed
//!                         │
//!                         └────dismiss────▶ dismissed
//! ```
//!
//! Dismissed patterns stay dismissed: detection never looks at them again.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{BillingCycle, Money, RecurringTransaction, SuggestionStatus};

/// Where a pattern sits in the suggestion lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionState {
    None,
    Suggested,
    Dismissed,
    Confirmed,
}

impl SuggestionState {
    pub fn of(pattern: &RecurringTransaction) -> Self {
        match pattern.suggestion_status {
            Some(SuggestionStatus::Suggested) => Self::Suggested,
            Some(SuggestionStatus::Dismissed) => Self::Dismissed,
            None if pattern.is_subscription => Self::Confirmed,
            None => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Suggested => "suggested",
            Self::Dismissed => "dismissed",
            Self::Confirmed => "confirmed",
        }
    }
}

/// What detection learned about a pattern it is suggesting
#[derive(Debug, Clone, Default)]
pub struct SuggestionDetails {
    pub subscription_service_id: Option<i64>,
    pub billing_cycle: BillingCycle,
    pub base_price: Option<Money>,
}

/// none → suggested
pub fn suggest(
    pattern: &mut RecurringTransaction,
    details: SuggestionDetails,
    now: DateTime<Utc>,
) -> Result<()> {
    require(pattern, SuggestionState::None, "suggest")?;

    pattern.suggestion_status = Some(SuggestionStatus::Suggested);
    pattern.suggested_at = Some(now);
    pattern.billing_cycle = details.billing_cycle;
    if let Some(id) = details.subscription_service_id {
        pattern.subscription_service_id = Some(id);
    }
    match details.base_price {
        Some(price) => {
            pattern.base_currency = Some(price.currency);
            pattern.base_amount = Some(price.amount);
        }
        None => {
            pattern.base_currency = None;
            pattern.base_amount = None;
        }
    }
    Ok(())
}

/// suggested → confirmed
///
/// With `use_base_currency` the pattern is rebased onto the detected
/// reference price, if detection found one.
pub fn approve(pattern: &mut RecurringTransaction, use_base_currency: bool) -> Result<()> {
    require(pattern, SuggestionState::Suggested, "approve")?;

    pattern.suggestion_status = None;
    pattern.is_subscription = true;

    if use_base_currency {
        if let (Some(currency), Some(amount)) = (pattern.base_currency.clone(), pattern.base_amount)
        {
            pattern.currency = currency;
            pattern.amount = amount;
        }
    }
    Ok(())
}

/// suggested → dismissed
pub fn dismiss(pattern: &mut RecurringTransaction, now: DateTime<Utc>) -> Result<()> {
    require(pattern, SuggestionState::Suggested, "dismiss")?;

    pattern.suggestion_status = Some(SuggestionStatus::Dismissed);
    pattern.dismissed_at = Some(now);
    Ok(())
}

fn require(
    pattern: &RecurringTransaction,
    expected: SuggestionState,
    action: &'static str,
) -> Result<()> {
    let state = SuggestionState::of(pattern);
    if state == expected {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            action,
            state: state.as_str(),
        })
    }
}
