//! Subscription totals in the family currency

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::debug;

use crate::db::{Database, PatternFilter};
use crate::error::{Error, Result};
use crate::exchange::convert;
use crate::models::{BillingCycle, RecurringTransaction};
use crate::recurring::schedule::clamp_to_day;
use crate::palette;

/// Label used for subscriptions without a catalog category
pub const UNCATEGORIZED: &str = "other";

/// Spend on one category of subscriptions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub color: String,
    pub count: usize,
    pub monthly_total: Decimal,
}

/// Monthly and yearly cost of a family's active subscriptions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub currency: String,
    pub count: usize,
    pub monthly_total: Decimal,
    pub yearly_total: Decimal,
    /// Sorted by monthly spend, highest first
    pub categories: Vec<CategoryTotal>,
}

/// Sum active subscriptions of a family
///
/// Foreign amounts use the cached rate on `today`; without one the amount is
/// counted as-is.
pub fn subscription_totals(
    db: &Database,
    family_id: i64,
    today: NaiveDate,
) -> Result<SubscriptionSummary> {
    let family = db
        .get_family(family_id)?
        .ok_or_else(|| Error::NotFound(format!("family {}", family_id)))?;
    let subscriptions = db.list_recurring(family_id, PatternFilter::ActiveSubscriptions)?;

    let mut monthly_total = Decimal::ZERO;
    let mut yearly_total = Decimal::ZERO;
    let mut by_category: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();

    for pattern in &subscriptions {
        let monthly = in_currency(db, pattern, pattern.monthly_cost(), &family.currency, today);
        let yearly = in_currency(db, pattern, pattern.yearly_cost(), &family.currency, today);
        monthly_total += monthly;
        yearly_total += yearly;

        let category = category_of(db, pattern)?;
        let slot = by_category.entry(category).or_insert((0, Decimal::ZERO));
        slot.0 += 1;
        slot.1 += monthly;
    }

    let mut categories: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, (count, total))| CategoryTotal {
            color: palette::color_for(&category).to_string(),
            category,
            count,
            monthly_total: round_cents(total),
        })
        .collect();
    categories.sort_by(|a, b| b.monthly_total.cmp(&a.monthly_total));

    Ok(SubscriptionSummary {
        currency: family.currency,
        count: subscriptions.len(),
        monthly_total: round_cents(monthly_total),
        yearly_total: round_cents(yearly_total),
        categories,
    })
}

/// One subscription charge on a calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCharge {
    pub id: i64,
    pub name: String,
    /// In the family currency
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub original_currency: String,
}

/// Charges falling on one day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub charges: Vec<CalendarCharge>,
    pub total: Decimal,
}

/// Billing days of one month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingCalendar {
    /// First day of the month
    pub month: NaiveDate,
    pub currency: String,
    /// Only days with charges, in date order
    pub days: Vec<CalendarDay>,
    pub month_total: Decimal,
    /// Monday through Sunday around `today`
    pub week_total: Decimal,
}

/// Day a subscription bills within the month starting at `first`
///
/// Monthly subscriptions bill every month on their clamped day. Yearly ones
/// bill only in their expected month.
pub fn billing_day(pattern: &RecurringTransaction, first: NaiveDate) -> Option<NaiveDate> {
    if pattern.billing_cycle == BillingCycle::Yearly {
        let month = pattern
            .expected_month
            .unwrap_or_else(|| pattern.last_occurrence_date.month());
        if month != first.month() {
            return None;
        }
    }
    Some(clamp_to_day(first, pattern.expected_day_of_month))
}

/// Lay out a family's active subscriptions over the month containing `month`
pub fn billing_calendar(
    db: &Database,
    family_id: i64,
    month: NaiveDate,
    today: NaiveDate,
) -> Result<BillingCalendar> {
    let family = db
        .get_family(family_id)?
        .ok_or_else(|| Error::NotFound(format!("family {}", family_id)))?;
    let subscriptions = db.list_recurring(family_id, PatternFilter::ActiveSubscriptions)?;
    let first = month.with_day(1).unwrap_or(month);

    let mut by_day: BTreeMap<NaiveDate, Vec<CalendarCharge>> = BTreeMap::new();
    for pattern in &subscriptions {
        if let Some(date) = billing_day(pattern, first) {
            let original = pattern.amount_for_transaction();
            let amount = in_currency(db, pattern, original, &family.currency, today);
            by_day.entry(date).or_default().push(CalendarCharge {
                id: pattern.id,
                name: pattern.display_name().to_string(),
                amount: round_cents(amount),
                original_amount: original,
                original_currency: pattern.currency.clone(),
            });
        }
    }

    let days: Vec<CalendarDay> = by_day
        .into_iter()
        .map(|(date, charges)| CalendarDay {
            date,
            total: charges.iter().map(|c| c.amount).sum(),
            charges,
        })
        .collect();
    let month_total = days.iter().map(|d| d.total).sum();

    // The week can straddle two months
    let week_start = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    let week_end = week_start + Days::new(6);
    let mut firsts = vec![week_start.with_day(1).unwrap_or(week_start)];
    if week_end.month() != week_start.month() {
        firsts.push(week_end.with_day(1).unwrap_or(week_end));
    }
    let mut week_total = Decimal::ZERO;
    for pattern in &subscriptions {
        for date in firsts.iter().filter_map(|f| billing_day(pattern, *f)) {
            if date >= week_start && date <= week_end {
                let original = pattern.amount_for_transaction();
                week_total += round_cents(in_currency(db, pattern, original, &family.currency, today));
            }
        }
    }

    debug!(family_id, month = %first, days = days.len(), "Built billing calendar");

    Ok(BillingCalendar {
        month: first,
        currency: family.currency,
        days,
        month_total,
        week_total,
    })
}

fn in_currency(
    db: &Database,
    pattern: &RecurringTransaction,
    amount: Decimal,
    currency: &str,
    today: NaiveDate,
) -> Decimal {
    convert(amount, &pattern.currency, currency, today, db).unwrap_or_else(|| {
        debug!(
            pattern_id = pattern.id,
            "No {} -> {} rate on {}, counting at par", pattern.currency, currency, today
        );
        amount
    })
}

fn category_of(db: &Database, pattern: &RecurringTransaction) -> Result<String> {
    let category = match pattern.subscription_service_id {
        Some(id) => db.get_service(id)?.and_then(|s| s.category),
        None => None,
    };
    Ok(category
        .map(|c| c.as_str().to_string())
        .unwrap_or_else(|| UNCATEGORIZED.to_string()))
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
