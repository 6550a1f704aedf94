//! Recurring patterns
//!
//! - `schedule` - Billing date arithmetic and per-occurrence bookkeeping
//! - `identifier` - Find patterns in ledger history
//! - `cleaner` - Deactivate patterns that stopped charging
//!
//! This module also holds the user-facing edits to patterns: promoting an
//! entry, creating a subscription by hand, updating and toggling one.

pub mod cleaner;
pub mod identifier;
pub mod schedule;

pub use cleaner::Cleaner;
pub use identifier::{IdentificationResults, Identifier};

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::config::CadenceConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{BillingCycle, NewRecurringTransaction, PatternStatus, RecurringTransaction};

/// Promote an existing entry to a manual recurring pattern
///
/// Amount bounds are seeded from matching entries (same merchant or name,
/// same currency, near the same day of month) within the variance lookback.
pub fn create_from_entry(
    db: &Database,
    family_id: i64,
    entry_id: i64,
    today: NaiveDate,
    config: &CadenceConfig,
) -> Result<i64> {
    let entry = db
        .get_entry(entry_id)?
        .filter(|e| e.family_id == family_id)
        .ok_or_else(|| Error::NotFound(format!("entry {}", entry_id)))?;

    let since = today
        .checked_sub_months(Months::new(config.lifecycle.variance_lookback_months))
        .unwrap_or(NaiveDate::MIN);
    let name = entry.merchant_id.is_none().then(|| entry.name.as_str());
    let amounts: Vec<Decimal> = db
        .find_matching_entries(
            family_id,
            entry.merchant_id,
            name,
            &entry.currency,
            entry.date.day(),
            config.identification.day_window,
            since,
        )?
        .into_iter()
        .map(|e| e.amount)
        .collect();

    let (min, max, avg) = match (amounts.iter().min(), amounts.iter().max()) {
        (Some(min), Some(max)) => {
            // Exact mean, never rounded
            let avg = amounts.iter().sum::<Decimal>() / Decimal::from(amounts.len());
            (Some(*min), Some(*max), Some(avg))
        }
        _ => (None, None, None),
    };

    let new = NewRecurringTransaction {
        merchant_id: entry.merchant_id,
        name: name.map(str::to_string),
        amount: entry.amount,
        currency: entry.currency.clone(),
        expected_day_of_month: entry.date.day(),
        manual: true,
        last_occurrence_date: entry.date,
        occurrence_count: amounts.len() as u32,
        expected_amount_min: min,
        expected_amount_max: max,
        expected_amount_avg: avg,
        ..Default::default()
    };

    let id = db.create_recurring(family_id, &new, today)?;
    info!(family_id, entry_id, pattern_id = id, "Created manual pattern from entry");
    Ok(id)
}

/// Create a subscription directly, without going through detection
pub fn create_subscription(
    db: &Database,
    family_id: i64,
    new: &NewRecurringTransaction,
    today: NaiveDate,
) -> Result<i64> {
    if let Some(account_id) = new.default_account_id {
        check_account(db, family_id, account_id)?;
    }
    if let Some(service_id) = new.subscription_service_id {
        db.get_service(service_id)?
            .ok_or_else(|| Error::NotFound(format!("subscription service {}", service_id)))?;
    }

    let new = NewRecurringTransaction {
        is_subscription: true,
        ..new.clone()
    };
    db.create_recurring(family_id, &new, today)
}

/// Partial update of a subscription's billing details
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionUpdate {
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub billing_cycle: Option<BillingCycle>,
    pub expected_day_of_month: Option<u32>,
    pub expected_month: Option<u32>,
    pub default_account_id: Option<i64>,
    pub subscription_service_id: Option<i64>,
    /// Wins over the date recomputed from changed billing parameters
    pub next_expected_date: Option<NaiveDate>,
}

/// Apply an update, rescheduling when the billing parameters change
pub fn update_subscription(
    db: &Database,
    family_id: i64,
    id: i64,
    update: &SubscriptionUpdate,
    today: NaiveDate,
) -> Result<RecurringTransaction> {
    let mut pattern = db.get_family_recurring(family_id, id)?;

    if let Some(day) = update.expected_day_of_month {
        if !(1..=31).contains(&day) {
            return Err(Error::Validation(format!(
                "expected_day_of_month must be between 1 and 31, got {}",
                day
            )));
        }
    }
    if let Some(month) = update.expected_month {
        if !(1..=12).contains(&month) {
            return Err(Error::Validation(format!(
                "expected_month must be between 1 and 12, got {}",
                month
            )));
        }
    }
    if let Some(account_id) = update.default_account_id {
        check_account(db, family_id, account_id)?;
    }

    let billing_changed = update
        .expected_day_of_month
        .is_some_and(|d| d != pattern.expected_day_of_month)
        || update.billing_cycle.is_some_and(|c| c != pattern.billing_cycle)
        || update.expected_month.is_some_and(|m| Some(m) != pattern.expected_month);

    if let Some(name) = update.name.as_deref().map(str::trim) {
        if name.is_empty() && pattern.merchant_id.is_none() {
            return Err(Error::Validation(
                "either merchant or name must be present".to_string(),
            ));
        }
        pattern.name = (!name.is_empty()).then(|| name.to_string());
    }
    if let Some(amount) = update.amount {
        pattern.amount = amount;
    }
    if let Some(currency) = update.currency.as_deref() {
        pattern.currency = crate::exchange::parse_currency(currency)?;
    }
    if let Some(cycle) = update.billing_cycle {
        pattern.billing_cycle = cycle;
    }
    if let Some(day) = update.expected_day_of_month {
        pattern.expected_day_of_month = day;
    }
    if update.expected_month.is_some() {
        pattern.expected_month = update.expected_month;
    }
    if pattern.billing_cycle == BillingCycle::Monthly {
        pattern.expected_month = None;
    }
    if update.default_account_id.is_some() {
        pattern.default_account_id = update.default_account_id;
    }
    if update.subscription_service_id.is_some() {
        pattern.subscription_service_id = update.subscription_service_id;
    }

    match update.next_expected_date {
        Some(next) => pattern.next_expected_date = next,
        None if billing_changed => pattern.reschedule(today),
        None => {}
    }

    db.save_recurring(&pattern)?;
    Ok(pattern)
}

/// Flip a pattern between active and inactive
pub fn toggle_status(db: &Database, family_id: i64, id: i64) -> Result<PatternStatus> {
    let mut pattern = db.get_family_recurring(family_id, id)?;
    pattern.status = match pattern.status {
        PatternStatus::Active => PatternStatus::Inactive,
        PatternStatus::Inactive => PatternStatus::Active,
    };
    db.save_recurring(&pattern)?;
    Ok(pattern.status)
}

fn check_account(db: &Database, family_id: i64, account_id: i64) -> Result<()> {
    db.get_account(account_id)?
        .filter(|a| a.family_id == family_id)
        .map(|_| ())
        .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEntry;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Checking", "USD", None).unwrap();
        (db, family, account)
    }

    fn insert(db: &Database, account: i64, entry: &NewEntry) -> i64 {
        match db.insert_entry(account, entry).unwrap() {
            crate::db::EntryInsertResult::Inserted(id) => id,
            crate::db::EntryInsertResult::Duplicate => panic!("unexpected duplicate"),
        }
    }

    #[test]
    fn test_create_from_entry_seeds_variance() {
        let (db, family, account) = setup();
        let merchant = db.get_or_create_merchant(family, "City Power").unwrap();
        let mut last = 0;
        for (date, amount) in [
            ("2024-10-09", "48.00"),
            ("2024-11-11", "52.00"),
            ("2024-12-10", "56.00"),
            ("2024-05-10", "99.00"), // outside the six month lookback
        ] {
            let mut entry = NewEntry::manual(d(date), dec(amount), "USD", "CITY POWER 0042");
            entry.merchant_id = Some(merchant);
            let id = insert(&db, account, &entry);
            if date == "2024-12-10" {
                last = id;
            }
        }

        let config = CadenceConfig::default();
        let id = create_from_entry(&db, family, last, d("2024-12-20"), &config).unwrap();
        let pattern = db.get_recurring(id).unwrap().unwrap();

        assert!(pattern.manual);
        assert_eq!(pattern.name, None);
        assert_eq!(pattern.display_name(), "City Power");
        assert_eq!(pattern.occurrence_count, 3);
        assert_eq!(pattern.expected_amount_min, Some(dec("48.00")));
        assert_eq!(pattern.expected_amount_max, Some(dec("56.00")));
        assert_eq!(pattern.expected_amount_avg, Some(dec("52.00")));
        assert_eq!(pattern.expected_day_of_month, 10);
        assert_eq!(pattern.next_expected_date, d("2025-01-10"));
    }

    #[test]
    fn test_create_from_entry_keeps_exact_mean() {
        let (db, family, account) = setup();
        let mut last = 0;
        for (date, amount) in [("2024-10-10", "10.00"), ("2024-11-10", "10.00"), ("2024-12-10", "10.01")] {
            last = insert(&db, account, &NewEntry::manual(d(date), dec(amount), "USD", "Water Co"));
        }

        let config = CadenceConfig::default();
        let id = create_from_entry(&db, family, last, d("2024-12-20"), &config).unwrap();
        let pattern = db.get_recurring(id).unwrap().unwrap();

        let exact = dec("30.01") / Decimal::from(3);
        assert_eq!(pattern.expected_amount_avg, Some(exact));
        assert_ne!(pattern.expected_amount_avg, Some(dec("10.00")));
    }

    #[test]
    fn test_create_from_entry_rejects_foreign_entry() {
        let (db, family, account) = setup();
        let other = db.create_family("Other", "USD").unwrap();
        let id = insert(
            &db,
            account,
            &NewEntry::manual(d("2024-12-10"), dec("5"), "USD", "Thing"),
        );
        let config = CadenceConfig::default();
        assert!(matches!(
            create_from_entry(&db, other, id, d("2024-12-20"), &config),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_reschedules_on_billing_change() {
        let (db, family, account) = setup();
        let new = NewRecurringTransaction {
            name: Some("Storage".to_string()),
            amount: dec("2.99"),
            currency: "USD".to_string(),
            expected_day_of_month: 5,
            last_occurrence_date: d("2025-01-05"),
            ..Default::default()
        };
        let id = create_subscription(&db, family, &new, d("2025-01-20")).unwrap();
        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert!(pattern.is_subscription);
        assert_eq!(pattern.next_expected_date, d("2025-02-05"));

        let update = SubscriptionUpdate {
            billing_cycle: Some(BillingCycle::Yearly),
            expected_month: Some(9),
            expected_day_of_month: Some(31),
            default_account_id: Some(account),
            ..Default::default()
        };
        let updated = update_subscription(&db, family, id, &update, d("2025-01-20")).unwrap();
        assert_eq!(updated.next_expected_date, d("2025-09-30"));
        assert_eq!(updated.default_account_id, Some(account));

        // Amount-only edits keep the schedule
        let update = SubscriptionUpdate {
            amount: Some(dec("29.99")),
            ..Default::default()
        };
        let updated = update_subscription(&db, family, id, &update, d("2025-03-01")).unwrap();
        assert_eq!(updated.next_expected_date, d("2025-09-30"));
        assert_eq!(updated.amount, dec("29.99"));
    }

    #[test]
    fn test_update_validates_input() {
        let (db, family, _account) = setup();
        let other = db.create_family("Other", "USD").unwrap();
        let foreign_account = db.upsert_account(other, "Theirs", "USD", None).unwrap();
        let new = NewRecurringTransaction {
            name: Some("Storage".to_string()),
            amount: dec("2.99"),
            currency: "USD".to_string(),
            expected_day_of_month: 5,
            last_occurrence_date: d("2025-01-05"),
            ..Default::default()
        };
        let id = create_subscription(&db, family, &new, d("2025-01-20")).unwrap();

        let bad_day = SubscriptionUpdate {
            expected_day_of_month: Some(0),
            ..Default::default()
        };
        assert!(update_subscription(&db, family, id, &bad_day, d("2025-01-20")).is_err());

        let foreign = SubscriptionUpdate {
            default_account_id: Some(foreign_account),
            ..Default::default()
        };
        assert!(matches!(
            update_subscription(&db, family, id, &foreign, d("2025-01-20")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_toggle_status() {
        let (db, family, _account) = setup();
        let new = NewRecurringTransaction {
            name: Some("Gym".to_string()),
            amount: dec("30"),
            currency: "USD".to_string(),
            expected_day_of_month: 1,
            last_occurrence_date: d("2025-01-01"),
            ..Default::default()
        };
        let id = create_subscription(&db, family, &new, d("2025-01-02")).unwrap();

        assert_eq!(toggle_status(&db, family, id).unwrap(), PatternStatus::Inactive);
        assert_eq!(toggle_status(&db, family, id).unwrap(), PatternStatus::Active);
    }
}
