//! Materialize ledger entries for confirmed subscriptions
//!
//! The batch job walks every family's due subscriptions and writes one entry
//! per missed billing period. Each entry and the pattern advance it causes are
//! committed together.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Account, EntrySource, NewEntry, PatternStatus, RecurringTransaction};
use crate::recurring::schedule::can_auto_generate;

/// Counts from a generation run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub families_processed: usize,
    pub subscriptions_processed: usize,
    pub transactions_created: usize,
}

/// Generate overdue entries for every family
///
/// A failing pattern is logged and skipped; the rest of the batch continues.
pub fn generate_for_all(db: &Database, today: NaiveDate) -> Result<GenerationStats> {
    let mut stats = GenerationStats::default();

    for family in db.list_families()? {
        stats.families_processed += 1;

        let due = match db.due_subscriptions(family.id, today) {
            Ok(due) => due,
            Err(e) => {
                error!(family_id = family.id, error = %e, "Failed to load due subscriptions");
                continue;
            }
        };

        for pattern in due {
            match generate_overdue(db, &pattern, today) {
                Ok(created) => {
                    stats.subscriptions_processed += 1;
                    stats.transactions_created += created;
                    if created > 0 {
                        info!(
                            family_id = family.id,
                            pattern_id = pattern.id,
                            created,
                            "Generated entries for subscription '{}'",
                            pattern.display_name()
                        );
                    }
                }
                Err(e) => {
                    error!(
                        family_id = family.id,
                        pattern_id = pattern.id,
                        error = %e,
                        "Failed to generate entries for subscription"
                    );
                }
            }
        }
    }

    info!(
        families = stats.families_processed,
        subscriptions = stats.subscriptions_processed,
        created = stats.transactions_created,
        "Subscription generation complete"
    );
    Ok(stats)
}

/// Generate every occurrence of one pattern due on or before `today`
///
/// Periods that already hold an entry for the pattern are skipped but still
/// advance the schedule. Returns the number of entries created.
pub fn generate_overdue(
    db: &Database,
    pattern: &RecurringTransaction,
    today: NaiveDate,
) -> Result<usize> {
    let Some(account) = default_account(db, pattern)? else {
        return Ok(0);
    };
    if !can_auto_generate(Some(&account)) {
        return Ok(0);
    }

    let mut current = pattern.clone();
    let mut created = 0;
    while current.status == PatternStatus::Active && current.next_expected_date <= today {
        if generate_occurrence(db, &mut current, &account)?.is_some() {
            created += 1;
        } else {
            current.skip_occurrence();
            db.save_recurring(&current)?;
        }
    }
    Ok(created)
}

/// Record the pending occurrence of a subscription now
///
/// Returns the new entry id, or None when the period already has an entry.
pub fn record_transaction(db: &Database, family_id: i64, pattern_id: i64) -> Result<Option<i64>> {
    let mut pattern = db.get_family_recurring(family_id, pattern_id)?;
    let account = default_account(db, &pattern)?.ok_or_else(|| {
        Error::Validation(format!(
            "subscription '{}' has no default account",
            pattern.display_name()
        ))
    })?;
    generate_occurrence(db, &mut pattern, &account)
}

/// Advance past the pending occurrence without creating an entry
pub fn skip_occurrence(db: &Database, family_id: i64, pattern_id: i64) -> Result<NaiveDate> {
    let mut pattern = db.get_family_recurring(family_id, pattern_id)?;
    pattern.skip_occurrence();
    db.save_recurring(&pattern)?;
    debug!(family_id, pattern_id, next = %pattern.next_expected_date, "Skipped occurrence");
    Ok(pattern.next_expected_date)
}

fn default_account(db: &Database, pattern: &RecurringTransaction) -> Result<Option<Account>> {
    match pattern.default_account_id {
        Some(id) => db.get_account(id),
        None => Ok(None),
    }
}

/// Write the entry for `pattern.next_expected_date` and advance the pattern
fn generate_occurrence(
    db: &Database,
    pattern: &mut RecurringTransaction,
    account: &Account,
) -> Result<Option<i64>> {
    let date = pattern.next_expected_date;
    let (start, end) = pattern.period_bounds(date);
    if db.entry_exists_for_period(pattern.id, account.id, start, end)? {
        debug!(pattern_id = pattern.id, %date, "Entry already exists for period");
        return Ok(None);
    }

    let amount = pattern.amount_for_transaction();
    let entry = NewEntry {
        date,
        amount,
        currency: pattern.currency.clone(),
        name: pattern.display_name().to_string(),
        merchant_id: pattern.merchant_id,
        recurring_transaction_id: Some(pattern.id),
        source: EntrySource::Subscription,
        provider_data: None,
        import_hash: None,
    };

    let mut advanced = pattern.clone();
    advanced.record_occurrence(date, Some(amount));
    let entry_id = db.insert_generated_entry(account.id, &entry, &advanced)?;
    *pattern = advanced;
    Ok(Some(entry_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountProvider, NewRecurringTransaction};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn subscription(
        db: &Database,
        family: i64,
        account: Option<i64>,
        name: &str,
        next: &str,
    ) -> i64 {
        let new = NewRecurringTransaction {
            name: Some(name.to_string()),
            amount: dec("9.99"),
            currency: "USD".to_string(),
            expected_day_of_month: 10,
            is_subscription: true,
            last_occurrence_date: d("2024-12-10"),
            next_expected_date: Some(d(next)),
            occurrence_count: 1,
            default_account_id: account,
            ..Default::default()
        };
        db.create_recurring(family, &new, d("2024-12-10")).unwrap()
    }

    #[test]
    fn test_generate_overdue_catches_up() {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Cash", "USD", None).unwrap();
        let id = subscription(&db, family, Some(account), "Music", "2025-01-10");

        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(generate_overdue(&db, &pattern, d("2025-03-12")).unwrap(), 3);

        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.next_expected_date, d("2025-04-10"));
        assert_eq!(pattern.last_occurrence_date, d("2025-03-10"));
        assert_eq!(pattern.occurrence_count, 4);

        let entries = db.list_entries_for_recurring(id).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.source == EntrySource::Subscription));
        assert_eq!(entries[0].name, "Music");

        // Running again is a no-op
        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(generate_overdue(&db, &pattern, d("2025-03-12")).unwrap(), 0);
    }

    #[test]
    fn test_existing_entry_in_period_is_not_duplicated() {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Cash", "USD", None).unwrap();
        let id = subscription(&db, family, Some(account), "Music", "2025-01-10");

        let mut manual = NewEntry::manual(d("2025-01-03"), dec("9.99"), "USD", "Music");
        manual.recurring_transaction_id = Some(id);
        db.insert_entry(account, &manual).unwrap();

        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(generate_overdue(&db, &pattern, d("2025-01-20")).unwrap(), 0);
        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.next_expected_date, d("2025-02-10"));
        assert_eq!(db.list_entries_for_recurring(id).unwrap().len(), 1);
    }

    #[test]
    fn test_generate_for_all_skips_linked_and_accountless() {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let cash = db.upsert_account(family, "Cash", "USD", None).unwrap();
        let card = db
            .upsert_account(family, "Card", "USD", Some(AccountProvider::Plaid))
            .unwrap();
        db.create_family("Empty", "EUR").unwrap();

        subscription(&db, family, Some(cash), "Music", "2025-01-10");
        subscription(&db, family, Some(card), "Video", "2025-01-10");
        subscription(&db, family, None, "Cloud", "2025-01-10");

        let stats = generate_for_all(&db, d("2025-01-15")).unwrap();
        assert_eq!(
            stats,
            GenerationStats {
                families_processed: 2,
                subscriptions_processed: 1,
                transactions_created: 1,
            }
        );
    }

    #[test]
    fn test_record_and_skip_occurrence() {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Cash", "USD", None).unwrap();
        let id = subscription(&db, family, Some(account), "Music", "2025-02-10");
        let orphan = subscription(&db, family, None, "Cloud", "2025-02-10");

        let entry = record_transaction(&db, family, id).unwrap();
        assert!(entry.is_some());
        assert_eq!(
            db.get_recurring(id).unwrap().unwrap().next_expected_date,
            d("2025-03-10")
        );

        assert_eq!(skip_occurrence(&db, family, id).unwrap(), d("2025-04-10"));
        assert!(matches!(
            record_transaction(&db, family, orphan),
            Err(Error::Validation(_))
        ));
    }
}
