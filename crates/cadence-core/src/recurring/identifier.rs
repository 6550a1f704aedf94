//! Pattern identification from ledger history
//!
//! Groups a family's outflows by merchant (or cleaned-up description) and
//! currency, and keeps the groups that repeat on a steady day of the month at
//! a steady price.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{BillingCycleConfig, CadenceConfig, IdentificationConfig};
use crate::db::Database;
use crate::detect::billing_cycle;
use crate::error::Result;
use crate::models::{BillingCycle, Entry, EntrySource, NewRecurringTransaction, PatternStatus};

/// Counts from one identification pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IdentificationResults {
    pub groups_examined: usize,
    pub created: usize,
    pub updated: usize,
    /// Matched an existing manual pattern, left untouched
    pub manual_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupIdentity {
    Merchant(i64),
    Description(String),
}

/// A group that repeats consistently enough to be a pattern
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecurringGroup {
    pub merchant_id: Option<i64>,
    /// Most recent raw description, used as the pattern name
    pub name: String,
    pub currency: String,
    pub amount: Decimal,
    pub expected_day: u32,
    pub billing_cycle: BillingCycle,
    pub expected_month: Option<u32>,
    pub last_date: NaiveDate,
    pub occurrences: usize,
}

fn noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Card processor prefixes, reference numbers and punctuation runs
    RE.get_or_init(|| Regex::new(r"(?i)^(sq|tst|pp|paypal)\s*\*|[#*]+|\b\d{4,}\b").expect("valid regex"))
}

/// Reduce a bank description to a grouping key
///
/// `"NETFLIX.COM #12345"` and `"Netflix.com"` both become `"netflix.com"`.
pub fn normalize_description(description: &str) -> String {
    let cleaned = noise_re().replace_all(description, " ");
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Key that ties a named pattern to its entries
///
/// The normalized description, or the lowercased name when normalizing
/// leaves nothing.
pub fn match_key(name: &str) -> String {
    let key = normalize_description(name);
    if key.is_empty() {
        name.trim().to_lowercase()
    } else {
        key
    }
}

/// Finds recurring patterns in a family's ledger
pub struct Identifier<'a> {
    db: &'a Database,
    config: &'a CadenceConfig,
}

impl<'a> Identifier<'a> {
    pub fn new(db: &'a Database, config: &'a CadenceConfig) -> Self {
        Self { db, config }
    }

    /// Create or refresh recurring patterns for a family
    pub fn identify_patterns(&self, family_id: i64, today: NaiveDate) -> Result<IdentificationResults> {
        let since = today
            .checked_sub_months(Months::new(self.config.lifecycle.detection_lookback_months))
            .unwrap_or(NaiveDate::MIN);
        let entries = self.db.list_entries(family_id, Some(since))?;

        let mut groups: HashMap<(GroupIdentity, String), Vec<&Entry>> = HashMap::new();
        for entry in &entries {
            if entry.is_pending()
                || entry.amount <= Decimal::ZERO
                || entry.source == EntrySource::Subscription
            {
                continue;
            }
            let identity = match entry.merchant_id {
                Some(id) => GroupIdentity::Merchant(id),
                None => {
                    let key = normalize_description(&entry.name);
                    if key.is_empty() {
                        continue;
                    }
                    GroupIdentity::Description(key)
                }
            };
            groups
                .entry((identity, entry.currency.clone()))
                .or_default()
                .push(entry);
        }

        let mut results = IdentificationResults::default();
        for group in groups.values() {
            results.groups_examined += 1;
            let Some(found) = analyze_group(
                group,
                today,
                &self.config.identification,
                &self.config.billing_cycle,
            ) else {
                continue;
            };
            self.upsert(family_id, &found, today, &mut results)?;
        }

        info!(
            family_id,
            created = results.created,
            updated = results.updated,
            "Pattern identification complete"
        );
        Ok(results)
    }

    fn upsert(
        &self,
        family_id: i64,
        group: &RecurringGroup,
        today: NaiveDate,
        results: &mut IdentificationResults,
    ) -> Result<()> {
        let name = if group.merchant_id.is_some() {
            None
        } else {
            Some(group.name.as_str())
        };
        let existing =
            self.db
                .find_recurring_by_identity(family_id, group.merchant_id, name, &group.currency)?;

        match existing {
            Some(pattern) if pattern.manual => {
                results.manual_skipped += 1;
            }
            Some(mut pattern) => {
                // Generated entries advance subscriptions past the imported history
                if group.last_date > pattern.last_occurrence_date {
                    pattern.last_occurrence_date = group.last_date;
                    pattern.occurrence_count =
                        pattern.occurrence_count.max(group.occurrences as u32);
                    pattern.amount = group.amount;
                    pattern.expected_day_of_month = group.expected_day;
                    pattern.next_expected_date =
                        pattern.calculate_next_expected_date(pattern.last_occurrence_date);
                    pattern.status = PatternStatus::Active;
                    self.db.save_recurring(&pattern)?;
                    results.updated += 1;
                    debug!(family_id, pattern_id = pattern.id, "Refreshed pattern");
                }
            }
            None => {
                let new = NewRecurringTransaction {
                    merchant_id: group.merchant_id,
                    name: name.map(str::to_string),
                    amount: group.amount,
                    currency: group.currency.clone(),
                    expected_day_of_month: group.expected_day,
                    expected_month: group.expected_month,
                    billing_cycle: group.billing_cycle,
                    last_occurrence_date: group.last_date,
                    occurrence_count: group.occurrences as u32,
                    ..Default::default()
                };
                let id = self.db.create_recurring(family_id, &new, today)?;
                results.created += 1;
                debug!(family_id, pattern_id = id, "Created pattern {}", group.name);
            }
        }
        Ok(())
    }
}

/// Decide whether a group of charges is a recurring pattern
pub(crate) fn analyze_group(
    entries: &[&Entry],
    today: NaiveDate,
    config: &IdentificationConfig,
    cycle_config: &BillingCycleConfig,
) -> Option<RecurringGroup> {
    let mut sorted: Vec<&Entry> = entries.to_vec();
    sorted.sort_by_key(|e| (e.date, e.id));

    let dates: Vec<NaiveDate> = sorted.iter().map(|e| e.date).collect();
    let cycle = billing_cycle::classify(&dates, None, today, cycle_config);

    let enough = sorted.len() >= config.min_occurrences
        || (sorted.len() >= config.yearly_min_occurrences
            && sorted.len() >= 2
            && cycle == BillingCycle::Yearly);
    if !enough {
        return None;
    }

    let days: Vec<u32> = dates.iter().map(|d| d.day()).collect();
    let median_day = median_day(&days);
    let on_time = days
        .iter()
        .filter(|d| d.abs_diff(median_day) <= config.day_window)
        .count();
    if (on_time as f64) < config.day_consistency * days.len() as f64 {
        return None;
    }

    let amounts: Vec<Decimal> = sorted.iter().map(|e| e.amount).collect();
    let median_amount = median_amount(&amounts);
    if median_amount <= Decimal::ZERO {
        return None;
    }
    let limit = median_amount * config.amount_tolerance;
    if amounts.iter().any(|a| (*a - median_amount).abs() > limit) {
        return None;
    }

    let last = sorted.last()?;
    Some(RecurringGroup {
        merchant_id: last.merchant_id,
        name: last.name.trim().to_string(),
        currency: last.currency.clone(),
        amount: median_amount,
        expected_day: median_day,
        billing_cycle: cycle,
        expected_month: (cycle == BillingCycle::Yearly).then(|| last.date.month()),
        last_date: last.date,
        occurrences: sorted.len(),
    })
}

/// Median day of month; the lower middle value for even counts
fn median_day(days: &[u32]) -> u32 {
    let mut sorted = days.to_vec();
    sorted.sort_unstable();
    sorted.get((sorted.len().saturating_sub(1)) / 2).copied().unwrap_or(1)
}

fn median_amount(amounts: &[Decimal]) -> Decimal {
    if amounts.is_empty() {
        return Decimal::ZERO;
    }
    let mut sorted = amounts.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::from(2)
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEntry, ProviderData};
    use crate::test_utils::entry_fixture;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entries(rows: &[(&str, &str)]) -> Vec<Entry> {
        rows.iter()
            .map(|(date, amount)| entry_fixture(d(date), dec(amount), "USD"))
            .collect()
    }

    fn analyze(rows: &[(&str, &str)], today: &str) -> Option<RecurringGroup> {
        let entries = entries(rows);
        let refs: Vec<&Entry> = entries.iter().collect();
        analyze_group(
            &refs,
            d(today),
            &IdentificationConfig::default(),
            &BillingCycleConfig::default(),
        )
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("NETFLIX.COM #12345"), "netflix.com");
        assert_eq!(normalize_description("SQ *BLUE BOTTLE"), "blue bottle");
        assert_eq!(normalize_description("  Spotify   AB "), "spotify ab");
        assert_eq!(normalize_description("#### 1234"), "");
    }

    #[test]
    fn test_monthly_group_is_recurring() {
        let group = analyze(
            &[
                ("2024-10-15", "15.49"),
                ("2024-11-16", "15.49"),
                ("2024-12-14", "15.49"),
                ("2025-01-15", "15.99"),
            ],
            "2025-01-20",
        )
        .unwrap();

        assert_eq!(group.billing_cycle, BillingCycle::Monthly);
        assert_eq!(group.expected_day, 15);
        assert_eq!(group.amount, dec("15.49"));
        assert_eq!(group.last_date, d("2025-01-15"));
        assert_eq!(group.occurrences, 4);
        assert_eq!(group.expected_month, None);
    }

    #[test]
    fn test_two_monthly_charges_are_not_enough() {
        assert!(analyze(&[("2024-12-15", "9.99"), ("2025-01-15", "9.99")], "2025-01-20").is_none());
    }

    #[test]
    fn test_two_yearly_charges_are_enough() {
        let group = analyze(&[("2023-03-10", "99.00"), ("2024-03-11", "99.00")], "2024-06-01").unwrap();
        assert_eq!(group.billing_cycle, BillingCycle::Yearly);
        assert_eq!(group.expected_month, Some(3));
    }

    #[test]
    fn test_scattered_days_rejected() {
        assert!(analyze(
            &[
                ("2024-10-02", "20.00"),
                ("2024-11-12", "20.00"),
                ("2024-12-22", "20.00"),
                ("2025-01-28", "20.00"),
            ],
            "2025-02-01"
        )
        .is_none());
    }

    #[test]
    fn test_unstable_amounts_rejected() {
        assert!(analyze(
            &[
                ("2024-10-15", "20.00"),
                ("2024-11-15", "20.00"),
                ("2024-12-15", "35.00"),
            ],
            "2025-01-01"
        )
        .is_none());
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Checking", "USD", None).unwrap();
        (db, family, account)
    }

    fn charge(db: &Database, account: i64, name: &str, date: &str, amount: &str) -> NewEntry {
        let mut entry = NewEntry::manual(d(date), dec(amount), "USD", name);
        entry.source = EntrySource::Import;
        db.insert_entry(account, &entry).unwrap();
        entry
    }

    #[test]
    fn test_identify_creates_and_refreshes_patterns() {
        let (db, family, account) = setup();
        let config = CadenceConfig::default();
        for date in ["2024-10-05", "2024-11-05", "2024-12-05"] {
            charge(&db, account, "GITHUB #1234", date, "4.00");
        }
        // Refunds and one-offs never form patterns
        charge(&db, account, "Refund", "2024-11-01", "-4.00");
        charge(&db, account, "Hardware store", "2024-11-20", "80.00");

        let identifier = Identifier::new(&db, &config);
        let results = identifier.identify_patterns(family, d("2024-12-10")).unwrap();
        assert_eq!(results.created, 1);

        let patterns = db
            .list_recurring(family, crate::db::PatternFilter::All)
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].name.as_deref(), Some("GITHUB #1234"));
        assert_eq!(patterns[0].occurrence_count, 3);
        assert_eq!(patterns[0].next_expected_date, d("2025-01-05"));

        charge(&db, account, "GITHUB #1234", "2025-01-06", "4.00");
        let results = identifier.identify_patterns(family, d("2025-01-10")).unwrap();
        assert_eq!(results.created, 0);
        assert_eq!(results.updated, 1);

        let pattern = db.get_recurring(patterns[0].id).unwrap().unwrap();
        assert_eq!(pattern.last_occurrence_date, d("2025-01-06"));
        assert_eq!(pattern.occurrence_count, 4);
        assert_eq!(pattern.next_expected_date, d("2025-02-05"));
    }

    #[test]
    fn test_identify_leaves_manual_patterns_alone() {
        let (db, family, account) = setup();
        let config = CadenceConfig::default();
        for date in ["2024-10-05", "2024-11-05", "2024-12-05"] {
            charge(&db, account, "Gym", date, "30.00");
        }
        let manual = NewRecurringTransaction {
            name: Some("Gym".to_string()),
            amount: dec("25.00"),
            currency: "USD".to_string(),
            expected_day_of_month: 5,
            manual: true,
            last_occurrence_date: d("2024-09-05"),
            occurrence_count: 1,
            ..Default::default()
        };
        let id = db.create_recurring(family, &manual, d("2024-09-05")).unwrap();

        let results = Identifier::new(&db, &config)
            .identify_patterns(family, d("2024-12-10"))
            .unwrap();
        assert_eq!(results.manual_skipped, 1);

        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.amount, dec("25.00"));
        assert_eq!(pattern.last_occurrence_date, d("2024-09-05"));
    }

    #[test]
    fn test_identify_skips_pending_and_generated_entries() {
        let (db, family, account) = setup();
        let config = CadenceConfig::default();
        for (i, date) in ["2024-10-05", "2024-11-05", "2024-12-05"].iter().enumerate() {
            let mut entry = NewEntry::manual(d(date), dec("12.00"), "USD", "Pending Co");
            entry.provider_data = Some(ProviderData::Lunchflow {
                transaction_id: format!("lf_{}", i),
                pending: true,
            });
            db.insert_entry(account, &entry).unwrap();

            let mut generated = NewEntry::manual(d(date), dec("8.00"), "USD", "Generated Co");
            generated.source = EntrySource::Subscription;
            db.insert_entry(account, &generated).unwrap();
        }

        let results = Identifier::new(&db, &config)
            .identify_patterns(family, d("2024-12-10"))
            .unwrap();
        assert_eq!(results.groups_examined, 0);
        assert_eq!(results.created, 0);
    }
}
