//! Subscription detection
//!
//! Turns recurring patterns into subscription suggestions:
//! - `service_matcher` - Match a pattern name against the service catalog
//! - `duplicates` - Skip patterns already covered by a confirmed subscription
//! - `billing_cycle` - Monthly or yearly, from charge dates
//! - `base_currency` - Reference-currency price behind converted charges

pub mod base_currency;
pub mod billing_cycle;
pub mod duplicates;
pub mod service_matcher;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use tracing::{debug, info};

use crate::config::CadenceConfig;
use crate::db::{Database, PatternFilter};
use crate::error::Result;
use crate::exchange::RateRequest;
use crate::lifecycle::{self, SuggestionDetails};
use crate::models::{BillingCycle, Entry, PatternStatus, RecurringTransaction};

/// Results of a detection pass over one family
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetectionResults {
    /// Candidates looked at
    pub candidates: usize,
    pub suggested: usize,
    /// No catalog service matched
    pub unmatched: usize,
    /// Already covered by a confirmed subscription
    pub duplicates_skipped: usize,
}

/// A candidate that passed the catalog and duplicate checks
struct Screened {
    pattern: RecurringTransaction,
    service_id: i64,
    history: Vec<Entry>,
}

/// Marks catalog-matching candidates of a family as suggestions
pub struct SubscriptionDetector<'a> {
    db: &'a Database,
    config: &'a CadenceConfig,
}

impl<'a> SubscriptionDetector<'a> {
    pub fn new(db: &'a Database, config: &'a CadenceConfig) -> Self {
        Self { db, config }
    }

    /// Run detection for one family
    ///
    /// Only candidates are considered: dismissed, suggested and confirmed
    /// patterns are left alone.
    pub fn detect_for_family(
        &self,
        family_id: i64,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DetectionResults> {
        let mut results = DetectionResults::default();

        for screened in self.screen(family_id, today, &mut results)? {
            let Screened {
                mut pattern,
                service_id,
                history,
            } = screened;

            let dates: Vec<NaiveDate> = history.iter().map(|e| e.date).collect();
            let cycle = billing_cycle::classify(
                &dates,
                Some(pattern.amount),
                today,
                &self.config.billing_cycle,
            );
            let base_price = base_currency::detect(
                &history,
                &pattern.currency,
                self.db,
                &self.config.base_currency,
            );

            let cycle_changed = cycle != pattern.billing_cycle;
            lifecycle::suggest(
                &mut pattern,
                SuggestionDetails {
                    subscription_service_id: Some(service_id),
                    billing_cycle: cycle,
                    base_price,
                },
                now,
            )?;

            if cycle_changed {
                pattern.expected_month = match cycle {
                    BillingCycle::Yearly => Some(pattern.last_occurrence_date.month()),
                    BillingCycle::Monthly => None,
                };
                pattern.reschedule(today);
            }

            self.db.save_recurring(&pattern)?;
            results.suggested += 1;
            debug!(
                family_id,
                pattern_id = pattern.id,
                service_id,
                cycle = cycle.as_str(),
                "Suggested subscription {}",
                pattern.display_name()
            );
        }

        info!(
            family_id,
            candidates = results.candidates,
            suggested = results.suggested,
            "Subscription detection complete"
        );
        Ok(results)
    }

    /// Approve suggestions on patterns the user declared by hand
    pub fn auto_approve_for_family(&self, family_id: i64) -> Result<usize> {
        let mut approved = 0;
        for mut pattern in self.db.list_recurring(family_id, PatternFilter::Suggested)? {
            if !pattern.manual {
                continue;
            }
            lifecycle::approve(&mut pattern, false)?;
            self.db.save_recurring(&pattern)?;
            approved += 1;
        }

        if approved > 0 {
            info!(family_id, approved, "Auto-approved manual subscriptions");
        }
        Ok(approved)
    }

    /// Rates base-currency detection will look up for this family
    ///
    /// Run before `detect_for_family` so the cache can be filled over the
    /// network while detection itself stays synchronous.
    pub fn rate_requests(&self, family_id: i64, today: NaiveDate) -> Result<Vec<RateRequest>> {
        let mut requests = Vec::new();
        let mut scratch = DetectionResults::default();

        for screened in self.screen(family_id, today, &mut scratch)? {
            let reference = base_currency::reference_currency(&screened.pattern.currency);
            for entry in &screened.history {
                let request = RateRequest {
                    from: reference.to_string(),
                    to: entry.currency.clone(),
                    date: entry.date,
                };
                if !requests.contains(&request) {
                    requests.push(request);
                }
            }
        }
        Ok(requests)
    }

    /// Active candidates that match the catalog and are not duplicates
    fn screen(
        &self,
        family_id: i64,
        today: NaiveDate,
        results: &mut DetectionResults,
    ) -> Result<Vec<Screened>> {
        let catalog = self.db.list_services(None)?;
        let confirmed = self.db.list_recurring(family_id, PatternFilter::Subscriptions)?;
        let candidates = self.db.list_recurring(family_id, PatternFilter::Candidates)?;

        let mut screened = Vec::new();
        for pattern in candidates {
            if pattern.status != PatternStatus::Active {
                continue;
            }
            results.candidates += 1;

            let Some(service) = service_matcher::find_service(pattern.display_name(), &catalog)
            else {
                results.unmatched += 1;
                continue;
            };

            if duplicates::is_duplicate(&pattern, &confirmed) {
                debug!(
                    family_id,
                    pattern_id = pattern.id,
                    "Skipping {}: already a subscription",
                    pattern.display_name()
                );
                results.duplicates_skipped += 1;
                continue;
            }

            let history = self.history(&pattern, today)?;
            screened.push(Screened {
                service_id: service.id,
                pattern,
                history,
            });
        }
        Ok(screened)
    }

    /// Charges of a pattern within the detection lookback
    fn history(&self, pattern: &RecurringTransaction, today: NaiveDate) -> Result<Vec<Entry>> {
        let since = today
            .checked_sub_months(Months::new(self.config.lifecycle.detection_lookback_months))
            .unwrap_or(NaiveDate::MIN);

        let entries = self.db.find_matching_entries(
            pattern.family_id,
            pattern.merchant_id,
            pattern.name.as_deref(),
            &pattern.currency,
            pattern.expected_day_of_month,
            self.config.identification.day_window,
            since,
        )?;
        Ok(entries.into_iter().filter(|e| !e.is_pending()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEntry, NewRecurringTransaction, SuggestionStatus};
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> rust_decimal::Decimal {
        rust_decimal::Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        db: Database,
        family: i64,
        account: i64,
    }

    fn setup() -> Fixture {
        let db = Database::in_memory().unwrap();
        db.seed_default_services().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Checking", "USD", None).unwrap();
        Fixture {
            db,
            family,
            account,
        }
    }

    impl Fixture {
        fn charge(&self, name: &str, date: &str, amount: &str) {
            let entry = NewEntry::manual(d(date), dec(amount), "USD", name);
            self.db.insert_entry(self.account, &entry).unwrap();
        }

        fn pattern(&self, name: &str, amount: &str, last: &str) -> i64 {
            let new = NewRecurringTransaction {
                name: Some(name.to_string()),
                amount: dec(amount),
                currency: "USD".to_string(),
                expected_day_of_month: d(last).day(),
                last_occurrence_date: d(last),
                occurrence_count: 3,
                ..Default::default()
            };
            self.db.create_recurring(self.family, &new, d(last)).unwrap()
        }
    }

    #[test]
    fn test_detect_suggests_catalog_matches() {
        let f = setup();
        let config = CadenceConfig::default();
        for date in ["2024-11-15", "2024-12-15", "2025-01-15"] {
            f.charge("Netflix", date, "15.49");
        }
        let netflix = f.pattern("Netflix", "15.49", "2025-01-15");
        let corner_shop = f.pattern("Corner Shop", "12.00", "2025-01-10");

        let detector = SubscriptionDetector::new(&f.db, &config);
        let results = detector
            .detect_for_family(f.family, d("2025-01-20"), Utc::now())
            .unwrap();

        assert_eq!(results.candidates, 2);
        assert_eq!(results.suggested, 1);
        assert_eq!(results.unmatched, 1);

        let pattern = f.db.get_recurring(netflix).unwrap().unwrap();
        assert_eq!(pattern.suggestion_status, Some(SuggestionStatus::Suggested));
        assert!(pattern.suggested_at.is_some());
        assert_eq!(pattern.billing_cycle, BillingCycle::Monthly);
        let service = f.db.get_service_by_slug("netflix").unwrap().unwrap();
        assert_eq!(pattern.subscription_service_id, Some(service.id));
        // Stable amounts, so no hidden conversion
        assert_eq!(pattern.base_currency, None);

        let untouched = f.db.get_recurring(corner_shop).unwrap().unwrap();
        assert_eq!(untouched.suggestion_status, None);
    }

    #[test]
    fn test_detect_classifies_yearly_and_reschedules() {
        let f = setup();
        let config = CadenceConfig::default();
        f.charge("Dropbox", "2023-03-10", "119.88");
        f.charge("Dropbox", "2024-03-10", "119.88");
        let id = f.pattern("Dropbox", "119.88", "2024-03-10");

        SubscriptionDetector::new(&f.db, &config)
            .detect_for_family(f.family, d("2024-06-01"), Utc::now())
            .unwrap();

        let pattern = f.db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.billing_cycle, BillingCycle::Yearly);
        assert_eq!(pattern.expected_month, Some(3));
        assert_eq!(pattern.next_expected_date, d("2025-03-10"));
    }

    #[test]
    fn test_detect_skips_duplicates_and_dismissed() {
        let f = setup();
        let config = CadenceConfig::default();

        let confirmed = f.pattern("Spotify", "9.99", "2025-01-05");
        let mut sub = f.db.get_recurring(confirmed).unwrap().unwrap();
        sub.is_subscription = true;
        f.db.save_recurring(&sub).unwrap();

        f.pattern("Spotify Family", "16.99", "2025-01-07");

        let dismissed = f.pattern("Hulu", "7.99", "2025-01-09");
        let mut hulu = f.db.get_recurring(dismissed).unwrap().unwrap();
        hulu.suggestion_status = Some(SuggestionStatus::Dismissed);
        f.db.save_recurring(&hulu).unwrap();

        let results = SubscriptionDetector::new(&f.db, &config)
            .detect_for_family(f.family, d("2025-01-20"), Utc::now())
            .unwrap();

        assert_eq!(results.candidates, 1);
        assert_eq!(results.duplicates_skipped, 1);
        assert_eq!(results.suggested, 0);
        assert_eq!(
            f.db.get_recurring(dismissed).unwrap().unwrap().suggestion_status,
            Some(SuggestionStatus::Dismissed)
        );
    }

    #[test]
    fn test_auto_approve_only_manual() {
        let f = setup();
        let config = CadenceConfig::default();

        let manual = f.pattern("Notion", "10.00", "2025-01-03");
        let mut p = f.db.get_recurring(manual).unwrap().unwrap();
        p.manual = true;
        f.db.save_recurring(&p).unwrap();
        let automatic = f.pattern("Figma", "15.00", "2025-01-04");

        let detector = SubscriptionDetector::new(&f.db, &config);
        detector
            .detect_for_family(f.family, d("2025-01-20"), Utc::now())
            .unwrap();
        assert_eq!(detector.auto_approve_for_family(f.family).unwrap(), 1);

        let manual = f.db.get_recurring(manual).unwrap().unwrap();
        assert!(manual.is_subscription);
        assert_eq!(manual.suggestion_status, None);

        let automatic = f.db.get_recurring(automatic).unwrap().unwrap();
        assert_eq!(automatic.suggestion_status, Some(SuggestionStatus::Suggested));
    }

    #[test]
    fn test_rate_requests_cover_history() {
        let f = setup();
        let config = CadenceConfig::default();
        for date in ["2024-12-15", "2025-01-15"] {
            f.charge("Netflix", date, "15.49");
        }
        f.pattern("Netflix", "15.49", "2025-01-15");

        let requests = SubscriptionDetector::new(&f.db, &config)
            .rate_requests(f.family, d("2025-01-20"))
            .unwrap();

        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.from == "UAH" && r.to == "USD"));
    }
}
