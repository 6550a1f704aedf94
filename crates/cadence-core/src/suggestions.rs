//! Suggestion workflow for a family
//!
//! `detect` runs the whole pipeline: identify patterns, prefetch exchange
//! rates, mark subscription suggestions, auto-approve manual ones. The
//! approve/dismiss helpers apply single or bulk lifecycle transitions.

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::config::CadenceConfig;
use crate::db::{Database, PatternFilter};
use crate::detect::SubscriptionDetector;
use crate::error::Result;
use crate::exchange::{ensure_rates, RateSource};
use crate::lifecycle;
use crate::models::{RecurringTransaction, SubscriptionService};
use crate::recurring::Identifier;

/// Outcome of approving suggestions
#[derive(Debug, Clone, Default)]
pub struct Approval {
    pub approved: Vec<RecurringTransaction>,
    /// Services of approved patterns whose icon is not cached yet
    pub services_needing_icons: Vec<SubscriptionService>,
}

pub struct SubscriptionSuggestionService<'a> {
    db: &'a Database,
    config: &'a CadenceConfig,
}

impl<'a> SubscriptionSuggestionService<'a> {
    pub fn new(db: &'a Database, config: &'a CadenceConfig) -> Self {
        Self { db, config }
    }

    /// Run identification and detection, returning how many suggestions are pending
    ///
    /// Without a rate source, base-currency detection only sees rates that are
    /// already cached.
    pub async fn detect(
        &self,
        family_id: i64,
        today: NaiveDate,
        rates: Option<&dyn RateSource>,
    ) -> Result<usize> {
        Identifier::new(self.db, self.config).identify_patterns(family_id, today)?;

        let detector = SubscriptionDetector::new(self.db, self.config);
        if let Some(source) = rates {
            let requests = detector.rate_requests(family_id, today)?;
            let fetched = ensure_rates(self.db, source, &requests).await?;
            if fetched > 0 {
                info!(family_id, fetched, "Cached exchange rates for detection");
            }
        }

        detector.detect_for_family(family_id, today, Utc::now())?;
        detector.auto_approve_for_family(family_id)?;

        self.db.count_recurring(family_id, PatternFilter::Suggested)
    }

    /// Pending suggestions, newest first
    pub fn suggestions(&self, family_id: i64) -> Result<Vec<RecurringTransaction>> {
        self.db.list_recurring(family_id, PatternFilter::Suggested)
    }

    /// Approve one suggestion
    pub fn approve(&self, family_id: i64, id: i64, use_base_currency: bool) -> Result<Approval> {
        let pattern = self.db.get_family_recurring(family_id, id)?;
        let mut approval = Approval::default();
        self.approve_pattern(pattern, use_base_currency, &mut approval)?;
        Ok(approval)
    }

    /// Approve every pending suggestion of a family
    pub fn approve_all(&self, family_id: i64) -> Result<Approval> {
        let mut approval = Approval::default();
        for pattern in self.suggestions(family_id)? {
            self.approve_pattern(pattern, false, &mut approval)?;
        }
        info!(family_id, approved = approval.approved.len(), "Approved all suggestions");
        Ok(approval)
    }

    /// Dismiss one suggestion
    pub fn dismiss(&self, family_id: i64, id: i64) -> Result<RecurringTransaction> {
        let mut pattern = self.db.get_family_recurring(family_id, id)?;
        lifecycle::dismiss(&mut pattern, Utc::now())?;
        self.db.save_recurring(&pattern)?;
        Ok(pattern)
    }

    /// Dismiss every pending suggestion of a family
    pub fn dismiss_all(&self, family_id: i64) -> Result<usize> {
        let now = Utc::now();
        let mut dismissed = 0;
        for mut pattern in self.suggestions(family_id)? {
            lifecycle::dismiss(&mut pattern, now)?;
            self.db.save_recurring(&pattern)?;
            dismissed += 1;
        }
        info!(family_id, dismissed, "Dismissed all suggestions");
        Ok(dismissed)
    }

    fn approve_pattern(
        &self,
        mut pattern: RecurringTransaction,
        use_base_currency: bool,
        approval: &mut Approval,
    ) -> Result<()> {
        lifecycle::approve(&mut pattern, use_base_currency)?;
        self.db.save_recurring(&pattern)?;

        if let Some(service_id) = pattern.subscription_service_id {
            if let Some(service) = self.db.get_service(service_id)? {
                let already_listed = approval
                    .services_needing_icons
                    .iter()
                    .any(|s| s.id == service.id);
                if !service.icon_cached && !already_listed {
                    approval.services_needing_icons.push(service);
                }
            }
        }

        approval.approved.push(pattern);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatesConfig;
    use crate::error::Error;
    use crate::exchange::NbuRateSource;
    use crate::models::{EntrySource, NewEntry, SuggestionStatus};
    use crate::test_utils::MockProviderServer;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup(currency: &str) -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        db.seed_default_services().unwrap();
        let family = db.create_family("Household", currency).unwrap();
        let account = db.upsert_account(family, "Card", currency, None).unwrap();
        (db, family, account)
    }

    fn charge(db: &Database, account: i64, name: &str, date: &str, amount: &str, currency: &str) {
        let mut entry = NewEntry::manual(d(date), dec(amount), currency, name);
        entry.source = EntrySource::Import;
        db.insert_entry(account, &entry).unwrap();
    }

    #[tokio::test]
    async fn test_detect_approve_and_dismiss() {
        let (db, family, account) = setup("USD");
        let config = CadenceConfig::default();
        for date in ["2024-10-08", "2024-11-08", "2024-12-08"] {
            charge(&db, account, "Spotify", date, "9.99", "USD");
            charge(&db, account, "Hulu", date, "7.99", "USD");
            charge(&db, account, "Landlord", date, "1200.00", "USD");
        }

        let service = SubscriptionSuggestionService::new(&db, &config);
        let count = service.detect(family, d("2024-12-15"), None).await.unwrap();
        assert_eq!(count, 2);

        let suggestions = service.suggestions(family).unwrap();
        let spotify = suggestions
            .iter()
            .find(|p| p.display_name() == "Spotify")
            .unwrap();
        let hulu = suggestions.iter().find(|p| p.display_name() == "Hulu").unwrap();

        let approval = service.approve(family, spotify.id, false).unwrap();
        assert!(approval.approved[0].is_subscription);
        assert_eq!(approval.services_needing_icons.len(), 1);
        assert_eq!(approval.services_needing_icons[0].slug, "spotify");

        let dismissed = service.dismiss(family, hulu.id).unwrap();
        assert_eq!(dismissed.suggestion_status, Some(SuggestionStatus::Dismissed));

        // Approving twice is an invalid transition
        assert!(matches!(
            service.approve(family, spotify.id, false),
            Err(Error::InvalidTransition { .. })
        ));

        // Dismissed suggestions never come back
        let count = service.detect(family, d("2024-12-16"), None).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_bulk_actions() {
        let (db, family, account) = setup("USD");
        let config = CadenceConfig::default();
        for date in ["2024-10-03", "2024-11-03", "2024-12-03"] {
            charge(&db, account, "Netflix", date, "15.49", "USD");
            charge(&db, account, "Dropbox", date, "11.99", "USD");
        }

        let service = SubscriptionSuggestionService::new(&db, &config);
        assert_eq!(service.detect(family, d("2024-12-10"), None).await.unwrap(), 2);

        let approval = service.approve_all(family).unwrap();
        assert_eq!(approval.approved.len(), 2);
        assert_eq!(service.dismiss_all(family).unwrap(), 0);
        assert_eq!(
            db.count_recurring(family, PatternFilter::Subscriptions).unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_detect_fetches_rates_for_base_currency() {
        let (db, family, account) = setup("UAH");
        let config = CadenceConfig::default();

        // $9.99 billed in UAH at drifting rates
        let rows = [
            ("2024-10-10", "399.60", "40"),
            ("2024-11-10", "417.58", "41.8"),
            ("2024-12-10", "429.57", "43"),
        ];
        let mut quotes = Vec::new();
        for (date, amount, rate) in rows {
            charge(&db, account, "Netflix", date, amount, "UAH");
            quotes.push(("USD", "UAH", d(date), dec(rate)));
        }
        let server = MockProviderServer::start(&quotes).await;
        let source = NbuRateSource::from_config(&RatesConfig {
            base_url: server.url(),
            nbu_url: server.nbu_url(),
            ..Default::default()
        })
        .unwrap();

        let service = SubscriptionSuggestionService::new(&db, &config);
        assert_eq!(
            service
                .detect(family, d("2024-12-15"), Some(&source))
                .await
                .unwrap(),
            1
        );

        let suggestion = service.suggestions(family).unwrap().remove(0);
        assert_eq!(suggestion.base_currency.as_deref(), Some("USD"));
        assert_eq!(suggestion.base_amount, Some(dec("9.99")));

        let approval = service.approve(family, suggestion.id, true).unwrap();
        assert_eq!(approval.approved[0].currency, "USD");
        assert_eq!(approval.approved[0].amount, dec("9.99"));
    }
}
