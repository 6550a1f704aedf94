//! Database tests

use super::*;
use crate::exchange::ExchangeRateLookup;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Family with one manual USD account
    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let account = db.upsert_account(family, "Checking", "USD", None).unwrap();
        (db, family, account)
    }

    fn new_pattern(name: &str, amount: &str) -> NewRecurringTransaction {
        NewRecurringTransaction {
            name: Some(name.to_string()),
            amount: dec(amount),
            currency: "USD".to_string(),
            expected_day_of_month: 15,
            last_occurrence_date: d("2025-01-15"),
            occurrence_count: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_families().unwrap().is_empty());
    }

    #[test]
    fn test_family_and_account_crud() {
        let (db, family, account) = setup();

        let loaded = db.get_family(family).unwrap().unwrap();
        assert_eq!(loaded.currency, "USD");

        // Upsert same account returns same ID
        let again = db.upsert_account(family, "Checking", "usd", None).unwrap();
        assert_eq!(account, again);

        db.set_account_provider(account, Some(AccountProvider::Plaid))
            .unwrap();
        let loaded = db.get_account(account).unwrap().unwrap();
        assert!(loaded.is_linked());
        assert_eq!(loaded.provider, Some(AccountProvider::Plaid));

        assert!(matches!(
            db.upsert_account(999, "Ghost", "USD", None),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.create_family("Bad", "DOLLARS"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_insert_entry_dedupes_by_import_hash() {
        let (db, _family, account) = setup();

        let mut entry = NewEntry::manual(d("2025-01-15"), dec("15.99"), "USD", "NETFLIX.COM");
        entry.source = EntrySource::Import;
        entry.import_hash = Some("abc123".to_string());

        let first = db.insert_entry(account, &entry).unwrap();
        assert!(matches!(first, EntryInsertResult::Inserted(_)));
        assert_eq!(
            db.insert_entry(account, &entry).unwrap(),
            EntryInsertResult::Duplicate
        );
    }

    #[test]
    fn test_provider_data_round_trip() {
        let (db, family, account) = setup();

        let mut entry = NewEntry::manual(d("2025-01-15"), dec("9.99"), "USD", "Spotify");
        entry.provider_data = Some(ProviderData::Plaid {
            transaction_id: "tx_1".to_string(),
            pending: true,
        });
        let EntryInsertResult::Inserted(id) = db.insert_entry(account, &entry).unwrap() else {
            panic!("expected insert");
        };

        let loaded = db.get_entry(id).unwrap().unwrap();
        assert_eq!(loaded.family_id, family);
        assert!(loaded.is_pending());
        assert_eq!(loaded.source, EntrySource::Manual);
    }

    #[test]
    fn test_find_matching_entries_by_merchant_and_window() {
        let (db, family, account) = setup();
        let merchant = db.get_or_create_merchant(family, "Netflix").unwrap();
        assert_eq!(db.get_or_create_merchant(family, " Netflix ").unwrap(), merchant);

        for (date, currency) in [
            ("2024-11-14", "USD"),
            ("2024-12-17", "USD"),
            ("2025-01-25", "USD"), // outside ±2 days
            ("2025-01-15", "EUR"), // other currency
        ] {
            let mut entry = NewEntry::manual(d(date), dec("15.99"), currency, "NETFLIX");
            entry.merchant_id = Some(merchant);
            db.insert_entry(account, &entry).unwrap();
        }

        let matches = db
            .find_matching_entries(family, Some(merchant), None, "USD", 15, 2, d("2024-08-01"))
            .unwrap();
        let dates: Vec<_> = matches.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![d("2024-12-17"), d("2024-11-14")]);
        assert_eq!(matches[0].merchant_name.as_deref(), Some("Netflix"));

        // No identity, no matches
        assert!(db
            .find_matching_entries(family, None, None, "USD", 15, 2, d("2024-08-01"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_named_pattern_matches_across_reference_numbers() {
        let (db, family, account) = setup();
        for (date, name) in [
            ("2024-11-15", "NETFLIX.COM #10001"),
            ("2024-12-15", "NETFLIX.COM #10002"),
            ("2025-01-14", "Netflix.com 10003"),
        ] {
            db.insert_entry(account, &NewEntry::manual(d(date), dec("15.49"), "USD", name))
                .unwrap();
        }

        let id = db
            .create_recurring(family, &new_pattern("NETFLIX.COM #10003", "15.49"), d("2025-01-20"))
            .unwrap();

        let found = db
            .find_recurring_by_identity(family, None, Some("NETFLIX.COM #10004"), "USD")
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(id));

        let matches = db
            .find_matching_entries(
                family,
                None,
                Some("NETFLIX.COM #10004"),
                "USD",
                15,
                2,
                d("2024-08-01"),
            )
            .unwrap();
        assert_eq!(matches.len(), 3);

        assert!(db
            .find_recurring_by_identity(family, None, Some("Netflix Games"), "USD")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_create_recurring_validates_and_defaults_next_date() {
        let (db, family, _account) = setup();

        let id = db
            .create_recurring(family, &new_pattern("Gym", "30.00"), d("2025-02-20"))
            .unwrap();
        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.next_expected_date, d("2025-03-15"));
        assert_eq!(pattern.status, PatternStatus::Active);
        assert_eq!(pattern.display_name(), "Gym");

        let mut bad = new_pattern("Gym", "30.00");
        bad.expected_day_of_month = 32;
        assert!(matches!(
            db.create_recurring(family, &bad, d("2025-02-20")),
            Err(Error::Validation(_))
        ));

        let mut nameless = new_pattern("  ", "30.00");
        nameless.name = Some("  ".to_string());
        assert!(db.create_recurring(family, &nameless, d("2025-02-20")).is_err());
    }

    #[test]
    fn test_merchant_pattern_drops_free_text_name() {
        let (db, family, _account) = setup();
        let merchant = db.get_or_create_merchant(family, "Spotify").unwrap();

        let mut new = new_pattern("spotify ab", "9.99");
        new.merchant_id = Some(merchant);
        let id = db.create_recurring(family, &new, d("2025-01-20")).unwrap();

        let pattern = db.get_recurring(id).unwrap().unwrap();
        assert_eq!(pattern.name, None);
        assert_eq!(pattern.display_name(), "Spotify");

        let found = db
            .find_recurring_by_identity(family, Some(merchant), None, "USD")
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(id));
    }

    #[test]
    fn test_list_recurring_filters() {
        let (db, family, _account) = setup();
        let today = d("2025-01-20");

        let candidate = db
            .create_recurring(family, &new_pattern("Candidate", "5.00"), today)
            .unwrap();
        let suggested = db
            .create_recurring(family, &new_pattern("Suggested", "6.00"), today)
            .unwrap();
        let dismissed = db
            .create_recurring(family, &new_pattern("Dismissed", "7.00"), today)
            .unwrap();
        let mut sub = new_pattern("Subscription", "8.00");
        sub.is_subscription = true;
        let subscription = db.create_recurring(family, &sub, today).unwrap();

        let mut p = db.get_recurring(suggested).unwrap().unwrap();
        p.suggestion_status = Some(SuggestionStatus::Suggested);
        p.is_subscription = true;
        db.save_recurring(&p).unwrap();

        let mut p = db.get_recurring(dismissed).unwrap().unwrap();
        p.suggestion_status = Some(SuggestionStatus::Dismissed);
        db.save_recurring(&p).unwrap();

        let ids = |filter| -> Vec<i64> {
            db.list_recurring(family, filter)
                .unwrap()
                .iter()
                .map(|p| p.id)
                .collect()
        };
        assert_eq!(ids(PatternFilter::Candidates), vec![candidate]);
        assert_eq!(ids(PatternFilter::Suggested), vec![suggested]);
        assert_eq!(ids(PatternFilter::Dismissed), vec![dismissed]);
        assert_eq!(ids(PatternFilter::Subscriptions), vec![subscription]);
        assert_eq!(db.count_recurring(family, PatternFilter::All).unwrap(), 4);

        db.mark_recurring_inactive(&[subscription]).unwrap();
        assert!(ids(PatternFilter::ActiveSubscriptions).is_empty());
    }

    #[test]
    fn test_get_family_recurring_checks_ownership() {
        let (db, family, _account) = setup();
        let other = db.create_family("Other", "EUR").unwrap();
        let id = db
            .create_recurring(family, &new_pattern("Gym", "30.00"), d("2025-01-20"))
            .unwrap();

        assert!(db.get_family_recurring(family, id).is_ok());
        assert!(matches!(
            db.get_family_recurring(other, id),
            Err(Error::NotFound(_))
        ));
        assert!(db.delete_recurring(other, id).is_err());
        db.delete_recurring(family, id).unwrap();
        assert!(db.get_recurring(id).unwrap().is_none());
    }

    #[test]
    fn test_due_subscriptions_skip_linked_accounts() {
        let (db, family, manual_account) = setup();
        let linked = db
            .upsert_account(family, "Card", "USD", Some(AccountProvider::SimpleFin))
            .unwrap();

        let mut on_manual = new_pattern("Manual", "10.00");
        on_manual.is_subscription = true;
        on_manual.default_account_id = Some(manual_account);
        on_manual.next_expected_date = Some(d("2025-02-15"));
        let due = db.create_recurring(family, &on_manual, d("2025-02-20")).unwrap();

        let mut on_linked = on_manual.clone();
        on_linked.name = Some("Linked".to_string());
        on_linked.default_account_id = Some(linked);
        db.create_recurring(family, &on_linked, d("2025-02-20")).unwrap();

        let mut no_account = on_manual.clone();
        no_account.name = Some("Nowhere".to_string());
        no_account.default_account_id = None;
        db.create_recurring(family, &no_account, d("2025-02-20")).unwrap();

        let mut future = on_manual.clone();
        future.name = Some("Later".to_string());
        future.next_expected_date = Some(d("2025-03-15"));
        db.create_recurring(family, &future, d("2025-02-20")).unwrap();

        let found: Vec<_> = db
            .due_subscriptions(family, d("2025-02-20"))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(found, vec![due]);
    }

    #[test]
    fn test_insert_generated_entry_is_atomic() {
        let (db, family, account) = setup();
        let id = db
            .create_recurring(family, &new_pattern("Gym", "30.00"), d("2025-01-20"))
            .unwrap();

        let mut pattern = db.get_recurring(id).unwrap().unwrap();
        pattern.next_expected_date = d("2025-03-15");
        let mut entry = NewEntry::manual(d("2025-02-15"), dec("30.00"), "USD", "Gym");
        entry.recurring_transaction_id = Some(id);
        entry.source = EntrySource::Subscription;

        db.insert_generated_entry(account, &entry, &pattern).unwrap();
        assert_eq!(
            db.get_recurring(id).unwrap().unwrap().next_expected_date,
            d("2025-03-15")
        );
        assert!(db
            .entry_exists_for_period(id, account, d("2025-02-01"), d("2025-02-28"))
            .unwrap());

        // A failed pattern save rolls back the entry
        let mut missing = pattern.clone();
        missing.id = 9999;
        entry.date = d("2025-03-15");
        assert!(db.insert_generated_entry(account, &entry, &missing).is_err());
        assert_eq!(db.list_entries_for_recurring(id).unwrap().len(), 1);
    }

    #[test]
    fn test_seed_services_is_idempotent() {
        let db = Database::in_memory().unwrap();

        let seeded = db.seed_default_services().unwrap();
        assert!(seeded > 40);
        assert_eq!(db.seed_default_services().unwrap(), 0);

        let netflix = db.get_service_by_slug("netflix").unwrap().unwrap();
        assert_eq!(netflix.domain, "netflix.com");
        assert_eq!(netflix.category, Some(ServiceCategory::Streaming));
        assert_eq!(netflix.color, crate::palette::color_for("netflix"));
        assert!(!netflix.icon_cached);

        let music = db.list_services(Some(ServiceCategory::Music)).unwrap();
        assert!(music.iter().any(|s| s.slug == "spotify"));
        assert!(music.iter().all(|s| s.category == Some(ServiceCategory::Music)));

        let found = db.search_services("SPOT").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_insert_service_and_icon_cache() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_service(&NewSubscriptionService {
                name: "Acme Cloud".to_string(),
                slug: "acme-cloud".to_string(),
                domain: "acme.example".to_string(),
                category: Some(ServiceCategory::Cloud),
                color: Some("#123456".to_string()),
            })
            .unwrap();

        assert!(db.get_service_icon(id).unwrap().is_none());
        db.store_service_icon(id, b"png-bytes", "image/png").unwrap();

        let service = db.get_service(id).unwrap().unwrap();
        assert!(service.icon_cached);
        assert_eq!(service.color, "#123456");
        let (bytes, content_type) = db.get_service_icon(id).unwrap().unwrap();
        assert_eq!(bytes, b"png-bytes".to_vec());
        assert_eq!(content_type, "image/png");

        assert!(matches!(
            db.store_service_icon(999, b"x", "image/png"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_exchange_rate_cache_and_inverse() {
        let db = Database::in_memory().unwrap();
        let date = d("2025-01-15");

        db.upsert_exchange_rate("usd", "uah", date, dec("40")).unwrap();
        db.upsert_exchange_rate("USD", "UAH", date, dec("41")).unwrap();

        assert_eq!(db.get_exchange_rate("USD", "UAH", date).unwrap(), Some(dec("41")));
        assert_eq!(db.rate("USD", "UAH", date), Some(dec("41")));
        assert_eq!(
            db.rate("UAH", "USD", date).map(|r| r.round_dp(6)),
            Some((Decimal::ONE / dec("41")).round_dp(6))
        );
        assert_eq!(db.rate("USD", "UAH", d("2025-01-16")), None);
        assert_eq!(db.rate("EUR", "eur", date), Some(Decimal::ONE));

        assert!(db.upsert_exchange_rate("USD", "UAH", date, Decimal::ZERO).is_err());
    }
}
