//! Deactivate patterns that stopped charging

use chrono::NaiveDate;
use tracing::info;

use crate::config::IdentificationConfig;
use crate::db::{Database, PatternFilter};
use crate::error::Result;
use crate::models::PatternStatus;

pub struct Cleaner<'a> {
    db: &'a Database,
    config: &'a IdentificationConfig,
}

impl<'a> Cleaner<'a> {
    pub fn new(db: &'a Database, config: &'a IdentificationConfig) -> Self {
        Self { db, config }
    }

    /// Mark active patterns with no recent occurrence inactive
    ///
    /// Returns how many patterns were deactivated.
    pub fn cleanup_stale(&self, family_id: i64, today: NaiveDate) -> Result<usize> {
        let stale: Vec<i64> = self
            .db
            .list_recurring(family_id, PatternFilter::All)?
            .into_iter()
            .filter(|p| p.status == PatternStatus::Active && p.should_be_inactive(today, self.config))
            .map(|p| p.id)
            .collect();

        let updated = self.db.mark_recurring_inactive(&stale)?;
        if updated > 0 {
            info!(family_id, deactivated = updated, "Deactivated stale patterns");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRecurringTransaction;
    use rust_decimal::Decimal;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_cleanup_uses_longer_window_for_manual() {
        let db = Database::in_memory().unwrap();
        let family = db.create_family("Household", "USD").unwrap();
        let config = IdentificationConfig::default();

        let pattern = |name: &str, last: &str, manual: bool| NewRecurringTransaction {
            name: Some(name.to_string()),
            amount: Decimal::from(10),
            currency: "USD".to_string(),
            expected_day_of_month: 1,
            manual,
            last_occurrence_date: d(last),
            ..Default::default()
        };

        let today = d("2025-06-15");
        let stale_auto = db
            .create_recurring(family, &pattern("Old auto", "2025-03-01", false), today)
            .unwrap();
        let fresh_auto = db
            .create_recurring(family, &pattern("New auto", "2025-05-01", false), today)
            .unwrap();
        let recent_manual = db
            .create_recurring(family, &pattern("Manual", "2025-03-01", true), today)
            .unwrap();
        let stale_manual = db
            .create_recurring(family, &pattern("Old manual", "2024-11-01", true), today)
            .unwrap();

        let cleaner = Cleaner::new(&db, &config);
        assert_eq!(cleaner.cleanup_stale(family, today).unwrap(), 2);
        // Already inactive patterns are not counted again
        assert_eq!(cleaner.cleanup_stale(family, today).unwrap(), 0);

        let status = |id| db.get_recurring(id).unwrap().unwrap().status;
        assert_eq!(status(stale_auto), PatternStatus::Inactive);
        assert_eq!(status(fresh_auto), PatternStatus::Active);
        assert_eq!(status(recent_manual), PatternStatus::Active);
        assert_eq!(status(stale_manual), PatternStatus::Inactive);
    }
}
