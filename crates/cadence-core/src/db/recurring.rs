//! Recurring pattern persistence

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::entries::insert_entry_on;
use super::{
    date_col, decimal_col, format_datetime, opt_datetime_col, opt_decimal_col, parse_datetime,
    Database,
};
use crate::error::{Error, Result};
use crate::models::{
    BillingCycle, NewEntry, NewRecurringTransaction, PatternStatus, RecurringTransaction,
    SuggestionStatus,
};
use crate::recurring::identifier::match_key;
use crate::recurring::schedule::next_expected_date_from_today;

/// Which recurring patterns to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFilter {
    All,
    /// Waiting for the user to approve or dismiss
    Suggested,
    Dismissed,
    /// Confirmed subscriptions, active or not
    Subscriptions,
    ActiveSubscriptions,
    /// Neither a subscription nor part of the suggestion flow
    Candidates,
}

impl PatternFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            Self::All => "",
            Self::Suggested => " AND r.suggestion_status = 'suggested'",
            Self::Dismissed => " AND r.suggestion_status = 'dismissed'",
            Self::Subscriptions => " AND r.is_subscription = 1 AND r.suggestion_status IS NULL",
            Self::ActiveSubscriptions => {
                " AND r.is_subscription = 1 AND r.suggestion_status IS NULL AND r.status = 'active'"
            }
            Self::Candidates => " AND r.is_subscription = 0 AND r.suggestion_status IS NULL",
        }
    }
}

const RECURRING_SELECT: &str = r#"
    SELECT r.id, r.family_id, r.merchant_id, m.name, r.name, r.amount, r.currency,
           r.expected_day_of_month, r.expected_month, r.billing_cycle, r.status,
           r.is_subscription, r.manual, r.suggestion_status, r.suggested_at, r.dismissed_at,
           r.last_occurrence_date, r.next_expected_date, r.occurrence_count,
           r.expected_amount_min, r.expected_amount_max, r.expected_amount_avg,
           r.base_currency, r.base_amount, r.default_account_id, r.subscription_service_id,
           r.created_at
    FROM recurring_transactions r
    LEFT JOIN merchants m ON m.id = r.merchant_id
"#;

fn row_to_recurring(row: &Row) -> rusqlite::Result<RecurringTransaction> {
    let billing_cycle: String = row.get(9)?;
    let status: String = row.get(10)?;
    let suggestion_status: Option<String> = row.get(13)?;
    let created_at: String = row.get(26)?;

    Ok(RecurringTransaction {
        id: row.get(0)?,
        family_id: row.get(1)?,
        merchant_id: row.get(2)?,
        merchant_name: row.get(3)?,
        name: row.get(4)?,
        amount: decimal_col(row, 5)?,
        currency: row.get(6)?,
        expected_day_of_month: row.get(7)?,
        expected_month: row.get(8)?,
        billing_cycle: BillingCycle::parse(&billing_cycle).unwrap_or_default(),
        status: PatternStatus::parse(&status),
        is_subscription: row.get(11)?,
        manual: row.get(12)?,
        suggestion_status: suggestion_status.as_deref().and_then(SuggestionStatus::parse),
        suggested_at: opt_datetime_col(row, 14)?,
        dismissed_at: opt_datetime_col(row, 15)?,
        last_occurrence_date: date_col(row, 16)?,
        next_expected_date: date_col(row, 17)?,
        occurrence_count: row.get(18)?,
        expected_amount_min: opt_decimal_col(row, 19)?,
        expected_amount_max: opt_decimal_col(row, 20)?,
        expected_amount_avg: opt_decimal_col(row, 21)?,
        base_currency: row.get(22)?,
        base_amount: opt_decimal_col(row, 23)?,
        default_account_id: row.get(24)?,
        subscription_service_id: row.get(25)?,
        created_at: parse_datetime(&created_at),
    })
}

/// Match key stored for a pattern; merchant patterns are found by merchant
fn pattern_key(merchant_id: Option<i64>, name: Option<&str>) -> Option<String> {
    match merchant_id {
        Some(_) => None,
        None => name.map(match_key),
    }
}

/// Write every mutable column of a pattern
fn save_recurring_on(conn: &Connection, p: &RecurringTransaction) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE recurring_transactions SET
            merchant_id = ?, name = ?, match_key = ?, amount = ?, currency = ?,
            expected_day_of_month = ?, expected_month = ?, billing_cycle = ?, status = ?,
            is_subscription = ?, manual = ?, suggestion_status = ?, suggested_at = ?,
            dismissed_at = ?, last_occurrence_date = ?, next_expected_date = ?,
            occurrence_count = ?, expected_amount_min = ?, expected_amount_max = ?,
            expected_amount_avg = ?, base_currency = ?, base_amount = ?,
            default_account_id = ?, subscription_service_id = ?
        WHERE id = ?
        "#,
        params![
            p.merchant_id,
            p.name,
            pattern_key(p.merchant_id, p.name.as_deref()),
            p.amount.to_string(),
            p.currency,
            p.expected_day_of_month,
            p.expected_month,
            p.billing_cycle.as_str(),
            p.status.as_str(),
            p.is_subscription,
            p.manual,
            p.suggestion_status.map(|s| s.as_str()),
            p.suggested_at.as_ref().map(format_datetime),
            p.dismissed_at.as_ref().map(format_datetime),
            p.last_occurrence_date.to_string(),
            p.next_expected_date.to_string(),
            p.occurrence_count,
            p.expected_amount_min.map(|d| d.to_string()),
            p.expected_amount_max.map(|d| d.to_string()),
            p.expected_amount_avg.map(|d| d.to_string()),
            p.base_currency,
            p.base_amount.map(|d| d.to_string()),
            p.default_account_id,
            p.subscription_service_id,
            p.id,
        ],
    )?;

    if updated == 0 {
        return Err(Error::NotFound(format!("recurring transaction {}", p.id)));
    }
    Ok(())
}

impl Database {
    /// Create a recurring pattern
    ///
    /// `next_expected_date` defaults to the first expected day after `today`.
    pub fn create_recurring(
        &self,
        family_id: i64,
        new: &NewRecurringTransaction,
        today: NaiveDate,
    ) -> Result<i64> {
        new.validate()?;

        let next_expected = new.next_expected_date.unwrap_or_else(|| {
            next_expected_date_from_today(
                new.expected_day_of_month,
                new.billing_cycle,
                new.expected_month,
                today,
            )
        });
        // A merchant identifies the pattern; the free-text name is only a fallback
        let name = if new.merchant_id.is_some() {
            None
        } else {
            new.name.as_deref().map(str::trim)
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO recurring_transactions (
                family_id, merchant_id, name, match_key, amount, currency, expected_day_of_month,
                expected_month, billing_cycle, status, is_subscription, manual,
                last_occurrence_date, next_expected_date, occurrence_count,
                expected_amount_min, expected_amount_max, expected_amount_avg,
                default_account_id, subscription_service_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                family_id,
                new.merchant_id,
                name,
                pattern_key(new.merchant_id, name),
                new.amount.to_string(),
                new.currency.trim().to_uppercase(),
                new.expected_day_of_month,
                new.expected_month,
                new.billing_cycle.as_str(),
                new.is_subscription,
                new.manual,
                new.last_occurrence_date.to_string(),
                next_expected.to_string(),
                new.occurrence_count,
                new.expected_amount_min.map(|d| d.to_string()),
                new.expected_amount_max.map(|d| d.to_string()),
                new.expected_amount_avg.map(|d| d.to_string()),
                new.default_account_id,
                new.subscription_service_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_recurring(&self, id: i64) -> Result<Option<RecurringTransaction>> {
        let conn = self.conn()?;
        let pattern = conn
            .query_row(
                &format!("{} WHERE r.id = ?", RECURRING_SELECT),
                params![id],
                row_to_recurring,
            )
            .optional()?;
        Ok(pattern)
    }

    /// Get a pattern that must belong to `family_id`
    pub fn get_family_recurring(&self, family_id: i64, id: i64) -> Result<RecurringTransaction> {
        self.get_recurring(id)?
            .filter(|p| p.family_id == family_id)
            .ok_or_else(|| Error::NotFound(format!("recurring transaction {}", id)))
    }

    /// List a family's patterns, newest first
    pub fn list_recurring(
        &self,
        family_id: i64,
        filter: PatternFilter,
    ) -> Result<Vec<RecurringTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE r.family_id = ?{} ORDER BY r.created_at DESC, r.id DESC",
            RECURRING_SELECT,
            filter.where_clause()
        ))?;

        let patterns = stmt
            .query_map(params![family_id], row_to_recurring)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }

    pub fn count_recurring(&self, family_id: i64, filter: PatternFilter) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM recurring_transactions r WHERE r.family_id = ?{}",
                filter.where_clause()
            ),
            params![family_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Find the pattern with the same identity (merchant or name match key, plus currency)
    pub fn find_recurring_by_identity(
        &self,
        family_id: i64,
        merchant_id: Option<i64>,
        name: Option<&str>,
        currency: &str,
    ) -> Result<Option<RecurringTransaction>> {
        let conn = self.conn()?;
        let pattern = match (merchant_id, name) {
            (Some(merchant_id), _) => conn
                .query_row(
                    &format!(
                        "{} WHERE r.family_id = ? AND r.merchant_id = ? AND r.currency = ? ORDER BY r.id LIMIT 1",
                        RECURRING_SELECT
                    ),
                    params![family_id, merchant_id, currency],
                    row_to_recurring,
                )
                .optional()?,
            (None, Some(name)) => conn
                .query_row(
                    &format!(
                        "{} WHERE r.family_id = ? AND r.merchant_id IS NULL AND r.match_key = ? AND r.currency = ? ORDER BY r.id LIMIT 1",
                        RECURRING_SELECT
                    ),
                    params![family_id, match_key(name), currency],
                    row_to_recurring,
                )
                .optional()?,
            (None, None) => None,
        };
        Ok(pattern)
    }

    /// Persist all changes made to a pattern
    pub fn save_recurring(&self, pattern: &RecurringTransaction) -> Result<()> {
        let conn = self.conn()?;
        save_recurring_on(&conn, pattern)
    }

    pub fn delete_recurring(&self, family_id: i64, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM recurring_transactions WHERE id = ? AND family_id = ?",
            params![id, family_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("recurring transaction {}", id)));
        }
        Ok(())
    }

    /// Active subscriptions due on or before `today` that may auto-generate
    ///
    /// Only patterns with a default account that is not linked to a provider.
    pub fn due_subscriptions(
        &self,
        family_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<RecurringTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"{}
               JOIN accounts da ON da.id = r.default_account_id
               WHERE r.family_id = ?{}
                 AND da.provider IS NULL
                 AND r.next_expected_date <= ?
               ORDER BY r.next_expected_date, r.id"#,
            RECURRING_SELECT,
            PatternFilter::ActiveSubscriptions.where_clause()
        ))?;

        let patterns = stmt
            .query_map(params![family_id, today.to_string()], row_to_recurring)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }

    /// Insert a generated entry and save the advanced pattern atomically
    pub fn insert_generated_entry(
        &self,
        account_id: i64,
        entry: &NewEntry,
        advanced: &RecurringTransaction,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let entry_id = insert_entry_on(&tx, account_id, entry)?;
        save_recurring_on(&tx, advanced)?;

        tx.commit()?;
        Ok(entry_id)
    }

    /// Mark patterns inactive without touching anything else
    pub fn mark_recurring_inactive(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE recurring_transactions SET status = 'inactive' WHERE id = ?")?;
            for id in ids {
                updated += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }
}
