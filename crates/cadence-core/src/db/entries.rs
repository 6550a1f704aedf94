//! Ledger entry and merchant operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{conversion_error, date_col, decimal_col, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Entry, EntrySource, NewEntry, ProviderData};
use crate::recurring::identifier::match_key;

/// Result of inserting an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryInsertResult {
    Inserted(i64),
    /// An entry with the same import hash already exists
    Duplicate,
}

const ENTRY_SELECT: &str = r#"
    SELECT e.id, e.account_id, a.family_id, e.date, e.amount, e.currency, e.name,
           e.merchant_id, m.name, e.recurring_transaction_id, e.source, e.provider_data,
           e.created_at
    FROM entries e
    JOIN accounts a ON a.id = e.account_id
    LEFT JOIN merchants m ON m.id = e.merchant_id
"#;

fn row_to_entry(row: &Row) -> rusqlite::Result<Entry> {
    let source: String = row.get(10)?;
    let provider_data: Option<String> = row.get(11)?;
    let created_at: String = row.get(12)?;

    let provider_data = provider_data
        .map(|json| serde_json::from_str::<ProviderData>(&json).map_err(|e| conversion_error(11, e)))
        .transpose()?;

    Ok(Entry {
        id: row.get(0)?,
        account_id: row.get(1)?,
        family_id: row.get(2)?,
        date: date_col(row, 3)?,
        amount: decimal_col(row, 4)?,
        currency: row.get(5)?,
        name: row.get(6)?,
        merchant_id: row.get(7)?,
        merchant_name: row.get(8)?,
        recurring_transaction_id: row.get(9)?,
        source: EntrySource::parse(&source),
        provider_data,
        created_at: parse_datetime(&created_at),
    })
}

/// Insert an entry on an existing connection (used inside transactions)
pub(crate) fn insert_entry_on(conn: &Connection, account_id: i64, entry: &NewEntry) -> Result<i64> {
    let provider_data = entry
        .provider_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        r#"
        INSERT INTO entries (account_id, date, amount, currency, name, match_key, merchant_id,
                             recurring_transaction_id, source, provider_data, import_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            account_id,
            entry.date.to_string(),
            entry.amount.to_string(),
            entry.currency,
            entry.name,
            match_key(&entry.name),
            entry.merchant_id,
            entry.recurring_transaction_id,
            entry.source.as_str(),
            provider_data,
            entry.import_hash,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Find or create a merchant by name within a family
    pub fn get_or_create_merchant(&self, family_id: i64, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("merchant name cannot be empty".to_string()));
        }

        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM merchants WHERE family_id = ? AND name = ?",
                params![family_id, name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO merchants (family_id, name) VALUES (?, ?)",
            params![family_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an entry, skipping it when its import hash is already known
    pub fn insert_entry(&self, account_id: i64, entry: &NewEntry) -> Result<EntryInsertResult> {
        let conn = self.conn()?;

        if let Some(hash) = &entry.import_hash {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM entries WHERE import_hash = ?)",
                params![hash],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(EntryInsertResult::Duplicate);
            }
        }

        let id = insert_entry_on(&conn, account_id, entry)?;
        Ok(EntryInsertResult::Inserted(id))
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<Entry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("{} WHERE e.id = ?", ENTRY_SELECT),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// All entries of a family on or after `since`, oldest first
    pub fn list_entries(&self, family_id: i64, since: Option<NaiveDate>) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        let since = since.map(|d| d.to_string()).unwrap_or_default();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE a.family_id = ? AND e.date >= ? ORDER BY e.date, e.id",
            ENTRY_SELECT
        ))?;

        let entries = stmt
            .query_map(params![family_id, since], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries generated for (or linked to) a recurring pattern, newest first
    pub fn list_entries_for_recurring(&self, recurring_id: i64) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE e.recurring_transaction_id = ? ORDER BY e.date DESC, e.id DESC",
            ENTRY_SELECT
        ))?;

        let entries = stmt
            .query_map(params![recurring_id], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries that look like occurrences of a pattern
    ///
    /// Matches by merchant when one is given, otherwise by the name's match key, in
    /// the same currency, on or after `since`, within ±`day_window` days of the
    /// expected day of month (clamped to 1..=31). Newest first.
    #[allow(clippy::too_many_arguments)]
    pub fn find_matching_entries(
        &self,
        family_id: i64,
        merchant_id: Option<i64>,
        name: Option<&str>,
        currency: &str,
        expected_day: u32,
        day_window: u32,
        since: NaiveDate,
    ) -> Result<Vec<Entry>> {
        let low = expected_day.saturating_sub(day_window).max(1);
        let high = (expected_day + day_window).min(31);

        let identity_clause = if merchant_id.is_some() {
            "e.merchant_id = ?"
        } else {
            "e.match_key = ?"
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"{} WHERE a.family_id = ?
                 AND e.currency = ?
                 AND e.date >= ?
                 AND CAST(strftime('%d', e.date) AS INTEGER) BETWEEN ? AND ?
                 AND {}
               ORDER BY e.date DESC, e.id DESC"#,
            ENTRY_SELECT, identity_clause
        ))?;

        let identity: rusqlite::types::Value = match (merchant_id, name) {
            (Some(id), _) => id.into(),
            (None, Some(name)) => match_key(name).into(),
            (None, None) => return Ok(Vec::new()),
        };

        let entries = stmt
            .query_map(
                params![family_id, currency, since.to_string(), low, high, identity],
                row_to_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Whether an entry for this pattern exists on the account between `start` and `end`
    pub fn entry_exists_for_period(
        &self,
        recurring_id: i64,
        account_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM entries
                WHERE recurring_transaction_id = ? AND account_id = ? AND date BETWEEN ? AND ?
            )
            "#,
            params![recurring_id, account_id, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Link an existing entry to a recurring pattern
    pub fn link_entry_to_recurring(&self, entry_id: i64, recurring_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE entries SET recurring_transaction_id = ? WHERE id = ?",
            params![recurring_id, entry_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("entry {}", entry_id)));
        }
        Ok(())
    }
}
