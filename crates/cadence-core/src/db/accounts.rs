//! Account operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::exchange::parse_currency;
use crate::models::{Account, AccountProvider};

const ACCOUNT_COLUMNS: &str = "id, family_id, name, currency, provider, created_at";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let provider: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Account {
        id: row.get(0)?,
        family_id: row.get(1)?,
        name: row.get(2)?,
        currency: row.get(3)?,
        provider: provider.as_deref().and_then(AccountProvider::parse),
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Create or get an account by name within a family
    pub fn upsert_account(
        &self,
        family_id: i64,
        name: &str,
        currency: &str,
        provider: Option<AccountProvider>,
    ) -> Result<i64> {
        let currency = parse_currency(currency)?;
        let conn = self.conn()?;

        let family_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM families WHERE id = ?)",
            params![family_id],
            |row| row.get(0),
        )?;
        if !family_exists {
            return Err(Error::NotFound(format!("family {}", family_id)));
        }

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM accounts WHERE family_id = ? AND name = ?",
                params![family_id, name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO accounts (family_id, name, currency, provider) VALUES (?, ?, ?, ?)",
            params![family_id, name, currency, provider.map(|p| p.as_str())],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List a family's accounts
    pub fn list_accounts(&self, family_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE family_id = ? ORDER BY name",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![family_id], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get an account by ID
    pub fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
                params![id],
                row_to_account,
            )
            .optional()?;

        Ok(account)
    }

    /// Link or unlink an account from an external provider
    pub fn set_account_provider(
        &self,
        account_id: i64,
        provider: Option<AccountProvider>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET provider = ? WHERE id = ?",
            params![provider.map(|p| p.as_str()), account_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("account {}", account_id)));
        }
        Ok(())
    }
}
