//! Family operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::exchange::parse_currency;
use crate::models::Family;

fn row_to_family(row: &Row) -> rusqlite::Result<Family> {
    let created_at: String = row.get(3)?;
    Ok(Family {
        id: row.get(0)?,
        name: row.get(1)?,
        currency: row.get(2)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Create a family with a home currency
    pub fn create_family(&self, name: &str, currency: &str) -> Result<i64> {
        let currency = parse_currency(currency)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO families (name, currency) VALUES (?, ?)",
            params![name, currency],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_family(&self, id: i64) -> Result<Option<Family>> {
        let conn = self.conn()?;
        let family = conn
            .query_row(
                "SELECT id, name, currency, created_at FROM families WHERE id = ?",
                params![id],
                row_to_family,
            )
            .optional()?;
        Ok(family)
    }

    pub fn list_families(&self) -> Result<Vec<Family>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, currency, created_at FROM families ORDER BY id")?;
        let families = stmt
            .query_map([], row_to_family)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(families)
    }
}
