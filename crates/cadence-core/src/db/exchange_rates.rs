//! Exchange rate cache

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;
use tracing::warn;

use super::Database;
use crate::error::{Error, Result};
use crate::exchange::ExchangeRateLookup;

impl Database {
    /// Store a rate, replacing any existing quote for the same pair and date
    pub fn upsert_exchange_rate(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
        rate: Decimal,
    ) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "exchange rate must be positive, got {}",
                rate
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, date, rate)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(from_currency, to_currency, date) DO UPDATE SET rate = excluded.rate
            "#,
            params![
                from.to_uppercase(),
                to.to_uppercase(),
                date.to_string(),
                rate.to_string()
            ],
        )?;
        Ok(())
    }

    /// Stored rate for exactly this pair and date
    pub fn get_exchange_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        let conn = self.conn()?;
        let rate: Option<String> = conn
            .query_row(
                "SELECT rate FROM exchange_rates WHERE from_currency = ? AND to_currency = ? AND date = ?",
                params![from.to_uppercase(), to.to_uppercase(), date.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        rate.map(|r| {
            r.parse::<Decimal>()
                .map_err(|e| Error::InvalidData(format!("bad stored rate '{}': {}", r, e)))
        })
        .transpose()
    }

    fn cached_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        if let Some(rate) = self.get_exchange_rate(from, to, date)? {
            return Ok(Some(rate));
        }
        // Fall back to the inverse quote
        let inverse = self
            .get_exchange_rate(to, from, date)?
            .filter(|r| !r.is_zero())
            .and_then(|r| Decimal::ONE.checked_div(r));
        Ok(inverse)
    }
}

impl ExchangeRateLookup for Database {
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        if from.eq_ignore_ascii_case(to) {
            return Some(Decimal::ONE);
        }
        match self.cached_rate(from, to, date) {
            Ok(rate) => rate,
            Err(e) => {
                warn!("Rate lookup {} -> {} on {} failed: {}", from, to, date, e);
                None
            }
        }
    }
}
