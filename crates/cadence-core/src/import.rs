//! CSV entry import
//!
//! Format: `date,amount,currency,name,merchant` with a header row. `currency`
//! may be blank (the account currency is used) and `merchant` is optional.
//! Dates are `YYYY-MM-DD`; positive amounts are charges.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{Database, EntryInsertResult};
use crate::error::{Error, Result};
use crate::exchange::parse_currency;
use crate::models::{EntrySource, NewEntry};
use crate::palette;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    amount: String,
    #[serde(default)]
    currency: Option<String>,
    name: String,
    #[serde(default)]
    merchant: Option<String>,
}

/// A parsed and validated import row
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    pub merchant: Option<String>,
}

/// Counts from an import run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub imported: usize,
    /// Rows already present from an earlier import
    pub duplicates: usize,
}

/// Parse import rows, validating every field
///
/// Errors name the 1-based data row that failed.
pub fn parse_entries<R: Read>(reader: R, default_currency: &str) -> Result<Vec<ImportedEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let line = index + 1;
        entries.push(validate_row(row, default_currency).map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("row {}: {}", line, msg)),
            other => other,
        })?);
    }

    debug!("Parsed {} import rows", entries.len());
    Ok(entries)
}

fn validate_row(row: CsvRow, default_currency: &str) -> Result<ImportedEntry> {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("invalid date '{}'", row.date)))?;

    let amount: Decimal = row
        .amount
        .replace(['$', ','], "")
        .parse()
        .map_err(|_| Error::Validation(format!("invalid amount '{}'", row.amount)))?;

    let currency = match row.currency.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => parse_currency(code)?,
        None => parse_currency(default_currency)?,
    };

    if row.name.is_empty() {
        return Err(Error::Validation("name cannot be empty".to_string()));
    }

    Ok(ImportedEntry {
        date,
        amount,
        currency,
        name: row.name,
        merchant: row.merchant.filter(|m| !m.is_empty()),
    })
}

/// Import CSV entries into an account
///
/// Re-importing the same file is a no-op: every row carries a hash of the
/// account, its fields and how many identical rows precede it in the file.
pub fn import_csv<R: Read>(db: &Database, account_id: i64, reader: R) -> Result<ImportStats> {
    let account = db
        .get_account(account_id)?
        .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;
    let entries = parse_entries(reader, &account.currency)?;

    let mut stats = ImportStats::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for imported in entries {
        let key = format!(
            "{}|{}|{}|{}|{}",
            account.id, imported.date, imported.amount, imported.currency, imported.name
        );
        let occurrence = seen.entry(key.clone()).or_insert(0);
        *occurrence += 1;
        let import_hash = palette::hash_hex(&format!("{}|{}", key, occurrence));

        let merchant_id = imported
            .merchant
            .as_deref()
            .map(|m| db.get_or_create_merchant(account.family_id, m))
            .transpose()?;

        let entry = NewEntry {
            date: imported.date,
            amount: imported.amount,
            currency: imported.currency,
            name: imported.name,
            merchant_id,
            recurring_transaction_id: None,
            source: EntrySource::Import,
            provider_data: None,
            import_hash: Some(import_hash),
        };

        match db.insert_entry(account.id, &entry)? {
            EntryInsertResult::Inserted(_) => stats.imported += 1,
            EntryInsertResult::Duplicate => stats.duplicates += 1,
        }
    }

    info!(
        account_id,
        imported = stats.imported,
        duplicates = stats.duplicates,
        "Import complete"
    );
    Ok(stats)
}
