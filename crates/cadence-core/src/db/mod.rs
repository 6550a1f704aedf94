//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `families` - Families (households)
//! - `accounts` - Ledger accounts
//! - `entries` - Ledger entries, merchants and pattern matching queries
//! - `recurring` - Recurring patterns, suggestions and generated entries
//! - `services` - Subscription service catalog and cached icons
//! - `exchange_rates` - Exchange rate cache

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};

mod accounts;
mod entries;
mod exchange_rates;
mod families;
mod recurring;
mod services;

pub use entries::EntryInsertResult;
pub use recurring::PatternFilter;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CADENCE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"cadence-salt-v01";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Read a `YYYY-MM-DD` column
pub(crate) fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

/// Read a decimal stored as TEXT
pub(crate) fn decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    s.parse::<Decimal>().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse::<Decimal>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn opt_datetime_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.map(|s| parse_datetime(&s)))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CADENCE_DB_KEY` environment variable to be set.
    /// Use `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Every pooled connection must be keyed before first use
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager = manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "cadence_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            CREATE TABLE IF NOT EXISTS families (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                family_id INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                currency TEXT NOT NULL,
                provider TEXT,                              -- plaid, simple_fin, lunchflow (NULL = unlinked)
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(family_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_family ON accounts(family_id);

            CREATE TABLE IF NOT EXISTS merchants (
                id INTEGER PRIMARY KEY,
                family_id INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE(family_id, name)
            );

            -- Subscription service catalog
            CREATE TABLE IF NOT EXISTS subscription_services (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                domain TEXT NOT NULL,
                category TEXT,
                color TEXT NOT NULL,
                icon BLOB,
                icon_content_type TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS recurring_transactions (
                id INTEGER PRIMARY KEY,
                family_id INTEGER NOT NULL REFERENCES families(id) ON DELETE CASCADE,
                merchant_id INTEGER REFERENCES merchants(id),
                name TEXT,
                match_key TEXT,                             -- normalized name, NULL with a merchant
                amount TEXT NOT NULL,                       -- decimal as text
                currency TEXT NOT NULL,
                expected_day_of_month INTEGER NOT NULL CHECK (expected_day_of_month BETWEEN 1 AND 31),
                expected_month INTEGER CHECK (expected_month BETWEEN 1 AND 12),
                billing_cycle TEXT NOT NULL DEFAULT 'monthly',
                status TEXT NOT NULL DEFAULT 'active',
                is_subscription BOOLEAN NOT NULL DEFAULT 0,
                manual BOOLEAN NOT NULL DEFAULT 0,
                suggestion_status TEXT,                     -- NULL, suggested, dismissed
                suggested_at DATETIME,
                dismissed_at DATETIME,
                last_occurrence_date DATE NOT NULL,
                next_expected_date DATE NOT NULL,
                occurrence_count INTEGER NOT NULL DEFAULT 0,
                expected_amount_min TEXT,
                expected_amount_max TEXT,
                expected_amount_avg TEXT,
                base_currency TEXT,
                base_amount TEXT,
                default_account_id INTEGER REFERENCES accounts(id) ON DELETE SET NULL,
                subscription_service_id INTEGER REFERENCES subscription_services(id) ON DELETE SET NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK (merchant_id IS NOT NULL OR name IS NOT NULL)
            );

            CREATE INDEX IF NOT EXISTS idx_recurring_family ON recurring_transactions(family_id);
            CREATE INDEX IF NOT EXISTS idx_recurring_suggestion ON recurring_transactions(family_id, suggestion_status);
            CREATE INDEX IF NOT EXISTS idx_recurring_next ON recurring_transactions(next_expected_date);
            CREATE INDEX IF NOT EXISTS idx_recurring_match_key ON recurring_transactions(family_id, match_key);

            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                date DATE NOT NULL,
                amount TEXT NOT NULL,                       -- positive = outflow
                currency TEXT NOT NULL,
                name TEXT NOT NULL,
                match_key TEXT NOT NULL,                    -- normalized name
                merchant_id INTEGER REFERENCES merchants(id),
                recurring_transaction_id INTEGER REFERENCES recurring_transactions(id) ON DELETE SET NULL,
                source TEXT NOT NULL DEFAULT 'import',      -- import, manual, subscription
                provider_data TEXT,                         -- JSON tagged by provider
                import_hash TEXT UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_entries_account_date ON entries(account_id, date);
            CREATE INDEX IF NOT EXISTS idx_entries_merchant ON entries(merchant_id);
            CREATE INDEX IF NOT EXISTS idx_entries_recurring ON entries(recurring_transaction_id);
            CREATE INDEX IF NOT EXISTS idx_entries_match_key ON entries(match_key);

            CREATE TABLE IF NOT EXISTS exchange_rates (
                id INTEGER PRIMARY KEY,
                from_currency TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                date DATE NOT NULL,
                rate TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(from_currency, to_currency, date)
            );
            "#,
        )?;

        debug!("Database migrations complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
