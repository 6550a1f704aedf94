//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Detection configuration from a file or the default locations
//! - `rate_source` / `icon_source` - HTTP clients built from the configuration
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{bail, Context, Result};
use cadence_core::{
    CadenceConfig, Database, HttpIconSource, IconSource, NbuRateSource, RateSource,
};
use tracing::warn;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the detection configuration
///
/// An explicit path must exist; the default locations fall back to built-in values.
pub fn load_config(path: Option<&Path>) -> Result<CadenceConfig> {
    match path {
        Some(path) if !path.exists() => bail!("Config file not found: {}", path.display()),
        Some(path) => CadenceConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => CadenceConfig::load().context("Failed to load config"),
    }
}

/// Exchange rate client, or None if it cannot be built
pub fn rate_source(config: &CadenceConfig) -> Option<Box<dyn RateSource>> {
    match NbuRateSource::from_config(&config.rates) {
        Ok(source) => Some(Box::new(source)),
        Err(e) => {
            warn!("Exchange rate client unavailable: {}", e);
            None
        }
    }
}

/// Icon client, or None when icons are not configured
pub fn icon_source(config: &CadenceConfig) -> Option<Box<dyn IconSource>> {
    if !config.icons.enabled() {
        return None;
    }
    match HttpIconSource::new(&config.icons) {
        Ok(source) => Some(Box::new(source)),
        Err(e) => {
            warn!("Icon client unavailable: {}", e);
            None
        }
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    let seeded = db
        .seed_default_services()
        .context("Failed to seed subscription services")?;
    println!("   Seeded {} subscription services", seeded);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a family: cadence family add Household --currency USD");
    println!("  2. Add an account: cadence account add --family 1 Checking");
    println!("  3. Import entries: cadence import --account 1 --file statement.csv");
    println!("  4. Find subscriptions: cadence detect --family 1");

    Ok(())
}
