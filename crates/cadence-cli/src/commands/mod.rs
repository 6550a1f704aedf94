//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, rate/icon sources)
//! - `families` - Family and account commands
//! - `import` - CSV entry import
//! - `jobs` - Generation and cleanup runs
//! - `serve` - Web server command
//! - `services` - Service catalog and exchange rate commands
//! - `subscriptions` - Subscription management and totals
//! - `suggestions` - Detection and suggestion review

pub mod core;
pub mod families;
pub mod import;
pub mod jobs;
pub mod serve;
pub mod services;
pub mod subscriptions;
pub mod suggestions;

// Re-export command functions for main.rs
pub use core::*;
pub use families::*;
pub use import::*;
pub use jobs::*;
pub use serve::*;
pub use services::*;
pub use subscriptions::*;
pub use suggestions::*;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse a YYYY-MM-DD argument
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Parse an optional date argument, defaulting to today
pub fn date_or_today(s: Option<&str>) -> Result<NaiveDate> {
    match s {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}
