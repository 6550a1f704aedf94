//! Cadence Core Library
//!
//! Recurring transaction and subscription engine for a family budget:
//! - Database access and schema (SQLCipher via r2d2)
//! - Recurring pattern identification and stale-pattern cleanup
//! - Subscription detection against a catalog of known services
//! - Suggestion lifecycle (suggest, approve, dismiss)
//! - Scheduled generation of subscription entries
//! - Exchange rate cache and service icon cache
//! - CSV entry import and subscription totals

pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod exchange;
pub mod generate;
pub mod icons;
pub mod import;
pub mod lifecycle;
pub mod models;
pub mod palette;
pub mod recurring;
pub mod suggestions;
pub mod summary;

/// Test utilities including a mock rate/icon server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::CadenceConfig;
pub use db::{Database, EntryInsertResult, PatternFilter};
pub use detect::{DetectionResults, SubscriptionDetector};
pub use error::{Error, Result};
pub use exchange::{ExchangeRateLookup, HttpRateSource, NbuRateSource, RateSource, StaticRates};
pub use generate::GenerationStats;
pub use icons::{HttpIconSource, IconSource};
pub use import::ImportStats;
pub use lifecycle::SuggestionState;
pub use recurring::{Cleaner, IdentificationResults, Identifier, SubscriptionUpdate};
pub use suggestions::{Approval, SubscriptionSuggestionService};
pub use summary::{BillingCalendar, SubscriptionSummary};
