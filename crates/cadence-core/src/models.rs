//! Domain models for Cadence

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A household whose ledger is analysed as one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: i64,
    pub name: String,
    /// Home currency used for totals
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger account owned by a family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub family_id: i64,
    pub name: String,
    pub currency: String,
    /// Set when the account is synced from an external provider
    pub provider: Option<AccountProvider>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Linked accounts get their entries from the provider, never from generation
    pub fn is_linked(&self) -> bool {
        self.provider.is_some()
    }
}

/// External providers that can feed an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountProvider {
    Plaid,
    SimpleFin,
    Lunchflow,
}

impl AccountProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaid => "plaid",
            Self::SimpleFin => "simple_fin",
            Self::Lunchflow => "lunchflow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plaid" => Some(Self::Plaid),
            "simple_fin" | "simplefin" => Some(Self::SimpleFin),
            "lunchflow" => Some(Self::Lunchflow),
            _ => None,
        }
    }
}

/// A merchant known to a family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: i64,
    pub family_id: i64,
    pub name: String,
}

/// Where a ledger entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Import,
    Manual,
    /// Materialized by the subscription generation job
    Subscription,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Manual => "manual",
            Self::Subscription => "subscription",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "manual" => Self::Manual,
            "subscription" => Self::Subscription,
            _ => Self::Import,
        }
    }
}

/// Provider-specific metadata attached to a synced entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderData {
    Plaid {
        transaction_id: String,
        pending: bool,
    },
    SimpleFin {
        transaction_id: String,
        pending: bool,
    },
    Lunchflow {
        transaction_id: String,
        pending: bool,
    },
}

impl ProviderData {
    pub fn pending(&self) -> bool {
        match self {
            Self::Plaid { pending, .. }
            | Self::SimpleFin { pending, .. }
            | Self::Lunchflow { pending, .. } => *pending,
        }
    }
}

/// A ledger entry
///
/// Amounts are positive for outflows (charges) and negative for inflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub family_id: i64,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    pub merchant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    pub recurring_transaction_id: Option<i64>,
    pub source: EntrySource,
    pub provider_data: Option<ProviderData>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_pending(&self) -> bool {
        self.provider_data
            .as_ref()
            .map(ProviderData::pending)
            .unwrap_or(false)
    }

    /// Merchant name when known, otherwise the entry name
    pub fn display_name(&self) -> &str {
        self.merchant_name.as_deref().unwrap_or(&self.name)
    }
}

/// New entry for insertion
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    pub merchant_id: Option<i64>,
    pub recurring_transaction_id: Option<i64>,
    pub source: EntrySource,
    pub provider_data: Option<ProviderData>,
    /// Deduplication key for imports
    pub import_hash: Option<String>,
}

impl NewEntry {
    pub fn manual(date: NaiveDate, amount: Decimal, currency: &str, name: &str) -> Self {
        Self {
            date,
            amount,
            currency: currency.to_uppercase(),
            name: name.to_string(),
            merchant_id: None,
            recurring_transaction_id: None,
            source: EntrySource::Manual,
            provider_data: None,
            import_hash: None,
        }
    }
}

/// Billing period of a recurring charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// Whether a recurring pattern is still being charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    #[default]
    Active,
    Inactive,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => Self::Inactive,
            _ => Self::Active,
        }
    }
}

/// Stored suggestion flag on a recurring pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Suggested,
    Dismissed,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggested => "suggested",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "suggested" => Some(Self::Suggested),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

/// A detected or user-declared recurring charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTransaction {
    pub id: i64,
    pub family_id: i64,
    pub merchant_id: Option<i64>,
    /// Joined from merchants for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    pub name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub expected_day_of_month: u32,
    /// Only meaningful for yearly billing
    pub expected_month: Option<u32>,
    pub billing_cycle: BillingCycle,
    pub status: PatternStatus,
    pub is_subscription: bool,
    /// Declared by the user rather than identified from history
    pub manual: bool,
    pub suggestion_status: Option<SuggestionStatus>,
    pub suggested_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub last_occurrence_date: NaiveDate,
    pub next_expected_date: NaiveDate,
    pub occurrence_count: u32,
    pub expected_amount_min: Option<Decimal>,
    pub expected_amount_max: Option<Decimal>,
    pub expected_amount_avg: Option<Decimal>,
    /// Reference currency price recovered by the base currency detector
    pub base_currency: Option<String>,
    pub base_amount: Option<Decimal>,
    pub default_account_id: Option<i64>,
    pub subscription_service_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RecurringTransaction {
    /// Merchant name when a merchant is linked, otherwise the free-text name
    pub fn display_name(&self) -> &str {
        if self.merchant_id.is_some() {
            if let Some(name) = self.merchant_name.as_deref() {
                return name;
            }
        }
        self.name.as_deref().unwrap_or("")
    }
}

/// Input for creating a recurring pattern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecurringTransaction {
    pub merchant_id: Option<i64>,
    pub name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub expected_day_of_month: u32,
    pub expected_month: Option<u32>,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub is_subscription: bool,
    #[serde(default)]
    pub manual: bool,
    pub last_occurrence_date: NaiveDate,
    /// Computed from today when absent
    pub next_expected_date: Option<NaiveDate>,
    #[serde(default)]
    pub occurrence_count: u32,
    pub expected_amount_min: Option<Decimal>,
    pub expected_amount_max: Option<Decimal>,
    pub expected_amount_avg: Option<Decimal>,
    pub default_account_id: Option<i64>,
    pub subscription_service_id: Option<i64>,
}

impl NewRecurringTransaction {
    /// Reject malformed input before it reaches the database
    pub fn validate(&self) -> Result<()> {
        let has_name = self
            .name
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false);
        if self.merchant_id.is_none() && !has_name {
            return Err(Error::Validation(
                "either merchant or name must be present".to_string(),
            ));
        }

        if self.currency.trim().len() != 3 {
            return Err(Error::Validation(format!(
                "currency must be a 3-letter code, got '{}'",
                self.currency
            )));
        }

        if !(1..=31).contains(&self.expected_day_of_month) {
            return Err(Error::Validation(format!(
                "expected_day_of_month must be between 1 and 31, got {}",
                self.expected_day_of_month
            )));
        }

        if let Some(month) = self.expected_month {
            if !(1..=12).contains(&month) {
                return Err(Error::Validation(format!(
                    "expected_month must be between 1 and 12, got {}",
                    month
                )));
            }
        }

        if self.manual {
            if let (Some(min), Some(max)) = (self.expected_amount_min, self.expected_amount_max) {
                if min > max {
                    return Err(Error::Validation(
                        "expected_amount_min cannot be greater than expected_amount_max"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Category of a known subscription service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Streaming,
    Music,
    Software,
    Gaming,
    News,
    Fitness,
    Storage,
    Cloud,
    Utilities,
    Education,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Music => "music",
            Self::Software => "software",
            Self::Gaming => "gaming",
            Self::News => "news",
            Self::Fitness => "fitness",
            Self::Storage => "storage",
            Self::Cloud => "cloud",
            Self::Utilities => "utilities",
            Self::Education => "education",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.as_str() == s)
    }

    pub fn all() -> &'static [ServiceCategory] {
        &[
            Self::Streaming,
            Self::Music,
            Self::Software,
            Self::Gaming,
            Self::News,
            Self::Fitness,
            Self::Storage,
            Self::Cloud,
            Self::Utilities,
            Self::Education,
        ]
    }
}

/// A known external subscription brand (catalog entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionService {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub category: Option<ServiceCategory>,
    pub color: String,
    /// True once the icon has been downloaded and cached
    pub icon_cached: bool,
}

/// New catalog entry for insertion
#[derive(Debug, Clone)]
pub struct NewSubscriptionService {
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub category: Option<ServiceCategory>,
    /// Derived from the slug when absent
    pub color: Option<String>,
}

/// A price in a specific currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub amount: Decimal,
}

/// The next upcoming charge of an active pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub amount_avg: Option<Decimal>,
    pub has_variance: bool,
}
