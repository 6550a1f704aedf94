//! Detection and identification configuration
//!
//! Configuration is loaded from TOML with the following priority:
//! 1. Explicit path (or `CADENCE_CONFIG`)
//! 2. `~/.local/share/cadence/config/cadence.toml`
//! 3. Embedded defaults (`config/cadence.toml`)
//!
//! Missing keys in an override file keep their default values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../config/cadence.toml");

/// Environment variable pointing at a config override file
pub const CONFIG_ENV: &str = "CADENCE_CONFIG";

/// Thresholds for the billing cycle classifier
#[derive(Debug, Clone)]
pub struct BillingCycleConfig {
    /// Mean gap in days above which a series is yearly
    pub yearly_mean_gap_days: f64,
    /// Single charge at least this old is yearly
    pub single_charge_yearly_days: i64,
    /// Single charge at least this old and big enough is yearly
    pub single_charge_moderate_days: i64,
    pub big_ticket_amount: Decimal,
}

impl Default for BillingCycleConfig {
    fn default() -> Self {
        Self {
            yearly_mean_gap_days: 300.0,
            single_charge_yearly_days: 90,
            single_charge_moderate_days: 45,
            big_ticket_amount: Decimal::from(40),
        }
    }
}

/// Thresholds for base currency detection
#[derive(Debug, Clone)]
pub struct BaseCurrencyConfig {
    /// Coefficient of variation below which raw amounts are considered stable
    pub variance_threshold: f64,
    /// Converted amounts must sit within this fraction of their mean
    pub cluster_threshold: Decimal,
    pub nice_price_tolerance: Decimal,
    pub uah_round_tolerance: Decimal,
    pub uah_integer_tolerance: Decimal,
}

impl Default for BaseCurrencyConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.01,
            cluster_threshold: Decimal::new(2, 2),
            nice_price_tolerance: Decimal::new(15, 2),
            uah_round_tolerance: Decimal::from(5),
            uah_integer_tolerance: Decimal::ONE,
        }
    }
}

/// Rules for grouping ledger entries into recurring patterns
#[derive(Debug, Clone)]
pub struct IdentificationConfig {
    pub min_occurrences: usize,
    /// Minimum occurrences when the gaps look yearly
    pub yearly_min_occurrences: usize,
    /// Days either side of the median day of month that still count as on time
    pub day_window: u32,
    /// Fraction of entries that must fall inside the day window
    pub day_consistency: f64,
    /// Maximum relative distance of any amount from the median
    pub amount_tolerance: Decimal,
    pub stale_months_automatic: u32,
    pub stale_months_manual: u32,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            yearly_min_occurrences: 2,
            day_window: 2,
            day_consistency: 0.7,
            amount_tolerance: Decimal::new(10, 2),
            stale_months_automatic: 2,
            stale_months_manual: 6,
        }
    }
}

/// History windows used by the suggestion lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub detection_lookback_months: u32,
    pub variance_lookback_months: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            detection_lookback_months: 24,
            variance_lookback_months: 6,
        }
    }
}

/// Exchange rate sources
///
/// Pairs involving UAH are quoted by the National Bank of Ukraine; every
/// other pair goes to `base_url`.
#[derive(Debug, Clone)]
pub struct RatesConfig {
    pub base_url: String,
    pub nbu_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra attempts after a timeout, connection failure or 5xx
    pub max_retries: u32,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.frankfurter.app".to_string(),
            nbu_url: "https://bank.gov.ua/NBUStatService/v1/statdirectory".to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_retries: 2,
        }
    }
}

/// Service icon source
#[derive(Debug, Clone)]
pub struct IconsConfig {
    /// Icon caching is disabled without a client id
    pub brandfetch_client_id: Option<String>,
    pub logo_size: u32,
    pub timeout: Duration,
    pub base_url: String,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            brandfetch_client_id: None,
            logo_size: 128,
            timeout: Duration::from_secs(10),
            base_url: "https://cdn.brandfetch.io".to_string(),
        }
    }
}

impl IconsConfig {
    pub fn enabled(&self) -> bool {
        self.brandfetch_client_id.is_some()
    }

    /// Icon URL for a service domain, or None when caching is disabled
    pub fn icon_url(&self, domain: &str) -> Option<String> {
        let client_id = self.brandfetch_client_id.as_deref()?;
        Some(format!(
            "{}/{}/icon/fallback/lettermark/w/{}/h/{}?c={}",
            self.base_url.trim_end_matches('/'),
            domain,
            self.logo_size,
            self.logo_size,
            client_id
        ))
    }
}

/// Full Cadence configuration
#[derive(Debug, Clone, Default)]
pub struct CadenceConfig {
    pub billing_cycle: BillingCycleConfig,
    pub base_currency: BaseCurrencyConfig,
    pub identification: IdentificationConfig,
    pub lifecycle: LifecycleConfig,
    pub rates: RatesConfig,
    pub icons: IconsConfig,
}

impl CadenceConfig {
    /// Load from the override locations, falling back to the embedded defaults
    pub fn load() -> Result<Self> {
        let override_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        load_config(override_path.as_deref())
    }

    /// Load from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse configuration from TOML content layered over the defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("cadence").join("config").join("cadence.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<CadenceConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .filter(|p| p.exists());

    let content = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        None => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    billing_cycle: Option<RawBillingCycle>,
    base_currency: Option<RawBaseCurrency>,
    identification: Option<RawIdentification>,
    lifecycle: Option<RawLifecycle>,
    rates: Option<RawRates>,
    icons: Option<RawIcons>,
}

#[derive(Debug, Deserialize)]
struct RawBillingCycle {
    yearly_mean_gap_days: Option<f64>,
    single_charge_yearly_days: Option<i64>,
    single_charge_moderate_days: Option<i64>,
    big_ticket_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawBaseCurrency {
    variance_threshold: Option<f64>,
    cluster_threshold: Option<Decimal>,
    nice_price_tolerance: Option<Decimal>,
    uah_round_tolerance: Option<Decimal>,
    uah_integer_tolerance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawIdentification {
    min_occurrences: Option<usize>,
    yearly_min_occurrences: Option<usize>,
    day_window: Option<u32>,
    day_consistency: Option<f64>,
    amount_tolerance: Option<Decimal>,
    stale_months_automatic: Option<u32>,
    stale_months_manual: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawLifecycle {
    detection_lookback_months: Option<u32>,
    variance_lookback_months: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRates {
    base_url: Option<String>,
    nbu_url: Option<String>,
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawIcons {
    brandfetch_client_id: Option<String>,
    logo_size: Option<u32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<CadenceConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = CadenceConfig::default();

    if let Some(bc) = raw.billing_cycle {
        let c = &mut config.billing_cycle;
        if let Some(v) = bc.yearly_mean_gap_days {
            c.yearly_mean_gap_days = v;
        }
        if let Some(v) = bc.single_charge_yearly_days {
            c.single_charge_yearly_days = v;
        }
        if let Some(v) = bc.single_charge_moderate_days {
            c.single_charge_moderate_days = v;
        }
        if let Some(v) = bc.big_ticket_amount {
            c.big_ticket_amount = v;
        }
    }

    if let Some(base) = raw.base_currency {
        let c = &mut config.base_currency;
        if let Some(v) = base.variance_threshold {
            c.variance_threshold = v;
        }
        if let Some(v) = base.cluster_threshold {
            c.cluster_threshold = v;
        }
        if let Some(v) = base.nice_price_tolerance {
            c.nice_price_tolerance = v;
        }
        if let Some(v) = base.uah_round_tolerance {
            c.uah_round_tolerance = v;
        }
        if let Some(v) = base.uah_integer_tolerance {
            c.uah_integer_tolerance = v;
        }
    }

    if let Some(ident) = raw.identification {
        let c = &mut config.identification;
        if let Some(v) = ident.min_occurrences {
            c.min_occurrences = v;
        }
        if let Some(v) = ident.yearly_min_occurrences {
            c.yearly_min_occurrences = v;
        }
        if let Some(v) = ident.day_window {
            c.day_window = v;
        }
        if let Some(v) = ident.day_consistency {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!(
                    "identification.day_consistency must be between 0 and 1, got {}",
                    v
                )));
            }
            c.day_consistency = v;
        }
        if let Some(v) = ident.amount_tolerance {
            c.amount_tolerance = v;
        }
        if let Some(v) = ident.stale_months_automatic {
            c.stale_months_automatic = v;
        }
        if let Some(v) = ident.stale_months_manual {
            c.stale_months_manual = v;
        }
    }

    if let Some(lc) = raw.lifecycle {
        if let Some(v) = lc.detection_lookback_months {
            config.lifecycle.detection_lookback_months = v;
        }
        if let Some(v) = lc.variance_lookback_months {
            config.lifecycle.variance_lookback_months = v;
        }
    }

    if let Some(rates) = raw.rates {
        if let Some(url) = rates.base_url {
            config.rates.base_url = url;
        }
        if let Some(url) = rates.nbu_url {
            config.rates.nbu_url = url;
        }
        if let Some(secs) = rates.timeout_secs {
            config.rates.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = rates.connect_timeout_secs {
            config.rates.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = rates.max_retries {
            config.rates.max_retries = n;
        }
    }

    if let Some(icons) = raw.icons {
        // Empty string in the file means "disabled"
        if let Some(id) = icons.brandfetch_client_id {
            config.icons.brandfetch_client_id = Some(id).filter(|s| !s.trim().is_empty());
        }
        if let Some(size) = icons.logo_size {
            config.icons.logo_size = size;
        }
        if let Some(secs) = icons.timeout_secs {
            config.icons.timeout = Duration::from_secs(secs);
        }
        if let Some(url) = icons.base_url {
            config.icons.base_url = url;
        }
    }

    Ok(config)
}
