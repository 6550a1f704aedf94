//! Exchange rates: lookup seam, HTTP source and cache filling
//!
//! Detection only ever reads rates synchronously through [`ExchangeRateLookup`].
//! Missing rates are fetched ahead of time by [`ensure_rates`], which stores
//! whatever the [`RateSource`] returns in the database cache. The default
//! source is [`NbuRateSource`], which falls back to [`HttpRateSource`] for
//! pairs without UAH.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::RatesConfig;
use crate::db::Database;
use crate::error::{Error, Result};

/// Synchronous rate lookup used by detection and totals
pub trait ExchangeRateLookup {
    /// Units of `to` per one unit of `from` on `date`, if known
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal>;
}

/// Convert an amount between currencies, None when no usable rate exists
pub fn convert(
    amount: Decimal,
    from: &str,
    to: &str,
    date: NaiveDate,
    rates: &dyn ExchangeRateLookup,
) -> Option<Decimal> {
    if from.eq_ignore_ascii_case(to) {
        return Some(amount);
    }
    rates
        .rate(from, to, date)
        .filter(|r| !r.is_zero())
        .map(|r| amount * r)
}

/// In-memory rate table
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<(String, String, NaiveDate), Decimal>,
}

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str, date: NaiveDate, rate: Decimal) {
        self.rates
            .insert((from.to_uppercase(), to.to_uppercase(), date), rate);
    }

    pub fn with_rate(mut self, from: &str, to: &str, date: NaiveDate, rate: Decimal) -> Self {
        self.insert(from, to, date, rate);
        self
    }
}

impl ExchangeRateLookup for StaticRates {
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        if from == to {
            return Some(Decimal::ONE);
        }
        self.rates.get(&(from, to, date)).copied()
    }
}

/// Remote source of historical rates
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch a single rate. `Ok(None)` means the source has no quote.
    async fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>>;
}

/// Response from the rates endpoint
#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Decimal>,
}

/// Delay before the first retry; doubles on each further attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

fn build_client(config: &RatesConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()?)
}

fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
}

/// GET with retries on timeouts, connection failures and 5xx responses
///
/// A 404 is returned as `Ok(None)`.
async fn get_with_retry(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
    max_retries: u32,
) -> Result<Option<reqwest::Response>> {
    let mut attempt = 0;
    loop {
        let result = client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(response) => return Ok(Some(response)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => return Ok(None),
            Err(e) if attempt < max_retries && is_retryable(&e) => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                attempt += 1;
                debug!(attempt, "Retrying {} in {:?}: {}", url, delay, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// HTTP rate source (`{base_url}/{date}?from=FROM&to=TO`)
#[derive(Clone)]
pub struct HttpRateSource {
    http_client: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpRateSource {
    pub fn new(config: &RatesConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        let url = format!("{}/{}", self.base_url, date.format("%Y-%m-%d"));
        let Some(response) = get_with_retry(
            &self.http_client,
            &url,
            &[("from", from), ("to", to)],
            self.max_retries,
        )
        .await?
        else {
            return Ok(None);
        };

        let body: RatesResponse = response.json().await?;
        let rate = body.rates.get(&to.to_uppercase()).copied();
        debug!("Fetched rate {} -> {} on {}: {:?}", from, to, date, rate);
        Ok(rate)
    }
}

/// Hryvnia, the currency the NBU quotes everything against
pub const UAH: &str = "UAH";

/// One row of the NBU `exchangenew` response
#[derive(Debug, Deserialize)]
struct NbuQuote {
    /// UAH per one unit of the foreign currency
    rate: Decimal,
}

/// National Bank of Ukraine rates for pairs involving UAH
///
/// Calls `{nbu_url}/exchangenew?json&valcode=XXX&date=YYYYMMDD`. The NBU quotes
/// UAH per unit of foreign currency, so UAH -> foreign is the inverse rounded
/// to 8 places. Pairs without UAH go to the fallback source.
pub struct NbuRateSource {
    http_client: Client,
    base_url: String,
    max_retries: u32,
    fallback: Box<dyn RateSource>,
}

impl NbuRateSource {
    pub fn new(config: &RatesConfig, fallback: Box<dyn RateSource>) -> Result<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            base_url: config.nbu_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            fallback,
        })
    }

    /// NBU for UAH pairs, [`HttpRateSource`] for the rest
    pub fn from_config(config: &RatesConfig) -> Result<Self> {
        Self::new(config, Box::new(HttpRateSource::new(config)?))
    }
}

#[async_trait]
impl RateSource for NbuRateSource {
    async fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Option<Decimal>> {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        if from != UAH && to != UAH {
            return self.fallback.fetch_rate(&from, &to, date).await;
        }
        if from == to {
            return Ok(Some(Decimal::ONE));
        }

        let foreign: &str = if from == UAH { &to } else { &from };
        let url = format!("{}/exchangenew", self.base_url);
        let date_param = date.format("%Y%m%d").to_string();
        let Some(response) = get_with_retry(
            &self.http_client,
            &url,
            &[("json", ""), ("valcode", foreign), ("date", date_param.as_str())],
            self.max_retries,
        )
        .await?
        else {
            return Ok(None);
        };

        let quotes: Vec<NbuQuote> = response.json().await?;
        let Some(quote) = quotes.first().filter(|q| !q.rate.is_zero()) else {
            debug!("NBU has no {} rate on {}", foreign, date);
            return Ok(None);
        };

        let rate = if from == UAH {
            (Decimal::ONE / quote.rate).round_dp(8)
        } else {
            quote.rate
        };
        debug!("Fetched NBU rate {} -> {} on {}: {}", from, to, date, rate);
        Ok(Some(rate))
    }
}

/// A rate the cache should hold before detection runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateRequest {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

/// Fill the database cache with any missing rates
///
/// Fetch failures are logged and skipped; detection then treats the sample as
/// missing. Returns the number of rates stored.
pub async fn ensure_rates(
    db: &Database,
    source: &dyn RateSource,
    requests: &[RateRequest],
) -> Result<usize> {
    let mut stored = 0;

    for req in requests {
        if req.from.eq_ignore_ascii_case(&req.to) || db.rate(&req.from, &req.to, req.date).is_some()
        {
            continue;
        }

        match source.fetch_rate(&req.from, &req.to, req.date).await {
            Ok(Some(rate)) if !rate.is_zero() => {
                db.upsert_exchange_rate(&req.from, &req.to, req.date, rate)?;
                stored += 1;
            }
            Ok(_) => {
                debug!(
                    "No rate available for {} -> {} on {}",
                    req.from, req.to, req.date
                );
            }
            Err(e) => {
                warn!(
                    "Failed to fetch rate {} -> {} on {}: {}",
                    req.from, req.to, req.date, e
                );
            }
        }
    }

    Ok(stored)
}

/// Parse a currency code, rejecting anything that is not three letters
pub fn parse_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_uppercase())
    } else {
        Err(Error::Validation(format!("Invalid currency code: '{}'", code)))
    }
}
