//! Test utilities for cadence-core
//!
//! This module provides a mock exchange rate / icon server and fixture
//! builders shared by unit and integration tests. The server answers both
//! the `{date}?from&to` rates API and the NBU `exchangenew` API under `/nbu`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::models::{
    BillingCycle, Entry, EntrySource, PatternStatus, RecurringTransaction,
};

/// Bytes served for every icon request
pub const MOCK_ICON_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nmock-icon";

/// Domain for which the mock icon endpoint fails
pub const FAILING_ICON_DOMAIN: &str = "broken.example";

type RateTable = HashMap<(String, String, NaiveDate), Decimal>;

struct MockState {
    rates: RateTable,
    /// NBU requests still to answer with 503
    nbu_failures: AtomicUsize,
    nbu_requests: AtomicUsize,
}

/// Mock rates and icon server for testing
pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port, serving the given rates
    ///
    /// A `(FOREIGN, "UAH", date, rate)` row is also served by the NBU endpoint.
    pub async fn start(rates: &[(&str, &str, NaiveDate, Decimal)]) -> Self {
        let table: RateTable = rates
            .iter()
            .map(|(from, to, date, rate)| ((from.to_string(), to.to_string(), *date), *rate))
            .collect();
        let state = Arc::new(MockState {
            rates: table,
            nbu_failures: AtomicUsize::new(0),
            nbu_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/nbu/exchangenew", get(handle_nbu))
            .route("/:date", get(handle_rate))
            .route(
                "/:domain/icon/fallback/lettermark/w/:width/h/:height",
                get(handle_icon),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL of the mock NBU statdirectory
    pub fn nbu_url(&self) -> String {
        format!("http://{}/nbu", self.addr)
    }

    /// Answer the next `n` NBU requests with 503 Service Unavailable
    pub fn fail_next_nbu_requests(&self, n: usize) {
        self.state.nbu_failures.store(n, Ordering::SeqCst);
    }

    /// NBU requests received so far, failed ones included
    pub fn nbu_requests(&self) -> usize {
        self.state.nbu_requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct RateQuery {
    from: String,
    to: String,
}

async fn handle_rate(
    State(state): State<Arc<MockState>>,
    Path(date): Path<NaiveDate>,
    Query(query): Query<RateQuery>,
) -> Response {
    match state.rates.get(&(query.from.clone(), query.to.clone(), date)) {
        Some(rate) => Json(serde_json::json!({
            "amount": 1.0,
            "base": query.from,
            "date": date.to_string(),
            "rates": { query.to: rate.to_string().parse::<f64>().unwrap_or(0.0) }
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct NbuQuery {
    valcode: String,
    date: String,
}

async fn handle_nbu(State(state): State<Arc<MockState>>, Query(query): Query<NbuQuery>) -> Response {
    state.nbu_requests.fetch_add(1, Ordering::SeqCst);
    let failing = state
        .nbu_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let Ok(date) = NaiveDate::parse_from_str(&query.date, "%Y%m%d") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let quotes: Vec<serde_json::Value> = state
        .rates
        .get(&(query.valcode.clone(), "UAH".to_string(), date))
        .map(|rate| {
            serde_json::json!({
                "r030": 840,
                "txt": query.valcode,
                "rate": rate.to_string().parse::<f64>().unwrap_or(0.0),
                "cc": query.valcode,
                "exchangedate": date.format("%d.%m.%Y").to_string(),
            })
        })
        .into_iter()
        .collect();
    Json(quotes).into_response()
}

async fn handle_icon(Path((domain, _width, _height)): Path<(String, u32, u32)>) -> Response {
    if domain == FAILING_ICON_DOMAIN {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], MOCK_ICON_BYTES).into_response()
}

/// An outflow entry on account 1 of family 1
pub fn entry_fixture(date: NaiveDate, amount: Decimal, currency: &str) -> Entry {
    Entry {
        id: 0,
        account_id: 1,
        family_id: 1,
        date,
        amount,
        currency: currency.to_string(),
        name: "Fixture".to_string(),
        merchant_id: None,
        merchant_name: None,
        recurring_transaction_id: None,
        source: EntrySource::Import,
        provider_data: None,
        created_at: Utc::now(),
    }
}

/// An active, automatic, monthly pattern identified by name
pub fn recurring_fixture(name: &str, amount: Decimal, currency: &str) -> RecurringTransaction {
    let last = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
    RecurringTransaction {
        id: 1,
        family_id: 1,
        merchant_id: None,
        merchant_name: None,
        name: Some(name.to_string()),
        amount,
        currency: currency.to_string(),
        expected_day_of_month: 15,
        expected_month: None,
        billing_cycle: BillingCycle::Monthly,
        status: PatternStatus::Active,
        is_subscription: false,
        manual: false,
        suggestion_status: None,
        suggested_at: None,
        dismissed_at: None,
        last_occurrence_date: last,
        next_expected_date: NaiveDate::from_ymd_opt(2025, 2, 15).unwrap(),
        occurrence_count: 3,
        expected_amount_min: None,
        expected_amount_max: None,
        expected_amount_avg: None,
        base_currency: None,
        base_amount: None,
        default_account_id: None,
        subscription_service_id: None,
        created_at: Utc::now(),
    }
}
