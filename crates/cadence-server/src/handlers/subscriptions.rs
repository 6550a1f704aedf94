//! Subscription management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{require_family, today};
use crate::{AppError, AppState, SuccessResponse};
use cadence_core::db::PatternFilter;
use cadence_core::generate;
use cadence_core::models::{NewRecurringTransaction, PatternStatus, ProjectedEntry, RecurringTransaction};
use cadence_core::recurring::{self, SubscriptionUpdate};
use cadence_core::summary::{billing_calendar, subscription_totals, BillingCalendar, SubscriptionSummary};

/// Query params for listing subscriptions
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListSubscriptionsQuery {
    /// Only active subscriptions
    pub active: bool,
}

/// Query params for the billing calendar
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalendarQuery {
    /// YYYY-MM, the current month when absent
    pub month: Option<String>,
}

/// A subscription with its schedule state
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: RecurringTransaction,
    pub display_name: String,
    pub monthly_cost: Decimal,
    pub yearly_cost: Decimal,
    pub overdue: bool,
    pub due_today: bool,
}

impl SubscriptionView {
    fn new(subscription: RecurringTransaction, today: NaiveDate) -> Self {
        Self {
            display_name: subscription.display_name().to_string(),
            monthly_cost: subscription.monthly_cost().round_dp(2),
            yearly_cost: subscription.yearly_cost().round_dp(2),
            overdue: subscription.is_overdue(today),
            due_today: subscription.is_due_today(today),
            subscription,
        }
    }
}

/// Response for creating a subscription
#[derive(Serialize)]
pub struct CreateResponse {
    pub id: i64,
}

/// Response for toggling a subscription
#[derive(Serialize)]
pub struct ToggleResponse {
    pub id: i64,
    pub status: PatternStatus,
}

/// Response for recording an occurrence
#[derive(Serialize)]
pub struct RecordResponse {
    /// None when the current period already has an entry
    pub entry_id: Option<i64>,
}

/// Response for skipping an occurrence
#[derive(Serialize)]
pub struct SkipResponse {
    pub next_expected_date: NaiveDate,
}

/// GET /api/families/:family_id/subscriptions - List confirmed subscriptions
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<Vec<SubscriptionView>>, AppError> {
    require_family(&state, family_id)?;

    let filter = if query.active {
        PatternFilter::ActiveSubscriptions
    } else {
        PatternFilter::Subscriptions
    };
    let today = today();
    let subscriptions = state
        .db
        .list_recurring(family_id, filter)?
        .into_iter()
        .map(|s| SubscriptionView::new(s, today))
        .collect();

    Ok(Json(subscriptions))
}

/// GET /api/families/:family_id/subscriptions/:id
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<SubscriptionView>, AppError> {
    let subscription = state.db.get_family_recurring(family_id, id)?;
    Ok(Json(SubscriptionView::new(subscription, today())))
}

/// POST /api/families/:family_id/subscriptions - Add a subscription by hand
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
    Json(body): Json<NewRecurringTransaction>,
) -> Result<Json<CreateResponse>, AppError> {
    require_family(&state, family_id)?;
    let id = recurring::create_subscription(&state.db, family_id, &body, today())?;
    Ok(Json(CreateResponse { id }))
}

/// PUT /api/families/:family_id/subscriptions/:id - Update billing details
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
    Json(body): Json<SubscriptionUpdate>,
) -> Result<Json<SubscriptionView>, AppError> {
    let today = today();
    let updated = recurring::update_subscription(&state.db, family_id, id, &body, today)?;
    Ok(Json(SubscriptionView::new(updated, today)))
}

/// DELETE /api/families/:family_id/subscriptions/:id
pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_recurring(family_id, id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/families/:family_id/subscriptions/:id/toggle - Pause or resume
pub async fn toggle_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<ToggleResponse>, AppError> {
    let status = recurring::toggle_status(&state.db, family_id, id)?;
    Ok(Json(ToggleResponse { id, status }))
}

/// POST /api/families/:family_id/subscriptions/:id/record - Create the pending entry now
pub async fn record_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<RecordResponse>, AppError> {
    let entry_id = generate::record_transaction(&state.db, family_id, id)?;
    Ok(Json(RecordResponse { entry_id }))
}

/// POST /api/families/:family_id/subscriptions/:id/skip - Skip the pending occurrence
pub async fn skip_subscription(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<SkipResponse>, AppError> {
    let next_expected_date = generate::skip_occurrence(&state.db, family_id, id)?;
    Ok(Json(SkipResponse { next_expected_date }))
}

/// GET /api/families/:family_id/subscriptions/:id/projected - Next expected charge
pub async fn get_projected_entry(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<Option<ProjectedEntry>>, AppError> {
    let subscription = state.db.get_family_recurring(family_id, id)?;
    Ok(Json(subscription.projected_entry(today())))
}

/// GET /api/families/:family_id/subscriptions/summary - Monthly and yearly totals
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<SubscriptionSummary>, AppError> {
    Ok(Json(subscription_totals(&state.db, family_id, today())?))
}

/// GET /api/families/:family_id/subscriptions/calendar - Billing days of a month
pub async fn get_calendar(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<BillingCalendar>, AppError> {
    let today = today();
    let month = match query.month.as_deref() {
        Some(month) => NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
            .map_err(|_| AppError::bad_request(&format!("Invalid month '{}', expected YYYY-MM", month)))?,
        None => today,
    };
    Ok(Json(billing_calendar(&state.db, family_id, month, today)?))
}
