//! Recurring pattern handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{require_family, today};
use crate::{AppError, AppState};
use cadence_core::db::PatternFilter;
use cadence_core::models::RecurringTransaction;
use cadence_core::recurring::{create_from_entry, Cleaner, IdentificationResults, Identifier};

/// Query params for listing patterns
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListRecurringQuery {
    /// all (default), suggested, dismissed, subscriptions, active, candidates
    pub filter: Option<String>,
}

fn parse_filter(filter: Option<&str>) -> Result<PatternFilter, AppError> {
    match filter.unwrap_or("all") {
        "all" => Ok(PatternFilter::All),
        "suggested" => Ok(PatternFilter::Suggested),
        "dismissed" => Ok(PatternFilter::Dismissed),
        "subscriptions" => Ok(PatternFilter::Subscriptions),
        "active" => Ok(PatternFilter::ActiveSubscriptions),
        "candidates" => Ok(PatternFilter::Candidates),
        other => Err(AppError::bad_request(&format!("Unknown filter '{}'", other))),
    }
}

/// Response for cleanup
#[derive(Serialize)]
pub struct CleanupResponse {
    pub deactivated: usize,
}

/// Response for promoting an entry
#[derive(Serialize)]
pub struct PromoteResponse {
    pub id: i64,
}

/// GET /api/families/:family_id/recurring - List patterns
pub async fn list_recurring(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
    Query(query): Query<ListRecurringQuery>,
) -> Result<Json<Vec<RecurringTransaction>>, AppError> {
    require_family(&state, family_id)?;
    let filter = parse_filter(query.filter.as_deref())?;
    Ok(Json(state.db.list_recurring(family_id, filter)?))
}

/// POST /api/families/:family_id/recurring/identify - Scan history for patterns
pub async fn identify_patterns(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<IdentificationResults>, AppError> {
    require_family(&state, family_id)?;
    let results = Identifier::new(&state.db, &state.cadence).identify_patterns(family_id, today())?;
    Ok(Json(results))
}

/// POST /api/families/:family_id/recurring/cleanup - Deactivate stale patterns
pub async fn cleanup_patterns(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<CleanupResponse>, AppError> {
    require_family(&state, family_id)?;
    let deactivated =
        Cleaner::new(&state.db, &state.cadence.identification).cleanup_stale(family_id, today())?;
    info!(family_id, deactivated, "Cleanup requested via API");
    Ok(Json(CleanupResponse { deactivated }))
}

/// POST /api/families/:family_id/entries/:id/promote - Track an entry as recurring
pub async fn promote_entry(
    State(state): State<Arc<AppState>>,
    Path((family_id, entry_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<PromoteResponse>), AppError> {
    let id = create_from_entry(&state.db, family_id, entry_id, today(), &state.cadence)?;
    Ok((StatusCode::CREATED, Json(PromoteResponse { id })))
}
