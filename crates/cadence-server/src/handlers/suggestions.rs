//! Subscription suggestion handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{require_family, today};
use crate::{AppError, AppState};
use cadence_core::icons::cache_service_icon;
use cadence_core::models::{RecurringTransaction, SubscriptionService};
use cadence_core::SubscriptionSuggestionService;

/// Response for a detection run
#[derive(Debug, Serialize)]
pub struct DetectResponse {
    /// Suggestions waiting for approval after the run
    pub suggested: usize,
}

/// Body for approving a suggestion
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApproveRequest {
    /// Rewrite amount and currency to the detected base price
    pub use_base_currency: bool,
}

/// Response for approve actions
#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub approved: Vec<RecurringTransaction>,
}

/// Response for dismiss-all
#[derive(Debug, Serialize)]
pub struct DismissAllResponse {
    pub dismissed: usize,
}

/// GET /api/families/:family_id/suggestions - Pending suggestions
pub async fn list_suggestions(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<Vec<RecurringTransaction>>, AppError> {
    require_family(&state, family_id)?;
    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    Ok(Json(service.suggestions(family_id)?))
}

/// POST /api/families/:family_id/suggestions/detect - Identify patterns and suggest subscriptions
pub async fn run_detection(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<DetectResponse>, AppError> {
    require_family(&state, family_id)?;

    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    let suggested = service
        .detect(family_id, today(), state.rates.as_deref())
        .await?;

    info!(family_id, suggested, "Detection requested via API");
    Ok(Json(DetectResponse { suggested }))
}

/// POST /api/families/:family_id/suggestions/:id/approve - Confirm a suggestion
pub async fn approve_suggestion(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<ApproveResponse>, AppError> {
    let Json(request) = body.unwrap_or_default();

    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    let approval = service.approve(family_id, id, request.use_base_currency)?;
    spawn_icon_downloads(&state, approval.services_needing_icons);

    Ok(Json(ApproveResponse {
        approved: approval.approved,
    }))
}

/// POST /api/families/:family_id/suggestions/:id/dismiss - Reject a suggestion for good
pub async fn dismiss_suggestion(
    State(state): State<Arc<AppState>>,
    Path((family_id, id)): Path<(i64, i64)>,
) -> Result<Json<RecurringTransaction>, AppError> {
    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    Ok(Json(service.dismiss(family_id, id)?))
}

/// POST /api/families/:family_id/suggestions/approve-all
pub async fn approve_all_suggestions(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<ApproveResponse>, AppError> {
    require_family(&state, family_id)?;

    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    let approval = service.approve_all(family_id)?;
    spawn_icon_downloads(&state, approval.services_needing_icons);

    Ok(Json(ApproveResponse {
        approved: approval.approved,
    }))
}

/// POST /api/families/:family_id/suggestions/dismiss-all
pub async fn dismiss_all_suggestions(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<DismissAllResponse>, AppError> {
    require_family(&state, family_id)?;

    let service = SubscriptionSuggestionService::new(&state.db, &state.cadence);
    let dismissed = service.dismiss_all(family_id)?;
    Ok(Json(DismissAllResponse { dismissed }))
}

/// Download missing service icons in the background
///
/// The approval is already committed; a failed download only logs.
fn spawn_icon_downloads(state: &AppState, services: Vec<SubscriptionService>) {
    let Some(source) = state.icons.clone() else {
        return;
    };

    for service in services {
        let db = state.db.clone();
        let source = source.clone();
        tokio::spawn(async move {
            cache_service_icon(&db, source.as_ref(), &service).await;
        });
    }
}
