//! Subscription service catalog handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState};
use cadence_core::models::{ServiceCategory, SubscriptionService};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceQuery {
    pub category: Option<String>,
    /// Case-insensitive name search
    pub q: Option<String>,
}

/// GET /api/services - Known subscription services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ServiceQuery>,
) -> Result<Json<Vec<SubscriptionService>>, AppError> {
    if let Some(q) = params.q.as_deref().filter(|q| !q.trim().is_empty()) {
        return Ok(Json(state.db.search_services(q.trim())?));
    }

    let category = match params.category.as_deref() {
        Some(c) => Some(
            ServiceCategory::parse(c)
                .ok_or_else(|| AppError::bad_request(&format!("Unknown category '{}'", c)))?,
        ),
        None => None,
    };

    Ok(Json(state.db.list_services(category)?))
}

/// GET /api/services/:id/icon - Cached service icon
pub async fn get_service_icon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let (bytes, content_type) = state
        .db
        .get_service_icon(id)?
        .ok_or_else(|| AppError::not_found(&format!("No icon cached for service {}", id)))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(bytes))?)
}
