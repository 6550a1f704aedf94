//! Family and account handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use super::require_family;
use crate::{AppError, AppState};
use cadence_core::models::{Account, Family};

/// GET /api/families - List all families
pub async fn list_families(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Family>>, AppError> {
    Ok(Json(state.db.list_families()?))
}

/// GET /api/families/:family_id - Get a single family
pub async fn get_family(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<Family>, AppError> {
    Ok(Json(require_family(&state, family_id)?))
}

/// GET /api/families/:family_id/accounts - List a family's accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Path(family_id): Path<i64>,
) -> Result<Json<Vec<Account>>, AppError> {
    require_family(&state, family_id)?;
    Ok(Json(state.db.list_accounts(family_id)?))
}
