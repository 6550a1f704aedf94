//! Background job handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use super::today;
use crate::{AppError, AppState};
use cadence_core::generate::{generate_for_all, GenerationStats};

/// POST /api/generate - Create overdue subscription entries for every family
pub async fn run_generation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GenerationStats>, AppError> {
    let db = state.db.clone();
    let today = today();
    let stats = tokio::task::spawn_blocking(move || generate_for_all(&db, today)).await??;

    info!(
        families = stats.families_processed,
        created = stats.transactions_created,
        "Generation requested via API"
    );
    Ok(Json(stats))
}
