//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod families;
pub mod jobs;
pub mod recurring;
pub mod services;
pub mod subscriptions;
pub mod suggestions;

// Re-export all handlers for use in router
pub use families::*;
pub use jobs::*;
pub use recurring::*;
pub use services::*;
pub use subscriptions::*;
pub use suggestions::*;

use chrono::{NaiveDate, Utc};

use crate::{AppError, AppState};
use cadence_core::models::Family;

/// Current date used for scheduling decisions
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Load a family or fail with 404
pub(crate) fn require_family(state: &AppState, family_id: i64) -> Result<Family, AppError> {
    state
        .db
        .get_family(family_id)?
        .ok_or_else(|| AppError::not_found(&format!("Family {} not found", family_id)))
}
