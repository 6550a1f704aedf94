//! Background scheduler for subscription entry generation
//!
//! Enabled via environment variable:
//!
//! - `CADENCE_GENERATE_INTERVAL_HOURS`: Interval in hours (e.g., "24" for daily)
//!
//! Each run creates the overdue entries of every active subscription whose
//! default account allows auto-generation.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use cadence_core::generate::generate_for_all;
use cadence_core::Database;

/// Environment variable holding the generation interval
pub const GENERATE_INTERVAL_ENV: &str = "CADENCE_GENERATE_INTERVAL_HOURS";

/// Configuration for scheduled generation
#[derive(Debug, Clone)]
pub struct GenerationScheduleConfig {
    /// Interval between runs in hours
    pub interval_hours: u64,
}

impl GenerationScheduleConfig {
    /// Parse configuration from the environment
    ///
    /// Returns None if scheduling is not configured
    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var(GENERATE_INTERVAL_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Option<Self> {
        let interval_hours: u64 = value.and_then(|s| s.trim().parse().ok())?;

        if interval_hours == 0 {
            warn!("{} is 0, scheduled generation disabled", GENERATE_INTERVAL_ENV);
            return None;
        }

        Some(Self { interval_hours })
    }
}

/// Start the generation scheduler as a background task
///
/// The first run happens immediately, then once per interval.
pub fn start_generation_scheduler(db: Database, config: GenerationScheduleConfig) {
    info!(
        interval_hours = config.interval_hours,
        "Starting generation scheduler"
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_hours * 3600));

        loop {
            ticker.tick().await;

            let db = db.clone();
            let today = Utc::now().date_naive();
            match tokio::task::spawn_blocking(move || generate_for_all(&db, today)).await {
                Ok(Ok(stats)) => info!(
                    families = stats.families_processed,
                    subscriptions = stats.subscriptions_processed,
                    created = stats.transactions_created,
                    "Scheduled generation completed"
                ),
                Ok(Err(e)) => error!(error = %e, "Scheduled generation failed"),
                Err(e) => error!(error = %e, "Scheduled generation task panicked"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_set() {
        assert!(GenerationScheduleConfig::parse(None).is_none());
    }

    #[test]
    fn test_config_zero_disables() {
        assert!(GenerationScheduleConfig::parse(Some("0")).is_none());
    }

    #[test]
    fn test_config_invalid() {
        assert!(GenerationScheduleConfig::parse(Some("daily")).is_none());
    }

    #[test]
    fn test_config_hours() {
        let config = GenerationScheduleConfig::parse(Some(" 24 ")).unwrap();
        assert_eq!(config.interval_hours, 24);
    }
}
