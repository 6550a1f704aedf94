//! Detection and suggestion review commands

use anyhow::Result;
use cadence_core::icons::cache_service_icon;
use cadence_core::models::{RecurringTransaction, SubscriptionService};
use cadence_core::{CadenceConfig, Database, IconSource, RateSource, SubscriptionSuggestionService};

use super::{date_or_today, truncate};

pub async fn cmd_detect(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    date: Option<&str>,
    rates: Option<&dyn RateSource>,
) -> Result<()> {
    let today = date_or_today(date)?;
    println!("🔍 Looking for subscriptions (as of {})...", today);
    if rates.is_none() {
        println!("   Using cached exchange rates only");
    }

    let service = SubscriptionSuggestionService::new(db, config);
    let suggested = service.detect(family_id, today, rates).await?;

    println!();
    if suggested > 0 {
        println!("💡 {} suggestion(s) waiting for review:", suggested);
        print_suggestions(&service.suggestions(family_id)?);
        println!();
        println!("Approve with: cadence suggestions --family {} approve <id>", family_id);
    } else {
        println!("✅ No new subscriptions found.");
    }

    Ok(())
}

pub fn cmd_suggestions_list(db: &Database, config: &CadenceConfig, family_id: i64) -> Result<()> {
    let suggestions = SubscriptionSuggestionService::new(db, config).suggestions(family_id)?;

    if suggestions.is_empty() {
        println!("No pending suggestions. Run:");
        println!("  cadence detect --family {}", family_id);
        return Ok(());
    }

    println!();
    println!("💡 Suggested Subscriptions");
    print_suggestions(&suggestions);
    Ok(())
}

fn print_suggestions(suggestions: &[RecurringTransaction]) {
    println!("   ─────────────────────────────────────────────────────────────");
    for s in suggestions {
        let base = match (&s.base_currency, s.base_amount) {
            (Some(currency), Some(amount)) => format!(" (≈ {} {})", amount, currency),
            _ => String::new(),
        };
        println!(
            "   #{:<4} {:24} │ {:>10} {}/{:<7} │ day {:>2}{}",
            s.id,
            truncate(s.display_name(), 24),
            s.amount,
            s.currency,
            s.billing_cycle.as_str(),
            s.expected_day_of_month,
            base
        );
    }
}

pub async fn cmd_suggestions_approve(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    id: i64,
    use_base_currency: bool,
    icons: Option<&dyn IconSource>,
) -> Result<()> {
    let service = SubscriptionSuggestionService::new(db, config);
    let approval = service.approve(family_id, id, use_base_currency)?;

    for pattern in &approval.approved {
        println!(
            "✅ Approved #{}: {} ({} {})",
            pattern.id,
            pattern.display_name(),
            pattern.amount,
            pattern.currency
        );
    }
    cache_icons(db, icons, &approval.services_needing_icons).await;

    Ok(())
}

pub fn cmd_suggestions_dismiss(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    id: i64,
) -> Result<()> {
    let pattern = SubscriptionSuggestionService::new(db, config).dismiss(family_id, id)?;
    println!("🚫 Dismissed #{}: {}", pattern.id, pattern.display_name());
    println!("   It will not be suggested again.");
    Ok(())
}

pub async fn cmd_suggestions_approve_all(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    icons: Option<&dyn IconSource>,
) -> Result<()> {
    let approval = SubscriptionSuggestionService::new(db, config).approve_all(family_id)?;
    println!("✅ Approved {} suggestion(s)", approval.approved.len());
    cache_icons(db, icons, &approval.services_needing_icons).await;
    Ok(())
}

pub fn cmd_suggestions_dismiss_all(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
) -> Result<()> {
    let dismissed = SubscriptionSuggestionService::new(db, config).dismiss_all(family_id)?;
    println!("🚫 Dismissed {} suggestion(s)", dismissed);
    Ok(())
}

/// Download icons inline; the CLI exits before a background task would finish
async fn cache_icons(
    db: &Database,
    icons: Option<&dyn IconSource>,
    services: &[SubscriptionService],
) {
    let Some(source) = icons else {
        return;
    };

    let mut cached = 0;
    for service in services {
        if cache_service_icon(db, source, service).await {
            cached += 1;
        }
    }
    if cached > 0 {
        println!("   🖼️  Cached {} service icon(s)", cached);
    }
}
