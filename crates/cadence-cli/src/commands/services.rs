//! Service catalog and exchange rate commands

use anyhow::{anyhow, Context, Result};
use cadence_core::exchange::parse_currency;
use cadence_core::models::ServiceCategory;
use cadence_core::{Database, ExchangeRateLookup};
use rust_decimal::Decimal;

use super::parse_date;

pub fn cmd_services(db: &Database, category: Option<&str>, query: Option<&str>) -> Result<()> {
    let services = match (query, category) {
        (Some(q), _) => db.search_services(q)?,
        (None, Some(c)) => {
            let category = ServiceCategory::parse(&c.to_lowercase())
                .ok_or_else(|| anyhow!("Unknown category '{}'", c))?;
            db.list_services(Some(category))?
        }
        (None, None) => db.list_services(None)?,
    };

    if services.is_empty() {
        println!("No matching services.");
        return Ok(());
    }

    println!();
    println!("📚 Subscription Services");
    println!("   ─────────────────────────────────────────────────────────────");
    for service in services {
        let category = service.category.map(|c| c.as_str()).unwrap_or("-");
        let icon = if service.icon_cached { "🖼️ " } else { "  " };
        println!(
            "   {} {:20} {:24} {:10} {}",
            icon, service.slug, service.domain, category, service.color
        );
    }

    Ok(())
}

pub fn cmd_rates_set(db: &Database, from: &str, to: &str, date: &str, rate: &str) -> Result<()> {
    let from = parse_currency(from)?;
    let to = parse_currency(to)?;
    let date = parse_date(date)?;
    let rate: Decimal = rate
        .trim()
        .parse()
        .with_context(|| format!("Invalid rate '{}'", rate))?;

    db.upsert_exchange_rate(&from, &to, date, rate)?;
    println!("✅ {} 1 {} = {} {}", date, from, rate, to);
    Ok(())
}

pub fn cmd_rates_get(db: &Database, from: &str, to: &str, date: &str) -> Result<()> {
    let from = parse_currency(from)?;
    let to = parse_currency(to)?;
    let date = parse_date(date)?;

    match db.rate(&from, &to, date) {
        Some(rate) => println!("{} 1 {} = {} {}", date, from, rate, to),
        None => println!("No cached rate for {}/{} on {}", from, to, date),
    }
    Ok(())
}
