//! Generation and cleanup commands

use anyhow::Result;
use cadence_core::generate::generate_for_all;
use cadence_core::{CadenceConfig, Cleaner, Database};

use super::date_or_today;

pub fn cmd_generate(db: &Database, date: Option<&str>) -> Result<()> {
    let today = date_or_today(date)?;
    println!("⚙️  Generating subscription entries due by {}...", today);

    let stats = generate_for_all(db, today)?;

    println!("   Families:      {}", stats.families_processed);
    println!("   Subscriptions: {}", stats.subscriptions_processed);
    println!("   Entries:       {}", stats.transactions_created);

    Ok(())
}

pub fn cmd_cleanup(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    date: Option<&str>,
) -> Result<()> {
    let today = date_or_today(date)?;
    let deactivated = Cleaner::new(db, &config.identification).cleanup_stale(family_id, today)?;

    if deactivated > 0 {
        println!("🧹 Deactivated {} stale pattern(s)", deactivated);
    } else {
        println!("✅ No stale patterns");
    }

    Ok(())
}
