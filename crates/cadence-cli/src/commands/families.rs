//! Family and account command implementations

use anyhow::{bail, Result};
use cadence_core::models::AccountProvider;
use cadence_core::Database;

pub fn cmd_family_list(db: &Database) -> Result<()> {
    let families = db.list_families()?;

    if families.is_empty() {
        println!("No families yet. Add one with:");
        println!("  cadence family add Household --currency USD");
        return Ok(());
    }

    println!();
    println!("👪 Families");
    println!("   ─────────────────────────────");
    for family in families {
        println!("   #{:<4} {:24} {}", family.id, family.name, family.currency);
    }

    Ok(())
}

pub fn cmd_family_add(db: &Database, name: &str, currency: &str) -> Result<()> {
    let id = db.create_family(name, currency)?;
    println!("✅ Created family #{}: {} ({})", id, name, currency.to_uppercase());
    Ok(())
}

pub fn cmd_account_list(db: &Database, family_id: i64) -> Result<()> {
    let accounts = db.list_accounts(family_id)?;

    if accounts.is_empty() {
        println!("No accounts for family #{}.", family_id);
        return Ok(());
    }

    println!();
    println!("🏦 Accounts");
    println!("   ─────────────────────────────");
    for account in accounts {
        let linked = account
            .provider
            .map(|p| format!(" (linked: {})", p.as_str()))
            .unwrap_or_default();
        println!(
            "   #{:<4} {:24} {}{}",
            account.id, account.name, account.currency, linked
        );
    }

    Ok(())
}

pub fn cmd_account_add(
    db: &Database,
    family_id: i64,
    name: &str,
    currency: &str,
    provider: Option<&str>,
) -> Result<()> {
    let provider = match provider {
        Some(p) => match AccountProvider::parse(p) {
            Some(provider) => Some(provider),
            None => bail!("Unknown provider '{}'. Use plaid, simple_fin or lunchflow", p),
        },
        None => None,
    };

    let id = db.upsert_account(family_id, name, currency, provider)?;
    println!("✅ Account #{}: {}", id, name);
    if provider.is_some() {
        println!("   Linked accounts never receive generated entries");
    }
    Ok(())
}
