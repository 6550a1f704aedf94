//! Subscription command implementations

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;

use cadence_core::db::PatternFilter;
use cadence_core::generate::{record_transaction, skip_occurrence};
use cadence_core::models::{BillingCycle, NewRecurringTransaction, PatternStatus};
use cadence_core::recurring::{
    create_from_entry, create_subscription, toggle_status, update_subscription,
};
use cadence_core::summary::subscription_totals;
use cadence_core::{CadenceConfig, Database, SubscriptionUpdate};

use super::{parse_date, truncate};
use crate::cli::{CreateSubscriptionArgs, UpdateSubscriptionArgs};

fn parse_amount(s: &str) -> Result<Decimal> {
    s.trim()
        .parse()
        .with_context(|| format!("Invalid amount '{}'", s))
}

fn parse_cycle(s: &str) -> Result<BillingCycle> {
    BillingCycle::parse(&s.to_lowercase())
        .ok_or_else(|| anyhow!("Invalid billing cycle '{}'. Use monthly or yearly", s))
}

pub fn cmd_subscriptions_list(db: &Database, family_id: i64, active_only: bool) -> Result<()> {
    let filter = if active_only {
        PatternFilter::ActiveSubscriptions
    } else {
        PatternFilter::Subscriptions
    };
    let subscriptions = db.list_recurring(family_id, filter)?;

    if subscriptions.is_empty() {
        println!("No subscriptions yet. Run:");
        println!("  cadence detect --family {}", family_id);
        return Ok(());
    }

    let today = Utc::now().date_naive();

    println!();
    println!("📋 Subscriptions");
    println!("   ─────────────────────────────────────────────────────────────");

    for sub in subscriptions {
        let status_icon = match sub.status {
            PatternStatus::Active if sub.is_overdue(today) => "⏰",
            PatternStatus::Active => "✅",
            PatternStatus::Inactive => "⏸️ ",
        };

        println!(
            "   {} #{:<4} {:24} │ {:>10} {}/{:<7} │ next {}",
            status_icon,
            sub.id,
            truncate(sub.display_name(), 24),
            sub.amount,
            sub.currency,
            sub.billing_cycle.as_str(),
            sub.next_expected_date
        );
    }

    Ok(())
}

pub fn cmd_subscriptions_create(
    db: &Database,
    family_id: i64,
    args: &CreateSubscriptionArgs,
) -> Result<()> {
    let last = parse_date(&args.last)?;
    let billing_cycle = parse_cycle(&args.cycle)?;

    let subscription_service_id = match args.service.as_deref() {
        Some(slug) => Some(
            db.get_service_by_slug(slug)?
                .ok_or_else(|| anyhow!("Unknown service '{}'. See: cadence services", slug))?
                .id,
        ),
        None => None,
    };

    let new = NewRecurringTransaction {
        name: Some(args.name.clone()),
        amount: parse_amount(&args.amount)?,
        currency: args.currency.clone(),
        expected_day_of_month: last.day(),
        expected_month: (billing_cycle == BillingCycle::Yearly).then(|| last.month()),
        billing_cycle,
        manual: true,
        last_occurrence_date: last,
        occurrence_count: 1,
        default_account_id: args.account,
        subscription_service_id,
        ..Default::default()
    };

    let today = Utc::now().date_naive();
    let id = create_subscription(db, family_id, &new, today)?;
    let created = db.get_family_recurring(family_id, id)?;

    println!("✅ Created subscription #{}: {}", id, args.name);
    println!("   Next charge: {}", created.next_expected_date);
    if args.account.is_none() {
        println!("   💡 Set --account to have entries generated automatically");
    }

    Ok(())
}

pub fn cmd_subscriptions_update(
    db: &Database,
    family_id: i64,
    args: &UpdateSubscriptionArgs,
) -> Result<()> {
    let update = SubscriptionUpdate {
        name: args.name.clone(),
        amount: args.amount.as_deref().map(parse_amount).transpose()?,
        currency: args.currency.clone(),
        billing_cycle: args.cycle.as_deref().map(parse_cycle).transpose()?,
        expected_day_of_month: args.day,
        expected_month: args.month,
        default_account_id: args.account,
        subscription_service_id: None,
        next_expected_date: args.next.as_deref().map(parse_date).transpose()?,
    };

    let today = Utc::now().date_naive();
    let updated = update_subscription(db, family_id, args.id, &update, today)?;

    println!("✅ Updated #{}: {}", updated.id, updated.display_name());
    println!(
        "   {} {} {} │ next {}",
        updated.amount,
        updated.currency,
        updated.billing_cycle.as_str(),
        updated.next_expected_date
    );

    Ok(())
}

pub fn cmd_subscriptions_toggle(db: &Database, family_id: i64, id: i64) -> Result<()> {
    match toggle_status(db, family_id, id)? {
        PatternStatus::Active => println!("▶️  Subscription #{} resumed", id),
        PatternStatus::Inactive => println!("⏸️  Subscription #{} paused", id),
    }
    Ok(())
}

pub fn cmd_subscriptions_record(db: &Database, family_id: i64, id: i64) -> Result<()> {
    match record_transaction(db, family_id, id)? {
        Some(entry_id) => println!("✅ Recorded entry #{} for subscription #{}", entry_id, id),
        None => println!("   This period already has an entry; schedule advanced"),
    }
    Ok(())
}

pub fn cmd_subscriptions_skip(db: &Database, family_id: i64, id: i64) -> Result<()> {
    let next = skip_occurrence(db, family_id, id)?;
    println!("⏭️  Skipped. Next charge: {}", next);
    Ok(())
}

pub fn cmd_subscriptions_promote(
    db: &Database,
    config: &CadenceConfig,
    family_id: i64,
    entry_id: i64,
) -> Result<()> {
    let today = Utc::now().date_naive();
    let id = create_from_entry(db, family_id, entry_id, today, config)?;
    let pattern = db.get_family_recurring(family_id, id)?;

    println!("✅ Tracking #{}: {}", id, pattern.display_name());
    if let (Some(min), Some(max)) = (pattern.expected_amount_min, pattern.expected_amount_max) {
        println!(
            "   Seen {} time(s), {} to {} {}",
            pattern.occurrence_count, min, max, pattern.currency
        );
    }

    Ok(())
}

pub fn cmd_subscriptions_delete(db: &Database, family_id: i64, id: i64) -> Result<()> {
    db.delete_recurring(family_id, id)?;
    println!("🗑️  Deleted subscription #{}", id);
    Ok(())
}

pub fn cmd_totals(db: &Database, family_id: i64, json: bool) -> Result<()> {
    let today = Utc::now().date_naive();
    let summary = subscription_totals(db, family_id, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.count == 0 {
        println!("No active subscriptions.");
        return Ok(());
    }

    println!();
    println!("💰 Subscription Totals");
    println!("   ─────────────────────────────");
    println!("   Active:  {}", summary.count);
    println!("   Monthly: {} {}", summary.monthly_total, summary.currency);
    println!("   Yearly:  {} {}", summary.yearly_total, summary.currency);
    println!();
    for category in &summary.categories {
        println!(
            "   {:12} {:>3} │ {:>10} {}/mo",
            category.category, category.count, category.monthly_total, summary.currency
        );
    }

    Ok(())
}
