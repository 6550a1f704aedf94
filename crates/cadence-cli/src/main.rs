//! Cadence CLI - Recurring transactions and subscription suggestions
//!
//! Usage:
//!   cadence init                          Initialize database and service catalog
//!   cadence import --account 1 --file CSV Import ledger entries
//!   cadence detect --family 1             Suggest subscriptions
//!   cadence serve --port 3000             Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Family { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(FamilyAction::List) => commands::cmd_family_list(&db),
                Some(FamilyAction::Add { name, currency }) => {
                    commands::cmd_family_add(&db, &name, &currency)
                }
            }
        }
        Commands::Account { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                AccountAction::List { family } => commands::cmd_account_list(&db, family),
                AccountAction::Add {
                    family,
                    name,
                    currency,
                    provider,
                } => commands::cmd_account_add(&db, family, &name, &currency, provider.as_deref()),
            }
        }
        Commands::Import { account, file } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_import(&db, account, &file)
        }
        Commands::Detect {
            family,
            offline,
            date,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let rates = if offline {
                None
            } else {
                commands::rate_source(&config)
            };
            commands::cmd_detect(&db, &config, family, date.as_deref(), rates.as_deref()).await
        }
        Commands::Suggestions { family, action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let icons = commands::icon_source(&config);
            let icons = icons.as_deref();
            match action {
                None | Some(SuggestionsAction::List) => {
                    commands::cmd_suggestions_list(&db, &config, family)
                }
                Some(SuggestionsAction::Approve { id, base_currency }) => {
                    commands::cmd_suggestions_approve(&db, &config, family, id, base_currency, icons)
                        .await
                }
                Some(SuggestionsAction::Dismiss { id }) => {
                    commands::cmd_suggestions_dismiss(&db, &config, family, id)
                }
                Some(SuggestionsAction::ApproveAll) => {
                    commands::cmd_suggestions_approve_all(&db, &config, family, icons).await
                }
                Some(SuggestionsAction::DismissAll) => {
                    commands::cmd_suggestions_dismiss_all(&db, &config, family)
                }
            }
        }
        Commands::Subscriptions { family, action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_subscriptions_list(&db, family, false),
                Some(SubscriptionsAction::List { active }) => {
                    commands::cmd_subscriptions_list(&db, family, active)
                }
                Some(SubscriptionsAction::Create(args)) => {
                    commands::cmd_subscriptions_create(&db, family, &args)
                }
                Some(SubscriptionsAction::Update(args)) => {
                    commands::cmd_subscriptions_update(&db, family, &args)
                }
                Some(SubscriptionsAction::Toggle { id }) => {
                    commands::cmd_subscriptions_toggle(&db, family, id)
                }
                Some(SubscriptionsAction::Record { id }) => {
                    commands::cmd_subscriptions_record(&db, family, id)
                }
                Some(SubscriptionsAction::Skip { id }) => {
                    commands::cmd_subscriptions_skip(&db, family, id)
                }
                Some(SubscriptionsAction::Promote { entry }) => {
                    commands::cmd_subscriptions_promote(&db, &config, family, entry)
                }
                Some(SubscriptionsAction::Delete { id }) => {
                    commands::cmd_subscriptions_delete(&db, family, id)
                }
            }
        }
        Commands::Totals { family, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_totals(&db, family, json)
        }
        Commands::Generate { date } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_generate(&db, date.as_deref())
        }
        Commands::Cleanup { family, date } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_cleanup(&db, &config, family, date.as_deref())
        }
        Commands::Services { category, query } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_services(&db, category.as_deref(), query.as_deref())
        }
        Commands::Rates { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                RatesAction::Set {
                    from,
                    to,
                    date,
                    rate,
                } => commands::cmd_rates_set(&db, &from, &to, &date, &rate),
                RatesAction::Get { from, to, date } => {
                    commands::cmd_rates_get(&db, &from, &to, &date)
                }
            }
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt, config).await,
    }
}
