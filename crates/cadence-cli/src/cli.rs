//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Cadence - Recurring transactions and subscription suggestions
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Find recurring charges and keep subscriptions on schedule", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "cadence.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CADENCE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Detection config file (defaults to $CADENCE_CONFIG, then the user
    /// config directory, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the service catalog
    Init,

    /// Manage families
    Family {
        #[command(subcommand)]
        action: Option<FamilyAction>,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Import ledger entries from CSV (date,amount,currency,name,merchant)
    Import {
        /// Account to import into
        #[arg(short, long)]
        account: i64,

        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Identify recurring patterns and suggest subscriptions
    Detect {
        /// Family to scan
        #[arg(short, long)]
        family: i64,

        /// Use cached exchange rates only
        #[arg(long)]
        offline: bool,

        /// Run as of this date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Review subscription suggestions
    Suggestions {
        /// Family to act on
        #[arg(short, long)]
        family: i64,

        #[command(subcommand)]
        action: Option<SuggestionsAction>,
    },

    /// Manage confirmed subscriptions
    Subscriptions {
        /// Family to act on
        #[arg(short, long)]
        family: i64,

        #[command(subcommand)]
        action: Option<SubscriptionsAction>,
    },

    /// Show monthly and yearly subscription totals
    Totals {
        #[arg(short, long)]
        family: i64,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create overdue subscription entries for every family
    Generate {
        /// Run as of this date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Deactivate patterns that stopped charging
    Cleanup {
        #[arg(short, long)]
        family: i64,

        /// Run as of this date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Browse the subscription service catalog
    Services {
        /// Filter by category (streaming, music, software, ...)
        #[arg(short, long)]
        category: Option<String>,

        /// Search by name
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Manage cached exchange rates
    Rates {
        #[command(subcommand)]
        action: RatesAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, requests need a key from CADENCE_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum FamilyAction {
    /// List families
    List,
    /// Add a family
    Add {
        /// Family name
        name: String,

        /// Home currency (ISO 4217)
        #[arg(short, long, default_value = "USD")]
        currency: String,
    },
}

#[derive(Subcommand)]
pub enum AccountAction {
    /// List a family's accounts
    List {
        #[arg(short, long)]
        family: i64,
    },
    /// Add an account (returns the existing one if the name is taken)
    Add {
        #[arg(short, long)]
        family: i64,

        /// Account name
        name: String,

        /// Account currency (ISO 4217)
        #[arg(short, long, default_value = "USD")]
        currency: String,

        /// Sync provider for linked accounts (plaid, simple_fin, lunchflow)
        #[arg(long)]
        provider: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SuggestionsAction {
    /// List pending suggestions
    List,
    /// Approve a suggestion
    Approve {
        /// Suggestion ID
        id: i64,

        /// Track the detected base currency price instead of the charged amount
        #[arg(long)]
        base_currency: bool,
    },
    /// Dismiss a suggestion permanently
    Dismiss {
        /// Suggestion ID
        id: i64,
    },
    /// Approve every pending suggestion
    ApproveAll,
    /// Dismiss every pending suggestion
    DismissAll,
}

#[derive(Subcommand)]
pub enum SubscriptionsAction {
    /// List subscriptions
    List {
        /// Only active subscriptions
        #[arg(long)]
        active: bool,
    },
    /// Add a subscription by hand
    Create(CreateSubscriptionArgs),
    /// Change billing details
    Update(UpdateSubscriptionArgs),
    /// Pause or resume a subscription
    Toggle { id: i64 },
    /// Create the pending entry now
    Record { id: i64 },
    /// Skip the pending occurrence
    Skip { id: i64 },
    /// Start tracking an existing entry as recurring
    Promote {
        /// Entry ID
        entry: i64,
    },
    /// Delete a subscription
    Delete { id: i64 },
}

#[derive(Args)]
pub struct CreateSubscriptionArgs {
    /// Subscription name
    pub name: String,

    /// Amount per charge
    #[arg(short, long)]
    pub amount: String,

    /// Currency (ISO 4217)
    #[arg(short, long, default_value = "USD")]
    pub currency: String,

    /// Billing cycle: monthly or yearly
    #[arg(long, default_value = "monthly")]
    pub cycle: String,

    /// Date of the last charge (YYYY-MM-DD); its day becomes the billing day
    #[arg(long)]
    pub last: String,

    /// Account that receives generated entries
    #[arg(long)]
    pub account: Option<i64>,

    /// Catalog service slug
    #[arg(long)]
    pub service: Option<String>,
}

#[derive(Args)]
pub struct UpdateSubscriptionArgs {
    /// Subscription ID
    pub id: i64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub amount: Option<String>,

    #[arg(short, long)]
    pub currency: Option<String>,

    /// Billing cycle: monthly or yearly
    #[arg(long)]
    pub cycle: Option<String>,

    /// Billing day of month
    #[arg(long)]
    pub day: Option<u32>,

    /// Billing month for yearly subscriptions
    #[arg(long)]
    pub month: Option<u32>,

    /// Account that receives generated entries
    #[arg(long)]
    pub account: Option<i64>,

    /// Next charge date (YYYY-MM-DD)
    #[arg(long)]
    pub next: Option<String>,
}

#[derive(Subcommand)]
pub enum RatesAction {
    /// Store a rate: 1 FROM = RATE TO
    Set {
        from: String,
        to: String,
        /// Rate date (YYYY-MM-DD)
        date: String,
        rate: String,
    },
    /// Look up a cached rate (either direction)
    Get {
        from: String,
        to: String,
        /// Rate date (YYYY-MM-DD)
        date: String,
    },
}
