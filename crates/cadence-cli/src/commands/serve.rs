//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use cadence_core::CadenceConfig;
use cadence_server::{parse_api_keys, GenerationScheduleConfig, API_KEYS_ENV};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    cadence: CadenceConfig,
) -> Result<()> {
    println!("🚀 Starting Cadence web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let api_keys = parse_api_keys(&std::env::var(API_KEYS_ENV).unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   ⚠️  No API keys configured ({}); all requests will be rejected", API_KEYS_ENV);
    } else {
        println!("   🔑 API keys: {} configured ({})", api_keys.len(), API_KEYS_ENV);
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    match GenerationScheduleConfig::from_env() {
        Some(schedule) => println!("   ⏱️  Generation: every {} hours", schedule.interval_hours),
        None => println!("   ⏱️  Generation: manual (set CADENCE_GENERATE_INTERVAL_HOURS)"),
    }
    if !cadence.icons.enabled() {
        println!("   🖼️  Icons: disabled (no brandfetch_client_id)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    // Ensure the catalog is seeded (idempotent)
    db.seed_default_services()
        .context("Failed to seed subscription services")?;

    let config = cadence_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        api_keys,
    };

    cadence_server::serve_with_config(db, host, port, config, cadence).await?;

    Ok(())
}
