//! Import command implementation

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use cadence_core::import::import_csv;
use cadence_core::Database;

pub fn cmd_import(db: &Database, account_id: i64, file: &Path) -> Result<()> {
    println!("📥 Importing {}...", file.display());

    let reader =
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let stats = import_csv(db, account_id, reader)?;

    println!("   Imported: {}", stats.imported);
    if stats.duplicates > 0 {
        println!("   Skipped {} already-imported rows", stats.duplicates);
    }
    println!();
    println!("Next: cadence detect --family <id>");

    Ok(())
}
