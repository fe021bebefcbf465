//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Pipeline configuration from a file or the default layers
//! - `open_pipeline` - Database + configuration + optional AI fallback
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use ciclops_core::{AIClient, Database, Pipeline, PipelineConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the pipeline configuration from `path`, or the override/embedded default
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => PipelineConfig::load().context("Failed to load pipeline config"),
    }
}

/// Open the database and build a pipeline over it
pub fn open_pipeline(
    db_path: &Path,
    config_path: Option<&Path>,
    no_encrypt: bool,
) -> Result<Pipeline> {
    let config = load_config(config_path)?;
    let db = open_db(db_path, no_encrypt)?;
    Pipeline::new(db, &config, AIClient::from_env()).context("Failed to start pipeline")
}

pub fn cmd_init(db_path: &Path, config_path: Option<&Path>, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let config = load_config(config_path)?;
    let db = open_db(db_path, no_encrypt)?;

    let stores = db
        .sync_stores(&config.stores)
        .context("Failed to sync stores")?;
    println!("   Registered {} store(s)", stores);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Ingest an extraction: ciclops ingest --file document.json --process");
    println!("  2. Start the API: ciclops serve");

    Ok(())
}
