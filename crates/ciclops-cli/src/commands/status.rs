//! Status command implementation

use std::path::Path;

use anyhow::Result;
use ciclops_core::db::DB_KEY_ENV;
use ciclops_core::{AIBackend, AIClient};

use super::{load_config, open_db};

pub async fn cmd_status(db_path: &Path, config_path: Option<&Path>, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Ciclops Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    match load_config(config_path) {
        Ok(config) => println!(
            "   Config: {} store(s), weeks start {:?}",
            config.stores.len(),
            config.calendar.anchor()
        ),
        Err(e) => println!("   ❌ Config: {:#}", e),
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                println!();
                if let Ok(counts) = db.count_documents_by_status() {
                    let total: i64 = counts.iter().map(|(_, n)| n).sum();
                    println!("   Documents: {}", total);
                    for (status, n) in counts {
                        println!("     {:<10} {}", status.as_str(), n);
                    }
                }
                if let Ok(corrections) = db.list_corrections() {
                    println!("   Corrections: {}", corrections.len());
                }
                if let Ok(summaries) = db.list_summaries(None, None) {
                    println!("   Summaries: {}", summaries.len());
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    match AIClient::from_env() {
        Some(client) => {
            let info = client.info();
            let state = if client.health_check().await {
                "✅ connected"
            } else {
                "⚠️  not responding"
            };
            println!(
                "   AI fallback: {} {} at {} ({})",
                info.backend, info.model, info.host, state
            );
        }
        None => println!("   AI fallback: not configured (heuristics only)"),
    }

    println!();
    Ok(())
}
