//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, load_config, open_pipeline) and init
//! - `documents` - Ingest, process, reprocess and list documents
//! - `corrections` - Category and store corrections
//! - `summaries` - Per-store, per-period summaries
//! - `fiscal` - Fiscal calendar lookups and the store registry
//! - `prompts` - Prompt library management commands
//! - `serve` - Web server command
//! - `status` - Database, memory and AI backend status

pub mod core;
pub mod corrections;
pub mod documents;
pub mod fiscal;
pub mod prompts;
pub mod serve;
pub mod status;
pub mod summaries;

// Re-export command functions for main.rs
pub use core::*;
pub use corrections::*;
pub use documents::*;
pub use fiscal::*;
pub use prompts::*;
pub use serve::*;
pub use status::*;
pub use summaries::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
