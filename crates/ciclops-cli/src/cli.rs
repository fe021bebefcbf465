//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ciclops - Classify and categorize franchise financial documents
#[derive(Parser)]
#[command(name = "ciclops")]
#[command(about = "Extraction and categorization pipeline for financial documents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "ciclops.db", global = true)]
    pub db: PathBuf,

    /// Pipeline configuration file (defaults to the data-dir override, then the built-in config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CICLOPS_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and sync the configured stores
    Init,

    /// Ingest an extraction (JSON file, or CSV line items plus metadata)
    Ingest {
        /// Extraction JSON file: {raw_text, line_items, filename_hint, tenant_id, uploaded_at}
        #[arg(short, long, conflicts_with = "csv")]
        file: Option<PathBuf>,

        /// CSV file of `label,amount` line items
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Text file with the document's extracted text (with --csv)
        #[arg(long, requires = "csv")]
        text: Option<PathBuf>,

        /// Tenant the document belongs to (with --csv)
        #[arg(long, requires = "csv")]
        tenant: Option<String>,

        /// Original filename, used as a period hint (with --csv)
        #[arg(long, requires = "csv")]
        filename: Option<String>,

        /// Process the document right after ingesting
        #[arg(long)]
        process: bool,
    },

    /// Process a pending document
    Process {
        /// Document ID
        id: i64,
    },

    /// Re-run the pipeline on a document, replacing its summaries
    Reprocess {
        /// Document ID
        id: i64,
    },

    /// List documents
    Documents {
        /// Status filter: pending, processed, failed, cancelled
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum documents to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Manage corrections (list, add, store, log)
    Corrections {
        #[command(subcommand)]
        action: Option<CorrectionsAction>,
    },

    /// Show the summary for a store and fiscal period
    Summary {
        /// Store ID (e.g., CENTRO)
        store: String,

        /// Fiscal period key (e.g., 2025-P4)
        period: String,

        /// Print the raw JSON summary
        #[arg(long)]
        json: bool,
    },

    /// List stored summaries
    Summaries {
        /// Only this store
        #[arg(short, long)]
        store: Option<String>,

        /// Only this fiscal year
        #[arg(short, long)]
        year: Option<i32>,
    },

    /// Fiscal period and week containing a date
    Period {
        /// Date (YYYY-MM-DD), defaults to today
        date: Option<String>,
    },

    /// All periods of a fiscal year
    Periods {
        /// Fiscal year
        year: i32,
    },

    /// List registered stores
    Stores,

    /// Show database, memory and AI backend status
    Status,

    /// Manage AI prompts (list, show, path)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum CorrectionsAction {
    /// List learned corrections
    List,

    /// Teach the mapper that a label belongs to a category
    Add {
        /// Label as it appears in documents (e.g., "SERV. LUZ")
        label: String,

        /// Category path or leaf name (e.g., expenses.servicios.electricidad or electricidad)
        category: String,

        /// Confidence between 0 and 1
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Teach the classifier that a label names a store
    Store {
        /// Label as it appears in documents (e.g., "5 FEB")
        label: String,

        /// Store ID (e.g., 5_FEBRERO)
        store: String,

        /// Confidence between 0 and 1
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Show the correction event log
    Log,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., classify_document)
        prompt_id: String,
    },

    /// Show the override directory path
    Path,
}
