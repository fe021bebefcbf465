//! Ciclops CLI - Financial document extraction and categorization
//!
//! Usage:
//!   ciclops init                        Initialize database
//!   ciclops ingest --file doc.json      Ingest an extraction
//!   ciclops process 1                   Classify, map and evaluate a document
//!   ciclops summary CENTRO 2025-P4      Show a store's period summary
//!   ciclops serve --port 3000           Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

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

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, config, cli.no_encrypt),
        Commands::Ingest {
            file,
            csv,
            text,
            tenant,
            filename,
            process,
        } => {
            let source = match (file, csv) {
                (Some(file), _) => commands::ExtractionSource::Json(file),
                (None, Some(csv)) => commands::ExtractionSource::Csv {
                    items: csv,
                    text,
                    tenant: tenant.unwrap_or_else(|| "default".to_string()),
                    filename,
                },
                (None, None) => anyhow::bail!("Provide --file or --csv"),
            };
            let input = commands::load_extraction(&source)?;
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_ingest(&pipeline, &input, process).await
        }
        Commands::Process { id } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_process(&pipeline, id).await
        }
        Commands::Reprocess { id } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_reprocess(&pipeline, id).await
        }
        Commands::Documents { status, limit } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_documents_list(&pipeline, status.as_deref(), limit)
        }
        Commands::Corrections { action } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            match action {
                None | Some(CorrectionsAction::List) => commands::cmd_corrections_list(&pipeline),
                Some(CorrectionsAction::Add {
                    label,
                    category,
                    confidence,
                }) => commands::cmd_corrections_add(&pipeline, &label, &category, confidence),
                Some(CorrectionsAction::Store {
                    label,
                    store,
                    confidence,
                }) => commands::cmd_corrections_store(&pipeline, &label, &store, confidence),
                Some(CorrectionsAction::Log) => commands::cmd_corrections_log(&pipeline),
            }
        }
        Commands::Summary {
            store,
            period,
            json,
        } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_summary(&pipeline, &store, &period, json)
        }
        Commands::Summaries { store, year } => {
            let pipeline = commands::open_pipeline(&cli.db, config, cli.no_encrypt)?;
            commands::cmd_summaries_list(&pipeline, store.as_deref(), year)
        }
        Commands::Period { date } => {
            let config = commands::load_config(config)?;
            commands::cmd_period(&config.calendar, date.as_deref())
        }
        Commands::Periods { year } => {
            let config = commands::load_config(config)?;
            commands::cmd_periods(&config.calendar, year)
        }
        Commands::Stores => {
            let config = commands::load_config(config)?;
            commands::cmd_stores(&config)
        }
        Commands::Status => commands::cmd_status(&cli.db, config, cli.no_encrypt).await,
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Serve {
            port,
            host,
            allowed_origins,
        } => {
            commands::cmd_serve(
                &cli.db,
                config,
                &host,
                port,
                allowed_origins,
                cli.no_encrypt,
            )
            .await
        }
    }
}
