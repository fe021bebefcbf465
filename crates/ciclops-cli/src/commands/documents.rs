//! Document command implementations (ingest, process, reprocess, list)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use ciclops_core::extraction::parse_line_items_csv;
use ciclops_core::models::DocumentStatus;
use ciclops_core::{CancelToken, ExtractionInput, Pipeline, ProcessingReport};

use super::truncate;

/// Where an extraction comes from
pub enum ExtractionSource {
    /// A complete extraction JSON document
    Json(PathBuf),
    /// `label,amount` rows with metadata from flags
    Csv {
        items: PathBuf,
        text: Option<PathBuf>,
        tenant: String,
        filename: Option<String>,
    },
}

/// Read an extraction from disk
pub fn load_extraction(source: &ExtractionSource) -> Result<ExtractionInput> {
    match source {
        ExtractionSource::Json(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid extraction JSON in {}", path.display()))
        }
        ExtractionSource::Csv {
            items,
            text,
            tenant,
            filename,
        } => {
            let file = fs::File::open(items)
                .with_context(|| format!("Failed to open {}", items.display()))?;
            let line_items = parse_line_items_csv(file)
                .with_context(|| format!("Failed to parse {}", items.display()))?;
            let raw_text = match text {
                Some(path) => fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => String::new(),
            };
            let filename_hint = filename
                .clone()
                .or_else(|| file_name(items));
            Ok(ExtractionInput {
                raw_text,
                line_items,
                filename_hint,
                tenant_id: tenant.clone(),
                uploaded_at: Utc::now(),
            })
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

pub async fn cmd_ingest(pipeline: &Pipeline, input: &ExtractionInput, process: bool) -> Result<()> {
    println!("📥 Ingesting {} line item(s)...", input.line_items.len());

    let result = pipeline.ingest(input)?;
    if result.created {
        println!("   Stored as document {}", result.document_id);
    } else {
        println!(
            "   Identical content already stored as document {}",
            result.document_id
        );
    }

    if process {
        let doc = pipeline.db().require_document(result.document_id)?;
        let report = if doc.status == DocumentStatus::Processed {
            pipeline
                .reprocess(result.document_id, &CancelToken::new())
                .await?
        } else {
            pipeline
                .process(result.document_id, &CancelToken::new())
                .await?
        };
        print_report(&report);
    } else {
        println!();
        println!("Run 'ciclops process {}' to classify and evaluate it.", result.document_id);
    }

    Ok(())
}

pub async fn cmd_process(pipeline: &Pipeline, id: i64) -> Result<()> {
    println!("⚙️  Processing document {}...", id);
    let report = pipeline.process(id, &CancelToken::new()).await?;
    print_report(&report);
    Ok(())
}

pub async fn cmd_reprocess(pipeline: &Pipeline, id: i64) -> Result<()> {
    println!("🔄 Reprocessing document {}...", id);
    let report = pipeline.reprocess(id, &CancelToken::new()).await?;
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &ProcessingReport) {
    let c = &report.classification;
    println!();
    println!("📄 Document {}", report.document_id);
    println!("   ─────────────────────────────");
    println!("   Type:        {}", c.doc_type);
    println!(
        "   Period:      {}{}",
        report.period,
        if report.period_inferred {
            " (inferred from upload date)"
        } else {
            ""
        }
    );
    println!("   Confidence:  {:.0}%", c.confidence * 100.0);
    println!("   Unmapped:    {}", report.unmapped_items);
    if report.reused_corrections > 0 {
        println!("   Corrections: {} reused", report.reused_corrections);
    }

    for summary in &report.summaries {
        println!();
        super::print_summary(summary);
    }
}

pub fn cmd_documents_list(pipeline: &Pipeline, status: Option<&str>, limit: i64) -> Result<()> {
    let status = status
        .map(|s| s.parse::<DocumentStatus>())
        .transpose()
        .context("Invalid status (use pending, processed, failed, cancelled)")?;
    let docs = pipeline.db().list_documents(status, limit)?;

    if docs.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<10}  {:<20}  {:<9}  {:<22}  {}",
        "ID", "STATUS", "TYPE", "PERIOD", "STORES", "FILENAME"
    );
    println!("{}", "-".repeat(90));

    for doc in docs {
        let (doc_type, period, stores) = match &doc.classification {
            Some(c) => (
                c.doc_type.to_string(),
                c.period.map(|p| p.key()).unwrap_or_else(|| "-".into()),
                c.stores.iter().cloned().collect::<Vec<_>>().join(","),
            ),
            None => ("-".into(), "-".into(), String::new()),
        };
        println!(
            "{:>5}  {:<10}  {:<20}  {:<9}  {:<22}  {}",
            doc.id,
            doc.status,
            doc_type,
            period,
            truncate(&stores, 22),
            doc.filename_hint.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
