//! Correction command implementations

use anyhow::{Context, Result};
use ciclops_core::taxonomy::Category;
use ciclops_core::{CorrectionEvent, CorrectionTarget, Pipeline};

use super::truncate;

pub fn cmd_corrections_list(pipeline: &Pipeline) -> Result<()> {
    let corrections = pipeline.db().list_corrections()?;
    if corrections.is_empty() {
        println!("No corrections learned yet.");
        println!("Add one with: ciclops corrections add \"SERV. LUZ\" electricidad");
        return Ok(());
    }

    println!(
        "{:<30}  {:<6}  {:<36}  {:>5}  {:>5}",
        "LABEL", "KIND", "TARGET", "CONF", "USES"
    );
    println!("{}", "-".repeat(90));
    for c in corrections {
        println!(
            "{:<30}  {:<6}  {:<36}  {:>5.2}  {:>5}",
            truncate(&c.original_label, 30),
            c.key.kind.as_str(),
            c.target.value(),
            c.confidence,
            c.usage_count
        );
    }
    Ok(())
}

pub fn cmd_corrections_add(
    pipeline: &Pipeline,
    label: &str,
    category: &str,
    confidence: Option<f64>,
) -> Result<()> {
    let category: Category = category
        .parse()
        .with_context(|| format!("Unknown category '{}'", category))?;
    let correction = pipeline.submit_correction(label, category, confidence)?;

    println!(
        "✅ \"{}\" → {} (used {} time(s))",
        label,
        category.path(),
        correction.usage_count
    );
    println!("   Run 'ciclops reprocess <id>' to apply it to stored documents.");
    Ok(())
}

pub fn cmd_corrections_store(
    pipeline: &Pipeline,
    label: &str,
    store: &str,
    confidence: Option<f64>,
) -> Result<()> {
    let correction = pipeline.submit_store_correction(label, store, confidence)?;
    println!(
        "✅ \"{}\" → store {} (used {} time(s))",
        label,
        store,
        correction.usage_count
    );
    Ok(())
}

pub fn cmd_corrections_log(pipeline: &Pipeline) -> Result<()> {
    let events = pipeline.db().correction_log()?;
    if events.is_empty() {
        println!("Correction log is empty.");
        return Ok(());
    }

    for event in events {
        match event {
            CorrectionEvent::Recorded {
                label,
                target,
                confidence,
                at,
            } => {
                let target = match target {
                    CorrectionTarget::Category(c) => c.path().to_string(),
                    CorrectionTarget::Store(s) => format!("store {}", s),
                };
                println!(
                    "{}  recorded  \"{}\" → {} ({:.2})",
                    at.format("%Y-%m-%d %H:%M:%S"),
                    label,
                    target,
                    confidence
                );
            }
            CorrectionEvent::Reused { key, at } => {
                println!(
                    "{}  reused    {} [{}]",
                    at.format("%Y-%m-%d %H:%M:%S"),
                    key.key,
                    key.kind.as_str()
                );
            }
        }
    }
    Ok(())
}
