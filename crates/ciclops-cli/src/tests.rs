//! CLI command tests

use std::io::Write;

use chrono::NaiveDate;
use ciclops_core::models::DocumentStatus;
use ciclops_core::{Database, ExtractionInput, Pipeline, PipelineConfig};
use tempfile::NamedTempFile;

use crate::commands::{self, truncate, ExtractionSource};

fn setup_pipeline() -> Pipeline {
    let db = Database::in_memory().unwrap();
    Pipeline::new(db, &PipelineConfig::embedded().unwrap(), None).unwrap()
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn statement_json() -> String {
    serde_json::json!({
        "raw_text": "ESTADO DE RESULTADOS\nSucursal Centro\nPeriodo 4 2025",
        "line_items": [
            {"label": "NOMINAS", "amount": 45000},
            {"label": "CFE", "amount": 8000},
            {"label": "VENTAS MOSTRADOR", "amount": 230000}
        ],
        "tenant_id": "franquicia-norte",
        "uploaded_at": "2025-04-15T12:00:00Z"
    })
    .to_string()
}

fn statement() -> ExtractionInput {
    serde_json::from_str(&statement_json()).unwrap()
}

// ========== Extraction Loading Tests ==========

#[test]
fn test_load_extraction_json() {
    let file = write_temp(&statement_json());
    let input = commands::load_extraction(&ExtractionSource::Json(file.path().to_path_buf())).unwrap();
    assert_eq!(input.line_items.len(), 3);
    assert_eq!(input.tenant_id, "franquicia-norte");
}

#[test]
fn test_load_extraction_json_invalid() {
    let file = write_temp("{\"line_items\": ");
    let result = commands::load_extraction(&ExtractionSource::Json(file.path().to_path_buf()));
    assert!(result.is_err());
}

#[test]
fn test_load_extraction_csv_with_text() {
    let items = write_temp("concepto,importe\nNOMINAS,\"$45,000.00\"\nCFE,8000\n");
    let text = write_temp("ESTADO DE RESULTADOS\nSucursal Centro");
    let source = ExtractionSource::Csv {
        items: items.path().to_path_buf(),
        text: Some(text.path().to_path_buf()),
        tenant: "franquicia-norte".into(),
        filename: Some("centro_abril.csv".into()),
    };

    let input = commands::load_extraction(&source).unwrap();
    assert_eq!(input.line_items.len(), 2);
    assert_eq!(input.line_items[0].label, "NOMINAS");
    assert!(input.raw_text.contains("Sucursal Centro"));
    assert_eq!(input.filename_hint.as_deref(), Some("centro_abril.csv"));
}

#[test]
fn test_load_extraction_csv_defaults_filename() {
    let items = write_temp("NOMINAS,45000\n");
    let source = ExtractionSource::Csv {
        items: items.path().to_path_buf(),
        text: None,
        tenant: "franquicia-norte".into(),
        filename: None,
    };

    let input = commands::load_extraction(&source).unwrap();
    assert!(input.raw_text.is_empty());
    assert!(input.filename_hint.is_some());
}

// ========== Document Command Tests ==========

#[tokio::test]
async fn test_cmd_ingest_without_processing() {
    let pipeline = setup_pipeline();
    commands::cmd_ingest(&pipeline, &statement(), false).await.unwrap();

    let docs = pipeline.db().list_documents(None, 10).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].status, DocumentStatus::Pending);
}

#[tokio::test]
async fn test_cmd_ingest_and_process_twice() {
    let pipeline = setup_pipeline();
    commands::cmd_ingest(&pipeline, &statement(), true).await.unwrap();
    // Same content again reprocesses the stored document instead of failing
    commands::cmd_ingest(&pipeline, &statement(), true).await.unwrap();

    let docs = pipeline.db().list_documents(None, 10).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].status, DocumentStatus::Processed);

    let summaries = pipeline.db().list_summaries(Some("CENTRO"), None).unwrap();
    assert_eq!(summaries.len(), 1);
}

#[tokio::test]
async fn test_cmd_process_missing_document() {
    let pipeline = setup_pipeline();
    assert!(commands::cmd_process(&pipeline, 42).await.is_err());
    assert!(commands::cmd_reprocess(&pipeline, 42).await.is_err());
}

#[test]
fn test_cmd_documents_list_status_filter() {
    let pipeline = setup_pipeline();
    pipeline.ingest(&statement()).unwrap();

    assert!(commands::cmd_documents_list(&pipeline, None, 10).is_ok());
    assert!(commands::cmd_documents_list(&pipeline, Some("pending"), 10).is_ok());
    assert!(commands::cmd_documents_list(&pipeline, Some("archived"), 10).is_err());
}

// ========== Correction Command Tests ==========

#[test]
fn test_cmd_corrections_add() {
    let pipeline = setup_pipeline();
    commands::cmd_corrections_add(&pipeline, "SERV. LUZ", "electricidad", None).unwrap();

    let correction = pipeline.memory().lookup("SERV. LUZ").unwrap();
    assert_eq!(correction.usage_count, 1);
    assert!(commands::cmd_corrections_list(&pipeline).is_ok());
    assert!(commands::cmd_corrections_log(&pipeline).is_ok());
}

#[test]
fn test_cmd_corrections_add_unknown_category() {
    let pipeline = setup_pipeline();
    let result = commands::cmd_corrections_add(&pipeline, "SERV. LUZ", "no.such.leaf", None);
    assert!(result.is_err());
    assert!(pipeline.memory().lookup("SERV. LUZ").is_none());
}

#[test]
fn test_cmd_corrections_store() {
    let pipeline = setup_pipeline();
    assert!(commands::cmd_corrections_store(&pipeline, "5 FEB", "5_FEBRERO", None).is_ok());
    assert!(commands::cmd_corrections_store(&pipeline, "SUC X", "NO_EXISTE", None).is_err());
}

// ========== Summary Command Tests ==========

#[tokio::test]
async fn test_cmd_summary_after_processing() {
    let pipeline = setup_pipeline();
    commands::cmd_ingest(&pipeline, &statement(), true).await.unwrap();

    assert!(commands::cmd_summary(&pipeline, "CENTRO", "2025-P4", false).is_ok());
    assert!(commands::cmd_summary(&pipeline, "CENTRO", "2025-4", true).is_ok());
    // Missing summary is reported, not an error
    assert!(commands::cmd_summary(&pipeline, "UNIVERSIDAD", "2025-P4", false).is_ok());
    assert!(commands::cmd_summaries_list(&pipeline, None, Some(2025)).is_ok());
}

#[test]
fn test_cmd_summary_invalid_period() {
    let pipeline = setup_pipeline();
    assert!(commands::cmd_summary(&pipeline, "CENTRO", "2025-P14", false).is_err());
    assert!(commands::cmd_summary(&pipeline, "CENTRO", "abril", false).is_err());
}

// ========== Fiscal Command Tests ==========

#[test]
fn test_cmd_period() {
    let config = PipelineConfig::embedded().unwrap();
    assert!(commands::cmd_period(&config.calendar, Some("2025-12-16")).is_ok());
    assert!(commands::cmd_period(&config.calendar, Some("16/12/2025")).is_err());
    assert!(commands::cmd_period(&config.calendar, Some("1999-06-01")).is_err());
    assert!(commands::cmd_periods(&config.calendar, 2025).is_ok());
    assert!(commands::cmd_stores(&config).is_ok());

    let period = config
        .calendar
        .period_for(NaiveDate::from_ymd_opt(2025, 12, 16).unwrap())
        .unwrap();
    assert_eq!(period.key(), "2025-P13");
}

// ========== Prompt and Setup Tests ==========

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show("classify_document").is_ok());
    // Unknown IDs print the available list
    assert!(commands::cmd_prompts_show("nope").is_ok());
}

#[test]
fn test_cmd_init_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ciclops.db");
    commands::cmd_init(&db_path, None, true).unwrap();

    let db = commands::open_db(&db_path, true).unwrap();
    assert_eq!(db.list_stores().unwrap().len(), 4);
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("NOMINAS", 20), "NOMINAS");
    assert_eq!(truncate("ENERGIA ELECTRICA SUCURSAL", 10), "ENERGIA...");
    assert_eq!(truncate("AÑO FISCAL ÚNICO", 6), "AÑO...");
}
