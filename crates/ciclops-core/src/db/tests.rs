//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::evaluate::MetricsEvaluator;
    use crate::extraction::{ExtractionInput, LineItemInput};
    use crate::fiscal::FiscalCalendar;
    use crate::mapper::ConceptMapper;
    use crate::memory::{CorrectionMemory, MemoryKey};
    use crate::taxonomy::{Category, ExpenseLeaf};

    fn extraction(text: &str, items: &[(&str, i64)]) -> ExtractionInput {
        ExtractionInput {
            raw_text: text.to_string(),
            line_items: items
                .iter()
                .map(|(label, amount)| LineItemInput {
                    label: label.to_string(),
                    amount: Decimal::from(*amount),
                })
                .collect(),
            filename_hint: Some("estado_p4.pdf".into()),
            tenant_id: "franquicia-norte".into(),
            uploaded_at: Utc.with_ymd_and_hms(2025, 4, 2, 15, 0, 0).unwrap(),
        }
    }

    fn summary(store: &str, period_number: u32, document_id: i64) -> FinancialSummary {
        let period = FiscalCalendar::default().period(2025, period_number).unwrap();
        let raw = extraction(
            "",
            &[("Ventas", 100_000), ("Costo de ventas", 35_000), ("Renta", 10_000)],
        )
        .raw_items();
        let mapped = ConceptMapper::new(Arc::new(CorrectionMemory::new())).map_items(&raw);
        let mut summary = MetricsEvaluator::new().evaluate(store, period, &mapped, None).unwrap();
        summary.document_id = Some(document_id);
        summary
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_documents(None, 10).unwrap().is_empty());
        assert!(db.list_summaries(None, None).unwrap().is_empty());
        assert!(db.list_corrections().unwrap().is_empty());
        assert!(!db.is_encrypted().unwrap());
    }

    #[test]
    fn test_schema_exists() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        for table in ["documents", "summaries", "corrections", "correction_log", "stores"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_document_insert_dedupes_on_content() {
        let db = Database::in_memory().unwrap();
        let input = extraction("ESTADO DE RESULTADOS P4 2025", &[("Ventas", 1000)]);

        let first = db.insert_document(&input).unwrap();
        assert!(first.created);

        // Same content uploaded later is the same document
        let mut again = input.clone();
        again.uploaded_at = Utc::now();
        let second = db.insert_document(&again).unwrap();
        assert!(!second.created);
        assert_eq!(first.document_id, second.document_id);

        let other = db
            .insert_document(&extraction("ESTADO DE RESULTADOS P5 2025", &[("Ventas", 1000)]))
            .unwrap();
        assert!(other.created);
        assert_ne!(other.document_id, first.document_id);
        assert_eq!(db.list_documents(None, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_document_round_trip_and_status() {
        let db = Database::in_memory().unwrap();
        let input = extraction("texto", &[("Ventas", 1000), ("Renta", 200)]);
        let id = db.insert_document(&input).unwrap().document_id;

        let doc = db.get_document(id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.extraction, input);
        assert_eq!(doc.uploaded_at, input.uploaded_at);
        assert_eq!(doc.content_hash, input.content_hash());
        assert!(doc.classification.is_none());

        let classification = DocumentClassification {
            doc_type: DocumentType::StatementOfResults,
            period: Some(FiscalCalendar::default().period(2025, 4).unwrap()),
            period_source: Some(PeriodSource::Marker),
            stores: BTreeSet::from(["CENTRO".to_string()]),
            primary_store: Some("CENTRO".to_string()),
            confidence: 0.9,
            memory_keys: vec![MemoryKey::store("centro")],
        };
        db.set_document_classification(id, &classification).unwrap();
        db.set_document_status(id, DocumentStatus::Failed, Some("boom"))
            .unwrap();

        let doc = db.get_document(id).unwrap().unwrap();
        assert_eq!(doc.classification, Some(classification));
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("boom"));

        db.set_document_status(id, DocumentStatus::Processed, None)
            .unwrap();
        let doc = db.require_document(id).unwrap();
        assert!(doc.error.is_none());

        let processed = db
            .list_documents(Some(DocumentStatus::Processed), 10)
            .unwrap();
        assert_eq!(processed.len(), 1);
        assert!(db
            .list_documents(Some(DocumentStatus::Pending), 10)
            .unwrap()
            .is_empty());
        assert_eq!(
            db.count_documents_by_status().unwrap(),
            vec![(DocumentStatus::Processed, 1)]
        );
    }

    #[test]
    fn test_missing_document() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_document(42).unwrap().is_none());
        assert!(matches!(
            db.require_document(42),
            Err(crate::error::Error::NotFound(_))
        ));
        assert!(db
            .set_document_status(42, DocumentStatus::Processed, None)
            .is_err());
    }

    #[test]
    fn test_summary_upsert_and_get() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document(&extraction("a", &[("Ventas", 1)]))
            .unwrap()
            .document_id;
        let s = summary("CENTRO", 4, doc);

        db.upsert_summary(&s).unwrap();
        let stored = db.get_summary("CENTRO", &s.period).unwrap().unwrap();
        assert_eq!(stored, s);
        assert_eq!(
            stored.branch_total(crate::taxonomy::Branch::Revenue),
            Decimal::from(100_000)
        );

        // Upsert overwrites the same key
        let mut changed = s.clone();
        changed.alerts.clear();
        changed.period_inferred = true;
        db.upsert_summary(&changed).unwrap();
        let stored = db.get_summary("CENTRO", &s.period).unwrap().unwrap();
        assert!(stored.period_inferred);
        assert_eq!(db.list_summaries(None, None).unwrap().len(), 1);

        let other_period = FiscalCalendar::default().period(2025, 5).unwrap();
        assert!(db.get_summary("CENTRO", &other_period).unwrap().is_none());
    }

    #[test]
    fn test_list_summaries_filters_and_orders() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document(&extraction("a", &[("Ventas", 1)]))
            .unwrap()
            .document_id;
        db.upsert_summary(&summary("UNIVERSIDAD", 5, doc)).unwrap();
        db.upsert_summary(&summary("CENTRO", 5, doc)).unwrap();
        db.upsert_summary(&summary("CENTRO", 4, doc)).unwrap();

        let all = db.list_summaries(None, None).unwrap();
        let keys: Vec<(String, u32)> = all
            .iter()
            .map(|s| (s.store_id.clone(), s.period.period_number))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("CENTRO".to_string(), 4),
                ("CENTRO".to_string(), 5),
                ("UNIVERSIDAD".to_string(), 5)
            ]
        );

        assert_eq!(db.list_summaries(Some("CENTRO"), None).unwrap().len(), 2);
        assert_eq!(db.list_summaries(None, Some(2025)).unwrap().len(), 3);
        assert!(db.list_summaries(None, Some(2024)).unwrap().is_empty());
    }

    #[test]
    fn test_replace_document_summaries() {
        let db = Database::in_memory().unwrap();
        let doc = db
            .insert_document(&extraction("a", &[("Ventas", 1)]))
            .unwrap()
            .document_id;
        let other = db
            .insert_document(&extraction("b", &[("Ventas", 1)]))
            .unwrap()
            .document_id;

        db.replace_document_summaries(doc, &[summary("CENTRO", 4, doc), summary("UNIVERSIDAD", 4, doc)])
            .unwrap();
        db.upsert_summary(&summary("CENTRO", 6, other)).unwrap();
        assert_eq!(db.summaries_for_document(doc).unwrap().len(), 2);

        // Reprocessing moved the document to a different period
        let removed = db
            .replace_document_summaries(doc, &[summary("CENTRO", 5, doc)])
            .unwrap();
        assert_eq!(removed, 2);

        let mine = db.summaries_for_document(doc).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].period.period_number, 5);
        // Other documents' summaries are untouched
        assert_eq!(db.summaries_for_document(other).unwrap().len(), 1);
        assert_eq!(db.list_summaries(None, None).unwrap().len(), 2);
    }

    #[test]
    fn test_corrections_persist_and_reload() {
        let db = Database::in_memory().unwrap();
        let memory = CorrectionMemory::new();

        let luz = Category::Expenses(ExpenseLeaf::Electricidad);
        let outcome = memory.record("SERV. LUZ", luz, 1.0).unwrap();
        db.save_record_outcome(&outcome).unwrap();
        let outcome = memory.record_store_alias("5 FEB", "5_FEBRERO", 1.0).unwrap();
        db.save_record_outcome(&outcome).unwrap();

        let events = memory.touch(&[MemoryKey::category("servicio luz")]);
        db.save_reuse(&memory, &events).unwrap();

        let stored = db.list_corrections().unwrap();
        assert_eq!(stored, memory.all());

        let reloaded = db.load_correction_memory().unwrap();
        let hit = reloaded.lookup("serv luz").unwrap();
        assert_eq!(hit.category(), Some(luz));
        assert_eq!(hit.usage_count, 2);
        assert_eq!(
            reloaded.lookup_store("5 feb").unwrap().store_id(),
            Some("5_FEBRERO")
        );

        // The log replays to the same state
        let log = db.correction_log().unwrap();
        assert_eq!(log, memory.log());
        let replayed = CorrectionMemory::replay(&log).unwrap();
        assert_eq!(replayed.all(), memory.all());
    }

    #[test]
    fn test_save_reuse_ignores_empty() {
        let db = Database::in_memory().unwrap();
        db.save_reuse(&CorrectionMemory::new(), &[]).unwrap();
        assert!(db.correction_log().unwrap().is_empty());
    }

    #[test]
    fn test_store_sync() {
        let db = Database::in_memory().unwrap();
        let stores = vec![
            Store {
                id: "CENTRO".into(),
                name: "Centro".into(),
                aliases: vec![],
            },
            Store {
                id: "5_FEBRERO".into(),
                name: "5 de Febrero".into(),
                aliases: vec!["Cinco de Febrero".into()],
            },
        ];
        assert_eq!(db.sync_stores(&stores).unwrap(), 2);
        // Syncing again updates rather than duplicates
        db.sync_stores(&stores).unwrap();

        let listed = db.list_stores().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "5_FEBRERO");
        assert_eq!(listed[0].aliases, vec!["Cinco de Febrero".to_string()]);
    }
}
