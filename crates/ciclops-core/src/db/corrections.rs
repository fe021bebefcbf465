//! Correction memory persistence
//!
//! The `corrections` table holds the current state of every learned
//! correction and is what the memory is loaded from at startup. The
//! `correction_log` table keeps every event in order so the state can be
//! audited or rebuilt with `CorrectionMemory::replay`.

use rusqlite::{params, Connection};

use super::{parse_timestamp, Database};
use crate::error::{Error, Result};
use crate::memory::{
    Correction, CorrectionEvent, CorrectionMemory, CorrectionTarget, MemoryKey, RecordOutcome,
    TargetKind,
};

fn save(conn: &Connection, correction: &Correction) -> Result<()> {
    conn.execute(
        "INSERT INTO corrections (kind, key, original_label, target, confidence, usage_count, last_used)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(kind, key) DO UPDATE SET
             target = excluded.target,
             confidence = excluded.confidence,
             usage_count = excluded.usage_count,
             last_used = excluded.last_used",
        params![
            correction.key.kind.as_str(),
            correction.key.key,
            correction.original_label,
            serde_json::to_string(&correction.target)?,
            correction.confidence,
            correction.usage_count as i64,
            correction.last_used.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn append(conn: &Connection, event: &CorrectionEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO correction_log (event) VALUES (?)",
        params![serde_json::to_string(event)?],
    )?;
    Ok(())
}

fn parse_kind(s: &str) -> Result<TargetKind> {
    match s {
        "category" => Ok(TargetKind::Category),
        "store" => Ok(TargetKind::Store),
        _ => Err(Error::InvalidData(format!("Unknown correction kind: {}", s))),
    }
}

impl Database {
    /// Insert or update one correction's current state
    pub fn save_correction(&self, correction: &Correction) -> Result<()> {
        let conn = self.conn()?;
        save(&conn, correction)
    }

    /// Persist a freshly recorded correction and its log event together
    pub fn save_record_outcome(&self, outcome: &RecordOutcome) -> Result<()> {
        let conn = self.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result: Result<()> = (|| {
            save(&conn, &outcome.correction)?;
            append(&conn, &outcome.event)
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Persist reuse events and the touched corrections' new state
    pub fn save_reuse(&self, memory: &CorrectionMemory, events: &[CorrectionEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let conn = self.conn()?;

        conn.execute("BEGIN TRANSACTION", [])?;

        let result: Result<()> = (|| {
            for event in events {
                append(&conn, event)?;
                if let CorrectionEvent::Reused { key, .. } = event {
                    if let Some(correction) = memory.get(key) {
                        save(&conn, &correction)?;
                    }
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Append events to the correction log
    pub fn append_correction_events(&self, events: &[CorrectionEvent]) -> Result<()> {
        let conn = self.conn()?;
        for event in events {
            append(&conn, event)?;
        }
        Ok(())
    }

    /// All stored corrections, ordered by kind then key
    pub fn list_corrections(&self) -> Result<Vec<Correction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, key, original_label, target, confidence, usage_count, last_used
             FROM corrections ORDER BY kind, key",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(kind, key, original_label, target, confidence, usage_count, last_used)| -> Result<Correction> {
                    let target: CorrectionTarget = serde_json::from_str(&target)?;
                    Ok(Correction {
                        original_label,
                        key: MemoryKey {
                            kind: parse_kind(&kind)?,
                            key,
                        },
                        target,
                        confidence,
                        usage_count: usage_count.max(0) as u64,
                        last_used: parse_timestamp(&last_used)?,
                    })
                },
            )
            .collect()
    }

    /// Full event log in insertion order
    pub fn correction_log(&self) -> Result<Vec<CorrectionEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT event FROM correction_log ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }

    /// Load the correction memory from its stored snapshot
    pub fn load_correction_memory(&self) -> Result<CorrectionMemory> {
        Ok(CorrectionMemory::from_corrections(self.list_corrections()?))
    }
}
