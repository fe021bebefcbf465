//! Correction memory
//!
//! Operators correct mislabeled concepts ("SERV. LUZ" is electricity) and
//! unrecognized store names ("5 FEB" is store `5_FEBRERO`). Corrections are
//! keyed by the normalized token set of the label so spelling variants share
//! an entry, and every change is appended to an event log that can be
//! replayed to rebuild the memory.
//!
//! Locking: the map sits behind an `RwLock` and every entry has its own
//! `Mutex`. Lookups and updates of existing entries only take the read lock,
//! so writers on one key never block readers of another. Inserting a new key
//! takes the write lock briefly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::normalize;
use crate::taxonomy::Category;

/// What kind of value a correction resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Category,
    Store,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrectionTarget {
    Category(Category),
    Store(String),
}

impl CorrectionTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Category(_) => TargetKind::Category,
            Self::Store(_) => TargetKind::Store,
        }
    }

    /// Category path or store id
    pub fn value(&self) -> String {
        match self {
            Self::Category(c) => c.path().to_string(),
            Self::Store(s) => s.clone(),
        }
    }
}

/// Memory entry address: kind plus normalized label key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryKey {
    pub kind: TargetKind,
    pub key: String,
}

impl MemoryKey {
    pub fn category(label: &str) -> Self {
        Self {
            kind: TargetKind::Category,
            key: normalize::token_key(label),
        }
    }

    pub fn store(label: &str) -> Self {
        Self {
            kind: TargetKind::Store,
            key: normalize::token_key(label),
        }
    }
}

/// A learned label correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Label as first submitted
    pub original_label: String,
    pub key: MemoryKey,
    pub target: CorrectionTarget,
    pub confidence: f64,
    pub usage_count: u64,
    pub last_used: DateTime<Utc>,
}

impl Correction {
    pub fn category(&self) -> Option<Category> {
        match self.target {
            CorrectionTarget::Category(c) => Some(c),
            CorrectionTarget::Store(_) => None,
        }
    }

    pub fn store_id(&self) -> Option<&str> {
        match &self.target {
            CorrectionTarget::Store(s) => Some(s),
            CorrectionTarget::Category(_) => None,
        }
    }
}

/// Append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CorrectionEvent {
    /// A correction was submitted (insert or upsert)
    Recorded {
        label: String,
        target: CorrectionTarget,
        confidence: f64,
        at: DateTime<Utc>,
    },
    /// A stored correction was used by a committed processing run
    Reused { key: MemoryKey, at: DateTime<Utc> },
}

impl CorrectionEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Recorded { at, .. } | Self::Reused { at, .. } => *at,
        }
    }
}

/// Result of `CorrectionMemory::record`
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub correction: Correction,
    pub event: CorrectionEvent,
    /// False when the key already existed and was updated
    pub created: bool,
}

/// Process-wide store of learned corrections
#[derive(Default)]
pub struct CorrectionMemory {
    entries: RwLock<HashMap<MemoryKey, Arc<Mutex<Correction>>>>,
    log: Mutex<Vec<CorrectionEvent>>,
}

impl CorrectionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot. The event log starts empty.
    pub fn from_corrections(corrections: Vec<Correction>) -> Self {
        let entries = corrections
            .into_iter()
            .map(|c| (c.key.clone(), Arc::new(Mutex::new(c))))
            .collect();
        Self {
            entries: RwLock::new(entries),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild by replaying an event log in order
    pub fn replay(events: &[CorrectionEvent]) -> Result<Self> {
        let memory = Self::new();
        for event in events {
            match event {
                CorrectionEvent::Recorded {
                    label,
                    target,
                    confidence,
                    at,
                } => {
                    memory.record_at(label, target.clone(), *confidence, *at, |_| Ok(()))?;
                }
                CorrectionEvent::Reused { key, at } => {
                    memory.touch_at(std::slice::from_ref(key), *at);
                }
            }
        }
        Ok(memory)
    }

    /// Category correction for `label`, if one was learned. Never mutates.
    pub fn lookup(&self, label: &str) -> Option<Correction> {
        self.get(&MemoryKey::category(label))
    }

    /// Store correction for `label`, if one was learned. Never mutates.
    pub fn lookup_store(&self, label: &str) -> Option<Correction> {
        self.get(&MemoryKey::store(label))
    }

    pub fn get(&self, key: &MemoryKey) -> Option<Correction> {
        let entry = self.read_entries().get(key).cloned()?;
        let correction = entry.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Some(correction)
    }

    /// Learn that `label` means `category`
    pub fn record(&self, label: &str, category: Category, confidence: f64) -> Result<RecordOutcome> {
        self.record_with(label, category, confidence, |_| Ok(()))
    }

    /// Like `record`, but memory only changes once `persist` accepts the outcome
    pub fn record_with<F>(
        &self,
        label: &str,
        category: Category,
        confidence: f64,
        persist: F,
    ) -> Result<RecordOutcome>
    where
        F: FnOnce(&RecordOutcome) -> Result<()>,
    {
        if category.is_unknown() {
            return Err(Error::InvalidData(
                "Corrections must target a taxonomy leaf".into(),
            ));
        }
        self.record_at(
            label,
            CorrectionTarget::Category(category),
            confidence,
            Utc::now(),
            persist,
        )
    }

    /// Learn that `label` names store `store_id`
    pub fn record_store_alias(
        &self,
        label: &str,
        store_id: &str,
        confidence: f64,
    ) -> Result<RecordOutcome> {
        self.record_store_alias_with(label, store_id, confidence, |_| Ok(()))
    }

    /// Like `record_store_alias`, but memory only changes once `persist`
    /// accepts the outcome
    pub fn record_store_alias_with<F>(
        &self,
        label: &str,
        store_id: &str,
        confidence: f64,
        persist: F,
    ) -> Result<RecordOutcome>
    where
        F: FnOnce(&RecordOutcome) -> Result<()>,
    {
        self.record_at(
            label,
            CorrectionTarget::Store(store_id.to_string()),
            confidence,
            Utc::now(),
            persist,
        )
    }

    fn record_at<F>(
        &self,
        label: &str,
        target: CorrectionTarget,
        confidence: f64,
        at: DateTime<Utc>,
        persist: F,
    ) -> Result<RecordOutcome>
    where
        F: FnOnce(&RecordOutcome) -> Result<()>,
    {
        let key = MemoryKey {
            kind: target.kind(),
            key: normalize::token_key(label),
        };
        if key.key.is_empty() {
            return Err(Error::InvalidData(format!(
                "Label '{}' has nothing to learn from",
                label
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidData(format!(
                "Confidence must be between 0 and 1, got {}",
                confidence
            )));
        }

        // Held until the outcome is applied so recorders of a key serialize
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let existing = entries.get(&key).cloned();
        let mut correction = match &existing {
            Some(entry) => entry.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Correction {
                original_label: label.to_string(),
                key: key.clone(),
                target: target.clone(),
                confidence,
                usage_count: 0,
                last_used: at,
            },
        };
        correction.target = target.clone();
        correction.confidence = confidence;
        correction.usage_count += 1;
        correction.last_used = at;

        let outcome = RecordOutcome {
            correction,
            event: CorrectionEvent::Recorded {
                label: label.to_string(),
                target: target.clone(),
                confidence,
                at,
            },
            created: existing.is_none(),
        };
        persist(&outcome)?;

        match existing {
            Some(entry) => {
                let mut c = entry.lock().unwrap_or_else(|e| e.into_inner());
                c.target = target;
                c.confidence = confidence;
                c.usage_count += 1;
                c.last_used = at;
            }
            None => {
                entries.insert(key.clone(), Arc::new(Mutex::new(outcome.correction.clone())));
            }
        }
        drop(entries);
        self.append(outcome.event.clone());

        debug!(
            key = %key.key,
            kind = key.kind.as_str(),
            target = %outcome.correction.target.value(),
            usage_count = outcome.correction.usage_count,
            created = outcome.created,
            "Recorded correction"
        );

        Ok(outcome)
    }

    /// Count a reuse of each key that exists. Returns the logged events.
    pub fn touch(&self, keys: &[MemoryKey]) -> Vec<CorrectionEvent> {
        self.touch_at(keys, Utc::now())
    }

    fn touch_at(&self, keys: &[MemoryKey], at: DateTime<Utc>) -> Vec<CorrectionEvent> {
        let mut events = Vec::new();
        for key in keys {
            let Some(entry) = self.read_entries().get(key).cloned() else {
                continue;
            };
            {
                let mut c = entry.lock().unwrap_or_else(|e| e.into_inner());
                c.usage_count += 1;
                c.last_used = at;
            }
            let event = CorrectionEvent::Reused {
                key: key.clone(),
                at,
            };
            self.append(event.clone());
            events.push(event);
        }
        events
    }

    /// Labels corrected to `category`, most used first (ties by label)
    pub fn most_used(&self, category: Category) -> Vec<String> {
        let mut matches: Vec<Correction> = self
            .all()
            .into_iter()
            .filter(|c| c.category() == Some(category))
            .collect();
        matches.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.original_label.cmp(&b.original_label))
        });
        matches.into_iter().map(|c| c.original_label).collect()
    }

    /// Learned store aliases as (normalized phrase, store id, key)
    pub fn store_aliases(&self) -> Vec<(String, String, MemoryKey)> {
        self.all()
            .into_iter()
            .filter_map(|c| {
                let store = c.store_id()?.to_string();
                Some((normalize::phrase(&c.original_label), store, c.key))
            })
            .collect()
    }

    /// Snapshot of every correction, ordered by key
    pub fn all(&self) -> Vec<Correction> {
        let entries: Vec<Arc<Mutex<Correction>>> = self.read_entries().values().cloned().collect();
        let mut out: Vec<Correction> = entries
            .iter()
            .map(|e| e.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Events appended since this memory was created or loaded
    pub fn log(&self) -> Vec<CorrectionEvent> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entries(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<MemoryKey, Arc<Mutex<Correction>>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn append(&self, event: CorrectionEvent) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
