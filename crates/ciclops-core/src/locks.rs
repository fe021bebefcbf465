//! Per-summary processing locks
//!
//! At most one evaluation may write the summary for a `(store_id, period)`
//! key at a time. A second caller is rejected with
//! `Error::ConcurrentProcessing` rather than queued; the error is retryable.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Error, Result};
use crate::fiscal::FiscalPeriod;

type Key = (String, String);

#[derive(Clone, Default)]
pub struct ProcessingLocks {
    held: Arc<Mutex<HashSet<Key>>>,
}

impl ProcessingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a key, or fail if it is already held
    pub fn try_acquire(&self, store_id: &str, period: &FiscalPeriod) -> Result<KeyGuard> {
        let key = (store_id.to_string(), period.key());
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            debug!(store = %key.0, period = %key.1, "Summary key busy");
            return Err(Error::ConcurrentProcessing {
                store_id: key.0,
                period: key.1,
            });
        }
        Ok(KeyGuard {
            held: self.held.clone(),
            key,
        })
    }

    pub fn is_held(&self, store_id: &str, period: &FiscalPeriod) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(store_id.to_string(), period.key()))
    }
}

/// Releases its key when dropped
pub struct KeyGuard {
    held: Arc<Mutex<HashSet<Key>>>,
    key: Key,
}

impl KeyGuard {
    pub fn store_id(&self) -> &str {
        &self.key.0
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
