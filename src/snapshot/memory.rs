use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::snapshot::{
    sha256_hex, url_key, DedupRepository, HistoryEntry, HistoryRepository, SnapshotRepository,
    StoreError,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<String, String>>,
    last_seen: Mutex<HashMap<String, DateTime<Utc>>>,
    history: Mutex<HashMap<String, Vec<HistoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

impl SnapshotRepository for MemoryStore {
    fn get_previous(&self, url: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.snapshots)?.get(&url_key(url)).cloned())
    }

    fn save(&self, url: &str, normalized_html: &str) -> Result<(), StoreError> {
        lock(&self.snapshots)?.insert(url_key(url), normalized_html.to_string());
        Ok(())
    }
}

impl DedupRepository for MemoryStore {
    fn get_last_seen(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(lock(&self.last_seen)?.get(fingerprint).copied())
    }

    fn set_last_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
        lock(&self.last_seen)?.insert(fingerprint.to_string(), seen_at);
        Ok(())
    }
}

impl HistoryRepository for MemoryStore {
    fn push_history(
        &self,
        url: &str,
        normalized_html: &str,
        captured_at: DateTime<Utc>,
        max_depth: usize,
    ) -> Result<(), StoreError> {
        let mut guard = lock(&self.history)?;
        let entries = guard.entry(url_key(url)).or_default();
        entries.insert(
            0,
            HistoryEntry {
                url: url.to_string(),
                captured_at,
                html_hash: sha256_hex(normalized_html),
            },
        );
        entries.truncate(max_depth.max(1));
        Ok(())
    }

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(lock(&self.history)?
            .get(&url_key(url))
            .cloned()
            .unwrap_or_default())
    }
}
