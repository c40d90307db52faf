use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::diff::DiffItem;
use crate::snapshot::{sha256_hex, DedupRepository, StoreError};

pub const SIGNATURE_TEXT_CHARS: usize = 20;

/// SHA-256 over the URL, each diff's `path:type:text-prefix` signature in
/// order, and the score.
pub fn generate_event_hash(url: &str, diffs: &[DiffItem], score: u8) -> String {
    let signature = diffs
        .iter()
        .map(|d| {
            let prefix: String = d
                .new
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(SIGNATURE_TEXT_CHARS)
                .collect();
            format!("{}:{}:{}", d.path, d.change_type, prefix)
        })
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(&format!("{url}|{signature}|{score}"))
}

#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn DedupRepository>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn DedupRepository>) -> Self {
        Self { store }
    }

    pub fn is_duplicate(&self, fingerprint: &str, cooldown: Duration) -> Result<bool, StoreError> {
        self.is_duplicate_at(fingerprint, cooldown, Utc::now())
    }

    pub fn is_duplicate_at(
        &self,
        fingerprint: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(last_seen) = self.store.get_last_seen(fingerprint)? else {
            return Ok(false);
        };
        Ok(now.signed_duration_since(last_seen) < cooldown)
    }

    pub fn record_event(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.record_event_at(fingerprint, Utc::now())
    }

    pub fn record_event_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.set_last_seen(fingerprint, now)
    }
}
