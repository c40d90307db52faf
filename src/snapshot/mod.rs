pub mod memory;
pub mod migrations;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use memory::MemoryStore;
pub use store::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored timestamp `{0}`")]
    Timestamp(String),
    #[error("store lock poisoned")]
    Poisoned,
}

pub trait SnapshotRepository: Send + Sync {
    fn get_previous(&self, url: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, url: &str, normalized_html: &str) -> Result<(), StoreError>;
}

pub trait DedupRepository: Send + Sync {
    fn get_last_seen(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
    fn set_last_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError>;
}

pub trait HistoryRepository: Send + Sync {
    fn push_history(
        &self,
        url: &str,
        normalized_html: &str,
        captured_at: DateTime<Utc>,
        max_depth: usize,
    ) -> Result<(), StoreError>;
    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub html_hash: String,
}

pub trait Store: SnapshotRepository + DedupRepository + HistoryRepository {}

impl<T: SnapshotRepository + DedupRepository + HistoryRepository> Store for T {}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn url_key(url: &str) -> String {
    sha256_hex(url)
}
