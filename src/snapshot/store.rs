use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::snapshot::migrations::BASE_MIGRATION;
use crate::snapshot::{
    sha256_hex, url_key, DedupRepository, HistoryEntry, HistoryRepository, SnapshotRepository,
    StoreError,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}

impl SnapshotRepository for SqliteStore {
    fn get_previous(&self, url: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let html = conn
            .query_row(
                "SELECT html FROM snapshots WHERE url_key = ?1",
                params![url_key(url)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(html)
    }

    fn save(&self, url: &str, normalized_html: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            r#"
INSERT INTO snapshots(url_key, url, html, captured_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(url_key) DO UPDATE SET
    html = excluded.html,
    captured_at = excluded.captured_at
"#,
            params![url_key(url), url, normalized_html, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl DedupRepository for SqliteStore {
    fn get_last_seen(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT last_seen FROM dedup_events WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        raw.as_deref().map(parse_timestamp).transpose()
    }

    fn set_last_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn()?.execute(
            r#"
INSERT INTO dedup_events(fingerprint, last_seen)
VALUES (?1, ?2)
ON CONFLICT(fingerprint) DO UPDATE SET last_seen = excluded.last_seen
"#,
            params![fingerprint, seen_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

impl HistoryRepository for SqliteStore {
    fn push_history(
        &self,
        url: &str,
        normalized_html: &str,
        captured_at: DateTime<Utc>,
        max_depth: usize,
    ) -> Result<(), StoreError> {
        let key = url_key(url);
        let conn = self.conn()?;
        conn.execute(
            r#"
INSERT INTO snapshot_history(url_key, url, html_hash, html, captured_at)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
            params![
                key,
                url,
                sha256_hex(normalized_html),
                normalized_html,
                captured_at.to_rfc3339()
            ],
        )?;
        conn.execute(
            r#"
DELETE FROM snapshot_history
WHERE url_key = ?1
  AND id NOT IN (
    SELECT id FROM snapshot_history
    WHERE url_key = ?1
    ORDER BY id DESC
    LIMIT ?2
  )
"#,
            params![key, max_depth.max(1) as i64],
        )?;
        Ok(())
    }

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT url, captured_at, html_hash
FROM snapshot_history
WHERE url_key = ?1
ORDER BY id DESC
"#,
        )?;
        let rows = stmt
            .query_map(params![url_key(url)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, captured_at, html_hash)| {
                Ok(HistoryEntry {
                    url,
                    captured_at: parse_timestamp(&captured_at)?,
                    html_hash,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::snapshot::{
        sha256_hex, DedupRepository, HistoryRepository, SnapshotRepository, SqliteStore,
    };

    #[test]
    fn saves_and_overwrites_snapshots() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert!(store.get_previous("https://a.test").expect("get").is_none());
        store.save("https://a.test", "<p>1</p>").expect("save");
        store.save("https://a.test", "<p>2</p>").expect("save");
        assert_eq!(
            store.get_previous("https://a.test").expect("get").as_deref(),
            Some("<p>2</p>")
        );
    }

    #[test]
    fn round_trips_last_seen() {
        let store = SqliteStore::open_in_memory().expect("open");
        let earlier = Utc::now() - Duration::minutes(5);
        store.set_last_seen("fp", earlier).expect("set");
        let later = Utc::now();
        store.set_last_seen("fp", later).expect("set");
        let stored = store.get_last_seen("fp").expect("get").expect("missing");
        assert_eq!(stored.timestamp_micros(), later.timestamp_micros());
        assert!(store.get_last_seen("other").expect("get").is_none());
    }

    #[test]
    fn prunes_history_to_depth() {
        let store = SqliteStore::open_in_memory().expect("open");
        let base = Utc::now();
        for i in 0..5 {
            store
                .push_history(
                    "https://a.test",
                    &format!("<p>{i}</p>"),
                    base + Duration::minutes(i),
                    2,
                )
                .expect("push");
        }
        store
            .push_history("https://b.test", "<p>b</p>", base, 2)
            .expect("push");
        let history = store.history("https://a.test").expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].html_hash, sha256_hex("<p>4</p>"));
        assert_eq!(history[1].html_hash, sha256_hex("<p>3</p>"));
        assert_eq!(
            history[0].captured_at.timestamp_micros(),
            (base + Duration::minutes(4)).timestamp_micros()
        );
        assert_eq!(store.history("https://b.test").expect("history").len(), 1);
    }
}
