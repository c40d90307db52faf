pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    url_key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    html TEXT NOT NULL,
    captured_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dedup_events (
    fingerprint TEXT PRIMARY KEY,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_key TEXT NOT NULL,
    url TEXT NOT NULL,
    html_hash TEXT NOT NULL,
    html TEXT NOT NULL,
    captured_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_url_key
    ON snapshot_history(url_key, id DESC);
"#;
