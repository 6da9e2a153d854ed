//! Forum database: photo records and the tag usage index share one
//! SQLite file, separate from the queue's own database.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id                    TEXT PRIMARY KEY,
    user_id               TEXT NOT NULL,
    url                   TEXT,
    thumbnail_url         TEXT,
    original_url          TEXT,
    title                 TEXT NOT NULL,
    description           TEXT,
    category              TEXT NOT NULL,
    tags_json             TEXT NOT NULL DEFAULT '[]',
    tag_status            TEXT CHECK(tag_status IN ('pending', 'processing', 'completed', 'failed')),
    tagging_started_at    DATETIME,
    tagging_completed_at  DATETIME,
    tagging_error         TEXT,
    tagging_note          TEXT,
    tagging_model         TEXT,
    tagging_ms            INTEGER,
    views                 INTEGER NOT NULL DEFAULT 0,
    liked_by_json         TEXT NOT NULL DEFAULT '[]',
    created_at            DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_photos_user ON photos(user_id);

CREATE TABLE IF NOT EXISTS tag_usage (
    name   TEXT PRIMARY KEY,
    count  INTEGER NOT NULL DEFAULT 0
);
"#;

/// Open (or create) the forum database. Pass `None` for in-memory.
pub fn open_database(path: Option<&Path>) -> Result<Arc<Mutex<Connection>>> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open forum database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create forum schema")?;

    Ok(Arc::new(Mutex::new(conn)))
}
