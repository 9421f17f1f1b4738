//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Madara-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Key/value options (JSON values)
CREATE TABLE IF NOT EXISTS options (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Manga work queue; drained by priority, then position (FIFO)
CREATE TABLE IF NOT EXISTS manga_queue (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    site_name TEXT NOT NULL,
    source_id TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 1,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_manga_queue_source ON manga_queue(site_name, source_id);
CREATE INDEX IF NOT EXISTS idx_manga_queue_status ON manga_queue(status);

-- Chapter work queue; source_id holds the owning manga's source id
CREATE TABLE IF NOT EXISTS chapter_queue (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    site_name TEXT NOT NULL,
    source_id TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 1,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chapter_queue_source ON chapter_queue(site_name, source_id);
CREATE INDEX IF NOT EXISTS idx_chapter_queue_status ON chapter_queue(status);

-- Harvested content items
CREATE TABLE IF NOT EXISTS content_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    site_name TEXT NOT NULL,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    cover TEXT NOT NULL DEFAULT '',
    alternative TEXT NOT NULL DEFAULT '',
    genre TEXT NOT NULL DEFAULT '',
    publication_status TEXT NOT NULL DEFAULT '',
    post_status TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    UNIQUE(site_name, source_id)
);

-- Chapters attached to content items
CREATE TABLE IF NOT EXISTS content_chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES content_items(id) ON DELETE CASCADE,
    chapter_source_id TEXT NOT NULL,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    images TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(item_id, chapter_source_id)
);

CREATE INDEX IF NOT EXISTS idx_content_chapters_item ON content_chapters(item_id);

-- Cached response bodies
CREATE TABLE IF NOT EXISTS response_cache (
    key TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_expires ON response_cache(expires_at);

-- Failed fetch attempts
CREATE TABLE IF NOT EXISTS fetch_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fetch_errors_occurred ON fetch_errors(occurred_at);

-- Operator-facing activity log
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_log_created ON activity_log(created_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
