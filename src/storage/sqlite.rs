//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::config::PostStatus;
use crate::queue::{
    ChapterTask, ContentOwner, MangaTask, Priority, QueueAction, QueueKind, TaskStatus,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ContentRepository, LogStore, OptionStore, QueueStore, ResponseCache, StorageError,
    StorageResult,
};
use crate::storage::{
    ChapterRecord, ContentItem, FetchErrorRecord, LogEntry, LogLevel, NewContentItem,
    CONTENT_SOURCE,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

const DRAINABLE_STATUSES: &str = "('queued', 'retrying')";

const ITEM_COLUMNS: &str = "id, source, site_name, source_id, title, link, cover, alternative, \
     genre, publication_status, post_status, details, created_at, last_updated";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn push_task<T: Serialize>(
        &mut self,
        queue: QueueKind,
        site_name: &str,
        source_id: &str,
        status: TaskStatus,
        priority: Priority,
        task: &T,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(task)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {} (site_name, source_id, status, priority, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                queue_table(queue)
            ),
            params![
                site_name,
                source_id,
                status.to_db_string(),
                priority.rank(),
                payload
            ],
        )?;
        Ok(())
    }

    fn pop_tasks<T: DeserializeOwned>(
        &mut self,
        queue: QueueKind,
        max: usize,
    ) -> StorageResult<Vec<T>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let table = queue_table(queue);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: Vec<(i64, String)> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT position, payload FROM {} WHERE status IN {}
                 ORDER BY priority DESC, position LIMIT ?1",
                table, DRAINABLE_STATUSES
            ))?;
            let rows = stmt
                .query_map(params![max as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        {
            let mut delete = tx.prepare(&format!("DELETE FROM {} WHERE position = ?1", table))?;
            for (position, _) in &rows {
                delete.execute(params![position])?;
            }
        }

        tx.commit()?;

        let mut tasks = Vec::with_capacity(rows.len());
        for (position, payload) in rows {
            match serde_json::from_str(&payload) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(
                    "Dropping unreadable {} queue entry at position {}: {}",
                    queue.as_str(),
                    position,
                    e
                ),
            }
        }

        Ok(tasks)
    }

    fn read_tasks<T: DeserializeOwned>(&self, queue: QueueKind) -> StorageResult<Vec<T>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT payload FROM {} ORDER BY position",
            queue_table(queue)
        ))?;

        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StorageError::from))
            .collect()
    }

    fn positions(&self, queue: QueueKind) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT position FROM {} ORDER BY position",
            queue_table(queue)
        ))?;

        let positions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(positions)
    }
}

fn queue_table(queue: QueueKind) -> &'static str {
    match queue {
        QueueKind::Manga => "manga_queue",
        QueueKind::Chapter => "chapter_queue",
    }
}

fn apply_action(
    conn: &Connection,
    table: &str,
    position: i64,
    action: QueueAction,
) -> StorageResult<()> {
    let status = match action {
        QueueAction::Delete => {
            conn.execute(
                &format!("DELETE FROM {} WHERE position = ?1", table),
                params![position],
            )?;
            return Ok(());
        }
        QueueAction::Pause => TaskStatus::Paused,
        QueueAction::Resume => TaskStatus::Queued,
    };

    let payload: String = conn.query_row(
        &format!("SELECT payload FROM {} WHERE position = ?1", table),
        params![position],
        |row| row.get(0),
    )?;

    let mut value: Value = serde_json::from_str(&payload)?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert(
            "status".to_string(),
            Value::String(status.to_db_string().to_string()),
        );
        if action == QueueAction::Resume && fields.contains_key("error_reason") {
            fields.insert("error_reason".to_string(), Value::Null);
        }
    }

    conn.execute(
        &format!(
            "UPDATE {} SET status = ?1, payload = ?2 WHERE position = ?3",
            table
        ),
        params![status.to_db_string(), serde_json::to_string(&value)?, position],
    )?;

    Ok(())
}

fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_db_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    Ok(ContentItem {
        id: row.get(0)?,
        source: row.get(1)?,
        site_name: row.get(2)?,
        source_id: row.get(3)?,
        title: row.get(4)?,
        link: row.get(5)?,
        cover: row.get(6)?,
        alternative: row.get(7)?,
        genre: row.get(8)?,
        publication_status: row.get(9)?,
        post_status: PostStatus::from_db_string(&row.get::<_, String>(10)?)
            .unwrap_or(PostStatus::Publish),
        details: parse_db_json(11, &row.get::<_, String>(11)?)?,
        created_at: parse_db_time(12, &row.get::<_, String>(12)?)?,
        last_updated: parse_db_time(13, &row.get::<_, String>(13)?)?,
    })
}

impl OptionStore for SqliteStorage {
    fn get_option(&self, key: &str) -> StorageResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM options WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_option(&mut self, key: &str, value: &Value) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO options (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    fn delete_option(&mut self, key: &str) -> StorageResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM options WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn update_option(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> StorageResult<Value> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM options WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let current = match current {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };

        let next = update(current);
        tx.execute(
            "INSERT INTO options (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serde_json::to_string(&next)?],
        )?;
        tx.commit()?;

        Ok(next)
    }
}

impl QueueStore for SqliteStorage {
    // ===== Manga Queue =====

    fn enqueue_manga(&mut self, mut task: MangaTask, at: DateTime<Utc>) -> StorageResult<()> {
        task.queued_at = Some(at);
        let (site_name, source_id, status, priority) = (
            task.site_name.clone(),
            task.source_id.clone(),
            task.status,
            task.priority,
        );
        self.push_task(
            QueueKind::Manga,
            &site_name,
            &source_id,
            status,
            priority,
            &task,
        )
    }

    fn drain_manga(&mut self, max: usize) -> StorageResult<Vec<MangaTask>> {
        self.pop_tasks(QueueKind::Manga, max)
    }

    fn list_manga(&self) -> StorageResult<Vec<MangaTask>> {
        self.read_tasks(QueueKind::Manga)
    }

    fn contains_manga(&self, site_name: &str, source_id: &str) -> StorageResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM manga_queue WHERE site_name = ?1 AND source_id = ?2)",
            params![site_name, source_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ===== Chapter Queue =====

    fn enqueue_chapter(&mut self, mut task: ChapterTask, at: DateTime<Utc>) -> StorageResult<()> {
        task.queued_at = Some(at);
        let (site_name, manga_source_id, status) = (
            task.site_name.clone(),
            task.manga_source_id.clone(),
            task.status,
        );
        self.push_task(
            QueueKind::Chapter,
            &site_name,
            &manga_source_id,
            status,
            Priority::Normal,
            &task,
        )
    }

    fn drain_chapters(&mut self, max: usize) -> StorageResult<Vec<ChapterTask>> {
        self.pop_tasks(QueueKind::Chapter, max)
    }

    fn list_chapters(&self) -> StorageResult<Vec<ChapterTask>> {
        self.read_tasks(QueueKind::Chapter)
    }

    fn patch_chapter_owner(
        &mut self,
        site_name: &str,
        manga_source_id: &str,
        item_id: i64,
    ) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;

        let rows: Vec<(i64, String)> = {
            let mut stmt = tx.prepare(
                "SELECT position, payload FROM chapter_queue
                 WHERE site_name = ?1 AND source_id = ?2 ORDER BY position",
            )?;
            let rows = stmt
                .query_map(params![site_name, manga_source_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut patched = 0;
        for (position, payload) in rows {
            let mut task: ChapterTask = serde_json::from_str(&payload)?;
            if let ContentOwner::Pending(_) = task.owner {
                task.owner = ContentOwner::Item(item_id);
                tx.execute(
                    "UPDATE chapter_queue SET payload = ?1 WHERE position = ?2",
                    params![serde_json::to_string(&task)?, position],
                )?;
                patched += 1;
            }
        }

        tx.commit()?;
        Ok(patched)
    }

    // ===== Operator Actions =====

    fn mutate_at(
        &mut self,
        queue: QueueKind,
        index: usize,
        action: QueueAction,
    ) -> StorageResult<bool> {
        Ok(self.mutate_many(queue, &[index], action)? == 1)
    }

    fn mutate_many(
        &mut self,
        queue: QueueKind,
        indices: &[usize],
        action: QueueAction,
    ) -> StorageResult<usize> {
        let positions = self.positions(queue)?;
        let mut targets: Vec<i64> = indices
            .iter()
            .filter_map(|&i| positions.get(i).copied())
            .collect();
        targets.sort_unstable();
        targets.dedup();

        let table = queue_table(queue);
        let tx = self.conn.transaction()?;
        for position in &targets {
            apply_action(&tx, table, *position, action)?;
        }
        tx.commit()?;

        Ok(targets.len())
    }

    fn count_by_status(&self, queue: QueueKind) -> StorageResult<HashMap<TaskStatus, u64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            queue_table(queue)
        ))?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = TaskStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }
}

impl ContentRepository for SqliteStorage {
    fn create_item(&mut self, item: &NewContentItem) -> StorageResult<i64> {
        let now = to_db_time(item.created_at);
        self.conn.execute(
            "INSERT INTO content_items (source, site_name, source_id, title, link, cover,
             alternative, genre, publication_status, post_status, details, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                CONTENT_SOURCE,
                item.site_name,
                item.source_id,
                item.title,
                item.link,
                item.cover,
                item.alternative,
                item.genre,
                item.publication_status,
                item.post_status.to_db_string(),
                serde_json::to_string(&item.details)?,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_item(&self, item_id: i64) -> StorageResult<Option<ContentItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {} FROM content_items WHERE id = ?1", ITEM_COLUMNS),
                params![item_id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn find_item_by_source(
        &self,
        site_name: &str,
        source_id: &str,
    ) -> StorageResult<Option<ContentItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM content_items
                     WHERE source = ?1 AND site_name = ?2 AND source_id = ?3",
                    ITEM_COLUMNS
                ),
                params![CONTENT_SOURCE, site_name, source_id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn chapter_ids(&self, item_id: i64) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chapter_source_id FROM content_chapters WHERE item_id = ?1")?;

        let ids = stmt
            .query_map(params![item_id], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(ids)
    }

    fn upsert_chapter(&mut self, item_id: i64, chapter: &ChapterRecord) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM content_items WHERE id = ?1)",
            params![item_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::ContentItemNotFound(item_id));
        }

        let updated_at = to_db_time(chapter.updated_at);
        tx.execute(
            "INSERT INTO content_chapters (item_id, chapter_source_id, name, slug, images, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(item_id, chapter_source_id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                images = excluded.images,
                updated_at = excluded.updated_at",
            params![
                item_id,
                chapter.chapter_source_id,
                chapter.name,
                chapter.slug,
                serde_json::to_string(&chapter.images)?,
                updated_at
            ],
        )?;

        tx.execute(
            "UPDATE content_items SET last_updated = ?1 WHERE id = ?2",
            params![updated_at, item_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn chapters(&self, item_id: i64) -> StorageResult<Vec<ChapterRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT chapter_source_id, name, slug, images, updated_at
             FROM content_chapters WHERE item_id = ?1 ORDER BY id",
        )?;

        let chapters = stmt
            .query_map(params![item_id], |row| {
                Ok(ChapterRecord {
                    chapter_source_id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    images: parse_db_json(3, &row.get::<_, String>(3)?)?,
                    updated_at: parse_db_time(4, &row.get::<_, String>(4)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chapters)
    }

    fn touch_item(&mut self, item_id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE content_items SET last_updated = ?1 WHERE id = ?2",
            params![to_db_time(at), item_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ContentItemNotFound(item_id));
        }
        Ok(())
    }

    fn delete_item(&mut self, item_id: i64) -> StorageResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM content_items WHERE id = ?1", params![item_id])?;
        Ok(removed > 0)
    }

    fn list_items(&self, offset: usize, limit: usize) -> StorageResult<Vec<ContentItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM content_items ORDER BY id LIMIT ?1 OFFSET ?2",
            ITEM_COLUMNS
        ))?;

        let items = stmt
            .query_map(params![limit as i64, offset as i64], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl ResponseCache for SqliteStorage {
    fn cache_get(&self, key: &str, now: DateTime<Utc>) -> StorageResult<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM response_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, to_db_time(now)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn cache_put(
        &mut self,
        key: &str,
        body: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO response_cache (key, body, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, expires_at = excluded.expires_at",
            params![key, body, to_db_time(expires_at)],
        )?;
        Ok(())
    }

    fn cache_prune(&mut self, now: DateTime<Utc>) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM response_cache WHERE expires_at <= ?1",
            params![to_db_time(now)],
        )?)
    }

    fn cache_clear(&mut self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM response_cache", [])?)
    }

    fn count_cache_entries(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM response_cache WHERE expires_at > ?1",
            params![to_db_time(now)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl LogStore for SqliteStorage {
    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO activity_log (level, message, created_at) VALUES (?1, ?2, ?3)",
            params![
                entry.level.to_db_string(),
                entry.message,
                to_db_time(entry.created_at)
            ],
        )?;
        Ok(())
    }

    fn prune_logs(&mut self, before: DateTime<Utc>) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM activity_log WHERE created_at < ?1",
            params![to_db_time(before)],
        )?)
    }

    fn list_logs(
        &self,
        level: Option<LogLevel>,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT level, message, created_at FROM activity_log
             WHERE (?1 IS NULL OR level = ?1)
             ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;

        let entries = stmt
            .query_map(
                params![
                    level.map(|l| l.to_db_string()),
                    limit as i64,
                    offset as i64
                ],
                |row| {
                    Ok(LogEntry {
                        level: LogLevel::from_db_string(&row.get::<_, String>(0)?)
                            .unwrap_or(LogLevel::Info),
                        message: row.get(1)?,
                        created_at: parse_db_time(2, &row.get::<_, String>(2)?)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn count_logs(&self, level: Option<LogLevel>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activity_log WHERE (?1 IS NULL OR level = ?1)",
            params![level.map(|l| l.to_db_string())],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear_logs(&mut self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM activity_log", [])?)
    }

    fn record_fetch_error(&mut self, record: &FetchErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO fetch_errors (url, message, occurred_at) VALUES (?1, ?2, ?3)",
            params![record.url, record.message, to_db_time(record.occurred_at)],
        )?;
        Ok(())
    }

    fn prune_fetch_errors(&mut self, before: DateTime<Utc>) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM fetch_errors WHERE occurred_at < ?1",
            params![to_db_time(before)],
        )?)
    }

    fn list_fetch_errors(&self, limit: usize) -> StorageResult<Vec<FetchErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, message, occurred_at FROM fetch_errors ORDER BY id DESC LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(FetchErrorRecord {
                    url: row.get(0)?,
                    message: row.get(1)?,
                    occurred_at: parse_db_time(2, &row.get::<_, String>(2)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MangaDetails;
    use crate::testing::{create_chapter_task, create_manga_task, create_test_site};
    use chrono::{Duration, TimeZone};

    fn new_item(site_name: &str, source_id: &str) -> NewContentItem {
        NewContentItem {
            site_name: site_name.to_string(),
            source_id: source_id.to_string(),
            title: "Solo Leveling".to_string(),
            link: "https://example.com/manga/solo-leveling/".to_string(),
            cover: String::new(),
            alternative: String::new(),
            genre: "Action".to_string(),
            publication_status: "Completed".to_string(),
            post_status: PostStatus::Draft,
            details: MangaDetails::default(),
            created_at: Utc::now(),
        }
    }

    fn chapter(id: &str, images: &[&str]) -> ChapterRecord {
        ChapterRecord {
            chapter_source_id: id.to_string(),
            name: format!("Chapter {}", id),
            slug: format!("chapter-{}", id),
            images: images.iter().map(|s| s.to_string()).collect(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::open_in_memory().is_ok());
    }

    #[test]
    fn test_drain_is_fifo_and_bounded() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");

        for slug in ["first", "second", "third"] {
            storage
                .enqueue_manga(create_manga_task(&site, slug), Utc::now())
                .unwrap();
        }

        let drained = storage.drain_manga(2).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].title, "first");
        assert_eq!(drained[1].title, "second");
        assert!(drained[0].queued_at.is_some());

        let rest = storage.list_manga().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "third");

        assert_eq!(storage.drain_manga(5).unwrap().len(), 1);
        assert!(storage.drain_manga(5).unwrap().is_empty());
    }

    #[test]
    fn test_drain_skips_paused_and_error() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");

        let mut errored = create_manga_task(&site, "broken");
        errored.status = TaskStatus::Error;
        storage.enqueue_manga(errored, Utc::now()).unwrap();
        storage
            .enqueue_manga(create_manga_task(&site, "paused"), Utc::now())
            .unwrap();
        storage
            .enqueue_manga(create_manga_task(&site, "ready"), Utc::now())
            .unwrap();

        assert!(storage
            .mutate_at(QueueKind::Manga, 1, QueueAction::Pause)
            .unwrap());

        let drained = storage.drain_manga(10).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].title, "ready");

        let remaining = storage.list_manga().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[1].status, TaskStatus::Paused);
    }

    #[test]
    fn test_resume_clears_error_reason() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");

        let mut task = create_manga_task(&site, "broken");
        task.status = TaskStatus::Error;
        task.error_reason = Some("No chapters".to_string());
        storage.enqueue_manga(task, Utc::now()).unwrap();

        assert!(storage
            .mutate_at(QueueKind::Manga, 0, QueueAction::Resume)
            .unwrap());
        assert!(!storage
            .mutate_at(QueueKind::Manga, 5, QueueAction::Resume)
            .unwrap());

        let tasks = storage.list_manga().unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Queued);
        assert!(tasks[0].error_reason.is_none());
        assert_eq!(storage.drain_manga(1).unwrap().len(), 1);
    }

    #[test]
    fn test_mutate_many_uses_original_indices() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");
        for slug in ["a", "b", "c", "d"] {
            storage.enqueue_manga(create_manga_task(&site, slug), Utc::now()).unwrap();
        }

        let removed = storage
            .mutate_many(QueueKind::Manga, &[0, 2, 2, 9], QueueAction::Delete)
            .unwrap();
        assert_eq!(removed, 2);

        let titles: Vec<String> = storage
            .list_manga()
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["b", "d"]);
    }

    #[test]
    fn test_contains_manga() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");
        let task = create_manga_task(&site, "queued-one");
        let source_id = task.source_id.clone();
        storage.enqueue_manga(task, Utc::now()).unwrap();

        assert!(storage.contains_manga("Example", &source_id).unwrap());
        assert!(!storage.contains_manga("Other", &source_id).unwrap());
    }

    #[test]
    fn test_patch_chapter_owner() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");
        let manga = create_manga_task(&site, "pending");
        let other = create_manga_task(&site, "other");

        for n in 1..=3 {
            storage
                .enqueue_chapter(create_chapter_task(
                    &manga,
                    ContentOwner::Pending(manga.source_id.clone()),
                    n,
                ), Utc::now())
                .unwrap();
        }
        storage
            .enqueue_chapter(create_chapter_task(
                &other,
                ContentOwner::Pending(other.source_id.clone()),
                1,
            ), Utc::now())
            .unwrap();

        let patched = storage
            .patch_chapter_owner("Example", &manga.source_id, 7)
            .unwrap();
        assert_eq!(patched, 3);

        let tasks = storage.list_chapters().unwrap();
        assert!(tasks[..3].iter().all(|t| t.owner == ContentOwner::Item(7)));
        assert_eq!(
            tasks[3].owner,
            ContentOwner::Pending(other.source_id.clone())
        );
    }

    #[test]
    fn test_count_by_status() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");
        let mut retrying = create_manga_task(&site, "retrying");
        retrying.status = TaskStatus::Retrying;
        storage.enqueue_manga(retrying, Utc::now()).unwrap();
        storage.enqueue_manga(create_manga_task(&site, "a"), Utc::now()).unwrap();
        storage.enqueue_manga(create_manga_task(&site, "b"), Utc::now()).unwrap();

        let counts = storage.count_by_status(QueueKind::Manga).unwrap();
        assert_eq!(counts.get(&TaskStatus::Queued), Some(&2));
        assert_eq!(counts.get(&TaskStatus::Retrying), Some(&1));
        assert_eq!(counts.get(&TaskStatus::Error), None);
    }

    #[test]
    fn test_content_item_lookup() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.create_item(&new_item("Example", "abc")).unwrap();

        let item = storage.find_item_by_source("Example", "abc").unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.source, CONTENT_SOURCE);
        assert_eq!(item.post_status, PostStatus::Draft);
        assert!(storage.find_item_by_source("Other", "abc").unwrap().is_none());

        assert!(storage.create_item(&new_item("Example", "abc")).is_err());
        assert_eq!(storage.count_items().unwrap(), 1);
    }

    #[test]
    fn test_upsert_chapter_is_idempotent() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.create_item(&new_item("Example", "abc")).unwrap();

        let record = chapter("1", &["https://cdn.example.com/1.jpg"]);
        storage.upsert_chapter(id, &record).unwrap();
        storage.upsert_chapter(id, &record).unwrap();
        storage
            .upsert_chapter(id, &chapter("2", &["https://cdn.example.com/2.jpg"]))
            .unwrap();

        let chapters = storage.chapters(id).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].chapter_source_id, "1");
        assert_eq!(chapters[0].images, vec!["https://cdn.example.com/1.jpg"]);

        let ids = storage.chapter_ids(id).unwrap();
        assert!(ids.contains("1") && ids.contains("2"));
    }

    #[test]
    fn test_upsert_chapter_requires_item() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let result = storage.upsert_chapter(99, &chapter("1", &[]));
        assert!(matches!(result, Err(StorageError::ContentItemNotFound(99))));
    }

    #[test]
    fn test_delete_item_cascades() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let id = storage.create_item(&new_item("Example", "abc")).unwrap();
        storage.upsert_chapter(id, &chapter("1", &[])).unwrap();

        assert!(storage.delete_item(id).unwrap());
        assert!(!storage.delete_item(id).unwrap());
        assert!(storage.chapter_ids(id).unwrap().is_empty());
    }

    #[test]
    fn test_cache_expiry() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        storage
            .cache_put("key", "<html></html>", now + Duration::seconds(300))
            .unwrap();

        assert_eq!(
            storage.cache_get("key", now).unwrap().as_deref(),
            Some("<html></html>")
        );
        assert!(storage
            .cache_get("key", now + Duration::seconds(301))
            .unwrap()
            .is_none());

        assert_eq!(storage.cache_clear().unwrap(), 1);
        assert!(storage.cache_get("key", now).unwrap().is_none());
    }

    #[test]
    fn test_cache_prune_and_live_count() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        storage
            .cache_put("stale", "old", now + Duration::seconds(10))
            .unwrap();
        storage
            .cache_put("fresh", "new", now + Duration::seconds(600))
            .unwrap();

        let later = now + Duration::seconds(60);
        assert_eq!(storage.count_cache_entries(now).unwrap(), 2);
        assert_eq!(storage.count_cache_entries(later).unwrap(), 1);

        assert_eq!(storage.cache_prune(later).unwrap(), 1);
        assert_eq!(storage.count_cache_entries(now).unwrap(), 1);
        assert_eq!(storage.cache_get("fresh", later).unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_drain_prefers_higher_priority() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");

        let mut low = create_manga_task(&site, "low");
        low.priority = Priority::Low;
        let mut urgent = create_manga_task(&site, "urgent");
        urgent.priority = Priority::High;

        storage.enqueue_manga(low, Utc::now()).unwrap();
        storage
            .enqueue_manga(create_manga_task(&site, "normal"), Utc::now())
            .unwrap();
        storage.enqueue_manga(urgent, Utc::now()).unwrap();

        let titles: Vec<String> = storage
            .drain_manga(3)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["urgent", "normal", "low"]);
    }

    #[test]
    fn test_timestamps_come_from_caller() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let site = create_test_site("Example", "https://example.com");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        storage
            .enqueue_manga(create_manga_task(&site, "stamped"), at)
            .unwrap();
        assert_eq!(storage.list_manga().unwrap()[0].queued_at, Some(at));

        let mut item = new_item("Example", "abc");
        item.created_at = at;
        let id = storage.create_item(&item).unwrap();
        let stored = storage.get_item(id).unwrap().unwrap();
        assert_eq!(stored.created_at, at);
        assert_eq!(stored.last_updated, at);
    }

    #[test]
    fn test_update_option_read_modify_write() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();

        for _ in 0..3 {
            storage
                .update_option("counter", &mut |current| {
                    let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                    Value::from(n + 1)
                })
                .unwrap();
        }

        assert_eq!(storage.get_option("counter").unwrap(), Some(Value::from(3)));
        assert!(storage.delete_option("counter").unwrap());
        assert_eq!(storage.get_option("counter").unwrap(), None);
    }

    #[test]
    fn test_log_filter_and_prune() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        let entries = [
            (LogLevel::Error, "old failure", now - Duration::days(10)),
            (LogLevel::Warning, "empty body", now - Duration::hours(1)),
            (LogLevel::Error, "fetch failed", now),
        ];
        for (level, message, created_at) in entries {
            storage
                .append_log(&LogEntry {
                    level,
                    message: message.to_string(),
                    created_at,
                })
                .unwrap();
        }

        let errors = storage.list_logs(Some(LogLevel::Error), 0, 10).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "fetch failed");

        assert_eq!(storage.prune_logs(now - Duration::days(7)).unwrap(), 1);
        assert_eq!(storage.count_logs(None).unwrap(), 2);

        let page = storage.list_logs(None, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message, "empty body");

        assert_eq!(storage.clear_logs().unwrap(), 2);
    }

    #[test]
    fn test_fetch_error_log() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .record_fetch_error(&FetchErrorRecord {
                url: "https://example.com/".to_string(),
                message: "HTTP 503".to_string(),
                occurred_at: Utc::now(),
            })
            .unwrap();

        let errors = storage.list_fetch_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "HTTP 503");
    }

    #[test]
    fn test_prune_fetch_errors() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();
        for (message, occurred_at) in [
            ("HTTP 500", now - Duration::days(10)),
            ("HTTP 503", now - Duration::hours(2)),
        ] {
            storage
                .record_fetch_error(&FetchErrorRecord {
                    url: "https://example.com/".to_string(),
                    message: message.to_string(),
                    occurred_at,
                })
                .unwrap();
        }

        assert_eq!(storage.prune_fetch_errors(now - Duration::days(7)).unwrap(), 1);
        let errors = storage.list_fetch_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "HTTP 503");
    }
}
