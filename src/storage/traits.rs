//! Storage traits and error types
//!
//! This module defines the ports the pipeline talks to: the option store,
//! the two work queues, the content repository, the response cache and the
//! log sinks. `Storage` bundles them for backends that provide all five.

use crate::queue::{ChapterTask, MangaTask, QueueAction, QueueKind, TaskStatus};
use crate::storage::{ChapterRecord, ContentItem, FetchErrorRecord, LogEntry, LogLevel, NewContentItem};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Content item not found: {0}")]
    ContentItemNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value option store holding JSON values
pub trait OptionStore {
    fn get_option(&self, key: &str) -> StorageResult<Option<Value>>;

    fn set_option(&mut self, key: &str, value: &Value) -> StorageResult<()>;

    /// Removes an option, returning whether it existed
    fn delete_option(&mut self, key: &str) -> StorageResult<bool>;

    /// Atomically replaces an option with `update(current)`
    ///
    /// # Returns
    ///
    /// The value that was written
    fn update_option(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> StorageResult<Value>;
}

/// The two FIFO work queues
///
/// Indices used by `mutate_at` and `mutate_many` are 0-based positions in
/// `list_*` order, covering every entry regardless of status.
pub trait QueueStore {
    // ===== Manga Queue =====

    /// Appends a task, stamping `queued_at` with `at`
    fn enqueue_manga(&mut self, task: MangaTask, at: DateTime<Utc>) -> StorageResult<()>;

    /// Atomically removes up to `max` drainable tasks, highest priority first,
    /// FIFO within a priority
    fn drain_manga(&mut self, max: usize) -> StorageResult<Vec<MangaTask>>;

    fn list_manga(&self) -> StorageResult<Vec<MangaTask>>;

    /// Returns true if a task for this manga is in the queue, in any status
    fn contains_manga(&self, site_name: &str, source_id: &str) -> StorageResult<bool>;

    // ===== Chapter Queue =====

    fn enqueue_chapter(&mut self, task: ChapterTask, at: DateTime<Utc>) -> StorageResult<()>;

    fn drain_chapters(&mut self, max: usize) -> StorageResult<Vec<ChapterTask>>;

    fn list_chapters(&self) -> StorageResult<Vec<ChapterTask>>;

    /// Rewrites pending owners of a manga's chapter tasks to a real item id
    ///
    /// # Returns
    ///
    /// The number of tasks patched
    fn patch_chapter_owner(
        &mut self,
        site_name: &str,
        manga_source_id: &str,
        item_id: i64,
    ) -> StorageResult<usize>;

    // ===== Operator Actions =====

    /// Applies an action to the entry at `index`, returning whether it existed
    fn mutate_at(&mut self, queue: QueueKind, index: usize, action: QueueAction)
        -> StorageResult<bool>;

    /// Applies an action to several entries, returning how many existed
    fn mutate_many(
        &mut self,
        queue: QueueKind,
        indices: &[usize],
        action: QueueAction,
    ) -> StorageResult<usize>;

    fn count_by_status(&self, queue: QueueKind) -> StorageResult<HashMap<TaskStatus, u64>>;
}

/// Store of harvested content items and their chapters
pub trait ContentRepository {
    /// Creates a content item, stamping both timestamps with `item.created_at`
    ///
    /// # Returns
    ///
    /// The id of the new item
    fn create_item(&mut self, item: &NewContentItem) -> StorageResult<i64>;

    fn get_item(&self, item_id: i64) -> StorageResult<Option<ContentItem>>;

    /// Finds the item harvested from `source_id` on `site_name`
    fn find_item_by_source(
        &self,
        site_name: &str,
        source_id: &str,
    ) -> StorageResult<Option<ContentItem>>;

    /// Source ids of the chapters already attached to an item
    fn chapter_ids(&self, item_id: i64) -> StorageResult<HashSet<String>>;

    /// Inserts or replaces a chapter and stamps the item's last-updated time
    fn upsert_chapter(&mut self, item_id: i64, chapter: &ChapterRecord) -> StorageResult<()>;

    /// Chapters of an item in the order they were first attached
    fn chapters(&self, item_id: i64) -> StorageResult<Vec<ChapterRecord>>;

    fn touch_item(&mut self, item_id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    fn delete_item(&mut self, item_id: i64) -> StorageResult<bool>;

    fn list_items(&self, offset: usize, limit: usize) -> StorageResult<Vec<ContentItem>>;

    fn count_items(&self) -> StorageResult<u64>;
}

/// Response cache keyed by request fingerprint
pub trait ResponseCache {
    /// Returns the cached body if present and not expired at `now`
    fn cache_get(&self, key: &str, now: DateTime<Utc>) -> StorageResult<Option<String>>;

    fn cache_put(&mut self, key: &str, body: &str, expires_at: DateTime<Utc>)
        -> StorageResult<()>;

    /// Deletes responses already expired at `now`, returning how many were removed
    fn cache_prune(&mut self, now: DateTime<Utc>) -> StorageResult<usize>;

    /// Removes every cached response, returning how many were removed
    fn cache_clear(&mut self) -> StorageResult<usize>;

    /// Counts responses still live at `now`
    fn count_cache_entries(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}

/// Activity log and fetch error log
pub trait LogStore {
    fn append_log(&mut self, entry: &LogEntry) -> StorageResult<()>;

    /// Deletes entries created before `before`
    fn prune_logs(&mut self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Lists entries newest first, optionally filtered by level
    fn list_logs(
        &self,
        level: Option<LogLevel>,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<LogEntry>>;

    fn count_logs(&self, level: Option<LogLevel>) -> StorageResult<u64>;

    fn clear_logs(&mut self) -> StorageResult<usize>;

    fn record_fetch_error(&mut self, record: &FetchErrorRecord) -> StorageResult<()>;

    /// Deletes fetch errors recorded before `before`
    fn prune_fetch_errors(&mut self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Most recent fetch errors first
    fn list_fetch_errors(&self, limit: usize) -> StorageResult<Vec<FetchErrorRecord>>;
}

/// Everything the harvester needs from a storage backend
pub trait Storage: OptionStore + QueueStore + ContentRepository + ResponseCache + LogStore {}

impl<T> Storage for T where T: OptionStore + QueueStore + ContentRepository + ResponseCache + LogStore
{}
