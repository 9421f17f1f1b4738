//! Storage module for persisting harvest state
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The manga and chapter work queues
//! - The content repository (items and their chapters)
//! - Options, the response cache and the activity/error logs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    ContentRepository, LogStore, OptionStore, QueueStore, ResponseCache, Storage, StorageError,
    StorageResult,
};

use crate::config::PostStatus;
use crate::extract::MangaDetails;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the pipeline stages and the fetch layer
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Option keys written by the harvester
pub mod keys {
    pub const MANGA_PAUSED: &str = "manga_paused";
    pub const CHAPTER_PAUSED: &str = "chapter_paused";
    pub const LAST_RUN: &str = "last_run";
    pub const LAST_MANGA_REPORT: &str = "last_manga_report";
    pub const LAST_CHAPTER_REPORT: &str = "last_chapter_report";
    pub const SITE_STATUS: &str = "site_status";
    pub const SITES_CONFIG: &str = "sites_config";
    pub const PROXY_LIST: &str = "proxy_list";
}

/// Source marker stamped on every content item this crate creates
pub const CONTENT_SOURCE: &str = "madara-harvest";

/// Opens (or creates) the SQLite database at `path` as shared storage
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SharedStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(path: &Path) -> StorageResult<SharedStorage> {
    let storage = SqliteStorage::new(path)?;
    Ok(Arc::new(Mutex::new(storage)))
}

/// Wraps an existing backend as shared storage
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, mapping poisoning to a storage error
pub fn lock_storage(
    storage: &SharedStorage,
) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Reads a typed option, returning None if absent
pub fn load_option<S, T>(store: &S, key: &str) -> StorageResult<Option<T>>
where
    S: OptionStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_option(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Writes a typed option
pub fn save_option<S, T>(store: &mut S, key: &str, value: &T) -> StorageResult<()>
where
    S: OptionStore + ?Sized,
    T: Serialize,
{
    let value = serde_json::to_value(value)?;
    store.set_option(key, &value)
}

/// Reads a boolean flag option, false when unset
pub fn load_flag<S>(store: &S, key: &str) -> StorageResult<bool>
where
    S: OptionStore + ?Sized,
{
    Ok(load_option::<S, bool>(store, key)?.unwrap_or(false))
}

/// Fields needed to create a content item
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentItem {
    pub site_name: String,
    pub source_id: String,
    pub title: String,
    pub link: String,
    pub cover: String,
    pub alternative: String,
    pub genre: String,
    pub publication_status: String,
    pub post_status: PostStatus,
    pub details: MangaDetails,
    pub created_at: DateTime<Utc>,
}

/// A harvested manga in the content repository
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: i64,
    pub source: String,
    pub site_name: String,
    pub source_id: String,
    pub title: String,
    pub link: String,
    pub cover: String,
    pub alternative: String,
    pub genre: String,
    pub publication_status: String,
    pub post_status: PostStatus,
    pub details: MangaDetails,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// A chapter attached to a content item
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRecord {
    pub chapter_source_id: String,
    pub name: String,
    pub slug: String,
    pub images: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One line of the operator-facing activity log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A failed fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FetchErrorRecord {
    pub url: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}
