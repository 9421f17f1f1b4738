//! Work queue task types
//!
//! Manga and chapter tasks are explicit, validated structs. Each carries a
//! snapshot of its site's rules so a task keeps working with the rules it
//! was discovered under. Persistence lives in the storage module.

use crate::extract::{ChapterListItem, MangaListItem};
use crate::links::is_valid_url;
use crate::site::SiteConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Task validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid URL for {field}: '{url}'")]
    InvalidUrl { field: &'static str, url: String },

    #[error("Task site '{task}' does not match its rule snapshot '{snapshot}'")]
    SiteMismatch { task: String, snapshot: String },
}

/// Lifecycle state of a queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Queued,
    Retrying,
    Paused,
    Error,
}

impl TaskStatus {
    /// Only queued and retrying tasks are handed out by a drain
    pub fn is_drainable(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Retrying)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Retrying => "retrying",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "retrying" => Some(Self::Retrying),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Drain order: higher ranks leave the queue first
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

/// Which of the two work queues an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Manga,
    Chapter,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Manga => "manga",
            QueueKind::Chapter => "chapter",
        }
    }
}

/// Operator actions on queue entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Pause,
    Resume,
    Delete,
}

/// Content item a chapter belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContentOwner {
    /// A content item that exists in the repository
    Item(i64),
    /// Placeholder keyed by the manga's source id, patched once the item exists
    Pending(String),
}

/// A manga detail page waiting to be harvested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaTask {
    pub site_name: String,
    pub site: SiteConfig,
    pub source_id: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub alternative: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub publication_status: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

impl MangaTask {
    /// Builds a task from a discovered list item
    ///
    /// # Arguments
    ///
    /// * `site` - Rules of the site the item was found on
    /// * `item` - The discovered manga
    ///
    /// # Returns
    ///
    /// * `Ok(MangaTask)` - A queued task with no retries
    /// * `Err(TaskError)` - The item is missing a title, id or usable link
    pub fn new(site: &SiteConfig, item: &MangaListItem) -> Result<Self, TaskError> {
        let task = Self {
            site_name: site.site_name.clone(),
            site: site.clone(),
            source_id: item.id.clone(),
            title: item.title.clone(),
            link: item.link.clone(),
            cover: item.cover.clone(),
            alternative: String::new(),
            genre: String::new(),
            publication_status: String::new(),
            retry_count: 0,
            status: TaskStatus::Queued,
            priority: Priority::Normal,
            queued_at: None,
            error_reason: None,
        };
        task.validate()?;
        Ok(task)
    }

    /// Re-checks the invariants of a task, including ones loaded from storage
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.site_name.trim().is_empty() {
            return Err(TaskError::MissingField("site_name"));
        }
        if self.source_id.trim().is_empty() {
            return Err(TaskError::MissingField("source_id"));
        }
        if self.title.trim().is_empty() {
            return Err(TaskError::MissingField("title"));
        }
        if self.link.trim().is_empty() {
            return Err(TaskError::MissingField("link"));
        }
        if !is_valid_url(&self.link) {
            return Err(TaskError::InvalidUrl {
                field: "link",
                url: self.link.clone(),
            });
        }
        if self.site.site_name != self.site_name {
            return Err(TaskError::SiteMismatch {
                task: self.site_name.clone(),
                snapshot: self.site.site_name.clone(),
            });
        }
        Ok(())
    }
}

/// A chapter page waiting to be attached to a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterTask {
    pub site_name: String,
    pub site: SiteConfig,
    pub owner: ContentOwner,
    pub manga_source_id: String,
    pub manga_title: String,
    pub chapter_title: String,
    pub chapter_link: String,
    pub chapter_source_id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

impl ChapterTask {
    /// Builds a chapter task for one chapter of a manga
    pub fn new(
        manga: &MangaTask,
        owner: ContentOwner,
        chapter: &ChapterListItem,
    ) -> Result<Self, TaskError> {
        let task = Self {
            site_name: manga.site_name.clone(),
            site: manga.site.clone(),
            owner,
            manga_source_id: manga.source_id.clone(),
            manga_title: manga.title.clone(),
            chapter_title: chapter.title.clone(),
            chapter_link: chapter.link.clone(),
            chapter_source_id: chapter.id.clone(),
            status: TaskStatus::Queued,
            queued_at: None,
        };
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.site_name.trim().is_empty() {
            return Err(TaskError::MissingField("site_name"));
        }
        if self.chapter_source_id.trim().is_empty() {
            return Err(TaskError::MissingField("chapter_source_id"));
        }
        if self.chapter_title.trim().is_empty() {
            return Err(TaskError::MissingField("chapter_title"));
        }
        if !is_valid_url(&self.chapter_link) {
            return Err(TaskError::InvalidUrl {
                field: "chapter_link",
                url: self.chapter_link.clone(),
            });
        }
        if let ContentOwner::Pending(source_id) = &self.owner {
            if source_id.trim().is_empty() {
                return Err(TaskError::MissingField("owner"));
            }
        }
        Ok(())
    }
}
