//! Run reports and harvest statistics
//!
//! This module provides:
//! - Aggregate reports returned by the pipeline batch drivers
//! - Statistics over the queues, content repository and logs
//! - Console rendering for the `--stats` mode

use crate::queue::{QueueKind, TaskStatus};
use crate::site::{load_site_statuses, SiteHealth, SiteStatusMap};
use crate::storage::{keys, load_option, Storage, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of one manga-queue batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Content items created in this batch
    pub items_added: usize,

    /// Chapter tasks enqueued (or, in a dry run, that would have been)
    pub chapters_queued: usize,

    /// Tasks that ended in any failure
    pub errors: usize,

    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of one chapter-queue batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRunReport {
    pub chapters_attached: usize,
    pub images_attached: usize,
    pub errors: usize,
    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of discovering one or more list pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Manga found on the list pages
    pub found: usize,

    /// New manga tasks enqueued
    pub queued: usize,

    /// Manga already waiting in the queue
    pub skipped: usize,

    /// List pages that could not be fetched
    pub errors: usize,
}

impl DiscoveryReport {
    pub fn merge(&mut self, other: DiscoveryReport) {
        self.found += other.found;
        self.queued += other.queued;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Task counts of one queue, by status
#[derive(Debug, Clone, Default)]
pub struct QueueCounts {
    pub by_status: HashMap<TaskStatus, u64>,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.by_status.values().sum()
    }

    pub fn get(&self, status: TaskStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub manga_queue: QueueCounts,
    pub chapter_queue: QueueCounts,

    /// Content items in the repository
    pub total_items: u64,

    /// Live entries in the response cache
    pub cache_entries: u64,

    /// Activity log entries, all levels
    pub log_entries: u64,

    pub last_run: Option<DateTime<Utc>>,
    pub last_manga_report: Option<RunReport>,
    pub last_chapter_report: Option<ChapterRunReport>,
    pub site_statuses: SiteStatusMap,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `now` - Cache entries expiring at or before this time are not counted
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics<S>(storage: &S, now: DateTime<Utc>) -> StorageResult<HarvestStatistics>
where
    S: Storage + ?Sized,
{
    Ok(HarvestStatistics {
        manga_queue: QueueCounts {
            by_status: storage.count_by_status(QueueKind::Manga)?,
        },
        chapter_queue: QueueCounts {
            by_status: storage.count_by_status(QueueKind::Chapter)?,
        },
        total_items: storage.count_items()?,
        cache_entries: storage.count_cache_entries(now)?,
        log_entries: storage.count_logs(None)?,
        last_run: load_option(storage, keys::LAST_RUN)?,
        last_manga_report: load_option(storage, keys::LAST_MANGA_REPORT)?,
        last_chapter_report: load_option(storage, keys::LAST_CHAPTER_REPORT)?,
        site_statuses: load_site_statuses(storage)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Content items: {}", stats.total_items);
    println!("  Cached responses: {}", stats.cache_entries);
    println!("  Activity log entries: {}", stats.log_entries);
    match stats.last_run {
        Some(at) => println!("  Last manga run: {}", at.to_rfc3339()),
        None => println!("  Last manga run: never"),
    }
    println!();

    print_queue("Manga Queue", &stats.manga_queue);
    print_queue("Chapter Queue", &stats.chapter_queue);

    if let Some(report) = &stats.last_manga_report {
        println!("Last Manga Batch:");
        println!("  Items added: {}", report.items_added);
        println!("  Chapters queued: {}", report.chapters_queued);
        println!("  Errors: {}", report.errors);
        println!();
    }

    if let Some(report) = &stats.last_chapter_report {
        println!("Last Chapter Batch:");
        println!("  Chapters attached: {}", report.chapters_attached);
        println!("  Images attached: {}", report.images_attached);
        println!("  Errors: {}", report.errors);
        println!();
    }

    if !stats.site_statuses.is_empty() {
        println!("Sites:");
        for (name, status) in &stats.site_statuses {
            let checked = status.last_check.to_rfc3339();
            match status.status {
                SiteHealth::Error => {
                    println!("  {}: error ({}) at {}", name, status.reason, checked)
                }
                health => println!("  {}: {:?} at {}", name, health, checked),
            }
        }
    }
}

fn print_queue(title: &str, counts: &QueueCounts) {
    println!("{} ({} tasks):", title, counts.total());
    for status in [
        TaskStatus::Queued,
        TaskStatus::Retrying,
        TaskStatus::Paused,
        TaskStatus::Error,
    ] {
        let count = counts.get(status);
        if count > 0 {
            println!("  {}: {}", status.to_db_string(), count);
        }
    }
    println!();
}
