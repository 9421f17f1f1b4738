//! Manga stage
//!
//! Drains manga tasks, fetches each manga's detail page and decides:
//! - Which chapters are new (set difference on chapter source id)
//! - Whether to create the content item now (threshold policy)
//! - Whether a failed task is retried, or parked as an error for review

use crate::config::PostStatus;
use crate::extract::{parse_chapter_list, parse_manga_details, ChapterListItem, MangaDetails};
use crate::fetcher::FetchRequest;
use crate::pipeline::{FailureKind, Harvester, TaskOutcome};
use crate::queue::{ChapterTask, ContentOwner, MangaTask, TaskStatus};
use crate::report::RunReport;
use crate::storage::{keys, load_flag, lock_storage, save_option, NewContentItem};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

impl Harvester {
    /// Runs one manga batch
    ///
    /// Drains up to `parallel_threads` tasks and processes them concurrently.
    /// A paused or empty queue yields a zero report and writes nothing. In dry
    /// run mode tasks are inspected in place instead of drained.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Aggregate counts for the batch
    /// * `Err(HarvestError)` - The queue itself could not be read or drained
    pub async fn drain_manga_queue(&self) -> Result<RunReport, HarvestError> {
        let dry_run = self.config.harvest.dry_run;
        let batch = self.batch_size();

        let tasks = {
            let mut storage = lock_storage(&self.storage)?;
            let tasks = if load_flag(&*storage, keys::MANGA_PAUSED)? {
                None
            } else if dry_run {
                let mut queued: Vec<MangaTask> = storage
                    .list_manga()?
                    .into_iter()
                    .filter(|task| task.status.is_drainable())
                    .collect();
                // Stable sort keeps FIFO order within a priority, as a real drain does
                queued.sort_by_key(|task| Reverse(task.priority.rank()));
                queued.truncate(batch);
                Some(queued)
            } else {
                Some(storage.drain_manga(batch)?)
            };
            tasks
        };

        let Some(tasks) = tasks else {
            debug!("Manga queue is paused");
            return Ok(RunReport::default());
        };
        if tasks.is_empty() {
            return Ok(RunReport::default());
        }

        let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|task| self.process_manga_task(task))
            .buffer_unordered(batch)
            .collect()
            .await;

        let mut report = RunReport {
            dry_run,
            ..RunReport::default()
        };
        for outcome in &outcomes {
            report.items_added += outcome.items_added;
            report.chapters_queued += outcome.chapters_queued;
            if outcome.is_failure() {
                report.errors += 1;
            }
        }

        if !dry_run {
            let now = self.fetcher.clock().now();
            let mut storage = lock_storage(&self.storage)?;
            save_option(&mut *storage, keys::LAST_MANGA_REPORT, &report)?;
            save_option(&mut *storage, keys::LAST_RUN, &now)?;
        }

        self.journal.info(format!(
            "Manga batch finished: {} item(s) added, {} chapter(s) queued, {} error(s){}",
            report.items_added,
            report.chapters_queued,
            report.errors,
            if dry_run { " [dry run]" } else { "" }
        ));

        Ok(report)
    }

    /// Processes one manga task
    ///
    /// # Arguments
    ///
    /// * `task` - A task removed from the manga queue
    ///
    /// # Returns
    ///
    /// The task's outcome. Failed tasks have already been re-queued (or
    /// dropped, for validation failures) when this returns.
    pub async fn process_manga_task(&self, task: MangaTask) -> TaskOutcome {
        if let Err(e) = task.validate() {
            self.journal
                .error(format!("Dropping invalid manga task '{}': {}", task.title, e));
            return TaskOutcome::failed(FailureKind::Validation, e.to_string());
        }

        let html = match self.fetcher.fetch(&task.link, &FetchRequest::get()).await {
            Ok(html) => html,
            Err(e) => return self.retry_later(task, e.to_string()),
        };

        let base_url = Url::parse(&task.link).ok();
        let chapters = parse_chapter_list(&html, &task.site, base_url.as_ref());
        if chapters.is_empty() {
            let reason = format!("No chapters found for '{}' at {}", task.title, task.link);
            return self.park_with_error(task, FailureKind::ParseEmpty, reason);
        }

        if self.config.harvest.dry_run {
            return self.preview_chapters(&task, &chapters);
        }

        let details = parse_manga_details(&html, &task.site);
        match self.store_chapters(&task, &chapters, details) {
            Ok(outcome) => {
                self.journal.info(format!(
                    "Queued {} new chapter(s) for '{}' from {}{}",
                    outcome.chapters_queued,
                    task.title,
                    task.site_name,
                    if outcome.items_added > 0 {
                        " and created its content item"
                    } else {
                        ""
                    }
                ));
                outcome
            }
            Err(e) => {
                let reason = format!("Failed to store chapters for '{}': {}", task.title, e);
                self.park_with_error(task, FailureKind::Persistence, reason)
            }
        }
    }

    /// Counts the chapters a real run would queue, without writing
    fn preview_chapters(&self, task: &MangaTask, chapters: &[ChapterListItem]) -> TaskOutcome {
        let known = {
            let storage = match lock_storage(&self.storage) {
                Ok(storage) => storage,
                Err(e) => return TaskOutcome::failed(FailureKind::Persistence, e.to_string()),
            };
            let known = match storage.find_item_by_source(&task.site_name, &task.source_id) {
                Ok(Some(item)) => storage.chapter_ids(item.id),
                Ok(None) => Ok(HashSet::new()),
                Err(e) => Err(e),
            };
            known
        };

        match known {
            Ok(known) => {
                let count = new_chapters(chapters, &known).len();
                self.journal.info(format!(
                    "[dry run] {} chapter(s) would be queued for '{}'",
                    count, task.title
                ));
                TaskOutcome {
                    chapters_queued: count,
                    ..TaskOutcome::default()
                }
            }
            Err(e) => TaskOutcome::failed(FailureKind::Persistence, e.to_string()),
        }
    }

    /// Enqueues new chapters and applies the threshold policy, all under one lock
    fn store_chapters(
        &self,
        task: &MangaTask,
        chapters: &[ChapterListItem],
        details: MangaDetails,
    ) -> Result<TaskOutcome, HarvestError> {
        let now = self.fetcher.clock().now();
        let mut storage = lock_storage(&self.storage)?;

        let existing = storage.find_item_by_source(&task.site_name, &task.source_id)?;
        let known = match &existing {
            Some(item) => storage.chapter_ids(item.id)?,
            None => HashSet::new(),
        };
        let owner = match &existing {
            Some(item) => ContentOwner::Item(item.id),
            None => ContentOwner::Pending(task.source_id.clone()),
        };

        let mut outcome = TaskOutcome::default();
        for chapter in new_chapters(chapters, &known) {
            match ChapterTask::new(task, owner.clone(), chapter) {
                Ok(chapter_task) => {
                    storage.enqueue_chapter(chapter_task, now)?;
                    outcome.chapters_queued += 1;
                }
                Err(e) => warn!("Skipping chapter '{}' of '{}': {}", chapter.title, task.title, e),
            }
        }

        let threshold = self.config.harvest.chapter_threshold.max(1) as usize;
        if existing.is_none() && outcome.chapters_queued >= threshold {
            let item_id = storage.create_item(&new_content_item(
                task,
                details,
                self.config.harvest.post_status,
                now,
            ))?;
            let patched = storage.patch_chapter_owner(&task.site_name, &task.source_id, item_id)?;
            debug!(
                "Created content item {} for '{}', patched {} chapter task(s)",
                item_id, task.title, patched
            );
            outcome.items_added = 1;
        }

        Ok(outcome)
    }

    /// Re-queues a task after a fetch failure, or parks it once retries run out
    fn retry_later(&self, mut task: MangaTask, message: String) -> TaskOutcome {
        task.retry_count += 1;

        if task.retry_count < self.config.harvest.max_retries {
            task.status = TaskStatus::Retrying;
            self.journal.warn(format!(
                "Re-queued '{}' for retry {}/{}: {}",
                task.title, task.retry_count, self.config.harvest.max_retries, message
            ));
            self.requeue(task);
            TaskOutcome::failed(FailureKind::TransientNetwork, message)
        } else {
            let reason = format!(
                "Giving up on '{}' after {} failed run(s): {}",
                task.title, task.retry_count, message
            );
            self.park_with_error(task, FailureKind::TransientNetwork, reason)
        }
    }

    /// Marks a task as error and re-queues it for operator review
    fn park_with_error(&self, mut task: MangaTask, kind: FailureKind, reason: String) -> TaskOutcome {
        self.journal.error(reason.clone());
        task.status = TaskStatus::Error;
        task.error_reason = Some(reason.clone());
        self.requeue(task);
        TaskOutcome::failed(kind, reason)
    }

    fn requeue(&self, task: MangaTask) {
        if self.config.harvest.dry_run {
            debug!("[dry run] Leaving '{}' in place", task.title);
            return;
        }

        let title = task.title.clone();
        let now = self.fetcher.clock().now();
        let result =
            lock_storage(&self.storage).and_then(|mut storage| storage.enqueue_manga(task, now));
        if let Err(e) = result {
            self.journal
                .error(format!("Failed to re-queue manga task '{}': {}", title, e));
        }
    }
}

fn new_chapters<'a>(
    chapters: &'a [ChapterListItem],
    known: &HashSet<String>,
) -> Vec<&'a ChapterListItem> {
    let mut seen = HashSet::new();
    chapters
        .iter()
        .filter(|chapter| !known.contains(&chapter.id) && seen.insert(chapter.id.clone()))
        .collect()
}

fn new_content_item(
    task: &MangaTask,
    details: MangaDetails,
    post_status: PostStatus,
    created_at: DateTime<Utc>,
) -> NewContentItem {
    NewContentItem {
        site_name: task.site_name.clone(),
        source_id: task.source_id.clone(),
        title: task.title.clone(),
        link: task.link.clone(),
        cover: task.cover.clone(),
        alternative: task.alternative.clone(),
        genre: task.genre.clone(),
        publication_status: task.publication_status.clone(),
        post_status,
        details,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::stable_id;

    fn chapter(n: u32) -> ChapterListItem {
        let link = format!("https://alpha.example.com/manga/x/chapter-{}/", n);
        ChapterListItem {
            id: stable_id(&link),
            title: format!("Chapter {}", n),
            link,
        }
    }

    #[test]
    fn test_new_chapters_skips_known_and_duplicates() {
        let chapters = vec![chapter(3), chapter(2), chapter(2), chapter(1)];
        let known: HashSet<String> = [chapter(1).id].into_iter().collect();

        let titles: Vec<&str> = new_chapters(&chapters, &known)
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Chapter 3", "Chapter 2"]);
    }
}
