//! Chapter stage
//!
//! Drains chapter tasks, fetches each chapter page and attaches its images to
//! the owning content item. Failed chapter tasks are logged and dropped after
//! a single attempt.

use crate::extract::parse_chapter_images;
use crate::fetcher::FetchRequest;
use crate::links::slugify;
use crate::pipeline::{FailureKind, Harvester, TaskOutcome};
use crate::queue::{ChapterTask, ContentOwner};
use crate::report::ChapterRunReport;
use crate::storage::{keys, load_flag, lock_storage, save_option, ChapterRecord, StorageResult};
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use tracing::debug;

impl Harvester {
    /// Runs one chapter batch
    ///
    /// Mirrors the manga batch: pause check, bounded drain, concurrent
    /// processing, then the report is persisted.
    pub async fn drain_chapter_queue(&self) -> Result<ChapterRunReport, HarvestError> {
        let dry_run = self.config.harvest.dry_run;
        let batch = self.batch_size();

        let tasks = {
            let mut storage = lock_storage(&self.storage)?;
            let tasks = if load_flag(&*storage, keys::CHAPTER_PAUSED)? {
                None
            } else if dry_run {
                let queued = storage.list_chapters()?;
                Some(
                    queued
                        .into_iter()
                        .filter(|task| task.status.is_drainable())
                        .take(batch)
                        .collect::<Vec<_>>(),
                )
            } else {
                Some(storage.drain_chapters(batch)?)
            };
            tasks
        };

        let Some(tasks) = tasks else {
            debug!("Chapter queue is paused");
            return Ok(ChapterRunReport::default());
        };
        if tasks.is_empty() {
            return Ok(ChapterRunReport::default());
        }

        let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|task| self.process_chapter_task(task))
            .buffer_unordered(batch)
            .collect()
            .await;

        let mut report = ChapterRunReport {
            dry_run,
            ..ChapterRunReport::default()
        };
        for outcome in &outcomes {
            report.chapters_attached += outcome.chapters_attached;
            report.images_attached += outcome.images_attached;
            if outcome.is_failure() {
                report.errors += 1;
            }
        }

        if !dry_run {
            save_option(
                &mut *lock_storage(&self.storage)?,
                keys::LAST_CHAPTER_REPORT,
                &report,
            )?;
        }

        self.journal.info(format!(
            "Chapter batch finished: {} chapter(s) attached, {} image(s), {} error(s){}",
            report.chapters_attached,
            report.images_attached,
            report.errors,
            if dry_run { " [dry run]" } else { "" }
        ));

        Ok(report)
    }

    /// Processes one chapter task
    ///
    /// # Arguments
    ///
    /// * `task` - A task removed from the chapter queue
    ///
    /// # Returns
    ///
    /// The task's outcome. Nothing is re-queued on failure.
    pub async fn process_chapter_task(&self, task: ChapterTask) -> TaskOutcome {
        if let Err(e) = task.validate() {
            return self.drop_chapter(&task, FailureKind::Validation, e.to_string());
        }

        let item_id = match self.resolve_owner(&task) {
            Ok(Some(item_id)) => item_id,
            Ok(None) => {
                let message = format!("No content item exists yet for '{}'", task.manga_title);
                return self.drop_chapter(&task, FailureKind::Validation, message);
            }
            Err(e) => return self.drop_chapter(&task, FailureKind::Persistence, e.to_string()),
        };

        let html = match self
            .fetcher
            .fetch(&task.chapter_link, &FetchRequest::get())
            .await
        {
            Ok(html) => html,
            Err(e) => {
                return self.drop_chapter(&task, FailureKind::TransientNetwork, e.to_string())
            }
        };

        let images = parse_chapter_images(&html, &task.site);
        if images.is_empty() {
            let message = format!("No images found at {}", task.chapter_link);
            return self.drop_chapter(&task, FailureKind::ParseEmpty, message);
        }

        let image_count = images.len();
        if self.config.harvest.dry_run {
            self.journal.info(format!(
                "[dry run] {} image(s) would be attached to '{}' of '{}'",
                image_count, task.chapter_title, task.manga_title
            ));
            return TaskOutcome {
                images_attached: image_count,
                ..TaskOutcome::default()
            };
        }

        let record = ChapterRecord {
            chapter_source_id: task.chapter_source_id.clone(),
            name: task.chapter_title.clone(),
            slug: slugify(&task.chapter_title),
            images,
            updated_at: self.fetcher.clock().now(),
        };

        let stored = lock_storage(&self.storage)
            .and_then(|mut storage| storage.upsert_chapter(item_id, &record));
        if let Err(e) = stored {
            return self.drop_chapter(&task, FailureKind::Persistence, e.to_string());
        }

        self.journal.info(format!(
            "Attached {} image(s) to '{}' of '{}'",
            image_count, task.chapter_title, task.manga_title
        ));

        TaskOutcome {
            chapters_attached: 1,
            images_attached: image_count,
            ..TaskOutcome::default()
        }
    }

    /// Finds the content item id a chapter belongs to
    fn resolve_owner(&self, task: &ChapterTask) -> StorageResult<Option<i64>> {
        match &task.owner {
            ContentOwner::Item(item_id) => Ok(Some(*item_id)),
            ContentOwner::Pending(source_id) => {
                let storage = lock_storage(&self.storage)?;
                let item = storage.find_item_by_source(&task.site_name, source_id)?;
                Ok(item.map(|item| item.id))
            }
        }
    }

    fn drop_chapter(&self, task: &ChapterTask, kind: FailureKind, message: String) -> TaskOutcome {
        self.journal.error(format!(
            "Dropped chapter '{}' of '{}': {}",
            task.chapter_title, task.manga_title, message
        ));
        TaskOutcome::failed(kind, message)
    }
}
