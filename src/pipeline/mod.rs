//! Harvest pipeline
//!
//! This module wires the fetch layer, the extraction rules and storage into
//! the two-stage pipeline:
//! - Discovery turns site list pages into manga tasks
//! - The manga stage turns manga tasks into content items and chapter tasks
//! - The chapter stage attaches chapter images to content items
//! - Site health checks validate each site's list selector
//!
//! Failures are absorbed per task and reported as counts. One failing task
//! never aborts its siblings.

mod chapter;
mod discovery;
mod health;
mod manga;

pub use discovery::list_request;

use crate::config::Config;
use crate::extract::MangaListItem;
use crate::fetcher::{Clock, FetchClient, FetchSettings, LogNotifier, Notifier, SystemClock};
use crate::journal::Journal;
use crate::queue::{MangaTask, Priority, QueueAction, QueueKind};
use crate::site::SiteRegistry;
use crate::storage::{keys, lock_storage, save_option, SharedStorage};
use crate::HarvestError;
use std::sync::Arc;

/// Failure taxonomy of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed task or unresolvable owner; dropped
    Validation,
    /// Network failure after the fetch layer's retries
    TransientNetwork,
    /// A selector matched nothing
    ParseEmpty,
    /// Content repository or queue write failed
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Structured result of processing one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub items_added: usize,
    pub chapters_queued: usize,
    pub chapters_attached: usize,
    pub images_attached: usize,
    pub failure: Option<TaskFailure>,
}

impl TaskOutcome {
    pub(crate) fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some(TaskFailure {
                kind,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// The harvest pipeline and its collaborators
pub struct Harvester {
    config: Config,
    registry: Arc<SiteRegistry>,
    storage: SharedStorage,
    fetcher: FetchClient,
    journal: Journal,
}

impl Harvester {
    /// Creates a harvester on the system clock
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `storage` - Shared storage backend
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run
    /// * `Err(HarvestError)` - The site registry, HTTP client or storage failed
    pub fn new(config: Config, storage: SharedStorage) -> Result<Self, HarvestError> {
        Self::with_clock(config, storage, Arc::new(SystemClock))
    }

    /// Creates a harvester with an injected clock
    pub fn with_clock(
        config: Config,
        storage: SharedStorage,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HarvestError> {
        let registry = Arc::new(SiteRegistry::new(config.sites.clone())?);
        let journal = Journal::new(
            storage.clone(),
            config.harvest.debug_mode,
            config.harvest.log_retention_days,
        )
        .with_clock(clock.clone());

        let mut fetcher = FetchClient::new(
            FetchSettings::from_config(&config),
            &config.proxies,
            storage.clone(),
            registry.clone(),
            clock,
            journal.clone(),
        )?;

        if config.notifications.enabled {
            let notifier = LogNotifier::new(config.notifications.email.clone(), journal.clone());
            fetcher.set_notifier(Some(Arc::new(notifier)));
        }

        // Expose the active site registry and proxy list to other readers of the store
        {
            let mut guard = lock_storage(&storage)?;
            save_option(&mut *guard, keys::SITES_CONFIG, &registry.sites())?;
            save_option(&mut *guard, keys::PROXY_LIST, &config.proxies)?;
        }

        Ok(Self {
            config,
            registry,
            storage,
            fetcher,
            journal,
        })
    }

    /// Replaces the failure notification channel
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.fetcher.set_notifier(Some(notifier));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn fetcher(&self) -> &FetchClient {
        &self.fetcher
    }

    /// Tasks drained per batch, also the fan-out bound
    fn batch_size(&self) -> usize {
        self.config.harvest.parallel_threads.max(1) as usize
    }

    pub fn set_manga_paused(&self, paused: bool) -> Result<(), HarvestError> {
        save_option(&mut *lock_storage(&self.storage)?, keys::MANGA_PAUSED, &paused)?;
        self.journal.info(format!(
            "Manga queue {}",
            if paused { "paused" } else { "resumed" }
        ));
        Ok(())
    }

    pub fn set_chapter_paused(&self, paused: bool) -> Result<(), HarvestError> {
        save_option(&mut *lock_storage(&self.storage)?, keys::CHAPTER_PAUSED, &paused)?;
        self.journal.info(format!(
            "Chapter queue {}",
            if paused { "paused" } else { "resumed" }
        ));
        Ok(())
    }

    /// Applies an operator action to queue entries by position
    ///
    /// # Returns
    ///
    /// The number of distinct entries changed; out-of-range indices are ignored.
    pub fn apply_queue_action(
        &self,
        queue: QueueKind,
        indices: &[usize],
        action: QueueAction,
    ) -> Result<usize, HarvestError> {
        let changed = lock_storage(&self.storage)?.mutate_many(queue, indices, action)?;
        self.journal.info(format!(
            "{:?} applied to {} {} task(s)",
            action,
            changed,
            queue.as_str()
        ));
        Ok(changed)
    }

    /// Deletes every persisted activity log entry
    pub fn clear_logs(&self) -> Result<usize, HarvestError> {
        let removed = lock_storage(&self.storage)?.clear_logs()?;
        self.journal
            .info(format!("Cleared {} activity log entr(ies)", removed));
        Ok(removed)
    }

    /// Deletes a content item and its chapters
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The item and its chapters are gone
    /// * `Err(HarvestError::ContentItemNotFound)` - No such item
    pub fn delete_content_item(&self, item_id: i64) -> Result<(), HarvestError> {
        if !lock_storage(&self.storage)?.delete_item(item_id)? {
            return Err(HarvestError::ContentItemNotFound(item_id));
        }
        self.journal
            .info(format!("Deleted content item {}", item_id));
        Ok(())
    }

    /// Empties the response cache
    pub fn clear_cache(&self) -> Result<usize, HarvestError> {
        let removed = lock_storage(&self.storage)?.cache_clear()?;
        self.journal
            .info(format!("Cleared {} cached response(s)", removed));
        Ok(removed)
    }

    /// Rebuilds a manga task from a stored content item and enqueues it
    ///
    /// # Arguments
    ///
    /// * `item_id` - Id of the content item to refresh
    /// * `priority` - Drain priority of the new task
    ///
    /// # Returns
    ///
    /// * `Ok(MangaTask)` - The task that was enqueued
    /// * `Err(HarvestError::ContentItemNotFound)` - No such item
    /// * `Err(HarvestError::UnknownSite)` - The item's site is no longer configured
    pub fn requeue_content_item(
        &self,
        item_id: i64,
        priority: Priority,
    ) -> Result<MangaTask, HarvestError> {
        let item = lock_storage(&self.storage)?
            .get_item(item_id)?
            .ok_or(HarvestError::ContentItemNotFound(item_id))?;

        let site = self
            .registry
            .get(&item.site_name)
            .ok_or_else(|| HarvestError::UnknownSite(item.site_name.clone()))?;

        let listed = MangaListItem {
            id: item.source_id.clone(),
            title: item.title.clone(),
            link: item.link.clone(),
            cover: item.cover.clone(),
        };
        let mut task = MangaTask::new(site, &listed)?;
        task.alternative = item.alternative;
        task.genre = item.genre;
        task.publication_status = item.publication_status;
        task.priority = priority;

        let now = self.fetcher.clock().now();
        lock_storage(&self.storage)?.enqueue_manga(task.clone(), now)?;
        self.journal.info(format!(
            "Re-queued '{}' from {} for a chapter refresh",
            task.title, task.site_name
        ));

        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostStatus;
    use crate::extract::MangaDetails;
    use crate::queue::TaskStatus;
    use crate::site::SiteConfig;
    use crate::storage::{load_flag, share, NewContentItem, SqliteStorage};
    use crate::testing::create_test_site;

    fn create_test_config(sites: Vec<SiteConfig>) -> Config {
        let mut config = Config::default();
        config.harvest.request_delay = 0;
        config.sites = sites;
        config
    }

    fn create_harvester(sites: Vec<SiteConfig>) -> Harvester {
        let storage = share(SqliteStorage::open_in_memory().unwrap());
        Harvester::new(create_test_config(sites), storage).unwrap()
    }

    #[test]
    fn test_new_persists_site_registry() {
        let harvester = create_harvester(vec![create_test_site(
            "alpha",
            "https://alpha.example.com",
        )]);

        let guard = lock_storage(harvester.storage()).unwrap();
        let sites: Vec<SiteConfig> = crate::storage::load_option(&*guard, keys::SITES_CONFIG)
            .unwrap()
            .unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].site_name, "alpha");
    }

    #[test]
    fn test_pause_flags() {
        let harvester = create_harvester(vec![]);
        harvester.set_manga_paused(true).unwrap();

        let guard = lock_storage(harvester.storage()).unwrap();
        assert!(load_flag(&*guard, keys::MANGA_PAUSED).unwrap());
        assert!(!load_flag(&*guard, keys::CHAPTER_PAUSED).unwrap());
    }

    #[test]
    fn test_requeue_content_item() {
        let site = create_test_site("alpha", "https://alpha.example.com");
        let harvester = create_harvester(vec![site]);

        let item_id = lock_storage(harvester.storage())
            .unwrap()
            .create_item(&NewContentItem {
                site_name: "alpha".to_string(),
                source_id: "abc123".to_string(),
                title: "One Piece".to_string(),
                link: "https://alpha.example.com/manga/one-piece/".to_string(),
                cover: String::new(),
                alternative: "Wan Pisu".to_string(),
                genre: "Action".to_string(),
                publication_status: "Ongoing".to_string(),
                post_status: PostStatus::Publish,
                details: MangaDetails::default(),
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        let task = harvester
            .requeue_content_item(item_id, Priority::High)
            .unwrap();
        assert_eq!(task.source_id, "abc123");
        assert_eq!(task.alternative, "Wan Pisu");
        assert_eq!(task.status, TaskStatus::Queued);

        let queued = lock_storage(harvester.storage()).unwrap().list_manga().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].title, "One Piece");
        assert_eq!(queued[0].priority, Priority::High);
    }

    #[test]
    fn test_requeue_missing_item_or_site() {
        let harvester = create_harvester(vec![]);
        assert!(matches!(
            harvester.requeue_content_item(42, Priority::Normal),
            Err(HarvestError::ContentItemNotFound(42))
        ));

        let item_id = lock_storage(harvester.storage())
            .unwrap()
            .create_item(&NewContentItem {
                site_name: "gone".to_string(),
                source_id: "abc".to_string(),
                title: "Orphan".to_string(),
                link: "https://gone.example.com/manga/orphan/".to_string(),
                cover: String::new(),
                alternative: String::new(),
                genre: String::new(),
                publication_status: String::new(),
                post_status: PostStatus::Draft,
                details: MangaDetails::default(),
                created_at: chrono::Utc::now(),
            })
            .unwrap();
        assert!(matches!(
            harvester.requeue_content_item(item_id, Priority::Normal),
            Err(HarvestError::UnknownSite(name)) if name == "gone"
        ));
    }

    #[test]
    fn test_apply_queue_action() {
        let site = create_test_site("alpha", "https://alpha.example.com");
        let harvester = create_harvester(vec![site.clone()]);
        {
            let mut guard = lock_storage(harvester.storage()).unwrap();
            guard
                .enqueue_manga(
                    crate::testing::create_manga_task(&site, "one"),
                    chrono::Utc::now(),
                )
                .unwrap();
            guard
                .enqueue_manga(
                    crate::testing::create_manga_task(&site, "two"),
                    chrono::Utc::now(),
                )
                .unwrap();
        }

        let changed = harvester
            .apply_queue_action(QueueKind::Manga, &[1, 1, 7], QueueAction::Pause)
            .unwrap();
        assert_eq!(changed, 1);

        let queued = lock_storage(harvester.storage()).unwrap().list_manga().unwrap();
        assert_eq!(queued[0].status, TaskStatus::Queued);
        assert_eq!(queued[1].status, TaskStatus::Paused);
    }

    #[test]
    fn test_delete_content_item() {
        let harvester = create_harvester(vec![]);
        assert!(matches!(
            harvester.delete_content_item(9),
            Err(HarvestError::ContentItemNotFound(9))
        ));

        let item_id = lock_storage(harvester.storage())
            .unwrap()
            .create_item(&NewContentItem {
                site_name: "alpha".to_string(),
                source_id: "abc".to_string(),
                title: "Berserk".to_string(),
                link: "https://alpha.example.com/manga/berserk/".to_string(),
                cover: String::new(),
                alternative: String::new(),
                genre: String::new(),
                publication_status: String::new(),
                post_status: PostStatus::Draft,
                details: MangaDetails::default(),
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        harvester.delete_content_item(item_id).unwrap();
        assert!(lock_storage(harvester.storage())
            .unwrap()
            .get_item(item_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_clear_logs() {
        let harvester = create_harvester(vec![]);
        harvester.journal().warn("first");
        harvester.journal().error("second");

        assert_eq!(harvester.clear_logs().unwrap(), 2);
        assert_eq!(
            lock_storage(harvester.storage())
                .unwrap()
                .count_logs(None)
                .unwrap(),
            0
        );
    }
}
