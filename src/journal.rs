//! Operator-facing activity log
//!
//! Every message goes to `tracing`. WARNING and ERROR messages are also
//! persisted to the activity log; INFO messages only when debug mode is on.
//! Entries older than the retention window are pruned on every write.

use crate::fetcher::{Clock, SystemClock};
use crate::storage::{lock_storage, LogEntry, LogLevel, SharedStorage};
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Writes to tracing and the persisted activity log
#[derive(Clone)]
pub struct Journal {
    storage: SharedStorage,
    debug_mode: bool,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl Journal {
    pub fn new(storage: SharedStorage, debug_mode: bool, retention_days: u32) -> Self {
        Self {
            storage,
            debug_mode,
            retention: Duration::days(i64::from(retention_days.max(1))),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps entries with `clock` instead of the system time
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long persisted entries are kept
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        if self.debug_mode {
            self.persist(LogLevel::Info, message);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.persist(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.persist(LogLevel::Error, message);
    }

    // Must not be called while the caller holds the storage lock.
    fn persist(&self, level: LogLevel, message: String) {
        let now = self.clock.now();
        let entry = LogEntry {
            level,
            message,
            created_at: now,
        };

        let mut storage = match lock_storage(&self.storage) {
            Ok(storage) => storage,
            Err(e) => {
                warn!("Activity log unavailable: {}", e);
                return;
            }
        };

        if let Err(e) = storage.append_log(&entry) {
            warn!("Failed to write activity log entry: {}", e);
        }
        if let Err(e) = storage.prune_logs(now - self.retention) {
            warn!("Failed to prune activity log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ManualClock;
    use crate::storage::{share, SqliteStorage};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_info_suppressed_without_debug() {
        let storage = share(SqliteStorage::open_in_memory().unwrap());
        let journal = Journal::new(storage.clone(), false, 7);

        journal.info("queue drained");
        journal.warn("empty body");
        journal.error("fetch failed");

        let guard = lock_storage(&storage).unwrap();
        let entries = guard.list_logs(None, 0, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[1].level, LogLevel::Warning);
    }

    #[test]
    fn test_info_kept_in_debug_mode() {
        let storage = share(SqliteStorage::open_in_memory().unwrap());
        let journal = Journal::new(storage.clone(), true, 7);

        journal.info("queue drained");

        let guard = lock_storage(&storage).unwrap();
        assert_eq!(guard.count_logs(Some(LogLevel::Info)).unwrap(), 1);
    }

    #[test]
    fn test_old_entries_pruned_on_write() {
        let storage = share(SqliteStorage::open_in_memory().unwrap());
        {
            let mut guard = lock_storage(&storage).unwrap();
            guard
                .append_log(&LogEntry {
                    level: LogLevel::Error,
                    message: "ancient".to_string(),
                    created_at: Utc::now() - Duration::days(30),
                })
                .unwrap();
        }

        Journal::new(storage.clone(), false, 7).warn("fresh");

        let guard = lock_storage(&storage).unwrap();
        let entries = guard.list_logs(None, 0, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "fresh");
    }

    #[test]
    fn test_entries_use_injected_clock() {
        let storage = share(SqliteStorage::open_in_memory().unwrap());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let journal =
            Journal::new(storage.clone(), false, 7).with_clock(Arc::new(ManualClock::new(at)));

        journal.error("fetch failed");

        let guard = lock_storage(&storage).unwrap();
        let entries = guard.list_logs(None, 0, 10).unwrap();
        assert_eq!(entries[0].created_at, at);
    }
}
