//! Failure notification channel

use crate::journal::Journal;
use async_trait::async_trait;
use tracing::error;

/// Receives a message when a fetch exhausts its retries
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str);
}

/// Records notifications in tracing and the activity log
///
/// The configured recipient is named in each entry. Nothing is sent; the
/// message only exists in the log.
pub struct LogNotifier {
    recipient: String,
    journal: Journal,
}

impl LogNotifier {
    pub fn new(recipient: impl Into<String>, journal: Journal) -> Self {
        Self {
            recipient: recipient.into(),
            journal,
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) {
        error!(recipient = %self.recipient, subject, "Notification: {}", body);
        self.journal.error(format!(
            "Notification to {}: {}: {}",
            self.recipient, subject, body
        ));
    }
}
