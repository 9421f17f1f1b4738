use crate::fetcher::ProxyConfig;
use crate::site::SiteConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Madara-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "proxy")]
    pub proxies: Vec<ProxyConfig>,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

/// Pipeline tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Retries after the first failed fetch (0-10)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Politeness delay before every network call (seconds)
    #[serde(rename = "request-delay")]
    pub request_delay: u64,

    /// Tasks drained and processed per batch (1-10)
    #[serde(rename = "parallel-threads")]
    pub parallel_threads: u32,

    /// New chapters required before a content item is created
    #[serde(rename = "chapter-threshold")]
    pub chapter_threshold: u32,

    /// Lifetime of cached responses (seconds)
    #[serde(rename = "cache-duration")]
    pub cache_duration: u64,

    /// Bypass the response cache for every fetch
    #[serde(rename = "force-fetch")]
    pub force_fetch: bool,

    /// Report what would be queued without writing anything
    #[serde(rename = "dry-run")]
    pub dry_run: bool,

    /// Persist INFO entries to the activity log
    #[serde(rename = "debug-mode")]
    pub debug_mode: bool,

    /// Age after which activity log entries are pruned (days)
    #[serde(rename = "log-retention-days")]
    pub log_retention_days: u32,

    /// Publication state given to newly created content items
    #[serde(rename = "post-status")]
    pub post_status: PostStatus,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_delay: 1,
            parallel_threads: 1,
            chapter_threshold: 1,
            cache_duration: 300,
            force_fetch: false,
            dry_run: false,
            debug_mode: false,
            log_retention_days: 7,
            post_status: PostStatus::Publish,
        }
    }
}

/// Publication state of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Publish,
    Draft,
}

impl PostStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Draft => "draft",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(PostStatus::Publish),
            "draft" => Some(PostStatus::Draft),
            _ => None,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    pub timeout: u64,

    /// Maximum redirects followed per request
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "Mozilla/5.0 (compatible; MadaraHarvest/{})",
                env!("CARGO_PKG_VERSION")
            ),
            timeout: 15,
            max_redirects: 5,
        }
    }
}

/// Failure notification configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Address notifications are sent to
    pub email: String,
}

/// How often the periodic trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Minute,
    Hourly,
    Daily,
}

impl Schedule {
    pub fn interval(&self) -> Duration {
        match self {
            Schedule::Minute => Duration::from_secs(60),
            Schedule::Hourly => Duration::from_secs(60 * 60),
            Schedule::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Trigger schedules for the two pipeline stages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub manga: Schedule,
    pub chapters: Schedule,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./madara-harvest.db".to_string(),
        }
    }
}
