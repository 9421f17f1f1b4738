//! Madara-Harvest: a scheduled manga scrape-and-ingest pipeline
//!
//! This crate harvests manga metadata and chapter images from configured
//! source sites and ingests them into a content repository. Work flows
//! through two persisted queues (manga tasks, then chapter tasks) that are
//! drained in small batches by a periodic trigger.

pub mod config;
pub mod extract;
pub mod fetcher;
pub mod journal;
pub mod links;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod site;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

/// Main error type for Madara-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetcher::FetchError),

    #[error("Invalid task: {0}")]
    Task(#[from] queue::TaskError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Content item not found: {0}")]
    ContentItemNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid site '{site}': {message}")]
    InvalidSite { site: String, message: String },
}

/// Result type alias for Madara-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::Harvester;
pub use queue::{ChapterTask, MangaTask, TaskStatus};
pub use site::{SiteConfig, SiteRegistry};
