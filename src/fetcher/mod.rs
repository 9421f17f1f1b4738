//! Fetch layer
//!
//! This module handles all HTTP traffic for the harvester, including:
//! - Request building with user agent, referer and form bodies
//! - The response cache
//! - Proxy rotation
//! - Retry with exponential backoff and failure notification
//! - An injectable clock for delays and cache expiry

mod cache;
mod client;
mod clock;
mod notify;
mod proxy;

pub use cache::cache_key;
pub use client::{
    backoff_delay, FetchClient, FetchError, FetchMethod, FetchRequest, FetchSettings, RequestBody,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{LogNotifier, Notifier};
pub use proxy::{ProxyConfig, ProxyPool};
