//! HTTP fetch client
//!
//! Every page the pipeline reads goes through `FetchClient::fetch`, which:
//! - Rejects malformed URLs before any network I/O
//! - Serves fresh responses from the response cache
//! - Waits the politeness delay before each network call
//! - Rotates through configured proxies
//! - Retries failures with exponential backoff and records each failure
//! - Tracks per-site health in the option store

use crate::config::Config;
use crate::fetcher::cache::cache_key;
use crate::fetcher::clock::Clock;
use crate::fetcher::notify::Notifier;
use crate::fetcher::proxy::{ProxyConfig, ProxyPool};
use crate::journal::Journal;
use crate::links::{parse_absolute_url, referer_for};
use crate::site::{record_site_status, SiteRegistry, SiteStatus};
use crate::storage::{lock_storage, FetchErrorRecord, SharedStorage};
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

/// Fetch failures surfaced to the pipeline
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: '{0}'")]
    InvalidUrl(String),

    #[error("Failed to fetch {url} after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMethod {
    #[default]
    Get,
    Post,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Get => "GET",
            FetchMethod::Post => "POST",
        }
    }
}

/// Request body sent as `application/x-www-form-urlencoded`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Ordered form fields, encoded on send
    Form(Vec<(String, String)>),
    /// Sent verbatim
    Raw(String),
}

impl RequestBody {
    pub fn encode(&self) -> String {
        match self {
            RequestBody::Form(pairs) => form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish(),
            RequestBody::Raw(raw) => raw.clone(),
        }
    }
}

/// One fetch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub body: Option<RequestBody>,
    /// Skip the cache lookup for this call
    pub force_fetch: bool,
}

impl FetchRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Option<RequestBody>) -> Self {
        Self {
            method: FetchMethod::Post,
            body,
            force_fetch: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force_fetch = true;
        self
    }
}

/// Fetch tunables
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub request_delay: Duration,
    pub max_retries: u32,
    pub cache_duration: Duration,
    pub force_fetch: bool,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.http.user_agent.clone(),
            timeout: Duration::from_secs(config.http.timeout),
            max_redirects: config.http.max_redirects,
            request_delay: Duration::from_secs(config.harvest.request_delay),
            max_retries: config.harvest.max_retries,
            cache_duration: Duration::from_secs(config.harvest.cache_duration),
            force_fetch: config.harvest.force_fetch,
        }
    }
}

/// Delay before retry number `attempt + 1`: 2, 4, 8, ... seconds
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.saturating_add(1)))
}

/// HTTP client with caching, proxy rotation, retries and site health tracking
pub struct FetchClient {
    settings: FetchSettings,
    pool: ProxyPool,
    storage: SharedStorage,
    registry: Arc<SiteRegistry>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn Notifier>>,
    journal: Journal,
}

impl FetchClient {
    /// Builds the client and one proxied client per configured proxy
    ///
    /// # Arguments
    ///
    /// * `settings` - Fetch tunables
    /// * `proxies` - Outbound proxies, possibly empty
    /// * `storage` - Shared storage for the cache, error log and site status
    /// * `registry` - Sites used to attribute URLs for health tracking
    /// * `clock` - Time source for delays, backoff and cache expiry
    /// * `journal` - Activity log
    ///
    /// # Returns
    ///
    /// * `Ok(FetchClient)` - Ready to fetch
    /// * `Err(reqwest::Error)` - A proxy or client setting was rejected
    pub fn new(
        settings: FetchSettings,
        proxies: &[ProxyConfig],
        storage: SharedStorage,
        registry: Arc<SiteRegistry>,
        clock: Arc<dyn Clock>,
        journal: Journal,
    ) -> Result<Self, reqwest::Error> {
        let pool = ProxyPool::build(proxies, |builder| {
            builder
                .user_agent(settings.user_agent.clone())
                .timeout(settings.timeout)
                .redirect(Policy::limited(settings.max_redirects))
                .gzip(true)
                .deflate(true)
                .brotli(true)
        })?;

        Ok(Self {
            settings,
            pool,
            storage,
            registry,
            clock,
            notifier: None,
            journal,
        })
    }

    /// Sets the channel notified when retries are exhausted
    pub fn set_notifier(&mut self, notifier: Option<Arc<dyn Notifier>>) {
        self.notifier = notifier;
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches a URL and returns the response body
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute http(s) URL
    /// * `request` - Method, body and cache bypass flag
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The body, from cache or network
    /// * `Err(FetchError::InvalidUrl)` - The URL was rejected, nothing was sent
    /// * `Err(FetchError::RetriesExhausted)` - Every attempt failed
    pub async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<String, FetchError> {
        let url = url.trim();
        let Some(parsed) = parse_absolute_url(url) else {
            self.journal
                .error(format!("Invalid URL provided for fetch: '{}'", url));
            return Err(FetchError::InvalidUrl(url.to_string()));
        };

        let key = cache_key(request.method, url, request.body.as_ref());
        if !(request.force_fetch || self.settings.force_fetch) {
            if let Some(body) = self.cached(&key) {
                debug!("Cache hit for {}", url);
                return Ok(body);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(&parsed, request).await {
                Ok(body) => {
                    self.on_success(url, &key, &body);
                    return Ok(body);
                }
                Err(message) => {
                    self.on_failure(url, &message, attempt);

                    if attempt >= self.settings.max_retries {
                        let attempts = attempt + 1;
                        self.notify_exhausted(url, &message, attempts).await;
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts,
                            message,
                        });
                    }

                    self.clock.sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, url: &Url, request: &FetchRequest) -> Result<String, String> {
        self.clock.sleep(self.settings.request_delay).await;

        let (client, proxy) = self.pool.select();
        if let Some(proxy) = proxy {
            debug!("Fetching {} via proxy {}", url, proxy.address());
        } else {
            debug!("Fetching {}", url);
        }

        let mut builder = match request.method {
            FetchMethod::Get => client.get(url.clone()),
            FetchMethod::Post => client.post(url.clone()),
        };
        builder = builder.header(REFERER, referer_for(url));

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body.encode());
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        response.text().await.map_err(|e| e.to_string())
    }

    fn cached(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        match lock_storage(&self.storage).and_then(|storage| storage.cache_get(key, now)) {
            Ok(body) => body,
            Err(e) => {
                warn!("Response cache read failed: {}", e);
                None
            }
        }
    }

    fn on_success(&self, url: &str, key: &str, body: &str) {
        if body.is_empty() {
            self.journal
                .warn(format!("Fetched content for {} is empty", url));
        }

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.settings.cache_duration)
            .ok()
            .map(|ttl| now + ttl);
        let site_name = self.site_name_for(url);

        let result = lock_storage(&self.storage).and_then(|mut storage| {
            let pruned = storage.cache_prune(now)?;
            if pruned > 0 {
                debug!("Pruned {} expired cache entr(ies)", pruned);
            }
            if let Some(expires_at) = expires_at.filter(|at| *at > now) {
                storage.cache_put(key, body, expires_at)?;
            }
            if let Some(site_name) = &site_name {
                record_site_status(&mut *storage, site_name, SiteStatus::success(now))?;
            }
            Ok(())
        });

        if let Err(e) = result {
            warn!("Failed to record successful fetch of {}: {}", url, e);
        }
    }

    fn on_failure(&self, url: &str, message: &str, attempt: u32) {
        self.journal.error(format!(
            "Failed to fetch {} (attempt {}/{}): {}",
            url,
            attempt + 1,
            self.settings.max_retries + 1,
            message
        ));

        let now = self.clock.now();
        let site_name = self.site_name_for(url);
        let record = FetchErrorRecord {
            url: url.to_string(),
            message: message.to_string(),
            occurred_at: now,
        };

        let result = lock_storage(&self.storage).and_then(|mut storage| {
            storage.record_fetch_error(&record)?;
            storage.prune_fetch_errors(now - self.journal.retention())?;
            if let Some(site_name) = &site_name {
                record_site_status(&mut *storage, site_name, SiteStatus::error(now, message))?;
            }
            Ok(())
        });

        if let Err(e) = result {
            warn!("Failed to record fetch failure for {}: {}", url, e);
        }
    }

    async fn notify_exhausted(&self, url: &str, message: &str, attempts: u32) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let body = format!(
            "Failed to fetch content from {} after {} attempt(s): {}",
            url, attempts, message
        );
        notifier.notify("MadaraHarvest fetch failure", &body).await;
    }

    fn site_name_for(&self, url: &str) -> Option<String> {
        self.registry
            .site_for_url(url)
            .map(|site| site.site_name.clone())
    }
}
