//! Site registry for Madara-Harvest
//!
//! This module handles:
//! - Per-site extraction rules (`SiteConfig`)
//! - The ordered registry of configured sites
//! - Per-site health status stored in the option store

use crate::links::is_valid_url;
use crate::storage::{keys, OptionStore, StorageResult};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// How a site's manga list page is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListMethod {
    /// Plain GET of the site's base URL
    Get,
    /// Form POST to the AJAX endpoint
    Post,
    /// GET of the AJAX endpoint with the params as a query string
    Ajax,
}

impl ListMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListMethod::Get => "GET",
            ListMethod::Post => "POST",
            ListMethod::Ajax => "AJAX",
        }
    }
}

/// Optional selectors for manga detail metadata
///
/// Empty selectors are skipped during extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetadataSelectors {
    pub description: String,
    pub genre: String,
    pub author: String,
    pub status: String,
    pub alternative_titles: String,
    pub tags: String,
    pub views: String,
    pub rating: String,
    pub artist: String,
    pub release: String,
    #[serde(rename = "type")]
    pub manga_type: String,
    pub publisher: String,
    pub serialization: String,
    pub volumes: String,
}

/// Declarative extraction rules for one source site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Unique name of the site
    pub site_name: String,

    /// Absolute base URL; also used to attribute fetched URLs to the site
    pub base_url: String,

    pub manga_list_method: ListMethod,

    /// Path of the AJAX endpoint, relative to `base_url`
    #[serde(default)]
    pub manga_list_ajax: String,

    /// Parameter template for list requests (supports `{page}`)
    #[serde(default)]
    pub manga_list_ajax_params: String,

    /// Selector for manga containers on the list page
    pub manga_item: String,

    /// Selector for chapter containers on the detail page
    pub chapter_list: String,

    /// Selector for image elements on a chapter page
    pub chapter_images: String,

    #[serde(default)]
    pub metadata: MetadataSelectors,
}

impl SiteConfig {
    /// Checks the structural rules a site must satisfy before it is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidSite {
            site: self.site_name.clone(),
            message,
        };

        if self.site_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site-name cannot be empty".to_string(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(invalid("base-url cannot be empty".to_string()));
        }

        if !is_valid_url(&self.base_url) {
            return Err(ConfigError::InvalidUrl(format!(
                "Invalid base-url for site '{}': '{}'",
                self.site_name, self.base_url
            )));
        }

        if self.manga_item.trim().is_empty() {
            return Err(invalid("manga-item selector cannot be empty".to_string()));
        }

        if self.chapter_list.trim().is_empty() {
            return Err(invalid("chapter-list selector cannot be empty".to_string()));
        }

        if self.chapter_images.trim().is_empty() {
            return Err(invalid(
                "chapter-images selector cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the URL of the list endpoint for this site
    ///
    /// GET sites use the base URL itself; POST and AJAX sites use
    /// `base_url/manga_list_ajax`.
    pub fn list_endpoint(&self) -> Result<Url, url::ParseError> {
        match self.manga_list_method {
            ListMethod::Get => Url::parse(self.base_url.trim()),
            ListMethod::Post | ListMethod::Ajax => Url::parse(&format!(
                "{}/{}",
                self.base_url.trim().trim_end_matches('/'),
                self.manga_list_ajax.trim().trim_start_matches('/')
            )),
        }
    }

    /// Returns true if `url` belongs to this site (prefix match on base URL)
    pub fn owns_url(&self, url: &str) -> bool {
        let base = self.base_url.trim();
        !base.is_empty() && url.starts_with(base)
    }
}

/// Ordered, validated set of configured sites
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
}

impl SiteRegistry {
    /// Builds a registry, validating each site and rejecting duplicate names
    ///
    /// # Arguments
    ///
    /// * `sites` - Site rules in configuration order
    ///
    /// # Returns
    ///
    /// * `Ok(SiteRegistry)` - All sites are valid and uniquely named
    /// * `Err(ConfigError)` - The first invalid or duplicate site
    pub fn new(sites: Vec<SiteConfig>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for site in &sites {
            site.validate()?;
            if !seen.insert(site.site_name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate site-name '{}'",
                    site.site_name
                )));
            }
        }

        Ok(Self { sites })
    }

    /// Looks up a site by name
    pub fn get(&self, site_name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.site_name == site_name)
    }

    /// Finds the site whose base URL prefixes `url`
    pub fn site_for_url(&self, url: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.owns_url(url))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.iter()
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Health of a site as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteHealth {
    Success,
    Error,
    Unknown,
}

/// Last observed status of a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub status: SiteHealth,
    pub last_check: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
}

impl SiteStatus {
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            status: SiteHealth::Success,
            last_check: at,
            reason: String::new(),
        }
    }

    pub fn error(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            status: SiteHealth::Error,
            last_check: at,
            reason: reason.into(),
        }
    }
}

/// Map of site name to last observed status
pub type SiteStatusMap = BTreeMap<String, SiteStatus>;

/// Records a site status with a single read-modify-write of the status map
pub fn record_site_status<S>(store: &mut S, site_name: &str, status: SiteStatus) -> StorageResult<()>
where
    S: OptionStore + ?Sized,
{
    let site_name = site_name.to_string();
    let mut update = move |current: Option<serde_json::Value>| {
        let mut map: SiteStatusMap = current
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        map.insert(site_name.clone(), status.clone());
        serde_json::to_value(&map).unwrap_or(serde_json::Value::Null)
    };
    store.update_option(keys::SITE_STATUS, &mut update)?;
    Ok(())
}

/// Loads the status map, empty if nothing was recorded yet
pub fn load_site_statuses<S>(store: &S) -> StorageResult<SiteStatusMap>
where
    S: OptionStore + ?Sized,
{
    Ok(store
        .get_option(keys::SITE_STATUS)?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}
