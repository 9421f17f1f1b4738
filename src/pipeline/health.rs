//! Site health checks
//!
//! A site is healthy when its list page can be fetched and its manga item
//! selector matches at least one node.

use crate::extract::count_matches;
use crate::pipeline::{list_request, Harvester};
use crate::site::{record_site_status, SiteConfig, SiteHealth, SiteStatus};
use crate::storage::lock_storage;
use crate::HarvestError;

impl Harvester {
    /// Checks every registered site and records the result
    ///
    /// List pages are always fetched fresh, bypassing the response cache.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<(String, SiteStatus)>)` - One status per site, in registry order
    /// * `Err(HarvestError)` - A status could not be recorded
    pub async fn check_site_health(&self) -> Result<Vec<(String, SiteStatus)>, HarvestError> {
        let mut results = Vec::with_capacity(self.registry.len());

        for site in self.registry.iter() {
            let status = self.check_site(site).await;
            record_site_status(
                &mut *lock_storage(&self.storage)?,
                &site.site_name,
                status.clone(),
            )?;

            match status.status {
                SiteHealth::Success => self
                    .journal
                    .info(format!("Site {} is healthy", site.site_name)),
                _ => self.journal.warn(format!(
                    "Site {} is unhealthy: {}",
                    site.site_name, status.reason
                )),
            }

            results.push((site.site_name.clone(), status));
        }

        Ok(results)
    }

    async fn check_site(&self, site: &SiteConfig) -> SiteStatus {
        let (url, request) = match list_request(site, 1) {
            Ok(built) => built,
            Err(e) => {
                return SiteStatus::error(
                    self.fetcher.clock().now(),
                    format!("Invalid list endpoint: {}", e),
                )
            }
        };

        let result = self.fetcher.fetch(url.as_str(), &request.forced()).await;
        let now = self.fetcher.clock().now();

        match result {
            Ok(html) if count_matches(&html, &site.manga_item) == 0 => {
                SiteStatus::error(now, "Invalid manga item selector")
            }
            Ok(_) => SiteStatus::success(now),
            Err(e) => SiteStatus::error(now, e.to_string()),
        }
    }
}
