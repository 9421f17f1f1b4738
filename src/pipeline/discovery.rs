//! Manga discovery
//!
//! Fetches a site's manga list page and enqueues a manga task for every
//! listed manga that is not already waiting in the queue.

use crate::extract::{build_params, parse_manga_list};
use crate::fetcher::{FetchRequest, RequestBody};
use crate::pipeline::Harvester;
use crate::queue::MangaTask;
use crate::report::DiscoveryReport;
use crate::site::{ListMethod, SiteConfig};
use crate::storage::lock_storage;
use crate::HarvestError;
use tracing::warn;
use url::Url;

/// Builds the list page request for a site
///
/// # Arguments
///
/// * `site` - The site to list
/// * `page` - 1-based page number substituted into the parameter template
///
/// # Returns
///
/// The URL to fetch and the request to send:
/// - GET fetches `base_url`
/// - POST sends the rendered parameters as a form body to the AJAX endpoint
/// - AJAX sends the rendered parameters as a query string to the AJAX endpoint
pub fn list_request(site: &SiteConfig, page: u32) -> Result<(Url, FetchRequest), url::ParseError> {
    let mut endpoint = site.list_endpoint()?;
    let params = build_params(&site.manga_list_ajax_params, page);

    let request = match site.manga_list_method {
        ListMethod::Get => FetchRequest::get(),
        ListMethod::Post => FetchRequest::post(params),
        ListMethod::Ajax => {
            match params {
                Some(RequestBody::Form(pairs)) => {
                    endpoint.query_pairs_mut().extend_pairs(pairs.iter());
                }
                Some(RequestBody::Raw(raw)) => endpoint.set_query(Some(&raw)),
                None => {}
            }
            FetchRequest::get()
        }
    };

    Ok((endpoint, request))
}

impl Harvester {
    /// Discovers one list page of a site
    ///
    /// # Arguments
    ///
    /// * `site_name` - Name of a configured site
    /// * `page` - 1-based list page
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryReport)` - Counts for the page; a failed fetch is
    ///   reported as one error
    /// * `Err(HarvestError)` - Unknown site, bad endpoint or storage failure
    pub async fn discover_site(
        &self,
        site_name: &str,
        page: u32,
    ) -> Result<DiscoveryReport, HarvestError> {
        let site = self
            .registry
            .get(site_name)
            .ok_or_else(|| HarvestError::UnknownSite(site_name.to_string()))?;

        let (url, request) = list_request(site, page)?;
        let html = match self.fetcher.fetch(url.as_str(), &request).await {
            Ok(html) => html,
            Err(e) => {
                self.journal.error(format!(
                    "Discovery of {} page {} failed: {}",
                    site.site_name, page, e
                ));
                return Ok(DiscoveryReport {
                    errors: 1,
                    ..DiscoveryReport::default()
                });
            }
        };

        let items = parse_manga_list(&html, site, Url::parse(&site.base_url).ok().as_ref());
        let mut report = DiscoveryReport {
            found: items.len(),
            ..DiscoveryReport::default()
        };

        if self.config.harvest.dry_run {
            self.journal.info(format!(
                "[dry run] Found {} manga on {} page {}",
                report.found, site.site_name, page
            ));
            return Ok(report);
        }

        {
            let now = self.fetcher.clock().now();
            let mut storage = lock_storage(&self.storage)?;
            for item in &items {
                if storage.contains_manga(&site.site_name, &item.id)? {
                    report.skipped += 1;
                    continue;
                }
                match MangaTask::new(site, item) {
                    Ok(task) => {
                        storage.enqueue_manga(task, now)?;
                        report.queued += 1;
                    }
                    Err(e) => warn!("Skipping list entry '{}': {}", item.title, e),
                }
            }
        }

        self.journal.info(format!(
            "Discovered {} manga on {} page {}: {} queued, {} already queued",
            report.found, site.site_name, page, report.queued, report.skipped
        ));

        Ok(report)
    }

    /// Discovers the first `pages` list pages of every site, in registry order
    pub async fn discover_all(&self, pages: u32) -> Result<DiscoveryReport, HarvestError> {
        let mut total = DiscoveryReport::default();
        let names: Vec<String> = self
            .registry
            .iter()
            .map(|site| site.site_name.clone())
            .collect();

        for name in names {
            for page in 1..=pages.max(1) {
                total.merge(self.discover_site(&name, page).await?);
            }
        }

        Ok(total)
    }
}
