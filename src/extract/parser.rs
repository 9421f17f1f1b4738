//! Site-rule driven extraction
//!
//! This module turns fetched pages into structured records:
//! - Manga list pages into `MangaListItem`s
//! - Manga detail pages into `ChapterListItem`s and `MangaDetails`
//! - Chapter pages into ordered image URLs
//!
//! Extraction never fails. Unmatched or invalid selectors produce empty
//! results and a warning.

use crate::extract::query::{CssDocument, DocumentQuery};
use crate::fetcher::RequestBody;
use crate::links::{is_valid_url, resolve_link, stable_id};
use crate::site::SiteConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::{form_urlencoded, Url};

/// Title link inside a manga container, most specific rule first
const TITLE_LINK_SELECTORS: &[&str] = &[
    "a[class*='manga-title'], a[class*='post-title']",
    "[class*='post-title'] a[href], [class*='manga-title'] a[href]",
];

/// Cover image inside a manga container, most specific rule first
const COVER_SELECTORS: &[&str] = &["img[class*='manga-cover'], img[class*='thumbnail']", "img"];

/// Lazy-loading attributes checked when a cover has no usable `src`
const COVER_SOURCE_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src"];

/// A manga found on a list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaListItem {
    /// Stable hash of `link`
    pub id: String,
    pub title: String,
    pub link: String,
    pub cover: String,
}

/// A chapter found on a manga detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterListItem {
    /// Stable hash of `link`
    pub id: String,
    pub title: String,
    pub link: String,
}

/// Optional metadata from a manga detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MangaDetails {
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub status: Option<String>,
    pub alternative_titles: Option<String>,
    pub tags: Vec<String>,
    pub views: Option<String>,
    pub rating: Option<String>,
    pub release: Option<String>,
    pub manga_type: Option<String>,
    pub publisher: Option<String>,
    pub serialization: Option<String>,
    pub volumes: Option<String>,
}

/// Extracts manga entries from a list page
///
/// # Arguments
///
/// * `html` - The list page body
/// * `site` - Rules of the site the page came from
/// * `base_url` - URL the page was fetched from, for resolving relative links
///
/// # Returns
///
/// One item per container that has both a title and a link, in document order.
pub fn parse_manga_list(html: &str, site: &SiteConfig, base_url: Option<&Url>) -> Vec<MangaListItem> {
    let doc = CssDocument::parse(html);
    manga_items(&doc, site, base_url)
}

/// Extracts the chapter list from a manga detail page
pub fn parse_chapter_list(
    html: &str,
    site: &SiteConfig,
    base_url: Option<&Url>,
) -> Vec<ChapterListItem> {
    let doc = CssDocument::parse(html);
    chapter_items(&doc, site, base_url)
}

/// Extracts image URLs from a chapter page, in document order
///
/// Only `src` values that are valid absolute URLs are kept.
pub fn parse_chapter_images(html: &str, site: &SiteConfig) -> Vec<String> {
    let doc = CssDocument::parse(html);
    chapter_images(&doc, site)
}

/// Extracts detail metadata using the site's optional selectors
pub fn parse_manga_details(html: &str, site: &SiteConfig) -> MangaDetails {
    let doc = CssDocument::parse(html);
    let rules = &site.metadata;

    MangaDetails {
        description: first_text(&doc, &rules.description),
        genres: all_texts(&doc, &rules.genre),
        authors: all_texts(&doc, &rules.author),
        artists: all_texts(&doc, &rules.artist),
        status: first_text(&doc, &rules.status),
        alternative_titles: first_text(&doc, &rules.alternative_titles),
        tags: all_texts(&doc, &rules.tags),
        views: first_text(&doc, &rules.views),
        rating: first_text(&doc, &rules.rating),
        release: first_text(&doc, &rules.release),
        manga_type: first_text(&doc, &rules.manga_type),
        publisher: first_text(&doc, &rules.publisher),
        serialization: first_text(&doc, &rules.serialization),
        volumes: first_text(&doc, &rules.volumes),
    }
}

/// Counts the nodes a selector matches, 0 for invalid selectors
pub fn count_matches(html: &str, selector: &str) -> usize {
    let doc = CssDocument::parse(html);
    match doc.select_all(None, selector) {
        Ok(nodes) => nodes.len(),
        Err(e) => {
            warn!("{}", e);
            0
        }
    }
}

/// Renders a list request parameter template for a page
///
/// `{page}` is substituted first. A result made only of `key=value` pairs is
/// decoded into ordered form fields; anything else is sent verbatim. An
/// empty template produces no body.
pub fn build_params(template: &str, page: u32) -> Option<RequestBody> {
    let rendered = template.replace("{page}", &page.to_string());
    let rendered = rendered.trim();

    if rendered.is_empty() {
        return None;
    }

    if looks_like_query(rendered) {
        let pairs = form_urlencoded::parse(rendered.as_bytes())
            .into_owned()
            .collect();
        Some(RequestBody::Form(pairs))
    } else {
        Some(RequestBody::Raw(rendered.to_string()))
    }
}

fn looks_like_query(s: &str) -> bool {
    s.split('&').all(|pair| match pair.split_once('=') {
        Some((key, _)) => !key.is_empty() && !key.contains(char::is_whitespace),
        None => false,
    })
}

fn manga_items<Q: DocumentQuery>(doc: &Q, site: &SiteConfig, base_url: Option<&Url>) -> Vec<MangaListItem> {
    let containers = match doc.select_all(None, &site.manga_item) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("Manga item selector for {} failed: {}", site.site_name, e);
            return Vec::new();
        }
    };

    if containers.is_empty() {
        warn!(
            "Selector '{}' matched no manga items for {}",
            site.manga_item, site.site_name
        );
    }

    let mut items = Vec::new();
    for container in containers {
        let Some(anchor) = first_match(doc, container, TITLE_LINK_SELECTORS) else {
            continue;
        };

        let title = doc.text(anchor);
        let link = doc
            .attribute(anchor, "href")
            .and_then(|href| resolve_link(&href, base_url));

        let Some(link) = link.filter(|_| !title.is_empty()) else {
            continue;
        };

        let cover = first_match(doc, container, COVER_SELECTORS)
            .and_then(|img| {
                COVER_SOURCE_ATTRS
                    .iter()
                    .filter_map(|attr| doc.attribute(img, attr))
                    .find_map(|src| resolve_link(&src, base_url))
            })
            .unwrap_or_default();

        items.push(MangaListItem {
            id: stable_id(&link),
            title,
            link,
            cover,
        });
    }

    items
}

fn chapter_items<Q: DocumentQuery>(
    doc: &Q,
    site: &SiteConfig,
    base_url: Option<&Url>,
) -> Vec<ChapterListItem> {
    let containers = match doc.select_all(None, &site.chapter_list) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("Chapter list selector for {} failed: {}", site.site_name, e);
            return Vec::new();
        }
    };

    let mut chapters = Vec::new();
    for container in containers {
        let Ok(Some(anchor)) = doc.select_one(Some(container), "a") else {
            continue;
        };

        let title = doc.text(anchor);
        let Some(link) = doc
            .attribute(anchor, "href")
            .and_then(|href| resolve_link(&href, base_url))
        else {
            continue;
        };

        if title.is_empty() {
            continue;
        }

        chapters.push(ChapterListItem {
            id: stable_id(&link),
            title,
            link,
        });
    }

    chapters
}

fn chapter_images<Q: DocumentQuery>(doc: &Q, site: &SiteConfig) -> Vec<String> {
    let nodes = match doc.select_all(None, &site.chapter_images) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("Chapter image selector for {} failed: {}", site.site_name, e);
            return Vec::new();
        }
    };

    nodes
        .into_iter()
        .filter_map(|node| doc.attribute(node, "src"))
        .filter(|src| is_valid_url(src))
        .collect()
}

fn first_match<'a, Q: DocumentQuery + 'a>(
    doc: &'a Q,
    scope: Q::Node<'a>,
    selectors: &[&str],
) -> Option<Q::Node<'a>> {
    selectors
        .iter()
        .find_map(|selector| doc.select_one(Some(scope), selector).ok().flatten())
}

fn first_text<Q: DocumentQuery>(doc: &Q, selector: &str) -> Option<String> {
    if selector.trim().is_empty() {
        return None;
    }

    match doc.select_one(None, selector) {
        Ok(node) => node.map(|n| doc.text(n)).filter(|t| !t.is_empty()),
        Err(e) => {
            warn!("Metadata selector failed: {}", e);
            None
        }
    }
}

fn all_texts<Q: DocumentQuery>(doc: &Q, selector: &str) -> Vec<String> {
    if selector.trim().is_empty() {
        return Vec::new();
    }

    match doc.select_all(None, selector) {
        Ok(nodes) => nodes
            .into_iter()
            .map(|n| doc.text(n))
            .filter(|t| !t.is_empty())
            .collect(),
        Err(e) => {
            warn!("Metadata selector failed: {}", e);
            Vec::new()
        }
    }
}
