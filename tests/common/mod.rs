//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use madara_harvest::config::Config;
use madara_harvest::fetcher::{Clock, ManualClock};
use madara_harvest::site::{ListMethod, MetadataSelectors, SiteConfig};
use madara_harvest::storage::{share, SqliteStorage};
use madara_harvest::Harvester;
use std::sync::Arc;

/// Creates a GET-listed site using the default Madara theme selectors
pub fn create_test_site(name: &str, base_url: &str) -> SiteConfig {
    SiteConfig {
        site_name: name.to_string(),
        base_url: base_url.to_string(),
        manga_list_method: ListMethod::Get,
        manga_list_ajax: String::new(),
        manga_list_ajax_params: String::new(),
        manga_item: ".page-item-detail".to_string(),
        chapter_list: "li.wp-manga-chapter".to_string(),
        chapter_images: ".reading-content img".to_string(),
        metadata: MetadataSelectors {
            description: ".summary__content".to_string(),
            genre: ".genres-content a".to_string(),
            ..MetadataSelectors::default()
        },
    }
}

/// Creates a test configuration with no politeness delay
pub fn create_test_config(sites: Vec<SiteConfig>) -> Config {
    let mut config = Config::default();
    config.harvest.request_delay = 0;
    config.sites = sites;
    config
}

/// Builds a harvester on in-memory storage and a manual clock
pub fn create_harvester(config: Config) -> (Harvester, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let storage = share(SqliteStorage::open_in_memory().expect("Failed to open storage"));
    let harvester = Harvester::with_clock(config, storage, clock.clone() as Arc<dyn Clock>)
        .expect("Failed to create harvester");
    (harvester, clock)
}

/// A manga list page with one container per `(title, link)`
pub fn list_page(entries: &[(&str, String)]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, link)| {
            format!(
                r#"<div class="page-item-detail">
                     <div class="item-thumb"><img src="{link}cover.jpg"></div>
                     <div class="post-title"><h3><a href="{link}">{title}</a></h3></div>
                   </div>"#
            )
        })
        .collect();
    format!("<html><body><div class=\"page-listing\">{items}</div></body></html>")
}

/// A manga detail page listing `count` chapters, newest first
pub fn detail_page(manga_link: &str, count: u32) -> String {
    let chapters: String = (1..=count)
        .rev()
        .map(|n| {
            format!(
                r#"<li class="wp-manga-chapter"><a href="{manga_link}chapter-{n}/">Chapter {n}</a></li>"#
            )
        })
        .collect();
    format!(
        r#"<html><body>
             <div class="summary__content"><p>A long voyage.</p></div>
             <div class="genres-content"><a>Action</a>, <a>Adventure</a></div>
             <ul class="main version-chap">{chapters}</ul>
           </body></html>"#
    )
}

/// A chapter page with the given image URLs
pub fn chapter_page(images: &[String]) -> String {
    let imgs: String = images
        .iter()
        .map(|src| format!(r#"<img class="wp-manga-chapter-img" src="{src}">"#))
        .collect();
    format!(r#"<html><body><div class="reading-content">{imgs}</div></body></html>"#)
}
