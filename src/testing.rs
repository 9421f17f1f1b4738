//! Shared fixtures for unit tests

use crate::extract::{ChapterListItem, MangaListItem};
use crate::links::stable_id;
use crate::queue::{ChapterTask, ContentOwner, MangaTask};
use crate::site::{ListMethod, MetadataSelectors, SiteConfig};

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
        metadata: MetadataSelectors::default(),
    }
}

pub fn create_manga_task(site: &SiteConfig, slug: &str) -> MangaTask {
    let link = format!("{}/manga/{}/", site.base_url.trim_end_matches('/'), slug);
    let item = MangaListItem {
        id: stable_id(&link),
        title: slug.replace('-', " "),
        link,
        cover: String::new(),
    };
    MangaTask::new(site, &item).unwrap()
}

pub fn create_chapter_task(manga: &MangaTask, owner: ContentOwner, number: u32) -> ChapterTask {
    let link = format!("{}chapter-{}/", manga.link, number);
    let chapter = ChapterListItem {
        id: stable_id(&link),
        title: format!("Chapter {}", number),
        link,
    };
    ChapterTask::new(manga, owner, &chapter).unwrap()
}
