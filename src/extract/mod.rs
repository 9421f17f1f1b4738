//! Extraction engine
//!
//! Pure functions that apply a site's selector rules to fetched HTML.

mod parser;
mod query;

pub use parser::{
    build_params, count_matches, parse_chapter_images, parse_chapter_list, parse_manga_details,
    parse_manga_list, ChapterListItem, MangaDetails, MangaListItem,
};
pub use query::{CssDocument, DocumentQuery, QueryError};
