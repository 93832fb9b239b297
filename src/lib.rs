//! Article ingestion worker.
//!
//! Imports single articles by URL and syncs new articles from RSS/Atom/JSON
//! feeds. Each page is fetched once, distilled into a readable rendition when
//! possible, and described by an [`ArticleMetadata`](content::ArticleMetadata)
//! record. Readable renditions and metadata are cached by URL so repeat work
//! is skipped.

pub mod cache;
pub mod config;
pub mod content;
pub mod feed;
pub mod fetch;
pub mod jobs;
pub mod storage;
pub mod util;
