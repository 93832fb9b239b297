//! HTML processing: readable-article extraction and metadata scraping.
//!
//! Both stages read the same [`Document`], parsed once per fetched page.

mod document;
mod metadata;
mod readability;
mod types;

pub use document::{Document, ExtractError};
pub use metadata::{
    default_article_metadata, merge_metadata, metadata_from_hints, parse_date,
    retrieve_article_metadata, scrape_metadata, MetadataError, MetadataService, ScrapedMetadata,
};
pub use readability::{extract_readable, ReadableArticleService};
pub use types::{ArticleHints, ArticleMetadata, ReadableArticle, UNTITLED};

pub use crate::feed::retrieve_articles_from_feed;
