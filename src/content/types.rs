use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when neither the caller nor the page supplies one.
pub const UNTITLED: &str = "Untitled";

/// Normalised descriptive record for one article, keyed by `link`.
///
/// Built fresh for every processing attempt and never mutated afterwards;
/// the job system persists it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    pub title: String,
    pub link: String,
    /// A readable rendition is retrievable from the readable cache.
    pub readable: bool,
    pub published_at: DateTime<Utc>,
    pub site_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Distilled main content of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadableArticle {
    pub title: String,
    /// Sanitised HTML: whitelisted tags only, links made absolute.
    pub content: String,
    pub excerpt: Option<String>,
    pub byline: Option<String>,
    /// Characters of plain text in `content`.
    pub length: usize,
}

/// Caller-supplied facts about an article.
///
/// `title` and `link` override scraped values. `published_at` (typically the
/// feed entry's date) only fills in when the page carries no date of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleHints {
    pub title: Option<String>,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl ArticleHints {
    pub fn new(title: Option<&str>, link: &str) -> Self {
        Self {
            title: title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
            link: link.trim().to_owned(),
            published_at: None,
        }
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }
}
