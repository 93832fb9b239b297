//! Article metadata scraped from page markup.
//!
//! Sources, in priority order per field: Open Graph / Twitter card / standard
//! `<meta>` names, then JSON-LD (`Article` and friends, including `@graph`
//! containers), then plain markup (`<title>`, `<time datetime>`,
//! `<link rel="image_src">`). Caller hints override the scraped title and link.

use super::document::{element_text, Document};
use super::readability::strip_site_suffix;
use super::types::{ArticleHints, ArticleMetadata, UNTITLED};
use crate::cache::{get_json, set_json, CacheError, CacheKind, CacheStore};
use crate::util::{clean_text, site_name_from_link, truncate_chars, validate_link, LinkError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Invalid article link: {0}")]
    InvalidLink(#[from] LinkError),
}

const TITLE_KEYS: &[&str] = &["og:title", "twitter:title", "dc.title", "headline"];
const SITE_NAME_KEYS: &[&str] = &["og:site_name", "application-name", "publisher"];
const PUBLISHED_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "datepublished",
    "publishdate",
    "publish-date",
    "pubdate",
    "dc.date.issued",
    "dc.date",
    "dcterms.created",
    "sailthru.date",
    "parsely-pub-date",
    "date",
];
const EXCERPT_KEYS: &[&str] = &[
    "og:description",
    "twitter:description",
    "description",
    "dc.description",
];
const IMAGE_KEYS: &[&str] = &[
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];
const AUTHOR_KEYS: &[&str] = &[
    "author",
    "article:author",
    "dc.creator",
    "parsely-author",
    "sailthru.author",
];

/// JSON-LD `@type` values describing an article.
const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "Report",
    "ScholarlyArticle",
    "TechArticle",
];

const MAX_EXCERPT_CHARS: usize = 500;

/// Fields found in the page. Every field is optional; see
/// [`merge_metadata`] for the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedMetadata {
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub author: Option<String>,
}

// ============================================================================
// Scraping
// ============================================================================

fn first_meta(meta: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| meta.get(*key).cloned())
}

/// Parses the date formats seen in the wild: RFC 3339, RFC 2822, and bare
/// ISO dates or date-times without an offset (taken as UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn is_article_type(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(s)) => ARTICLE_TYPES.contains(&s.as_str()),
        Some(Value::Array(items)) => items.iter().any(|item| is_article_type(Some(item))),
        _ => false,
    }
}

fn find_article_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_article_node),
        Value::Object(map) => {
            if is_article_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_article_node)
        }
        _ => None,
    }
}

/// First JSON-LD node typed as an article.
fn json_ld_article(doc: &Document) -> Option<Value> {
    let scripts = doc.elements().filter(|el| {
        el.value().name() == "script"
            && el
                .value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
    });
    for script in scripts {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => {
                if let Some(article) = find_article_node(&value) {
                    return Some(article.clone());
                }
            }
            Err(e) => tracing::debug!(error = %e, "Skipping malformed JSON-LD block"),
        }
    }
    None
}

/// Text of a JSON-LD value: a string, or the `name` of an object. Arrays of
/// names are joined with ", ".
fn json_ld_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Object(map) => map.get("name").and_then(json_ld_name),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(json_ld_name).collect();
            (!names.is_empty()).then(|| names.join(", "))
        }
        _ => None,
    }
}

/// URL of a JSON-LD image: a string, an `ImageObject`, or the first of a list.
fn json_ld_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Object(map) => map.get("url").and_then(json_ld_url),
        Value::Array(items) => items.iter().find_map(json_ld_url),
        _ => None,
    }
}

fn json_ld_text(article: Option<&Value>, key: &str) -> Option<String> {
    article?.get(key)?.as_str().and_then(clean_text)
}

fn resolve(base: Option<&Url>, raw: &str) -> Option<String> {
    let resolved = match base {
        Some(base) => base.join(raw.trim()).ok()?,
        None => Url::parse(raw.trim()).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn looks_like_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Collects whatever metadata the page declares about itself.
pub fn scrape_metadata(doc: &Document, link: &str) -> ScrapedMetadata {
    let meta = doc.meta_map();
    let ld = json_ld_article(doc);
    let ld = ld.as_ref();
    let base = Url::parse(link.trim()).ok();

    let title = first_meta(&meta, TITLE_KEYS)
        .or_else(|| json_ld_text(ld, "headline"))
        .or_else(|| {
            doc.first("title")
                .and_then(|t| clean_text(&element_text(t)))
                .map(|t| strip_site_suffix(&t).to_owned())
        })
        .or_else(|| doc.first("h1").and_then(|h| clean_text(&element_text(h))));

    let site_name = first_meta(&meta, SITE_NAME_KEYS)
        .or_else(|| ld.and_then(|a| a.get("publisher")).and_then(json_ld_name));

    let published_at = PUBLISHED_KEYS
        .iter()
        .filter_map(|key| meta.get(*key))
        .find_map(|raw| parse_date(raw))
        .or_else(|| {
            ["datePublished", "dateCreated"]
                .iter()
                .filter_map(|key| json_ld_text(ld, key))
                .find_map(|raw| parse_date(&raw))
        })
        .or_else(|| {
            doc.elements()
                .filter(|el| el.value().name() == "time")
                .filter_map(|el| el.value().attr("datetime"))
                .find_map(parse_date)
        });

    let excerpt = first_meta(&meta, EXCERPT_KEYS)
        .or_else(|| json_ld_text(ld, "description"))
        .map(|e| truncate_chars(&e, MAX_EXCERPT_CHARS).into_owned());

    let cover_image = IMAGE_KEYS
        .iter()
        .filter_map(|key| meta.get(*key))
        .find_map(|raw| resolve(base.as_ref(), raw))
        .or_else(|| {
            ld.and_then(|a| a.get("image"))
                .and_then(json_ld_url)
                .and_then(|raw| resolve(base.as_ref(), &raw))
        })
        .or_else(|| {
            doc.elements()
                .filter(|el| {
                    el.value().name() == "link" && el.value().attr("rel") == Some("image_src")
                })
                .filter_map(|el| el.value().attr("href"))
                .find_map(|raw| resolve(base.as_ref(), raw))
        });

    let author = AUTHOR_KEYS
        .iter()
        .filter_map(|key| meta.get(*key))
        .find(|value| !looks_like_url(value))
        .cloned()
        .or_else(|| ld.and_then(|a| a.get("author")).and_then(json_ld_name));

    ScrapedMetadata {
        title,
        site_name,
        published_at,
        excerpt,
        cover_image,
        author,
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Combines scraped fields with caller hints.
///
/// The hint title wins over the scraped one. `site_name` falls back to the
/// link's host. `published_at` is the scraped date, else the hint's, else `now`.
pub fn merge_metadata(
    scraped: ScrapedMetadata,
    hints: &ArticleHints,
    is_readable: bool,
    now: DateTime<Utc>,
) -> ArticleMetadata {
    ArticleMetadata {
        title: hints
            .title
            .clone()
            .or(scraped.title)
            .unwrap_or_else(|| UNTITLED.to_owned()),
        link: hints.link.clone(),
        readable: is_readable,
        published_at: scraped
            .published_at
            .or(hints.published_at)
            .unwrap_or(now),
        site_name: scraped
            .site_name
            .or_else(|| site_name_from_link(&hints.link))
            .unwrap_or_default(),
        excerpt: scraped.excerpt,
        cover_image: scraped.cover_image,
        author: scraped.author,
    }
}

/// Builds the metadata record for a fetched page.
pub fn retrieve_article_metadata(
    doc: &Document,
    hints: &ArticleHints,
    is_readable: bool,
) -> Result<ArticleMetadata, MetadataError> {
    validate_link(&hints.link)?;
    let scraped = scrape_metadata(doc, &hints.link);
    Ok(merge_metadata(scraped, hints, is_readable, Utc::now()))
}

/// Minimal record used when a page could not be processed: not readable,
/// published now, site name from the link's host.
pub fn default_article_metadata(title: Option<&str>, link: &str) -> ArticleMetadata {
    metadata_from_hints(&ArticleHints::new(title, link))
}

/// Like [`default_article_metadata`], but keeps every hint, including a
/// known publication date.
pub fn metadata_from_hints(hints: &ArticleHints) -> ArticleMetadata {
    merge_metadata(ScrapedMetadata::default(), hints, false, Utc::now())
}

// ============================================================================
// Cached Service
// ============================================================================

/// Access to the metadata cache, used to skip links already processed.
#[derive(Clone)]
pub struct MetadataService {
    cache: Arc<dyn CacheStore>,
}

impl MetadataService {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub async fn retrieve_cached_article_metadata(
        &self,
        link: &str,
    ) -> Result<Option<ArticleMetadata>, CacheError> {
        get_json(self.cache.as_ref(), CacheKind::Metadata, link).await
    }

    pub async fn cache_article_metadata(&self, metadata: &ArticleMetadata) -> Result<(), CacheError> {
        set_json(self.cache.as_ref(), CacheKind::Metadata, &metadata.link, metadata).await
    }
}
