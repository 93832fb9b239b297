use super::FeedParseError;
use crate::content::UNTITLED;
use crate::util::clean_text;
use chrono::{DateTime, Utc};
use feed_rs::model::Link;
use feed_rs::parser;

/// One entry as listed by a feed. Consumed immediately by the sync job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Feed-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub info: FeedInfo,
    /// Entries in document order.
    pub entries: Vec<RawFeedEntry>,
    /// Entries dropped for having neither a title nor a link.
    pub skipped: usize,
}

/// The `alternate` link (or an untyped one), else the first link.
fn preferred_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| clean_text(&l.href))
}

/// Parses RSS 0.9-2.0, Atom or JSON Feed bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FeedParseError> {
    let feed = parser::parse(bytes).map_err(|e| FeedParseError::Parse(e.to_string()))?;

    let info = FeedInfo {
        title: feed.title.as_ref().and_then(|t| clean_text(&t.content)),
        description: feed.description.as_ref().and_then(|d| clean_text(&d.content)),
        site_link: preferred_link(&feed.links),
    };

    let mut skipped = 0;
    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.as_ref().and_then(|t| clean_text(&t.content));
            let link = preferred_link(&entry.links);
            if title.is_none() && link.is_none() {
                tracing::debug!(id = %entry.id, "Skipping feed entry without title or link");
                skipped += 1;
                return None;
            }
            Some(RawFeedEntry {
                title: title.unwrap_or_else(|| UNTITLED.to_owned()),
                link,
                published_at: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(ParsedFeed {
        info,
        entries,
        skipped,
    })
}
