use super::parser::{parse_feed, ParsedFeed, RawFeedEntry};
use super::FeedParseError;
use crate::fetch::Fetcher;
use crate::util::{is_valid_link, validate_link};
use url::Url;

/// Fetches and parses the feed at `feed_link`.
///
/// Relative entry links are resolved against the feed's final URL.
pub async fn retrieve_feed(
    fetcher: &dyn Fetcher,
    feed_link: &str,
) -> Result<ParsedFeed, FeedParseError> {
    validate_link(feed_link)?;

    let response = fetcher.fetch(feed_link).await.map_err(|e| {
        tracing::warn!(feed = %feed_link, error = %e, "Feed unreachable");
        FeedParseError::Unreachable(e)
    })?;

    let mut parsed = parse_feed(&response.body).map_err(|e| {
        tracing::warn!(feed = %feed_link, error = %e, "Feed could not be parsed");
        e
    })?;

    if let Ok(base) = Url::parse(&response.final_url) {
        resolve_entry_links(&mut parsed.entries, &base);
    }

    tracing::info!(
        feed = %feed_link,
        entries = parsed.entries.len(),
        skipped = parsed.skipped,
        "Listed feed entries"
    );
    Ok(parsed)
}

/// Lists the raw entries of the feed at `feed_link`, in document order.
pub async fn retrieve_articles_from_feed(
    fetcher: &dyn Fetcher,
    feed_link: &str,
) -> Result<Vec<RawFeedEntry>, FeedParseError> {
    Ok(retrieve_feed(fetcher, feed_link).await?.entries)
}

fn resolve_entry_links(entries: &mut [RawFeedEntry], base: &Url) {
    for entry in entries {
        let Some(link) = entry.link.as_deref() else {
            continue;
        };
        if is_valid_link(link) {
            continue;
        }
        if let Ok(resolved) = base.join(link) {
            entry.link = Some(resolved.to_string());
        }
    }
}
