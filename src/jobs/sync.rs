use super::{JobContext, JobError, Pipeline, SyncFeedArticlesInput};
use crate::config::SyncConfig;
use crate::content::{metadata_from_hints, ArticleHints, ArticleMetadata, UNTITLED};
use crate::feed::{retrieve_feed, RawFeedEntry};
use crate::fetch::fetch_article;
use crate::util::{is_valid_link, normalize_link};
use futures::future::join_all;
use std::collections::HashSet;

/// Syncs every new article of a feed.
///
/// Entries are processed in chunks of [`SyncConfig::chunk_size`]: entries of
/// one chunk run concurrently, chunks run one after another with
/// [`SyncConfig::parallel_delay`] in between. Entries already in the metadata
/// cache are skipped; entries that fail are emitted with default metadata.
/// The result preserves feed order.
pub async fn sync_feed_articles(
    pipeline: &Pipeline,
    ctx: &JobContext,
    input: &SyncFeedArticlesInput,
    config: &SyncConfig,
) -> Result<Vec<ArticleMetadata>, JobError> {
    let feed = &input.feed;
    tracing::info!(job_id = %ctx.id, feed_id = %feed.id, feed = %feed.name, "Syncing feed");

    let listed = retrieve_feed(pipeline.fetcher(), &feed.link).await?;
    tracing::info!(
        job_id = %ctx.id,
        feed_id = %feed.id,
        feed_title = listed.info.title.as_deref().unwrap_or(UNTITLED),
        site = listed.info.site_link.as_deref().unwrap_or(""),
        entries = listed.entries.len(),
        "Feed listed"
    );

    let entries = listed.entries;
    if entries.is_empty() {
        tracing::info!(job_id = %ctx.id, feed_id = %feed.id, "Feed has no entries");
        return Ok(Vec::new());
    }

    let entries = drop_duplicate_links(entries);
    let chunk_size = config.chunk_size();
    let delay = config.parallel_delay();
    let chunk_count = entries.len().div_ceil(chunk_size);

    let mut articles = Vec::with_capacity(entries.len());
    for (index, chunk) in entries.chunks(chunk_size).enumerate() {
        tracing::debug!(
            job_id = %ctx.id,
            chunk = index + 1,
            of = chunk_count,
            size = chunk.len(),
            "Processing chunk"
        );

        let outcomes = join_all(chunk.iter().map(|entry| process_entry(pipeline, ctx, entry))).await;
        articles.extend(outcomes.into_iter().flatten());

        let is_last = index + 1 == chunk_count;
        if !delay.is_zero() && (!is_last || config.delay_after_last_chunk) {
            tokio::time::sleep(delay).await;
        }
    }

    tracing::info!(
        job_id = %ctx.id,
        feed_id = %feed.id,
        articles = articles.len(),
        "Feed sync complete"
    );
    Ok(articles)
}

/// Keeps the first entry for each normalised link. Entries without a link
/// pass through and are dropped later with a warning.
fn drop_duplicate_links(entries: Vec<RawFeedEntry>) -> Vec<RawFeedEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| match entry.link.as_deref() {
            Some(link) => {
                let fresh = seen.insert(normalize_link(link));
                if !fresh {
                    tracing::debug!(link = %link, "Dropping duplicate feed entry");
                }
                fresh
            }
            None => true,
        })
        .collect()
}

/// One entry of a chunk. `None` means the entry was dropped.
async fn process_entry(
    pipeline: &Pipeline,
    ctx: &JobContext,
    entry: &RawFeedEntry,
) -> Option<ArticleMetadata> {
    let Some(link) = entry.link.as_deref().filter(|l| is_valid_link(l)) else {
        tracing::warn!(
            job_id = %ctx.id,
            title = %entry.title,
            link = ?entry.link,
            "Dropping feed entry with invalid link"
        );
        return None;
    };

    match pipeline.metadata().retrieve_cached_article_metadata(link).await {
        Ok(Some(_)) => {
            tracing::info!(job_id = %ctx.id, link = %link, "Article already synced, skipping");
            return None;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(job_id = %ctx.id, link = %link, error = %e, "Metadata cache read failed");
        }
    }

    // A placeholder title should not override the page's own
    let title = (entry.title != UNTITLED).then_some(entry.title.as_str());
    let hints = ArticleHints::new(title, link).with_published_at(entry.published_at);

    let metadata = match build_entry(pipeline, ctx, &hints).await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(
                job_id = %ctx.id,
                link = %link,
                error = %e,
                "Entry failed, recording default metadata"
            );
            metadata_from_hints(
                &ArticleHints::new(Some(entry.title.as_str()), link)
                    .with_published_at(entry.published_at),
            )
        }
    };

    pipeline.remember(&ctx.id, &metadata).await;
    Some(metadata)
}

async fn build_entry(
    pipeline: &Pipeline,
    ctx: &JobContext,
    hints: &ArticleHints,
) -> Result<ArticleMetadata, JobError> {
    let response = fetch_article(pipeline.fetcher(), &hints.link).await?;
    if !response.is_html() {
        return Err(JobError::NotHtml {
            mime: response.mime_type.clone(),
        });
    }
    pipeline.process_page(&ctx.id, &response, hints).await
}
