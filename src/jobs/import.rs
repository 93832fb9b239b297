use super::{ImportArticleJob, JobContext, JobError, Pipeline};
use crate::content::{default_article_metadata, ArticleHints, ArticleMetadata};
use crate::fetch::fetch_article;
use crate::util::validate_link;

/// Imports a single article.
///
/// Fails fast on an invalid URL (no request is made), on fetch failure and
/// on a non-HTML response. Readability problems only clear the `readable`
/// flag.
pub async fn import_article(
    pipeline: &Pipeline,
    ctx: &JobContext,
    job: &ImportArticleJob,
) -> Result<ArticleMetadata, JobError> {
    let link = job.url.trim();
    validate_link(link).map_err(|e| {
        tracing::warn!(job_id = %ctx.id, url = %job.url, error = %e, "Rejecting import with invalid url");
        e
    })?;

    tracing::info!(
        job_id = %ctx.id,
        link = %link,
        make_readable = job.make_readable,
        "Importing article"
    );

    let response = fetch_article(pipeline.fetcher(), link).await?;
    if !response.is_html() {
        tracing::warn!(job_id = %ctx.id, link = %link, mime = %response.mime_type, "Article not HTML");
        return Err(JobError::NotHtml {
            mime: response.mime_type.clone(),
        });
    }

    let hints = ArticleHints::new(job.title.as_deref(), link);
    let metadata = if job.make_readable {
        pipeline.process_page(&ctx.id, &response, &hints).await?
    } else {
        default_article_metadata(hints.title.as_deref(), &hints.link)
    };

    pipeline.remember(&ctx.id, &metadata).await;
    tracing::info!(
        job_id = %ctx.id,
        link = %link,
        readable = metadata.readable,
        "Article imported"
    );
    Ok(metadata)
}
