use super::JobError;
use crate::cache::CacheStore;
use crate::config::ReadabilityConfig;
use crate::content::{
    merge_metadata, scrape_metadata, ArticleHints, ArticleMetadata, Document, MetadataError,
    MetadataService, ReadableArticleService, ScrapedMetadata,
};
use crate::fetch::{FetchedResponse, Fetcher};
use crate::util::validate_link;
use chrono::Utc;
use std::sync::Arc;

/// Shared collaborators for both orchestrators: the fetcher and the two
/// cache-backed content services.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    readable: ReadableArticleService,
    metadata: MetadataService,
}

impl Pipeline {
    /// Both services share one cache store; entries are separated by
    /// [`CacheKind`](crate::cache::CacheKind).
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn CacheStore>,
        readability: ReadabilityConfig,
    ) -> Self {
        Self {
            fetcher,
            readable: ReadableArticleService::new(Arc::clone(&cache), readability),
            metadata: MetadataService::new(cache),
        }
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn readable(&self) -> &ReadableArticleService {
        &self.readable
    }

    pub fn metadata(&self) -> &MetadataService {
        &self.metadata
    }

    /// Readability plus metadata for an HTML response.
    ///
    /// The page is parsed once and read by both stages. Readability is best
    /// effort: a page without a recognisable article, a body that cannot be
    /// parsed at all, or a failed cache write only leaves `readable` false.
    pub(crate) async fn process_page(
        &self,
        job_id: &str,
        response: &FetchedResponse,
        hints: &ArticleHints,
    ) -> Result<ArticleMetadata, JobError> {
        let link = hints.link.as_str();
        validate_link(link).map_err(MetadataError::from)?;

        let already_cached = self.readable.cached_readable_article(link).await.is_some();

        // Document is !Send; it must be dropped before the next await.
        let parsed = Document::parse(&response.body).map(|doc| {
            let extracted = if already_cached {
                None
            } else {
                self.readable.extract(&doc, link)
            };
            (extracted, scrape_metadata(&doc, link))
        });
        let (extracted, scraped) = match parsed {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    link = %link,
                    error = %e,
                    "Page body unusable, recording hints only"
                );
                return Ok(merge_metadata(
                    ScrapedMetadata::default(),
                    hints,
                    false,
                    Utc::now(),
                ));
            }
        };

        let readable = if already_cached {
            tracing::debug!(job_id = %job_id, link = %link, "Readable article already cached");
            true
        } else if let Some(article) = extracted {
            match self
                .readable
                .create_readable_article_cache(link, &article)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        link = %link,
                        error = %e,
                        "Failed to cache readable article"
                    );
                    false
                }
            }
        } else {
            tracing::info!(job_id = %job_id, link = %link, "Readable article not found");
            false
        };

        Ok(merge_metadata(scraped, hints, readable, Utc::now()))
    }

    /// Records `metadata` in the metadata cache. Failures are logged only.
    pub(crate) async fn remember(&self, job_id: &str, metadata: &ArticleMetadata) {
        if let Err(e) = self.metadata.cache_article_metadata(metadata).await {
            tracing::warn!(
                job_id = %job_id,
                link = %metadata.link,
                error = %e,
                "Failed to cache article metadata"
            );
        }
    }
}
