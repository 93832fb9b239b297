use super::{import_article, sync_feed_articles, Job, JobContext, JobEnvelope, Pipeline};
use crate::config::{Config, SyncConfig};
use crate::content::ArticleMetadata;
use crate::storage::ArticleStore;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Result of one job, written to stdout by `gleaner work`.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: String,
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        articles: Vec<ArticleMetadata>,
        /// Records newly written to the article store.
        stored: usize,
    },
    Failed {
        error: String,
    },
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed { .. })
    }
}

/// Runs jobs and persists what they produce.
pub struct Worker {
    pipeline: Pipeline,
    store: Arc<dyn ArticleStore>,
    sync: SyncConfig,
    max_concurrent_jobs: usize,
}

impl Worker {
    pub fn new(pipeline: Pipeline, store: Arc<dyn ArticleStore>, config: &Config) -> Self {
        Self {
            pipeline,
            store,
            sync: config.sync.clone(),
            max_concurrent_jobs: config.worker.max_concurrent_jobs.max(1),
        }
    }

    /// Runs one job to completion. Never fails: job errors are reported in
    /// the returned [`JobOutcome`].
    pub async fn handle(&self, envelope: JobEnvelope) -> JobReport {
        let ctx = JobContext::new(envelope.id.clone());
        let kind = envelope.job.kind();

        let (feed_id, result) = match &envelope.job {
            Job::Import(job) => (
                None,
                import_article(&self.pipeline, &ctx, job)
                    .await
                    .map(|article| vec![article]),
            ),
            Job::Sync(input) => (
                Some(input.feed.id.as_str()),
                sync_feed_articles(&self.pipeline, &ctx, input, &self.sync).await,
            ),
        };

        let outcome = match result {
            Ok(articles) => {
                let stored = self.persist(&ctx, feed_id, &articles).await;
                tracing::info!(
                    job_id = %ctx.id,
                    kind,
                    articles = articles.len(),
                    stored,
                    "Job completed"
                );
                JobOutcome::Completed { articles, stored }
            }
            Err(e) => {
                tracing::error!(job_id = %ctx.id, kind, error = %e, "Job failed");
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        JobReport {
            id: ctx.id,
            kind,
            outcome,
        }
    }

    /// Saves each record once. Store failures are logged and not counted.
    async fn persist(
        &self,
        ctx: &JobContext,
        feed_id: Option<&str>,
        articles: &[ArticleMetadata],
    ) -> usize {
        let mut stored = 0;
        for article in articles {
            match self.store.save_article(feed_id, article).await {
                Ok(true) => stored += 1,
                Ok(false) => {
                    tracing::debug!(job_id = %ctx.id, link = %article.link, "Article already stored");
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %ctx.id,
                        link = %article.link,
                        error = %e,
                        "Failed to store article"
                    );
                }
            }
        }
        stored
    }

    /// Consumes envelopes until the channel closes, running at most
    /// `max_concurrent_jobs` at once, and forwards every report. A job that
    /// panics is reported as failed.
    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::Receiver<JobEnvelope>,
        reports: mpsc::Sender<JobReport>,
    ) {
        let mut running = JoinSet::new();

        while let Some(envelope) = jobs.recv().await {
            while running.len() >= self.max_concurrent_jobs {
                if let Some(Err(e)) = running.join_next().await {
                    tracing::error!(error = %e, "Job task ended abnormally");
                }
            }

            let worker = Arc::clone(&self);
            let reports = reports.clone();
            running.spawn(async move {
                let id = envelope.id.clone();
                let kind = envelope.job.kind();
                let report = match AssertUnwindSafe(worker.handle(envelope))
                    .catch_unwind()
                    .await
                {
                    Ok(report) => report,
                    Err(panic) => {
                        let error = panic_message(panic.as_ref());
                        tracing::error!(job_id = %id, kind, error = %error, "Job panicked");
                        JobReport {
                            id,
                            kind,
                            outcome: JobOutcome::Failed {
                                error: format!("Job panicked: {error}"),
                            },
                        }
                    }
                };
                if reports.send(report).await.is_err() {
                    tracing::debug!("Report receiver closed");
                }
            });
        }

        while let Some(result) = running.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Job task ended abnormally");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
