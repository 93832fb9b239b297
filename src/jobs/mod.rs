//! Background jobs: single-article import and batch feed sync.
//!
//! Jobs arrive as [`JobEnvelope`]s (JSON, one per line for `gleaner work`).
//! The orchestrators return the article records they produced; persisting
//! them is the [`Worker`]'s job.

mod import;
mod pipeline;
mod sync;
mod worker;

use crate::content::MetadataError;
use crate::feed::FeedParseError;
use crate::fetch::FetchError;
use crate::util::LinkError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use import::import_article;
pub use pipeline::Pipeline;
pub use sync::sync_feed_articles;
pub use worker::{JobOutcome, JobReport, Worker};

// ============================================================================
// Payloads
// ============================================================================

/// Import one article by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportArticleJob {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    /// Run readability extraction. Without it the job only checks that the
    /// page is HTML and records default metadata.
    #[serde(default)]
    pub make_readable: bool,
}

/// Feed being synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFeedArticlesInput {
    pub feed: FeedRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Import(ImportArticleJob),
    Sync(SyncFeedArticlesInput),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Import(_) => "import",
            Job::Sync(_) => "sync",
        }
    }
}

/// A job as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub job: Job,
}

/// Per-run context threaded through the orchestrators for logging.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: String,
}

impl JobContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures that fail a whole job. Per-entry problems inside a sync are
/// recovered and never surface here.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid url: {0}")]
    Validation(#[from] LinkError),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Article not HTML (content type: {mime})")]
    NotHtml { mime: String },
    #[error("Metadata extraction failed: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Feed listing failed: {0}")]
    FeedParse(#[from] FeedParseError),
}
