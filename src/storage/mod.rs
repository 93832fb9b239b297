//! SQLite persistence: the article store and the shared URL cache.

mod articles;
mod cache;
mod schema;
mod types;

use crate::content::ArticleMetadata;
use anyhow::Result;
use async_trait::async_trait;

pub use schema::Database;
pub use types::DatabaseError;

/// Destination for finished article records.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Inserts `article` unless its link is already stored.
    /// Returns `true` when a row was written.
    async fn save_article(&self, feed_id: Option<&str>, article: &ArticleMetadata) -> Result<bool>;

    async fn find_article(&self, link: &str) -> Result<Option<ArticleMetadata>>;
}
