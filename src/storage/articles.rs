use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::ArticleRow;
use super::ArticleStore;
use crate::content::ArticleMetadata;

fn row_to_article(row: ArticleRow) -> ArticleMetadata {
    let (link, title, site_name, readable, published_at, excerpt, cover_image, author) = row;
    ArticleMetadata {
        title,
        link,
        readable,
        published_at: DateTime::from_timestamp(published_at, 0).unwrap_or_default(),
        site_name,
        excerpt,
        cover_image,
        author,
    }
}

const ARTICLE_COLUMNS: &str =
    "link, title, site_name, readable, published_at, excerpt, cover_image, author";

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Articles saved for a feed, newest first.
    pub async fn articles_for_feed(&self, feed_id: &str) -> Result<Vec<ArticleMetadata>> {
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE feed_id = ? ORDER BY published_at DESC"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_article).collect())
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ArticleStore for Database {
    async fn save_article(&self, feed_id: Option<&str>, article: &ArticleMetadata) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (link, feed_id, title, site_name, readable, published_at,
                 excerpt, cover_image, author, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(link) DO NOTHING
        "#,
        )
        .bind(&article.link)
        .bind(feed_id)
        .bind(&article.title)
        .bind(&article.site_name)
        .bind(article.readable)
        .bind(article.published_at.timestamp())
        .bind(&article.excerpt)
        .bind(&article.cover_image)
        .bind(&article.author)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_article(&self, link: &str) -> Result<Option<ArticleMetadata>> {
        let row: Option<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE link = ?"
        ))
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_article))
    }
}
