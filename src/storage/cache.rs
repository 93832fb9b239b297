use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::schema::Database;
use crate::cache::{CacheError, CacheKind, CacheStore};

/// Row key for a cache entry: SHA-256 of the (already normalised) link.
fn hashed_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn backend(err: sqlx::Error) -> CacheError {
    CacheError::Backend(err.to_string())
}

impl Database {
    // ========================================================================
    // Cache Maintenance
    // ========================================================================

    /// Delete all expired cache entries.
    ///
    /// Returns the number of entries evicted.
    pub async fn evict_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Number of live (unexpired) entries of one kind.
    pub async fn cache_entry_count(&self, kind: CacheKind) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cache_entries WHERE kind = ? AND expires_at > datetime('now')",
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl CacheStore for Database {
    async fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM cache_entries
            WHERE kind = ? AND key = ? AND expires_at > datetime('now')
        "#,
        )
        .bind(kind.as_str())
        .bind(hashed_key(key))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CacheError> {
        let ttl_modifier = format!("+{} hours", self.cache_ttl_hours);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries
                (kind, key, value, fetched_at, expires_at, size_bytes)
            VALUES (?, ?, ?, datetime('now'), datetime('now', ?), ?)
        "#,
        )
        .bind(kind.as_str())
        .bind(hashed_key(key))
        .bind(value)
        .bind(&ttl_modifier)
        .bind(value.len() as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}
