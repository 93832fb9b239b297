//! URL-keyed caches for readable articles and article metadata.
//!
//! The backing store is pluggable through [`CacheStore`]. Two stores ship with
//! the crate: [`MemoryCache`] (bounded LRU, per process) and the SQLite-backed
//! [`Database`](crate::storage::Database) (TTL expiry, shared across runs).
//!
//! Values are stored as JSON text. Keys are normalised links (see
//! [`normalize_link`]); [`get_json`] and [`set_json`] apply the
//! normalisation so callers can pass links as they found them.

mod memory;

use crate::util::normalize_link;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryCache;

/// Which logical cache an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Readable,
    Metadata,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Readable => "readable",
            CacheKind::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store rejected the operation
    #[error("Cache backend error: {0}")]
    Backend(String),
    /// A cached value could not be encoded or decoded
    #[error("Cache value is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key-value store keyed by `(kind, key)`.
///
/// Implementations must tolerate concurrent readers and writers; a write to a
/// key replaces the previous value (last write wins).
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Reads and decodes the entry for `link`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    kind: CacheKind,
    link: &str,
) -> Result<Option<T>, CacheError> {
    let key = normalize_link(link);
    match store.get(kind, &key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes `value` and stores it under `link`.
pub async fn set_json<T: Serialize + Sync + ?Sized>(
    store: &dyn CacheStore,
    kind: CacheKind,
    link: &str,
    value: &T,
) -> Result<(), CacheError> {
    let key = normalize_link(link);
    let raw = serde_json::to_string(value)?;
    store.set(kind, &key, &raw).await
}
