use super::{CacheError, CacheKind, CacheStore};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// In-process LRU cache. Entries never expire; the least recently used entry
/// is evicted once `capacity` is reached.
pub struct MemoryCache {
    entries: Mutex<LruCache<(CacheKind, String), String>>,
}

impl MemoryCache {
    /// Capacity below 1 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".into()))?;
        Ok(entries.get(&(kind, key.to_owned())).cloned())
    }

    async fn set(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".into()))?;
        entries.put((kind, key.to_owned()), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryCache::new(4);
        cache.set(CacheKind::Readable, "k", "old").await.unwrap();
        cache.set(CacheKind::Readable, "k", "new").await.unwrap();

        assert_eq!(
            cache.get(CacheKind::Readable, "k").await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_least_recently_used_evicted() {
        let cache = MemoryCache::new(2);
        cache.set(CacheKind::Metadata, "a", "1").await.unwrap();
        cache.set(CacheKind::Metadata, "b", "2").await.unwrap();
        // Touch "a" so "b" becomes the eviction candidate
        cache.get(CacheKind::Metadata, "a").await.unwrap();
        cache.set(CacheKind::Metadata, "c", "3").await.unwrap();

        assert!(cache.get(CacheKind::Metadata, "a").await.unwrap().is_some());
        assert!(cache.get(CacheKind::Metadata, "b").await.unwrap().is_none());
        assert!(cache.get(CacheKind::Metadata, "c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let cache = MemoryCache::new(0);
        cache.set(CacheKind::Metadata, "a", "1").await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_corrupt() {
        let cache = std::sync::Arc::new(MemoryCache::new(64));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .set(CacheKind::Readable, "shared", &format!("value-{i}"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let value = cache.get(CacheKind::Readable, "shared").await.unwrap().unwrap();
        assert!(value.starts_with("value-"));
    }
}
