#![allow(dead_code)]

use async_trait::async_trait;
use gleaner::cache::{CacheError, CacheKind, CacheStore, MemoryCache};
use gleaner::config::ReadabilityConfig;
use gleaner::fetch::{FetchError, FetchedResponse, Fetcher};
use gleaner::jobs::Pipeline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Fetcher
// ============================================================================

enum Route {
    Body { mime: String, body: Vec<u8> },
    Status(u16),
    Panic,
}

/// When one fetch ran, in tokio time.
#[derive(Debug, Clone)]
pub struct FetchSpan {
    pub url: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Serves canned responses by exact URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    routes: HashMap<String, Route>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    spans: Mutex<Vec<FetchSpan>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(mut self, url: &str, body: impl Into<String>) -> Self {
        self.routes.insert(
            url.to_owned(),
            Route::Body {
                mime: "text/html".into(),
                body: body.into().into_bytes(),
            },
        );
        self
    }

    pub fn body(mut self, url: &str, mime: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(
            url.to_owned(),
            Route::Body {
                mime: mime.into(),
                body: body.into(),
            },
        );
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(url.to_owned(), Route::Status(status));
        self
    }

    /// Fetching `url` panics.
    pub fn panics(mut self, url: &str) -> Self {
        self.routes.insert(url.to_owned(), Route::Panic);
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Completed fetches in completion order.
    pub fn spans(&self) -> Vec<FetchSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span(&self, url: &str) -> FetchSpan {
        self.spans()
            .into_iter()
            .find(|s| s.url == url)
            .unwrap_or_else(|| panic!("{url} was never fetched"))
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap().push(FetchSpan {
            url: url.to_owned(),
            started,
            finished: Instant::now(),
        });

        match self.routes.get(url) {
            Some(Route::Body { mime, body }) => Ok(FetchedResponse {
                url: url.to_owned(),
                final_url: url.to_owned(),
                status: 200,
                mime_type: mime.clone(),
                body: Arc::from(body.as_slice()),
            }),
            Some(Route::Status(code)) => Err(FetchError::HttpStatus(*code)),
            Some(Route::Panic) => panic!("stub fetcher told to panic on {url}"),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

// ============================================================================
// Caches
// ============================================================================

/// Memory cache that counts traffic per kind and can refuse readable writes.
pub struct CountingCache {
    inner: MemoryCache,
    readable_gets: AtomicUsize,
    readable_sets: AtomicUsize,
    metadata_gets: AtomicUsize,
    metadata_sets: AtomicUsize,
    fail_readable_writes: AtomicBool,
}

impl CountingCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCache::new(1024),
            readable_gets: AtomicUsize::new(0),
            readable_sets: AtomicUsize::new(0),
            metadata_gets: AtomicUsize::new(0),
            metadata_sets: AtomicUsize::new(0),
            fail_readable_writes: AtomicBool::new(false),
        }
    }

    pub fn failing_readable_writes() -> Self {
        let cache = Self::new();
        cache.fail_readable_writes.store(true, Ordering::SeqCst);
        cache
    }

    pub fn readable_gets(&self) -> usize {
        self.readable_gets.load(Ordering::SeqCst)
    }

    pub fn readable_sets(&self) -> usize {
        self.readable_sets.load(Ordering::SeqCst)
    }

    pub fn metadata_gets(&self) -> usize {
        self.metadata_gets.load(Ordering::SeqCst)
    }

    pub fn metadata_sets(&self) -> usize {
        self.metadata_sets.load(Ordering::SeqCst)
    }

    fn counters(&self, kind: CacheKind) -> (&AtomicUsize, &AtomicUsize) {
        match kind {
            CacheKind::Readable => (&self.readable_gets, &self.readable_sets),
            CacheKind::Metadata => (&self.metadata_gets, &self.metadata_sets),
        }
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, kind: CacheKind, key: &str) -> Result<Option<String>, CacheError> {
        self.counters(kind).0.fetch_add(1, Ordering::SeqCst);
        self.inner.get(kind, key).await
    }

    async fn set(&self, kind: CacheKind, key: &str, value: &str) -> Result<(), CacheError> {
        self.counters(kind).1.fetch_add(1, Ordering::SeqCst);
        if kind == CacheKind::Readable && self.fail_readable_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("disk full".into()));
        }
        self.inner.set(kind, key, value).await
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn pipeline(fetcher: &Arc<StubFetcher>, cache: &Arc<CountingCache>) -> Pipeline {
    let fetcher: Arc<dyn Fetcher> = fetcher.clone();
    let cache: Arc<dyn CacheStore> = cache.clone();
    Pipeline::new(fetcher, cache, ReadabilityConfig::default())
}

// ============================================================================
// Fixtures
// ============================================================================

const PARAGRAPH: &str = "Residents gathered at the library on Saturday morning to hear the \
    council explain the new transit plan, which adds two bus routes, extends weekend service \
    and replaces the oldest vehicles in the fleet.";

/// Article page long enough for readability, with no `og:site_name`.
pub fn article_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
        <html>
        <head>
            <title>{title}</title>
            <meta name="description" content="A new transit plan for the city.">
        </head>
        <body>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <article class="post-content">
                <h1>{title}</h1>
                <p>{p}</p>
                <p>{p}</p>
                <p>{p}</p>
                <p>{p}</p>
            </article>
            <footer><p>Contact us at the front desk during opening hours.</p></footer>
        </body>
        </html>"#,
        p = PARAGRAPH
    )
}

/// A page with no recognisable article body.
pub fn short_page(title: &str) -> String {
    format!("<html><head><title>{title}</title></head><body><p>Coming soon.</p></body></html>")
}

/// RSS 2.0 document with one `<item>` per `(title, link)`.
pub fn rss_feed(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link)| format!("<item><title>{title}</title><link>{link}</link></item>"))
        .collect();
    rss_channel(&items)
}

/// Like [`rss_feed`], with a `<pubDate>` (RFC 2822) per item.
pub fn dated_rss_feed(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, date)| {
            format!("<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate></item>")
        })
        .collect();
    rss_channel(&items)
}

fn rss_channel(items: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0"><channel>
            <title>Example Feed</title>
            <link>https://example.com/</link>
            <description>Test feed</description>
            {items}
        </channel></rss>"#
    )
}
