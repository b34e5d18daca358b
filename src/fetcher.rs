//! Cached, revalidating retrieval of catalog indexes, items and raw content.
//!
//! Per call:
//! - no cache entry: fetch, validate, store;
//! - cache entry without ETag: served as is;
//! - cache entry with ETag: conditional request. `304` serves the entry,
//!   a new body is validated and replaces it, and a transport failure or
//!   5xx falls back to the stale entry. 4xx, schema and rate-limit errors
//!   always propagate.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheStore};
use crate::catalog::{CatalogIndex, DistributableItem, Headers, parse_payload};
use crate::error::{ResolveError, Result};
use crate::http::{HttpClient, HttpResponse};

/// Result of a fetch, with whether it was served from cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub cached: bool,
    pub etag: Option<String>,
}

impl<T> Fetched<T> {
    fn from_cache(entry: CacheEntry<T>) -> Self {
        Self {
            data: entry.data,
            cached: true,
            etag: entry.etag,
        }
    }
}

/// Where catalog indexes and items come from.
///
/// The locator and resolver only depend on this trait, so they can be
/// exercised without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_index(&self, url: &str, headers: &Headers) -> Result<Arc<CatalogIndex>>;

    async fn fetch_item(&self, url: &str, headers: &Headers) -> Result<Arc<DistributableItem>>;
}

/// A payload type with its own cache partition.
trait Cached: Clone + Sized {
    const KIND: &'static str;

    fn load(cache: &CacheStore, url: &str) -> Option<CacheEntry<Self>>;
    fn store(cache: &CacheStore, url: &str, entry: CacheEntry<Self>);
    fn decode(url: &str, body: String) -> Result<Self>;
}

impl Cached for Arc<CatalogIndex> {
    const KIND: &'static str = "catalog index";

    fn load(cache: &CacheStore, url: &str) -> Option<CacheEntry<Self>> {
        cache.index(url)
    }

    fn store(cache: &CacheStore, url: &str, entry: CacheEntry<Self>) {
        cache.put_index(url, entry)
    }

    fn decode(url: &str, body: String) -> Result<Self> {
        parse_payload(url, &body).map(Arc::new)
    }
}

impl Cached for Arc<DistributableItem> {
    const KIND: &'static str = "item";

    fn load(cache: &CacheStore, url: &str) -> Option<CacheEntry<Self>> {
        cache.item(url)
    }

    fn store(cache: &CacheStore, url: &str, entry: CacheEntry<Self>) {
        cache.put_item(url, entry)
    }

    fn decode(url: &str, body: String) -> Result<Self> {
        parse_payload(url, &body).map(Arc::new)
    }
}

impl Cached for Arc<str> {
    const KIND: &'static str = "raw content";

    fn load(cache: &CacheStore, url: &str) -> Option<CacheEntry<Self>> {
        cache.raw(url)
    }

    fn store(cache: &CacheStore, url: &str, entry: CacheEntry<Self>) {
        cache.put_raw(url, entry)
    }

    fn decode(_url: &str, body: String) -> Result<Self> {
        Ok(Arc::from(body))
    }
}

/// Fetches catalog documents over HTTP through a [`CacheStore`].
#[derive(Clone)]
pub struct CatalogFetcher {
    http: HttpClient,
    cache: CacheStore,
    use_cache: bool,
}

impl CatalogFetcher {
    pub fn new(http: HttpClient, cache: CacheStore) -> Self {
        Self {
            http,
            cache,
            use_cache: true,
        }
    }

    /// Whether [`CatalogSource`] lookups read the cache. Fresh results are
    /// stored either way.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    #[tracing::instrument(skip(self, headers))]
    pub async fn fetch_index(
        &self,
        url: &str,
        headers: &Headers,
        use_cache: bool,
    ) -> Result<Fetched<Arc<CatalogIndex>>> {
        self.fetch(url, headers, use_cache).await
    }

    #[tracing::instrument(skip(self, headers))]
    pub async fn fetch_single_item(
        &self,
        url: &str,
        headers: &Headers,
        use_cache: bool,
    ) -> Result<Fetched<Arc<DistributableItem>>> {
        self.fetch(url, headers, use_cache).await
    }

    /// Fetches a document without interpreting it.
    #[tracing::instrument(skip(self, headers))]
    pub async fn fetch_raw(
        &self,
        url: &str,
        headers: &Headers,
        use_cache: bool,
    ) -> Result<Fetched<Arc<str>>> {
        self.fetch(url, headers, use_cache).await
    }

    async fn fetch<T: Cached>(
        &self,
        url: &str,
        headers: &Headers,
        use_cache: bool,
    ) -> Result<Fetched<T>> {
        let cached = if use_cache { T::load(&self.cache, url) } else { None };

        if let Some(entry) = &cached {
            if entry.etag.is_none() {
                debug!("Serving {} for {} from cache", T::KIND, url);
                return Ok(Fetched::from_cache(entry.clone()));
            }
        }

        let etag = cached.as_ref().and_then(|e| e.etag.as_deref());
        let response = match self.http.get(url, headers, etag).await {
            Ok(response) => response,
            Err(e) => return self.stale_fallback(url, cached, e),
        };

        match response {
            HttpResponse::NotModified => match cached {
                Some(entry) => {
                    debug!("{} for {} not modified", T::KIND, url);
                    Ok(Fetched::from_cache(entry))
                }
                None => Err(ResolveError::fetch(
                    url,
                    Some(304),
                    "server answered 304 to an unconditional request",
                )),
            },
            HttpResponse::Body { body, etag } => {
                let data = T::decode(url, body)?;
                T::store(&self.cache, url, CacheEntry::new(data.clone(), etag.clone()));
                debug!("Fetched {} from {}", T::KIND, url);
                Ok(Fetched {
                    data,
                    cached: false,
                    etag,
                })
            }
        }
    }

    fn stale_fallback<T>(
        &self,
        url: &str,
        cached: Option<CacheEntry<T>>,
        error: ResolveError,
    ) -> Result<Fetched<T>> {
        if error.bypasses_stale_cache() {
            return Err(error);
        }
        match cached {
            Some(entry) if self.cache.is_servable_stale(&entry) => {
                warn!(
                    "Revalidating {} failed ({}), using cached copy from {}s ago",
                    url,
                    error,
                    entry.age().as_secs()
                );
                Ok(Fetched::from_cache(entry))
            }
            _ => Err(error),
        }
    }
}

#[async_trait]
impl CatalogSource for CatalogFetcher {
    async fn fetch_index(&self, url: &str, headers: &Headers) -> Result<Arc<CatalogIndex>> {
        CatalogFetcher::fetch_index(self, url, headers, self.use_cache)
            .await
            .map(|f| f.data)
    }

    async fn fetch_item(&self, url: &str, headers: &Headers) -> Result<Arc<DistributableItem>> {
        self.fetch_single_item(url, headers, self.use_cache)
            .await
            .map(|f| f.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NO_HEADERS;
    use crate::http::{RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER, RetryPolicy};
    use mockito::Matcher;
    use reqwest::Client;
    use std::time::{Duration, SystemTime};

    const BUTTON_V1: &str = r#"{"name": "button", "type": "registry:ui", "title": "v1", "files": []}"#;
    const BUTTON_V2: &str = r#"{"name": "button", "type": "registry:ui", "title": "v2", "files": []}"#;

    fn fetcher() -> CatalogFetcher {
        fetcher_with_cache(CacheStore::new())
    }

    fn fetcher_with_cache(cache: CacheStore) -> CatalogFetcher {
        let http = HttpClient::with_policy(Client::new(), RetryPolicy::new(3, Duration::ZERO));
        CatalogFetcher::new(http, cache)
    }

    #[tokio::test]
    async fn test_fetch_item_then_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/r/button.json")
            .with_status(200)
            .with_body(BUTTON_V1)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        let first = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let second = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();

        mock.assert_async().await;
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn test_etag_revalidation_not_modified() {
        let mut server = mockito::Server::new_async().await;
        let fresh = server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(BUTTON_V1)
            .expect(1)
            .create_async()
            .await;
        let revalidate = server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        let first = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let second = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();

        fresh.assert_async().await;
        revalidate.assert_async().await;
        assert!(second.cached);
        assert_eq!(second.etag.as_deref(), Some("\"v1\""));
        assert_eq!(second.data.title.as_deref(), Some("v1"));
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn test_etag_revalidation_modified_recaches() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(BUTTON_V1)
            .create_async()
            .await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_body(BUTTON_V2)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let second = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();

        assert!(!second.cached);
        assert_eq!(second.data.title.as_deref(), Some("v2"));
        let entry = fetcher.cache().item(&url).unwrap();
        assert_eq!(entry.etag.as_deref(), Some("\"v2\""));
        assert_eq!(entry.data.title.as_deref(), Some("v2"));
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_fallback_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/registry.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"idx\"")
            .with_body(r#"{"name": "acme", "items": []}"#)
            .create_async()
            .await;
        let failing = server
            .mock("GET", "/registry.json")
            .match_header("if-none-match", "\"idx\"")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/registry.json", server.url());

        fetcher.fetch_index(&url, &NO_HEADERS, true).await.unwrap();
        let stale = fetcher.fetch_index(&url, &NO_HEADERS, true).await.unwrap();

        failing.assert_async().await;
        assert!(stale.cached);
        assert_eq!(stale.data.name, "acme");
    }

    #[tokio::test]
    async fn test_removed_item_is_not_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(BUTTON_V1)
            .create_async()
            .await;
        let removed = server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let err = fetcher
            .fetch_single_item(&url, &NO_HEADERS, true)
            .await
            .unwrap_err();

        removed.assert_async().await;
        assert!(matches!(
            err,
            ResolveError::CatalogFetch {
                status: Some(404),
                ..
            }
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_fallback_on_transport_error() {
        let cache = CacheStore::new();
        let url = "http://127.0.0.1:1/r/button.json";
        let item: Arc<DistributableItem> = Arc::new(serde_json::from_str(BUTTON_V1).unwrap());
        cache.put_item(url, CacheEntry::new(item, Some("\"v1\"".into())));

        let fetcher = fetcher_with_cache(cache);
        let result = fetcher.fetch_single_item(url, &NO_HEADERS, true).await.unwrap();

        assert!(result.cached);
        assert_eq!(result.data.name, "button");
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_entry_past_bound_is_not_served() {
        let cache = CacheStore::with_max_stale(Duration::from_secs(60));
        let url = "http://127.0.0.1:1/r/button.json";
        let item: Arc<DistributableItem> = Arc::new(serde_json::from_str(BUTTON_V1).unwrap());
        let mut entry = CacheEntry::new(item, Some("\"v1\"".into()));
        entry.timestamp = SystemTime::now() - Duration::from_secs(600);
        cache.put_item(url, entry);

        let fetcher = fetcher_with_cache(cache);
        let err = fetcher.fetch_single_item(url, &NO_HEADERS, true).await.unwrap_err();

        assert!(matches!(err, ResolveError::CatalogFetch { status: None, .. }));
    }

    #[tokio::test]
    async fn test_schema_error_propagates_despite_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(BUTTON_V1)
            .create_async()
            .await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_body(r#"{"name": "button"}"#)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let err = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap_err();

        assert!(matches!(err, ResolveError::SchemaValidation { .. }));
        // The previous good copy stays cached.
        assert_eq!(fetcher.cache().item(&url).unwrap().etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_rate_limit_propagates_despite_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", Matcher::Missing)
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body(BUTTON_V1)
            .create_async()
            .await;
        let limited = server
            .mock("GET", "/r/button.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(403)
            .with_header(RATE_LIMIT_REMAINING_HEADER, "0")
            .with_header(RATE_LIMIT_RESET_HEADER, "1700000000")
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap();
        let err = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap_err();

        limited.assert_async().await;
        assert!(matches!(
            err,
            ResolveError::RateLimit {
                reset_time: 1700000000,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_no_cache_bypasses_read_but_stores() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/r/button.json")
            .with_status(200)
            .with_body(BUTTON_V1)
            .expect(2)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/button.json", server.url());

        let first = fetcher.fetch_single_item(&url, &NO_HEADERS, false).await.unwrap();
        let second = fetcher.fetch_single_item(&url, &NO_HEADERS, false).await.unwrap();

        mock.assert_async().await;
        assert!(!first.cached);
        assert!(!second.cached);
        assert!(fetcher.cache().item(&url).is_some());
    }

    #[tokio::test]
    async fn test_schema_error_on_first_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/registry.json")
            .with_status(200)
            .with_body(r#"{"items": "nope"}"#)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/registry.json", server.url());
        let err = fetcher.fetch_index(&url, &NO_HEADERS, true).await.unwrap_err();

        assert!(matches!(err, ResolveError::SchemaValidation { .. }));
        assert!(fetcher.cache().index(&url).is_none());
    }

    #[tokio::test]
    async fn test_not_found_without_cache_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/r/missing.json")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/r/missing.json", server.url());
        let err = fetcher.fetch_single_item(&url, &NO_HEADERS, true).await.unwrap_err();

        assert!(matches!(
            err,
            ResolveError::CatalogFetch {
                status: Some(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_raw_uses_own_partition() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/button.tsx")
            .with_status(200)
            .with_body("export function Button() {}")
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let url = format!("{}/files/button.tsx", server.url());

        let first = fetcher.fetch_raw(&url, &NO_HEADERS, true).await.unwrap();
        let second = fetcher.fetch_raw(&url, &NO_HEADERS, true).await.unwrap();

        mock.assert_async().await;
        assert_eq!(&*first.data, "export function Button() {}");
        assert!(second.cached);
        assert_eq!(fetcher.cache().len(), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_catalog_source_impl_uses_cache_flag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/r/button.json")
            .with_status(200)
            .with_body(BUTTON_V1)
            .expect(2)
            .create_async()
            .await;

        let fetcher = fetcher().use_cache(false);
        let source: &dyn CatalogSource = &fetcher;
        let url = format!("{}/r/button.json", server.url());

        source.fetch_item(&url, &NO_HEADERS).await.unwrap();
        let item = source.fetch_item(&url, &NO_HEADERS).await.unwrap();

        mock.assert_async().await;
        assert_eq!(item.name, "button");
    }
}
