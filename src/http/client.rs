//! HTTP client with built-in retry logic and conditional requests.

use log::{debug, warn};
use reqwest::header::{ETAG, HeaderMap, HeaderName, HeaderValue, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};

use super::retry::{RetryPolicy, classify_status};
use crate::catalog::Headers;
use crate::error::{ResolveError, Result};

/// Outcome of a successful GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpResponse {
    /// 304 for a conditional request.
    NotModified,
    Body { body: String, etag: Option<String> },
}

/// HTTP client with built-in retry logic for catalog requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    pub fn with_policy(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Performs a GET, conditional on `etag` when given.
    /// Transport errors and 5xx responses are retried with backoff.
    #[tracing::instrument(skip(self, headers))]
    pub async fn get(
        &self,
        url: &str,
        headers: &Headers,
        etag: Option<&str>,
    ) -> Result<HttpResponse> {
        debug!("GET {} (etag: {:?})...", url, etag);

        let header_map = build_headers(url, headers, etag)?;

        self.with_retry(url, || self.get_once(url, header_map.clone()))
            .await
    }

    /// Single attempt without retry.
    async fn get_once(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(url, None, format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(HttpResponse::NotModified);
        }
        if !status.is_success() {
            return Err(classify_status(url, status, response.headers()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| {
            ResolveError::fetch(url, None, format!("failed to read response body: {}", e))
        })?;

        Ok(HttpResponse::Body { body, etag })
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, url: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        debug!("{}: non-retryable error: {}", url, e);
                        return Err(e);
                    }

                    if attempt + 1 < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            url,
                            attempt + 1,
                            max_attempts,
                            e,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ResolveError::fetch(url, None, format!("failed after {} attempts", max_attempts))
        }))
    }
}

fn build_headers(url: &str, headers: &Headers, etag: Option<&str>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();

    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            ResolveError::fetch(url, None, format!("invalid header name '{}'", key))
        })?;
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            ResolveError::fetch(url, None, format!("invalid value for header '{}'", key))
        })?;
        value.set_sensitive(true);
        map.insert(name, value);
    }

    if let Some(etag) = etag {
        let value = HeaderValue::from_str(etag)
            .map_err(|_| ResolveError::fetch(url, None, "invalid stored etag"))?;
        map.insert(IF_NONE_MATCH, value);
    }

    Ok(map)
}
