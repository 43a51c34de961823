//! HTTP client wrapper applying proxy, headers, timeout, and retries.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};

use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::config::Config;

/// HTTP fetcher for API payloads and image bytes.
///
/// Created once per run and shared by `Arc` across the collector and
/// downloader pools, taking advantage of connection pooling. The base
/// header set (browser identity and, when configured, the session cookie)
/// is attached to every request; callers supply per-request headers such
/// as `Referer` and `x-user-id`, which override base headers on collision.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Creates a fetcher from the run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the proxy URL is malformed or
    /// the client cannot be constructed, and [`FetchError::InvalidHeader`]
    /// if the configured cookie is not a valid header value.
    pub fn new(config: Arc<Config>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.network.user_agent).map_err(|_| {
                FetchError::InvalidHeader {
                    name: "User-Agent".to_string(),
                }
            })?,
        );
        if let Some(cookie) = &config.user.cookie {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(cookie).map_err(|_| FetchError::InvalidHeader {
                    name: "Cookie".to_string(),
                })?,
            );
        }

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.download.timeout_secs))
            .default_headers(headers)
            .gzip(true);

        if let Some(proxy_url) = &config.network.proxy {
            let proxy =
                Proxy::all(proxy_url).map_err(|source| FetchError::ClientBuild { source })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|source| FetchError::ClientBuild { source })?;

        Ok(Self {
            client,
            policy: RetryPolicy::with_max_attempts(config.download.fail_times),
        })
    }

    /// Creates a fetcher with an explicit retry policy (used by tests to
    /// shrink backoff delays).
    ///
    /// # Errors
    ///
    /// Same as [`Fetcher::new`].
    pub fn with_policy(config: Arc<Config>, policy: RetryPolicy) -> Result<Self, FetchError> {
        let mut fetcher = Self::new(config)?;
        fetcher.policy = policy;
        Ok(fetcher)
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a URL, retrying transient failures up to the configured bound.
    ///
    /// `extra_headers` are attached on top of the base header set (e.g.
    /// `[("Referer", page_url), ("x-user-id", uid)]`).
    ///
    /// The returned bytes are untrusted: a `200` payload may still be
    /// malformed JSON, which is a selector-level error, not a fetch error.
    ///
    /// # Errors
    ///
    /// Returns the final [`FetchError`] once retries are exhausted, or
    /// immediately for non-retryable failures (permanent 4xx, bad headers).
    #[instrument(skip(self, extra_headers), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, FetchError> {
        let headers = build_header_map(extra_headers)?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting fetch");

            match self.attempt(url, headers.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => {
                    let failure_type = classify_error(&error);
                    match self.policy.should_retry(failure_type, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next_attempt,
                        } => {
                            warn!(
                                url = %url,
                                attempt = next_attempt,
                                max_attempts = self.policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "retrying fetch"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(url = %url, %reason, "not retrying fetch");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Issues one GET request and reads the full body.
    async fn attempt(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Builds a `HeaderMap` from caller-supplied name/value pairs.
fn build_header_map(extra_headers: &[(&str, &str)]) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::with_capacity(extra_headers.len());
    for (name, value) in extra_headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| FetchError::InvalidHeader {
                name: (*name).to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader {
                name: (*name).to_string(),
            })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Maps a reqwest error to the fetch error taxonomy.
fn map_reqwest_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}
