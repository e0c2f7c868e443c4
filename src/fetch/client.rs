//! `reqwest`-backed [`PageFetcher`].
//!
//! One client per source: the source's static headers are installed as
//! default headers next to the shared browser User-Agent, and every request
//! carries the configured timeout. No retries.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{FetchError, Page, PageFetcher};
use crate::user_agent;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP fetcher shared by one source's pagination and enrichment requests.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher with the given timeout and extra static headers.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] for invalid header names/values or when
    /// the client cannot be constructed.
    pub fn new(timeout: Duration, headers: &IndexMap<String, String>) -> Result<Self, FetchError> {
        let headers = header_map(headers)?;
        match try_build_client(timeout, headers.clone(), false) {
            Ok(client) => Ok(Self { client }),
            Err(BuildClientFailure::Panic) => {
                // Some sandboxed environments panic when querying system proxy settings.
                warn!("HTTP client hit system proxy panic; using env-proxy fallback builder");
                match try_build_client(timeout, headers, true) {
                    Ok(client) => Ok(Self { client }),
                    Err(BuildClientFailure::Panic) => Err(FetchError::client(
                        "client construction panicked while reading proxy settings",
                    )),
                    Err(BuildClientFailure::Build(error)) => Err(FetchError::client(error)),
                }
            }
            Err(BuildClientFailure::Build(error)) => Err(FetchError::client(error)),
        }
    }

    /// Builds a fetcher with default headers and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the client cannot be constructed.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS), &IndexMap::new())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<Page, FetchError> {
        debug!("fetching page");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url.as_str(), status.as_u16()));
        }

        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), e))?;
        debug!(final_url = %final_url, bytes = body.len(), "page fetched");

        Ok(Page {
            url: final_url,
            body: body.to_vec(),
        })
    }
}

fn header_map(headers: &IndexMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    map.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::client(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::client(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    timeout: Duration,
    headers: HeaderMap,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(timeout, headers);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(timeout: Duration, headers: HeaderMap) -> ClientBuilder {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent::BROWSER_USER_AGENT)
        .default_headers(headers)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_includes_gzip_and_custom_headers() {
        let mut headers = IndexMap::new();
        headers.insert("Referer".to_string(), "https://example.org/".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.get(ACCEPT_ENCODING).unwrap(), "gzip");
        assert_eq!(map.get("referer").unwrap(), "https://example.org/");
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut headers = IndexMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        assert!(matches!(
            HttpFetcher::new(Duration::from_secs(1), &headers),
            Err(FetchError::Client { .. })
        ));
    }

    #[test]
    fn test_unsupported_scheme_is_network_error() {
        let fetcher = HttpFetcher::with_defaults().unwrap();
        let url = Url::parse("ftp://idx.example/list").unwrap();
        let result = tokio_test::block_on(fetcher.fetch(&url));
        assert!(matches!(result, Err(FetchError::Network { .. })));
    }

    #[test]
    fn test_env_proxy_unknown_scheme() {
        assert_eq!(env_proxy_for_scheme("ftp"), None);
    }
}
