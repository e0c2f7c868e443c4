//! Page fetching.
//!
//! Sources never talk to `reqwest` directly: they go through the
//! [`PageFetcher`] trait, so tests and tools can substitute canned pages.
//! [`HttpFetcher`] is the production implementation.

mod client;
mod error;

pub use client::{DEFAULT_TIMEOUT_SECS, HttpFetcher};
pub use error::FetchError;

use async_trait::async_trait;
use url::Url;

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects; relative links resolve against it.
    pub url: Url,
    /// Response body (already decompressed).
    pub body: Vec<u8>,
}

/// Fetches one page per call. Implementations must be shareable across tasks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issues a GET for `url`.
    ///
    /// # Errors
    ///
    /// [`FetchError`] on transport failures, timeouts or non-success statuses.
    async fn fetch(&self, url: &Url) -> Result<Page, FetchError>;
}
