//! Sources: compiled descriptors that turn a query into records.
//!
//! A [`Source`] runs its primary [`ResultsParser`] (with pagination) and then
//! every [`DetailParser`] in declaration order. Detail fetches run one task
//! per record, admitted through a shared fetch semaphore; a record whose
//! detail fetch fails is dropped or kept un-enriched per
//! [`EnrichmentPolicy`].

mod descriptor;
mod error;
mod query;

pub use descriptor::{
    CompileOptions, DetailDescriptor, ResultsDescriptor, SourceDescriptor, load_descriptors,
    load_sources,
};
pub use error::SourceError;
pub use query::{QueryKind, SearchQuery};

use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::extract::{DetailParser, Record, ResultsParser};
use crate::fetch::PageFetcher;
use crate::format::Formatter;
use crate::util::collapse_whitespace;

/// What happens to a record whose detail fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentPolicy {
    /// Remove the record.
    #[default]
    Drop,
    /// Keep the record without the detail fields.
    Keep,
}

/// Presentation attributes of a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceAttributes {
    /// Icon path, relative to the descriptor file.
    #[serde(default)]
    icon: Option<String>,
    /// ARGB hex color, e.g. `FFFF0000`.
    #[serde(default)]
    color: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_json::Value>,
}

impl SourceAttributes {
    #[must_use]
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Any other attribute, `None` when not present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

/// A compiled, ready-to-query source.
#[derive(Clone)]
pub struct Source {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) base_url: Url,
    pub(crate) results: ResultsParser,
    pub(crate) details: Vec<Arc<DetailParser>>,
    pub(crate) keywords: IndexMap<String, String>,
    pub(crate) attributes: SourceAttributes,
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) formatter: Arc<Formatter>,
    pub(crate) enrichment_policy: EnrichmentPolicy,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("base_url", &self.base_url.as_str())
            .field("details", &self.details.len())
            .field("enrichment_policy", &self.enrichment_policy)
            .finish_non_exhaustive()
    }
}

impl Source {
    /// Lowercase name with whitespace runs replaced by `.`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn attributes(&self) -> &SourceAttributes {
        &self.attributes
    }

    #[must_use]
    pub fn results_parser(&self) -> &ResultsParser {
        &self.results
    }

    #[must_use]
    pub fn detail_parsers(&self) -> &[Arc<DetailParser>] {
        &self.details
    }

    #[must_use]
    pub fn enrichment_policy(&self) -> EnrichmentPolicy {
        self.enrichment_policy
    }

    /// Replaces the page fetcher (used by tools and tests).
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Builds the query string: free text verbatim, otherwise the keyword
    /// template for the query kind with whitespace runs collapsed.
    ///
    /// # Errors
    ///
    /// [`SourceError::MissingQueryTemplate`] when the source has no template
    /// for the kind, [`SourceError::Query`] when it does not render.
    pub fn format_query(&self, query: &SearchQuery) -> Result<String, SourceError> {
        if let Some(text) = query.raw_text() {
            return Ok(text.to_string());
        }
        let kind = query.kind();
        let template = self
            .keywords
            .get(kind.as_str())
            .ok_or_else(|| SourceError::MissingQueryTemplate {
                source_name: self.name.clone(),
                kind: kind.as_str(),
            })?;
        let formatted = self
            .formatter
            .format(template, query.fields())
            .map_err(|error| SourceError::Query {
                source_name: self.name.clone(),
                error,
            })?;
        Ok(collapse_whitespace(&formatted))
    }

    /// Runs a typed query.
    ///
    /// # Errors
    ///
    /// See [`Source::format_query`] and [`Source::query_text`].
    pub async fn query(
        &self,
        query: &SearchQuery,
        fetch_permits: &Arc<Semaphore>,
    ) -> Result<Vec<Record>, SourceError> {
        let text = self.format_query(query)?;
        self.query_text(&text, fetch_permits).await
    }

    /// Runs an already formatted query string through pagination and enrichment.
    ///
    /// # Errors
    ///
    /// [`SourceError::Extract`] for any failure of the primary results block.
    /// Detail failures never fail the source; they follow the enrichment policy.
    #[instrument(skip(self, fetch_permits), fields(source = %self.name))]
    pub async fn query_text(
        &self,
        text: &str,
        fetch_permits: &Arc<Semaphore>,
    ) -> Result<Vec<Record>, SourceError> {
        let mut records = self
            .results
            .collect(&self.fetcher, &self.base_url, text)
            .await
            .map_err(|e| SourceError::extract(&self.name, e))?;
        debug!(records = records.len(), "collected primary results");

        for (index, detail) in self.details.iter().enumerate() {
            records = self.enrich(index, detail, records, fetch_permits).await;
        }

        if records.is_empty() {
            warn!(query = text, "no results found");
        } else {
            info!(records = records.len(), "source query complete");
        }
        Ok(records)
    }

    async fn enrich(
        &self,
        index: usize,
        detail: &Arc<DetailParser>,
        records: Vec<Record>,
        fetch_permits: &Arc<Semaphore>,
    ) -> Vec<Record> {
        let handles = records.into_iter().map(|record| {
            let detail = Arc::clone(detail);
            let fetcher = Arc::clone(&self.fetcher);
            let permits = Arc::clone(fetch_permits);
            let base_url = self.base_url.clone();
            tokio::spawn(async move {
                // A closed semaphore only happens at shutdown; run unthrottled.
                let _permit = permits.acquire_owned().await.ok();
                match detail.enrich(fetcher.as_ref(), &base_url, &record).await {
                    Ok(enriched) => Ok(enriched),
                    Err(e) => Err((record, e)),
                }
            })
        });

        let mut enriched = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(records)) => enriched.extend(records),
                Ok(Err((record, e))) => match self.enrichment_policy {
                    EnrichmentPolicy::Drop => {
                        warn!(source = %self.name, parser = index, error = %e, "detail fetch failed; dropping record");
                    }
                    EnrichmentPolicy::Keep => {
                        warn!(source = %self.name, parser = index, error = %e, "detail fetch failed; keeping record un-enriched");
                        enriched.push(record);
                    }
                },
                Err(e) => warn!(source = %self.name, error = %e, "enrichment task panicked"),
            }
        }
        enriched
    }
}
