//! Detail-page enrichment.
//!
//! A [`DetailParser`] fetches one extra page per record (its URL template is
//! formatted over the record) and either merges root-level fields into the
//! record or, with a row locator, produces one copy of the record per row.

use tracing::instrument;
use url::Url;

use super::{ExtractError, Extractor, Record};
use crate::document::ElementPath;
use crate::fetch::{FetchError, PageFetcher};
use crate::util::join_url;

/// One `additional_parsers` block of a source.
#[derive(Debug, Clone)]
pub struct DetailParser {
    url: String,
    rows: Option<ElementPath>,
    extractor: Extractor,
}

impl DetailParser {
    #[must_use]
    pub fn new(url: String, rows: Option<ElementPath>, extractor: Extractor) -> Self {
        Self {
            url,
            rows,
            extractor,
        }
    }

    #[must_use]
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    #[must_use]
    pub fn rows(&self) -> Option<&ElementPath> {
        self.rows.as_ref()
    }

    /// Detail page address for `record`.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Format`] if the template references fields the record
    /// lacks, [`ExtractError::Fetch`] if the result is not a valid URL.
    pub fn url_for(&self, base_url: &Url, record: &Record) -> Result<Url, ExtractError> {
        let reference = self.extractor.formatter().format(&self.url, &record.to_fields())?;
        join_url(base_url, &reference).ok_or_else(|| FetchError::invalid_url(reference).into())
    }

    /// Fetches the detail page and returns the enriched record(s).
    ///
    /// # Errors
    ///
    /// Any fetch, document, field or template failure for this record.
    #[instrument(level = "debug", skip_all)]
    pub async fn enrich(
        &self,
        fetcher: &dyn PageFetcher,
        base_url: &Url,
        record: &Record,
    ) -> Result<Vec<Record>, ExtractError> {
        let url = self.url_for(base_url, record)?;
        let page = fetcher.fetch(&url).await?;
        let doc = self.extractor.parse_document(&page.body)?;
        match &self.rows {
            None => {
                let mut updated = record.clone();
                self.extractor.update(&doc, &mut updated)?;
                Ok(vec![updated])
            }
            Some(rows) => self.extractor.fan_out(&doc, rows, record),
        }
    }
}
