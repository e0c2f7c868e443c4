//! Source descriptor file format.
//!
//! A descriptor file is a JSON array; each entry declares one index site:
//!
//! ```json
//! {
//!   "name": "Example",
//!   "base_url": "https://idx.example",
//!   "results_parser": {
//!     "url": "/search/{query:q}/1/",
//!     "rows": ".//table[@class='list']/tbody/tr",
//!     "data": {"title": "td[1]/a/text()", "magnet": "td[2]/a/@href"},
//!     "type": "html",
//!     "total_pages": 3,
//!     "next_page_url_type": "xpath",
//!     "next_page_url": ".//a[@rel='next']/@href"
//!   },
//!   "additional_parsers": [{"url": "{detail}", "data": {"size": ".//dd[2]/text()"}}],
//!   "keywords": {"movie": "{title} {year}", "episode": "{title} S{season:02d}E{episode:02d}"},
//!   "attributes": {"icon": "icons/example.png", "color": "FFFF0000"}
//! }
//! ```
//!
//! Paths are compiled while the file is deserialized, so a bad expression
//! fails at load time rather than mid-search.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{EnrichmentPolicy, Source, SourceAttributes, SourceError};
use crate::document::{DocumentKind, ElementPath, PathExpr};
use crate::extract::{
    DetailParser, Extractor, Mutations, NextPage, NextPageKind, Pagination, ResultsParser,
};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::format::Formatter;

/// One entry of the descriptor file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub base_url: String,
    pub results_parser: ResultsDescriptor,
    #[serde(default)]
    pub additional_parsers: Vec<DetailDescriptor>,
    #[serde(default)]
    pub keywords: IndexMap<String, String>,
    #[serde(default)]
    pub attributes: SourceAttributes,
    /// Extra static request headers.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// The primary `results_parser` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultsDescriptor {
    pub url: String,
    pub rows: ElementPath,
    pub data: IndexMap<String, PathExpr>,
    #[serde(rename = "type", default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub mutate: Mutations,
    #[serde(default)]
    pub total_pages: Option<i64>,
    #[serde(default)]
    pub next_page_url_type: NextPageKind,
    #[serde(default)]
    pub next_page_url: Option<String>,
}

/// One `additional_parsers` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailDescriptor {
    pub url: String,
    pub data: IndexMap<String, PathExpr>,
    #[serde(default)]
    pub rows: Option<ElementPath>,
    #[serde(rename = "type", default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub mutate: Mutations,
}

impl DetailDescriptor {
    /// Field names this block produces (extracted and mutated).
    pub fn output_fields(&self) -> impl Iterator<Item = &str> {
        self.data
            .keys()
            .map(String::as_str)
            .chain(self.mutate.iter().map(|(key, _)| key))
    }
}

impl ResultsDescriptor {
    /// Field names this block produces (extracted and mutated).
    pub fn output_fields(&self) -> impl Iterator<Item = &str> {
        self.data
            .keys()
            .map(String::as_str)
            .chain(self.mutate.iter().map(|(key, _)| key))
    }
}

/// Settings shared by every source compiled from one file.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub formatter: Arc<Formatter>,
    pub timeout: Duration,
    pub enrichment_policy: EnrichmentPolicy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            formatter: Arc::new(Formatter::new()),
            timeout: Duration::from_secs(crate::fetch::DEFAULT_TIMEOUT_SECS),
            enrichment_policy: EnrichmentPolicy::default(),
        }
    }
}

impl SourceDescriptor {
    /// Every field name any block of this source produces.
    pub fn output_fields(&self) -> impl Iterator<Item = &str> {
        self.results_parser.output_fields().chain(
            self.additional_parsers
                .iter()
                .flat_map(DetailDescriptor::output_fields),
        )
    }

    /// Compiles the descriptor with an HTTP fetcher built from its headers.
    ///
    /// # Errors
    ///
    /// [`SourceError::Descriptor`] for an invalid base URL, template,
    /// next-page locator or header.
    pub fn compile(self, options: &CompileOptions) -> Result<Source, SourceError> {
        let fetcher = HttpFetcher::new(options.timeout, &self.headers)
            .map_err(|e| SourceError::client(&self.name, &e))?;
        self.compile_with_fetcher(options, Arc::new(fetcher))
    }

    /// Compiles the descriptor around an existing fetcher.
    ///
    /// # Errors
    ///
    /// As [`SourceDescriptor::compile`].
    pub fn compile_with_fetcher(
        self,
        options: &CompileOptions,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Source, SourceError> {
        let name = self.name;
        let formatter = &options.formatter;
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::descriptor(&name, format!("base_url '{}': {e}", self.base_url)))?;

        let validate = |what: &str, template: &str| {
            formatter
                .validate(template)
                .map_err(|e| SourceError::descriptor(&name, format!("{what}: {e}")))
        };

        let results = self.results_parser;
        validate("results_parser.url", &results.url)?;
        for (key, template) in results.mutate.iter() {
            validate(&format!("results_parser.mutate.{key}"), template)?;
        }
        let next = match (results.next_page_url_type, results.next_page_url) {
            (_, None) => None,
            (NextPageKind::Static, Some(template)) => {
                validate("results_parser.next_page_url", &template)?;
                Some(NextPage::Static(template))
            }
            (NextPageKind::Xpath, Some(path)) => Some(NextPage::Path(
                PathExpr::compile(&path)
                    .map_err(|e| SourceError::path(&name, "results_parser.next_page_url", &e))?,
            )),
        };
        let results = ResultsParser::new(
            results.url,
            results.rows,
            Extractor::new(results.kind, results.data, results.mutate, Arc::clone(formatter)),
            Pagination::new(results.total_pages, next),
        );

        let mut details = Vec::with_capacity(self.additional_parsers.len());
        for (index, detail) in self.additional_parsers.into_iter().enumerate() {
            validate(&format!("additional_parsers[{index}].url"), &detail.url)?;
            for (key, template) in detail.mutate.iter() {
                validate(&format!("additional_parsers[{index}].mutate.{key}"), template)?;
            }
            details.push(Arc::new(DetailParser::new(
                detail.url,
                detail.rows,
                Extractor::new(detail.kind, detail.data, detail.mutate, Arc::clone(formatter)),
            )));
        }
        for (kind, template) in &self.keywords {
            validate(&format!("keywords.{kind}"), template)?;
        }

        debug!(source = %name, details = details.len(), "compiled source descriptor");
        Ok(Source {
            id: crate::util::slugify(&name, "."),
            name,
            base_url,
            results,
            details,
            keywords: self.keywords,
            attributes: self.attributes,
            fetcher,
            formatter: Arc::clone(formatter),
            enrichment_policy: options.enrichment_policy,
        })
    }
}

/// Parses a descriptor file.
///
/// # Errors
///
/// [`SourceError::Io`] / [`SourceError::Parse`] when the file cannot be read
/// or is not a valid descriptor array (including bad path expressions and
/// unknown `type` values).
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn load_descriptors(path: &Path) -> Result<Vec<SourceDescriptor>, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptors: Vec<SourceDescriptor> =
        serde_json::from_str(&content).map_err(|source| SourceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(count = descriptors.len(), "loaded source descriptors");
    Ok(descriptors)
}

/// Loads and compiles every source in a descriptor file, in declaration order.
///
/// # Errors
///
/// The first load or compile failure.
pub fn load_sources(path: &Path, options: &CompileOptions) -> Result<Vec<Source>, SourceError> {
    load_descriptors(path)?
        .into_iter()
        .map(|descriptor| descriptor.compile(options))
        .collect()
}
