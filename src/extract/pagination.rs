//! Multi-page result collection.
//!
//! The first page comes from the source's `url` template. Further pages come
//! from a next-page locator: either a static template formatted with
//! `{page}` / `{query}`, or a path expression resolved against the page just
//! fetched. Collection stops at the page cap, when a page yields no rows,
//! when there is no next link, or when the next link points at a page that
//! was already visited.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{ExtractError, Extractor, Record};
use crate::document::{ElementPath, PathExpr};
use crate::fetch::{FetchError, PageFetcher};
use crate::format::{Fields, TemplateValue};
use crate::util::join_url;

/// How the next page's address is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// Template formatted with `page` (the page to fetch) and `query`.
    Static(String),
    /// Path resolved against the current page; failures end pagination.
    Path(PathExpr),
}

/// Locator kind as written in descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextPageKind {
    Static,
    #[default]
    Xpath,
}

/// Page cap plus optional next-page locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    total_pages: usize,
    next: Option<NextPage>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::single()
    }
}

impl Pagination {
    /// Only the first page is fetched.
    #[must_use]
    pub fn single() -> Self {
        Self {
            total_pages: 1,
            next: None,
        }
    }

    /// A missing or `<= 1` cap, or a missing locator, means a single page.
    #[must_use]
    pub fn new(total_pages: Option<i64>, next: Option<NextPage>) -> Self {
        match (total_pages.and_then(|n| usize::try_from(n).ok()), next) {
            (Some(total_pages), Some(next)) if total_pages > 1 => Self {
                total_pages,
                next: Some(next),
            },
            _ => Self::single(),
        }
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    #[must_use]
    pub fn next(&self) -> Option<&NextPage> {
        self.next.as_ref()
    }
}

/// The primary result block of a source: URL template, row locator,
/// extractor and pagination.
#[derive(Debug, Clone)]
pub struct ResultsParser {
    url: String,
    rows: ElementPath,
    extractor: Extractor,
    pagination: Pagination,
}

struct ParsedPage {
    records: Vec<Record>,
    url: Url,
    next: Option<String>,
}

impl ResultsParser {
    #[must_use]
    pub fn new(url: String, rows: ElementPath, extractor: Extractor, pagination: Pagination) -> Self {
        Self {
            url,
            rows,
            extractor,
            pagination,
        }
    }

    #[must_use]
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    #[must_use]
    pub fn rows(&self) -> &ElementPath {
        &self.rows
    }

    #[must_use]
    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// First page address for `query`.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Format`] if the template does not render,
    /// [`ExtractError::Fetch`] if the result is not a valid URL.
    pub fn first_url(&self, base_url: &Url, query: &str) -> Result<Url, ExtractError> {
        let mut fields = Fields::new();
        fields.insert("query".to_string(), TemplateValue::from(query));
        let reference = self.extractor.formatter().format(&self.url, &fields)?;
        join_url(base_url, &reference).ok_or_else(|| FetchError::invalid_url(reference).into())
    }

    /// Fetches and extracts every page for `query`, in page order.
    ///
    /// # Errors
    ///
    /// Any fetch, document, field or template failure aborts the whole
    /// collection; a visited-URL cycle does not.
    #[instrument(level = "debug", skip(self, fetcher, base_url), fields(base_url = %base_url))]
    pub async fn collect(
        &self,
        fetcher: &Arc<dyn PageFetcher>,
        base_url: &Url,
        query: &str,
    ) -> Result<Vec<Record>, ExtractError> {
        let first = self.first_url(base_url, query)?;
        let ParsedPage {
            mut records,
            url: mut current,
            next,
        } = self.fetch_page(fetcher.as_ref(), &first, 1, query).await?;

        let Some(mut next_ref) = next else {
            return Ok(records);
        };
        let mut visited = vec![current.clone()];

        for page in 2..=self.pagination.total_pages {
            let next_url = join_url(&current, &next_ref)
                .ok_or_else(|| FetchError::invalid_url(next_ref.clone()))?;
            if visited.contains(&next_url) {
                warn!(url = %next_url, "next page already visited; stopping");
                break;
            }

            let parsed = self.fetch_page(fetcher.as_ref(), &next_url, page, query).await?;
            if parsed.records.is_empty() {
                debug!(page, "page yielded no records; stopping");
                break;
            }
            records.extend(parsed.records);
            current = parsed.url;
            match parsed.next {
                Some(next) => next_ref = next,
                None => break,
            }
            visited.push(next_url);
        }

        Ok(records)
    }

    async fn fetch_page(
        &self,
        fetcher: &dyn PageFetcher,
        url: &Url,
        page: usize,
        query: &str,
    ) -> Result<ParsedPage, ExtractError> {
        let fetched = fetcher.fetch(url).await?;
        let doc = self.extractor.parse_document(&fetched.body)?;
        let records = self.extractor.extract_many(&doc, &self.rows)?;
        debug!(url = %fetched.url, page, records = records.len(), "parsed result page");

        let next = match self.pagination.next() {
            None => None,
            Some(NextPage::Path(expr)) => Extractor::try_resolve(&doc, expr),
            Some(NextPage::Static(template)) => {
                let mut fields = Fields::new();
                fields.insert(
                    "page".to_string(),
                    TemplateValue::Integer(i64::try_from(page + 1).unwrap_or(i64::MAX)),
                );
                fields.insert("query".to_string(), TemplateValue::from(query));
                Some(self.extractor.formatter().format(template, &fields)?)
            }
        };

        Ok(ParsedPage {
            records,
            url: fetched.url,
            next,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use indexmap::IndexMap;

    use super::*;
    use crate::document::DocumentKind;
    use crate::extract::Mutations;
    use crate::fetch::Page;
    use crate::format::Formatter;

    /// Serves canned pages by URL and records every request.
    struct CannedFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl CannedFetcher {
        fn new(pages: &[(&str, String)]) -> Self {
            Self {
                pages: pages.iter().map(|(u, b)| ((*u).to_string(), b.clone())).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch(&self, url: &Url) -> Result<Page, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .map(|body| Page {
                    url: url.clone(),
                    body: body.clone().into_bytes(),
                })
                .ok_or_else(|| FetchError::http_status(url.as_str(), 404))
        }
    }

    fn page(titles: &[&str], next: Option<&str>) -> String {
        let rows: String = titles
            .iter()
            .map(|t| format!("<tr><td>{t}</td></tr>"))
            .collect();
        let link = next.map_or(String::new(), |n| format!("<a rel=\"next\" href=\"{n}\">next</a>"));
        format!("<html><body><table>{rows}</table>{link}</body></html>")
    }

    fn parser(total_pages: Option<i64>, next: Option<NextPage>) -> ResultsParser {
        let mut fields = IndexMap::new();
        fields.insert("title".to_string(), PathExpr::compile("td/text()").unwrap());
        ResultsParser::new(
            "/search?q={query:q}".to_string(),
            ElementPath::compile(".//tr").unwrap(),
            Extractor::new(DocumentKind::Html, fields, Mutations::default(), Arc::new(Formatter::new())),
            Pagination::new(total_pages, next),
        )
    }

    fn titles(records: &[Record]) -> Vec<&str> {
        records.iter().filter_map(|r| r.get("title")).collect()
    }

    fn base() -> Url {
        Url::parse("https://idx.example/").unwrap()
    }

    fn xpath_next() -> Option<NextPage> {
        Some(NextPage::Path(PathExpr::compile(".//a[@rel='next']/@href").unwrap()))
    }

    #[test]
    fn test_pagination_normalization() {
        assert_eq!(Pagination::new(None, xpath_next()).total_pages(), 1);
        assert_eq!(Pagination::new(Some(1), xpath_next()).total_pages(), 1);
        assert_eq!(Pagination::new(Some(5), None).total_pages(), 1);
        assert_eq!(Pagination::new(Some(-3), xpath_next()).total_pages(), 1);
        assert_eq!(Pagination::new(Some(3), xpath_next()).total_pages(), 3);
    }

    #[tokio::test]
    async fn test_single_page_without_locator() {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(CannedFetcher::new(&[(
            "https://idx.example/search?q=a%20b",
            page(&["one", "two"], Some("/p2")),
        )]));
        let records = parser(None, None).collect(&fetcher, &base(), "a b").await.unwrap();
        assert_eq!(titles(&records), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_cycle_back_to_first_page_stops() {
        let canned = Arc::new(CannedFetcher::new(&[
            ("https://idx.example/search?q=x", page(&["p1"], Some("/p2"))),
            ("https://idx.example/p2", page(&["p2"], Some("/p3"))),
            ("https://idx.example/p3", page(&["p3"], Some("/search?q=x"))),
        ]));
        let fetcher: Arc<dyn PageFetcher> = canned.clone();
        let records = parser(Some(10), xpath_next())
            .collect(&fetcher, &base(), "x")
            .await
            .unwrap();
        assert_eq!(titles(&records), vec!["p1", "p2", "p3"]);
        assert_eq!(canned.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_page_cap_bounds_requests() {
        let canned = Arc::new(CannedFetcher::new(&[
            ("https://idx.example/search?q=x", page(&["p1"], None)),
            ("https://idx.example/list/2", page(&["p2"], None)),
            ("https://idx.example/list/3", page(&["p3"], None)),
            ("https://idx.example/list/4", page(&["p4"], None)),
        ]));
        let fetcher: Arc<dyn PageFetcher> = canned.clone();
        let records = parser(Some(3), Some(NextPage::Static("/list/{page}".to_string())))
            .collect(&fetcher, &base(), "x")
            .await
            .unwrap();
        assert_eq!(titles(&records), vec!["p1", "p2", "p3"]);
        assert_eq!(canned.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(CannedFetcher::new(&[
            ("https://idx.example/search?q=x", page(&["p1"], Some("/p2"))),
            ("https://idx.example/p2", page(&[], Some("/p3"))),
            ("https://idx.example/p3", page(&["p3"], None)),
        ]));
        let records = parser(Some(5), xpath_next())
            .collect(&fetcher, &base(), "x")
            .await
            .unwrap();
        assert_eq!(titles(&records), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts() {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(CannedFetcher::new(&[]));
        let err = parser(None, None).collect(&fetcher, &base(), "x").await.unwrap_err();
        assert!(matches!(err, ExtractError::Fetch(FetchError::HttpStatus { status: 404, .. })));
    }
}
