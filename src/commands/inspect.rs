//! Descriptor authoring helpers: `xpath` and `json2xml`.

use anyhow::{Context, Result};
use magneto_core::document::PathError;
use magneto_core::fetch::{HttpFetcher, PageFetcher};
use magneto_core::{Document, DocumentKind, ElementPath, PathExpr};
use tracing::debug;
use url::Url;

use crate::cli::XpathArgs;

pub async fn run_xpath_command(args: &XpathArgs) -> Result<()> {
    let body = read_input(&args.url).await?;
    let doc = args
        .kind()
        .parse(&body)
        .with_context(|| format!("Failed to parse '{}' as {}", args.url, args.kind().as_str()))?;
    for value in evaluate(&doc, &args.expr, args.rows.as_deref())? {
        println!("{}", value.as_deref().unwrap_or("<none>"));
    }
    Ok(())
}

pub async fn run_json2xml_command(path: &str) -> Result<()> {
    let body = read_input(path).await?;
    println!("{}", json_to_xml(&body).with_context(|| format!("Failed to convert '{path}'"))?);
    Ok(())
}

/// Evaluates `expr` from the root, or once per row when `rows` is given.
/// A missing element or attribute yields `None`.
fn evaluate(doc: &Document, expr: &str, rows: Option<&str>) -> Result<Vec<Option<String>>> {
    let expr = PathExpr::compile(expr).with_context(|| format!("Invalid expression '{expr}'"))?;
    let contexts = match rows {
        Some(rows) => {
            let rows = ElementPath::compile(rows)
                .with_context(|| format!("Invalid rows path '{rows}'"))?;
            rows.find_all(doc, doc.root())
        }
        None => vec![doc.root()],
    };
    debug!(contexts = contexts.len(), "evaluating expression");
    contexts
        .into_iter()
        .map(|node| match expr.resolve(doc, node) {
            Err(PathError::NotFound { .. }) => Ok(None),
            other => other.with_context(|| format!("Failed to evaluate '{}'", expr.as_str())),
        })
        .collect()
}

fn json_to_xml(body: &[u8]) -> Result<String> {
    let doc = DocumentKind::Json.parse(body)?;
    Ok(doc.serialize(doc.root()))
}

/// An http(s) URL is fetched; anything else is read as a local file.
async fn read_input(location: &str) -> Result<Vec<u8>> {
    match Url::parse(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let fetcher = HttpFetcher::with_defaults().context("Failed to build HTTP client")?;
            let page = fetcher
                .fetch(&url)
                .await
                .with_context(|| format!("Failed to fetch '{url}'"))?;
            Ok(page.body)
        }
        _ => tokio::fs::read(location)
            .await
            .with_context(|| format!("Failed to read '{location}'")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &[u8] = br#"<html><body><table>
        <tr><td>One</td><td><a href="/1">x</a></td></tr>
        <tr><td>Two</td><td></td></tr>
    </table></body></html>"#;

    #[test]
    fn test_evaluate_per_row() {
        let doc = DocumentKind::Html.parse(PAGE).unwrap();
        let values = evaluate(&doc, "td[2]/a/@href", Some(".//tr")).unwrap();
        assert_eq!(values, vec![Some("/1".to_string()), None]);
    }

    #[test]
    fn test_evaluate_from_root() {
        let doc = DocumentKind::Html.parse(PAGE).unwrap();
        let values = evaluate(&doc, ".//td/text()", None).unwrap();
        assert_eq!(values, vec![Some("One".to_string())]);
    }

    #[test]
    fn test_evaluate_rejects_bad_expression() {
        let doc = DocumentKind::Html.parse(PAGE).unwrap();
        assert!(evaluate(&doc, "/html//td", None).is_err());
    }

    #[test]
    fn test_json_to_xml() {
        let xml = json_to_xml(br#"{"data": {"movies": [{"title": "A"}]}}"#).unwrap();
        assert!(xml.contains("<title>A</title>"), "{xml}");
        assert!(json_to_xml(b"{not json").is_err());
    }

    #[tokio::test]
    async fn test_read_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        std::fs::write(&path, b"[]").unwrap();
        let body = read_input(path.to_str().unwrap()).await.unwrap();
        assert_eq!(body, b"[]");
        assert!(read_input("/nonexistent/page.json").await.is_err());
    }
}
