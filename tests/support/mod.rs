//! Shared helpers for integration tests: mock server startup and
//! descriptor/page fixtures.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;

use tempfile::TempDir;
use wiremock::MockServer;

/// Starts a mock index site, or `None` when this host forbids binding a
/// loopback port. Setting `MAGNETO_REQUIRE_SOCKET_TESTS=1` turns the skip
/// into a failure.
pub async fn mock_server() -> Option<MockServer> {
    if let Err(error) = TcpListener::bind("127.0.0.1:0") {
        let required = std::env::var("MAGNETO_REQUIRE_SOCKET_TESTS")
            .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        assert!(!required, "mock index site unavailable: {error}");
        eprintln!("skipping: mock index site unavailable ({error})");
        return None;
    }
    Some(MockServer::start().await)
}

/// A 40-character hex info hash built from one repeated digit.
pub fn hash(digit: char) -> String {
    std::iter::repeat_n(digit, 40).collect()
}

pub fn magnet(digit: char, name: &str) -> String {
    format!("magnet:?xt=urn:btih:{}&dn={name}", hash(digit))
}

/// One result row: title, magnet link, seeds, leeches, size, detail id.
pub struct Row<'a> {
    pub title: &'a str,
    pub magnet: String,
    pub seeds: u32,
    pub leeches: u32,
    pub size: &'a str,
    pub id: u32,
}

impl<'a> Row<'a> {
    pub fn new(title: &'a str, magnet: String) -> Self {
        Self {
            title,
            magnet,
            seeds: 10,
            leeches: 2,
            size: "1.4 GB",
            id: 1,
        }
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn swarm(mut self, seeds: u32, leeches: u32) -> Self {
        self.seeds = seeds;
        self.leeches = leeches;
        self
    }
}

/// An HTML results page, with an optional `rel=next` link.
pub fn results_page(rows: &[Row<'_>], next: Option<&str>) -> String {
    let mut body = String::from("<html><body><table class=\"list\">");
    for row in rows {
        body.push_str(&format!(
            "<tr><td>{}</td><td><a href=\"{}\">m</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.title,
            row.magnet.replace('&', "&amp;"),
            row.seeds,
            row.leeches,
            row.size,
            row.id
        ));
    }
    body.push_str("</table>");
    if let Some(next) = next {
        body.push_str(&format!("<a rel=\"next\" href=\"{next}\">next</a>"));
    }
    body.push_str("</body></html>");
    body
}

/// A descriptor entry reading the columns written by [`results_page`].
///
/// `extra` is spliced into the `results_parser` block, `tail` into the
/// descriptor itself (both must start with a comma when non-empty).
pub fn descriptor(name: &str, base_url: &str, url: &str, extra: &str, tail: &str) -> String {
    format!(
        r#"{{
            "name": "{name}",
            "base_url": "{base_url}",
            "results_parser": {{
                "url": "{url}",
                "rows": ".//table[@class='list']//tr",
                "data": {{
                    "title": "td[1]/text()",
                    "magnet": "td[2]/a/@href",
                    "seeds": "td[3]/text()",
                    "leeches": "td[4]/text()",
                    "size": "td[5]/text()",
                    "id": "td[6]/text()"
                }}{extra}
            }},
            "keywords": {{"movie": "{{title}} {{year}}"}},
            "attributes": {{"color": "FFFF0000"}}{tail}
        }}"#
    )
}

/// Writes a descriptor file into a fresh temp dir.
pub fn write_providers(entries: &[String]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("providers.json");
    std::fs::write(&path, format!("[{}]", entries.join(",")))
        .expect("Failed to write descriptor file");
    (dir, path)
}
