//! Integration tests for the search pipeline against mock index sites.
//!
//! Covers pagination, detail enrichment, per-source fault isolation and
//! cross-source de-duplication through the public API.

use std::sync::Arc;

use magneto_core::search::{load_enabled_sources, run_sources, search_with_providers};
use magneto_core::source::{CompileOptions, load_sources};
use magneto_core::{
    EnrichmentPolicy, Formatter, SearchConfig, SearchQuery, Title, perform_search,
};
use tokio::sync::Semaphore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::{Row, descriptor, hash, magnet, mock_server, results_page, write_providers};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body)
}

fn permits() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(4))
}

#[tokio::test]
async fn test_static_pagination_stops_at_page_cap() {
    let Some(server) = mock_server().await else {
        return;
    };
    for (page, digit) in [(1, 'a'), (2, 'b'), (3, 'c')] {
        Mock::given(method("GET"))
            .and(path(format!("/s/matrix/{page}")))
            .respond_with(html(results_page(
                &[Row::new("Matrix", magnet(digit, "m"))],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/s/matrix/4"))
        .respond_with(html(results_page(&[Row::new("Extra", magnet('d', "x"))], None)))
        .expect(0)
        .mount(&server)
        .await;

    let entry = descriptor(
        "Paged",
        &server.uri(),
        "/s/{query:q}/1",
        r#", "total_pages": 3, "next_page_url_type": "static", "next_page_url": "/s/{query:q}/{page}""#,
        "",
    );
    let (_dir, providers) = write_providers(&[entry]);
    let source = load_sources(&providers, &CompileOptions::default())
        .expect("descriptor compiles")
        .remove(0);

    let records = source.query_text("matrix", &permits()).await.expect("query succeeds");

    let magnets: Vec<_> = records.iter().filter_map(|r| r.get("magnet")).collect();
    assert_eq!(magnets.len(), 3);
    assert!(magnets[0].contains(&hash('a')));
    assert!(magnets[2].contains(&hash('c')));
}

#[tokio::test]
async fn test_path_pagination_stops_on_revisited_page() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/cycle/matrix"))
        .respond_with(html(results_page(
            &[Row::new("First", magnet('a', "1"))],
            Some("/cycle/page2"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cycle/page2"))
        .respond_with(html(results_page(
            &[Row::new("Second", magnet('b', "2"))],
            Some("/cycle/matrix"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let entry = descriptor(
        "Cyclic",
        &server.uri(),
        "/cycle/{query:q}",
        r#", "total_pages": 5, "next_page_url": ".//a[@rel='next']/@href""#,
        "",
    );
    let (_dir, providers) = write_providers(&[entry]);
    let source = load_sources(&providers, &CompileOptions::default())
        .expect("descriptor compiles")
        .remove(0);

    let records = source.query_text("matrix", &permits()).await.expect("query succeeds");
    let titles: Vec<_> = records.iter().filter_map(|r| r.get("title")).collect();
    assert_eq!(titles, vec!["First", "Second"]);
}

async fn enrichment_fixture(
    server: &wiremock::MockServer,
) -> (tempfile::TempDir, std::path::PathBuf) {
    Mock::given(method("GET"))
        .and(path("/s/matrix"))
        .respond_with(html(results_page(
            &[
                Row::new("Enriched", magnet('a', "1")).id(1),
                Row::new("Orphan", magnet('b', "2")).id(2),
            ],
            None,
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/detail/1"))
        .respond_with(html(
            "<html><body><span class=\"size\">2.0 GB</span></body></html>".to_string(),
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/detail/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    let entry = descriptor(
        "Detailed",
        &server.uri(),
        "/s/{query:q}",
        "",
        r#", "additional_parsers": [{"url": "/detail/{id}", "data": {"size": ".//span[@class='size']/text()"}}]"#,
    );
    write_providers(&[entry])
}

#[tokio::test]
async fn test_failed_enrichment_drops_record_by_default() {
    let Some(server) = mock_server().await else {
        return;
    };
    let (_dir, providers) = enrichment_fixture(&server).await;
    let source = load_sources(&providers, &CompileOptions::default())
        .expect("descriptor compiles")
        .remove(0);

    let records = source.query_text("matrix", &permits()).await.expect("query succeeds");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("title"), Some("Enriched"));
    assert_eq!(records[0].get("size"), Some("2.0 GB"));
}

#[tokio::test]
async fn test_failed_enrichment_keeps_record_when_configured() {
    let Some(server) = mock_server().await else {
        return;
    };
    let (_dir, providers) = enrichment_fixture(&server).await;
    let options = CompileOptions {
        enrichment_policy: EnrichmentPolicy::Keep,
        ..CompileOptions::default()
    };
    let source = load_sources(&providers, &options)
        .expect("descriptor compiles")
        .remove(0);

    let records = source.query_text("matrix", &permits()).await.expect("query succeeds");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("size"), Some("2.0 GB"));
    assert_eq!(records[1].get("title"), Some("Orphan"));
    assert_eq!(records[1].get("size"), Some("1.4 GB"), "row value survives");
}

#[tokio::test]
async fn test_search_skips_invalid_magnets() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/s/matrix"))
        .respond_with(html(results_page(
            &[
                Row::new("Matrix 1999 1080p BluRay x264", magnet('a', "matrix")).swarm(12, 3),
                Row::new("Broken", "magnet:?xt=urn:btih:nothex".to_string()),
            ],
            None,
        )))
        .mount(&server)
        .await;

    let entry = descriptor("Index", &server.uri(), "/s/{query:q}", "", "");
    let (_dir, providers) = write_providers(&[entry]);

    let results = search_with_providers(&providers, &SearchQuery::text("matrix"))
        .await
        .expect("search succeeds");

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.title, "Matrix 1999 1080p BluRay x264");
    assert_eq!(result.info_hash, hash('a'));
    assert_eq!(result.seeds, Some(12));
    assert_eq!(result.leeches, Some(3));
    assert_eq!(result.resolution.as_deref(), Some("1080p"));
    assert_eq!(result.release_type.as_deref(), Some("BRRip"));
    assert_eq!(result.providers.len(), 1);
    assert_eq!(result.providers[0].name, "Index");
    assert_eq!(result.providers[0].color.as_deref(), Some("FFFF0000"));
}

#[tokio::test]
async fn test_failing_source_does_not_affect_others() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/good/The%20Matrix%201999"))
        .respond_with(html(results_page(&[Row::new("Matrix 720p", magnet('a', "m"))], None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad/The%20Matrix%201999"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (_dir, providers) = write_providers(&[
        descriptor("Bad", &server.uri(), "/bad/{query:q}", "", ""),
        descriptor("Good", &server.uri(), "/good/{query:q}", "", ""),
    ]);
    let config = SearchConfig {
        providers_path: Some(providers),
        ..SearchConfig::default()
    };
    let query = SearchQuery::movie(None, Title::new("The Matrix"), Some(1999));

    let formatter = Arc::new(Formatter::new());
    let sources = load_enabled_sources(&config, &formatter, None).expect("sources load");
    let mut progress = Vec::new();
    let outcomes = run_sources(&config, &sources, &query, |p| {
        progress.push((p.completed, p.total));
    })
    .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(progress.len(), 2);
    assert!(progress.iter().all(|(_, total)| *total == 2));
    let bad = outcomes.iter().find(|o| o.source_id == "bad").expect("bad outcome");
    let good = outcomes.iter().find(|o| o.source_id == "good").expect("good outcome");
    assert!(!bad.is_success());
    assert!(bad.records.is_empty());
    assert!(good.is_success());
    assert_eq!(good.records.len(), 1);

    let results = perform_search(&config, &query, None, |_| {})
        .await
        .expect("search succeeds");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].providers[0].name, "Good");
}

#[tokio::test]
async fn test_duplicate_hashes_merge_across_sources() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/alpha/matrix"))
        .respond_with(html(results_page(
            &[Row::new("Matrix.1999.1080p", magnet('b', "m")).swarm(10, 2)],
            None,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/beta/matrix"))
        .respond_with(html(results_page(
            &[Row::new("The Matrix (1999)", magnet('b', "m")).swarm(20, 4)],
            None,
        )))
        .mount(&server)
        .await;

    let (_dir, providers) = write_providers(&[
        descriptor("Alpha", &server.uri(), "/alpha/{query:q}", "", ""),
        descriptor("Beta", &server.uri(), "/beta/{query:q}", "", ""),
    ]);

    let results = search_with_providers(&providers, &SearchQuery::text("matrix"))
        .await
        .expect("search succeeds");

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.title, "Matrix.1999.1080p", "first source in file order wins");
    assert_eq!(result.seeds, Some(15));
    assert_eq!(result.leeches, Some(3));
    let names: Vec<_> = result.providers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);
}

#[test]
fn test_enabled_sources_and_only_filter() {
    let (_dir, providers) = write_providers(&[
        descriptor("One", "https://one.example", "/s/{query:q}", "", ""),
        descriptor("Two", "https://two.example", "/s/{query:q}", "", ""),
    ]);
    let formatter = Arc::new(Formatter::new());
    let mut config = SearchConfig {
        providers_path: Some(providers),
        ..SearchConfig::default()
    };

    let all = load_enabled_sources(&config, &formatter, None).expect("sources load");
    assert_eq!(all.len(), 2);

    let only = load_enabled_sources(&config, &formatter, Some("two")).expect("sources load");
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].name(), "Two");

    let err = load_enabled_sources(&config, &formatter, Some("three")).unwrap_err();
    assert!(err.to_string().contains("three"), "{err}");

    config.enabled_sources = Some(vec!["one".to_string()]);
    let enabled = load_enabled_sources(&config, &formatter, None).expect("sources load");
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id(), "one");
}
