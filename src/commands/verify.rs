//! Verify command handler: descriptor file lint.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use magneto_core::SearchConfig;
use magneto_core::source::{CompileOptions, SourceDescriptor, load_descriptors};
use magneto_core::util::compile_static_regex;
use regex::Regex;
use tracing::{debug, error, info, warn};

static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^[0-9A-Fa-f]{8}$"));

/// Fields every source must produce, and fields it should.
const REQUIRED_FIELDS: [&str; 2] = ["title", "magnet"];
const RECOMMENDED_FIELDS: [&str; 3] = ["seeds", "leeches", "size"];

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct VerifyReport {
    pub(crate) sources: usize,
    pub(crate) errors: Vec<String>,
    pub(crate) warnings: Vec<String>,
}

pub fn run_verify_command(config: &SearchConfig) -> Result<()> {
    let path = config
        .providers_path()
        .context("No descriptor file configured; set `providers_path` or pass --providers")?;
    let report = verify_file(&path)?;

    for message in &report.errors {
        error!("{message}");
    }
    for message in &report.warnings {
        warn!("{message}");
    }
    println!(
        "{}: {} source(s), {} error(s), {} warning(s)",
        path.display(),
        report.sources,
        report.errors.len(),
        report.warnings.len()
    );
    if !report.errors.is_empty() {
        bail!("Descriptor file '{}' has {} error(s)", path.display(), report.errors.len());
    }
    info!("the descriptor file contents are valid");
    Ok(())
}

pub(crate) fn verify_file(path: &Path) -> Result<VerifyReport> {
    let descriptors = load_descriptors(path)
        .with_context(|| format!("Failed to load descriptor file '{}'", path.display()))?;
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let mut report = VerifyReport {
        sources: descriptors.len(),
        ..VerifyReport::default()
    };
    let mut ids = HashSet::new();
    for descriptor in descriptors {
        verify_descriptor(descriptor, root, &mut ids, &mut report);
    }
    Ok(report)
}

fn verify_descriptor(
    descriptor: SourceDescriptor,
    root: &Path,
    ids: &mut HashSet<String>,
    report: &mut VerifyReport,
) {
    let name = descriptor.name.clone();
    let fields: HashSet<&str> = descriptor.output_fields().collect();
    for key in REQUIRED_FIELDS {
        if !fields.contains(key) {
            report.errors.push(format!("data.{key} not defined for source '{name}'"));
        }
    }
    for key in RECOMMENDED_FIELDS {
        if !fields.contains(key) {
            report.warnings.push(format!("data.{key} not defined for source '{name}'"));
        }
    }

    match descriptor.attributes.icon() {
        Some(icon) if !root.join(icon).is_file() => report.warnings.push(format!(
            "attributes.icon for source '{name}' is defined ({icon}) but is not a valid file"
        )),
        Some(_) => {}
        None => debug!(source = %name, "no attributes.icon defined"),
    }
    match descriptor.attributes.color() {
        Some(color) if !COLOR_RE.is_match(color) => report.warnings.push(format!(
            "attributes.color for source '{name}' is defined ({color}) but is not a valid color ({})",
            COLOR_RE.as_str()
        )),
        Some(_) => {}
        None => debug!(source = %name, "no attributes.color defined"),
    }

    match descriptor.compile(&CompileOptions::default()) {
        Ok(source) => {
            if !ids.insert(source.id().to_string()) {
                report
                    .errors
                    .push(format!("source id '{}' is used by more than one source", source.id()));
            }
        }
        Err(e) => report.errors.push(e.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("providers.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_complete_descriptor_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("icon.png"), b"png").unwrap();
        let path = write(
            dir.path(),
            r#"[{
                "name": "Good",
                "base_url": "https://good.example",
                "results_parser": {
                    "url": "/s/{query:q}", "rows": ".//tr",
                    "data": {"title": "td[1]/text()", "magnet": "td[2]/a/@href",
                             "seeds": "td[3]/text()", "leeches": "td[4]/text()", "size": "td[5]/text()"}
                },
                "attributes": {"icon": "icon.png", "color": "FF00AA00"}
            }]"#,
        );
        let report = verify_file(&path).unwrap();
        assert_eq!(report.sources, 1);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_missing_fields_icon_and_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"[{
                "name": "Sparse",
                "base_url": "https://sparse.example",
                "results_parser": {
                    "url": "/s/{query:q}", "rows": ".//tr",
                    "data": {"title": "td/text()"},
                    "mutate": {"magnet": "magnet:?xt=urn:btih:{title}"}
                },
                "attributes": {"icon": "missing.png", "color": "red"}
            }]"#,
        );
        let report = verify_file(&path).unwrap();
        assert!(report.errors.is_empty(), "mutated magnet counts: {:?}", report.errors);
        assert_eq!(report.warnings.len(), 5, "{:?}", report.warnings);
        assert!(report.warnings.iter().any(|w| w.contains("missing.png")));
        assert!(report.warnings.iter().any(|w| w.contains("(red)")));
    }

    #[test]
    fn test_duplicate_ids_and_bad_templates_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = |name: &str, url: &str| {
            format!(
                r#"{{"name": "{name}", "base_url": "https://x.example",
                    "results_parser": {{"url": "{url}", "rows": ".//tr",
                        "data": {{"title": "td/text()", "magnet": "td/a/@href"}}}}}}"#
            )
        };
        let body = format!(
            "[{}, {}, {}]",
            source("Same Name", "/a"),
            source("same  name", "/b"),
            source("Broken", "/{query:eval('1')}")
        );
        let report = verify_file(&write(dir.path(), &body)).unwrap();
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].contains("same.name"));
        assert!(report.errors[1].contains("Broken"));
    }
}
