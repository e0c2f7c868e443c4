//! Host-facing entry point: load sources, run them, aggregate.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::aggregate::{Aggregator, DisplayRecord};
use crate::config::SearchConfig;
use crate::format::Formatter;
use crate::runner::{Progress, Runner, SourceOutcome};
use crate::source::{CompileOptions, SearchQuery, Source, load_sources};

/// Loads the descriptor file and keeps the sources enabled by `config`.
///
/// `only` restricts the result to one source id.
///
/// # Errors
///
/// Fails when the descriptor file cannot be loaded, when no descriptor
/// path is known, or when `only` names an unknown source.
pub fn load_enabled_sources(
    config: &SearchConfig,
    formatter: &Arc<Formatter>,
    only: Option<&str>,
) -> Result<Vec<Arc<Source>>> {
    let path = config
        .providers_path()
        .context("No descriptor file configured; set `providers_path` or pass --providers")?;
    let options = CompileOptions {
        formatter: Arc::clone(formatter),
        timeout: config.timeout(),
        enrichment_policy: config.enrichment_policy,
    };
    let sources = load_sources(&path, &options)
        .with_context(|| format!("Failed to load sources from '{}'", path.display()))?;

    let selected: Vec<Arc<Source>> = sources
        .into_iter()
        .filter(|source| match only {
            Some(id) => source.id() == id,
            None => config.is_enabled(source.id()),
        })
        .map(Arc::new)
        .collect();

    if let Some(id) = only
        && selected.is_empty()
    {
        bail!("No source with id '{id}' in '{}'", path.display());
    }
    Ok(selected)
}

/// Runs `query` against already loaded sources and returns raw outcomes.
pub async fn run_sources<F>(
    config: &SearchConfig,
    sources: &[Arc<Source>],
    query: &SearchQuery,
    on_progress: F,
) -> Vec<SourceOutcome>
where
    F: FnMut(Progress<'_>),
{
    Runner::new(config.threads)
        .run(sources, query, on_progress)
        .await
}

/// Full pipeline: load, query, de-duplicate, rank and filter.
///
/// Returns an empty list (with a warning) when no source is enabled.
///
/// # Errors
///
/// Configuration and descriptor failures only; individual source failures
/// are logged and skipped.
pub async fn perform_search<F>(
    config: &SearchConfig,
    query: &SearchQuery,
    only: Option<&str>,
    on_progress: F,
) -> Result<Vec<DisplayRecord>>
where
    F: FnMut(Progress<'_>),
{
    config.validate().context("Invalid search configuration")?;
    let formatter = Arc::new(Formatter::new());
    formatter
        .validate(&config.locator_template)
        .context("Invalid `locator_template`")?;

    let sources = load_enabled_sources(config, &formatter, only)?;
    if sources.is_empty() {
        warn!("no sources configured or enabled");
        return Ok(Vec::new());
    }

    let outcomes = run_sources(config, &sources, query, on_progress).await;
    let aggregator = Aggregator::new(
        config.ranking.clone(),
        config.filters.clone(),
        config.locator_template.clone(),
        formatter,
    );
    let results = aggregator.aggregate(outcomes);
    info!(results = results.len(), "search complete");
    Ok(results)
}

/// Convenience wrapper using an explicit descriptor file.
///
/// # Errors
///
/// As [`perform_search`].
pub async fn search_with_providers(
    providers: &Path,
    query: &SearchQuery,
) -> Result<Vec<DisplayRecord>> {
    let config = SearchConfig {
        providers_path: Some(providers.to_path_buf()),
        ..SearchConfig::default()
    };
    perform_search(&config, query, None, |_| {}).await
}
