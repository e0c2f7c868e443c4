//! Cross-source de-duplication, classification and ranking.
//!
//! Records from every source are keyed by the info hash of their `magnet`
//! field. The first record seen for a hash supplies the title and icon;
//! later ones add their provider and seed/leech samples, and fill any size
//! or classification still unknown. Outcomes are merged in source
//! declaration order so the result never depends on which source answered
//! first.

pub mod classify;
mod filter;

pub use classify::{Classification, ClassificationTable};
pub use filter::{FilterConfig, RankingConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::extract::Record;
use crate::format::{Fields, Formatter, TemplateValue};
use crate::magnet::Magnet;
use crate::runner::SourceOutcome;

/// Locator used when none is configured: the magnet URI itself.
pub const DEFAULT_LOCATOR_TEMPLATE: &str = "{magnet}";

/// All records sharing one info hash.
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    magnet: Magnet,
    title: String,
    /// Provider name to its display color.
    providers: BTreeMap<String, Option<String>>,
    icon: Option<String>,
    seeds: Vec<i64>,
    leeches: Vec<i64>,
    size: Option<String>,
    classification: Classification,
}

impl AggregatedResult {
    fn new(outcome: &SourceOutcome, magnet: Magnet, record: &Record) -> Self {
        let title = record
            .get("title")
            .or_else(|| magnet.display_name())
            .unwrap_or_else(|| magnet.info_hash())
            .to_string();
        let mut result = Self {
            magnet,
            title,
            providers: BTreeMap::new(),
            icon: outcome.attributes.icon().map(str::to_string),
            seeds: Vec::new(),
            leeches: Vec::new(),
            size: None,
            classification: Classification::default(),
        };
        result.add(outcome, record);
        result
    }

    fn add(&mut self, outcome: &SourceOutcome, record: &Record) {
        self.providers
            .entry(outcome.source_name.clone())
            .or_insert_with(|| outcome.attributes.color().map(str::to_string));
        if let Some(seeds) = record.get("seeds").and_then(parse_count) {
            self.seeds.push(seeds);
        }
        if let Some(leeches) = record.get("leeches").and_then(parse_count) {
            self.leeches.push(leeches);
        }
        if self.size.is_none() {
            self.size = record.get("size").map(str::to_string);
        }
        if let Some(title) = record.get("title") {
            self.classification.fill_from(title);
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn magnet(&self) -> &Magnet {
        &self.magnet
    }

    #[must_use]
    pub fn info_hash(&self) -> &str {
        self.magnet.info_hash()
    }

    /// Integer mean of the reported seed counts.
    #[must_use]
    pub fn seeds(&self) -> Option<i64> {
        mean(&self.seeds)
    }

    /// Integer mean of the reported leech counts.
    #[must_use]
    pub fn leeches(&self) -> Option<i64> {
        mean(&self.leeches)
    }

    #[must_use]
    pub fn size(&self) -> Option<&str> {
        self.size.as_deref()
    }

    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Provider names, sorted.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

/// A provider credited on a display record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provider {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Presentation-ready result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub title: String,
    pub info_hash: String,
    pub magnet: String,
    /// Play locator built from the configured template.
    pub locator: String,
    pub providers: Vec<Provider>,
    pub icon: Option<String>,
    pub size: Option<String>,
    pub seeds: Option<i64>,
    pub leeches: Option<i64>,
    pub resolution: Option<String>,
    pub release_type: Option<String>,
    pub scene_tag: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub factor: i64,
}

impl DisplayRecord {
    /// One-line summary, e.g. `1080p (12/3) [1.40 GB] BRRip H.264 - 1337x YTS`.
    #[must_use]
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(resolution) = &self.resolution {
            parts.push(resolution.clone());
        }
        if let (Some(seeds), Some(leeches)) = (self.seeds, self.leeches) {
            parts.push(format!("({seeds}/{leeches})"));
        }
        if let Some(size) = &self.size {
            parts.push(format!("[{size}]"));
        }
        parts.extend(
            [&self.release_type, &self.video_codec, &self.audio_codec]
                .into_iter()
                .flatten()
                .cloned(),
        );
        if !parts.is_empty() {
            parts.push("-".to_string());
        }
        parts.extend(self.providers.iter().map(|p| p.name.clone()));
        parts.join(" ")
    }
}

/// Merges, ranks and filters source outcomes.
#[derive(Debug, Clone)]
pub struct Aggregator {
    ranking: RankingConfig,
    filters: FilterConfig,
    locator_template: String,
    formatter: Arc<Formatter>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(
            RankingConfig::default(),
            FilterConfig::default(),
            DEFAULT_LOCATOR_TEMPLATE,
            Arc::new(Formatter::new()),
        )
    }
}

impl Aggregator {
    #[must_use]
    pub fn new(
        ranking: RankingConfig,
        filters: FilterConfig,
        locator_template: impl Into<String>,
        formatter: Arc<Formatter>,
    ) -> Self {
        Self {
            ranking,
            filters,
            locator_template: locator_template.into(),
            formatter,
        }
    }

    /// De-duplicates by info hash, ranks by factor (descending, stable) and
    /// applies the inclusion filter to the ranked list.
    #[must_use]
    pub fn aggregate(&self, mut outcomes: Vec<SourceOutcome>) -> Vec<DisplayRecord> {
        outcomes.sort_by_key(|outcome| outcome.rank);

        let mut merged: IndexMap<String, AggregatedResult> = IndexMap::new();
        let mut skipped = 0usize;
        for outcome in &outcomes {
            for record in &outcome.records {
                let Some(magnet) = parse_magnet(outcome, record) else {
                    skipped += 1;
                    continue;
                };
                match merged.get_mut(magnet.info_hash()) {
                    Some(result) => result.add(outcome, record),
                    None => {
                        let result = AggregatedResult::new(outcome, magnet, record);
                        merged.insert(result.info_hash().to_string(), result);
                    }
                }
            }
        }

        let mut ranked: Vec<(i64, AggregatedResult)> = merged
            .into_values()
            .map(|result| (self.ranking.factor(&result), result))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let total = ranked.len();
        let shown: Vec<DisplayRecord> = ranked
            .into_iter()
            .filter(|(_, result)| self.filters.includes(result))
            .map(|(factor, result)| self.display(factor, &result))
            .collect();
        info!(
            unique = total,
            shown = shown.len(),
            skipped,
            "aggregated results"
        );
        shown
    }

    fn display(&self, factor: i64, result: &AggregatedResult) -> DisplayRecord {
        let classification = result.classification();
        DisplayRecord {
            title: result.title().to_string(),
            info_hash: result.info_hash().to_string(),
            magnet: result.magnet().as_uri().to_string(),
            locator: self.locator(result),
            providers: result
                .providers
                .iter()
                .map(|(name, color)| Provider {
                    name: name.clone(),
                    color: color.clone(),
                })
                .collect(),
            icon: result.icon.clone(),
            size: result.size().map(str::to_string),
            seeds: result.seeds(),
            leeches: result.leeches(),
            resolution: classification.resolution.map(str::to_string),
            release_type: classification.release_type.map(str::to_string),
            scene_tag: classification.scene_tag.map(str::to_string),
            video_codec: classification.video_codec.map(str::to_string),
            audio_codec: classification.audio_codec.map(str::to_string),
            factor,
        }
    }

    fn locator(&self, result: &AggregatedResult) -> String {
        let mut fields = Fields::new();
        fields.insert("magnet".to_string(), TemplateValue::from(result.magnet().as_uri()));
        fields.insert("info_hash".to_string(), TemplateValue::from(result.info_hash()));
        fields.insert("title".to_string(), TemplateValue::from(result.title()));
        self.formatter
            .format(&self.locator_template, &fields)
            .unwrap_or_else(|e| {
                warn!(error = %e, "locator template failed; using magnet URI");
                result.magnet().as_uri().to_string()
            })
    }
}

fn parse_magnet(outcome: &SourceOutcome, record: &Record) -> Option<Magnet> {
    let Some(uri) = record.get("magnet") else {
        debug!(source = %outcome.source_name, "record has no magnet; skipping");
        return None;
    };
    match Magnet::parse(uri) {
        Ok(magnet) if magnet.is_null_hash() => {
            debug!(source = %outcome.source_name, "null info hash; skipping");
            None
        }
        Ok(magnet) => Some(magnet),
        Err(e) => {
            debug!(source = %outcome.source_name, error = %e, "invalid magnet; skipping");
            None
        }
    }
}

fn parse_count(value: &str) -> Option<i64> {
    value.trim().replace(',', "").parse().ok()
}

fn mean(samples: &[i64]) -> Option<i64> {
    let count = i64::try_from(samples.len()).ok().filter(|&n| n > 0)?;
    Some(samples.iter().sum::<i64>() / count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::SourceAttributes;

    fn hash(c: char) -> String {
        c.to_string().repeat(40)
    }

    fn magnet(c: char) -> String {
        format!("magnet:?xt=urn:btih:{}", hash(c))
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (*k, Some((*v).to_string())))
            .collect()
    }

    fn outcome(name: &str, rank: usize, records: Vec<Record>) -> SourceOutcome {
        let attributes: SourceAttributes =
            serde_json::from_value(serde_json::json!({"icon": format!("{name}.png")})).unwrap();
        SourceOutcome {
            source_id: name.to_lowercase(),
            source_name: name.to_string(),
            rank,
            attributes,
            records,
            error: None,
        }
    }

    #[test]
    fn test_first_resolved_classification_wins() {
        let outcomes = vec![outcome(
            "A",
            0,
            vec![
                record(&[("title", "Movie.2020.1080p.BluRay.x264"), ("magnet", &magnet('a'))]),
                record(&[("title", "Movie.2020.720p.WEB-DL"), ("magnet", &magnet('a'))]),
            ],
        )];
        let results = Aggregator::default().aggregate(outcomes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resolution.as_deref(), Some("1080p"));
        assert_eq!(results[0].release_type.as_deref(), Some("BRRip"));
        assert_eq!(results[0].video_codec.as_deref(), Some("H.264"));
        assert_eq!(results[0].title, "Movie.2020.1080p.BluRay.x264");
    }

    #[test]
    fn test_higher_resolution_ranks_first_on_equal_swarm() {
        let outcomes = vec![outcome(
            "A",
            0,
            vec![
                record(&[("title", "Movie 720p"), ("magnet", &magnet('1')), ("seeds", "10"), ("leeches", "2")]),
                record(&[("title", "Movie 1080p"), ("magnet", &magnet('2')), ("seeds", "10"), ("leeches", "2")]),
            ],
        )];
        let results = Aggregator::default().aggregate(outcomes);
        assert_eq!(results[0].info_hash, hash('2'));
        assert_eq!(results[0].factor, 42 * 4);
        assert_eq!(results[1].factor, 42 * 3);
    }

    #[test]
    fn test_invalid_and_null_magnets_are_skipped() {
        let outcomes = vec![outcome(
            "A",
            0,
            vec![
                record(&[("title", "good"), ("magnet", &magnet('b'))]),
                record(&[("title", "bad"), ("magnet", "magnet:?dn=nohash")]),
                record(&[("title", "null"), ("magnet", &magnet('0'))]),
                record(&[("title", "none")]),
            ],
        )];
        let results = Aggregator::default().aggregate(outcomes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "good");
    }

    #[test]
    fn test_merge_is_independent_of_arrival_order() {
        let build = || {
            vec![
                outcome("First", 0, vec![record(&[("title", "Show S01 720p"), ("magnet", &magnet('c')), ("seeds", "5")])]),
                outcome(
                    "Second",
                    1,
                    vec![record(&[("title", "Show S01 1080p x265"), ("magnet", &magnet('c')), ("seeds", "8"), ("size", "1.2 GB")])],
                ),
            ]
        };
        let in_order = Aggregator::default().aggregate(build());
        let mut reversed_input = build();
        reversed_input.reverse();
        let reversed = Aggregator::default().aggregate(reversed_input);
        assert_eq!(in_order, reversed);

        let result = &in_order[0];
        assert_eq!(result.title, "Show S01 720p");
        assert_eq!(result.icon.as_deref(), Some("First.png"));
        assert_eq!(result.resolution.as_deref(), Some("720p"));
        assert_eq!(result.video_codec.as_deref(), Some("H.265"));
        assert_eq!(result.seeds, Some(6));
        assert_eq!(result.size.as_deref(), Some("1.2 GB"));
        let names: Vec<_> = result.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn test_filter_applies_after_ranking() {
        let outcomes = vec![outcome(
            "A",
            0,
            vec![
                record(&[("title", "Unknown res"), ("magnet", &magnet('d')), ("seeds", "100")]),
                record(&[("title", "Movie 480p"), ("magnet", &magnet('e')), ("seeds", "1")]),
                record(&[("title", "Movie 2160p"), ("magnet", &magnet('f')), ("seeds", "2")]),
            ],
        )];
        let filters = FilterConfig {
            require_resolution: true,
            resolutions: vec!["480p".into(), "4K".into()],
            ..FilterConfig::default()
        };
        let aggregator = Aggregator::new(
            RankingConfig::default(),
            filters,
            DEFAULT_LOCATOR_TEMPLATE,
            Arc::new(Formatter::new()),
        );
        let results = aggregator.aggregate(outcomes);
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Movie 2160p", "Movie 480p"]);
        let factors: Vec<_> = results.iter().map(|r| r.factor).collect();
        assert_eq!(factors, vec![48, 8], "the unknown-resolution leader (800) is filtered out");
    }

    #[test]
    fn test_require_seeds_and_size() {
        let filters = FilterConfig {
            require_seeds: true,
            require_size: true,
            ..FilterConfig::default()
        };
        let aggregator = Aggregator::new(
            RankingConfig::default(),
            filters,
            DEFAULT_LOCATOR_TEMPLATE,
            Arc::new(Formatter::new()),
        );
        let outcomes = vec![outcome(
            "A",
            0,
            vec![
                record(&[("title", "a"), ("magnet", &magnet('1')), ("seeds", "0"), ("size", "1 GB")]),
                record(&[("title", "b"), ("magnet", &magnet('2')), ("seeds", "3")]),
                record(&[("title", "c"), ("magnet", &magnet('3')), ("seeds", "3"), ("size", "2 GB")]),
            ],
        )];
        let results = aggregator.aggregate(outcomes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "c");
    }

    #[test]
    fn test_averages_use_integer_division() {
        let outcomes = vec![
            outcome("A", 0, vec![record(&[("title", "t"), ("magnet", &magnet('9')), ("seeds", "3"), ("leeches", "x")])]),
            outcome("B", 1, vec![record(&[("title", "t"), ("magnet", &magnet('9')), ("seeds", "4")])]),
        ];
        let results = Aggregator::default().aggregate(outcomes);
        assert_eq!(results[0].seeds, Some(3));
        assert_eq!(results[0].leeches, None);
        // max(3*4 + 0, 1) * default resolution factor 2
        assert_eq!(results[0].factor, 24);
    }

    #[test]
    fn test_label_and_locator() {
        let aggregator = Aggregator::new(
            RankingConfig::default(),
            FilterConfig::default(),
            "plugin://player/play?magnet={magnet:q}",
            Arc::new(Formatter::new()),
        );
        let outcomes = vec![
            outcome(
                "YTS",
                0,
                vec![record(&[
                    ("title", "Movie.2020.1080p.BluRay.x264.AAC"),
                    ("magnet", &magnet('a')),
                    ("seeds", "12"),
                    ("leeches", "3"),
                    ("size", "1.40 GB"),
                ])],
            ),
            outcome("1337x", 1, vec![record(&[("title", "other"), ("magnet", &magnet('a'))])]),
        ];
        let results = aggregator.aggregate(outcomes);
        assert_eq!(
            results[0].label(),
            "1080p (12/3) [1.40 GB] BRRip H.264 AAC - 1337x YTS"
        );
        assert!(results[0].locator.starts_with("plugin://player/play?magnet=magnet%3A%3Fxt%3D"));
    }

    #[test]
    fn test_unknown_filter_labels_reported() {
        let filters = FilterConfig {
            resolutions: vec!["1080p".into(), "8K".into()],
            ..FilterConfig::default()
        };
        assert_eq!(filters.unknown_labels(), vec!["8K".to_string()]);
    }
}
