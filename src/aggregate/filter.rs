//! Ranking weights and the inclusion filter.

use serde::{Deserialize, Serialize};

use super::AggregatedResult;
use super::classify::{RELEASE_TYPES, RESOLUTIONS};

/// Weights of the ranking factor.
///
/// `factor = max(seeds * seeds_weight + leeches * leeches_weight, 1) * resolution_factor`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    pub seeds_weight: i64,
    pub leeches_weight: i64,
    /// Used when no source reported seeds.
    pub default_seeds: i64,
    /// Used when no source reported leeches.
    pub default_leeches: i64,
    /// Used when the resolution is unknown.
    pub default_resolution_factor: i64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            seeds_weight: 4,
            leeches_weight: 1,
            default_seeds: 0,
            default_leeches: 0,
            default_resolution_factor: 2,
        }
    }
}

impl RankingConfig {
    #[must_use]
    pub fn factor(&self, result: &AggregatedResult) -> i64 {
        let seeds = result.seeds().unwrap_or(self.default_seeds);
        let leeches = result.leeches().unwrap_or(self.default_leeches);
        let resolution = result
            .classification()
            .resolution
            .and_then(|label| RESOLUTIONS.position(label))
            .and_then(|position| i64::try_from(position).ok())
            .unwrap_or(self.default_resolution_factor);
        seeds
            .saturating_mul(self.seeds_weight)
            .saturating_add(leeches.saturating_mul(self.leeches_weight))
            .max(1)
            .saturating_mul(resolution)
    }
}

/// Which aggregated results are shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub require_size: bool,
    /// Requires a non-zero average seed count.
    pub require_seeds: bool,
    /// Requires a known resolution listed in `resolutions`.
    pub require_resolution: bool,
    /// Requires a known release type listed in `release_types`.
    pub require_release_type: bool,
    pub resolutions: Vec<String>,
    pub release_types: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            require_size: false,
            require_seeds: false,
            require_resolution: false,
            require_release_type: false,
            resolutions: RESOLUTIONS.labels().map(str::to_string).collect(),
            release_types: RELEASE_TYPES.labels().map(str::to_string).collect(),
        }
    }
}

impl FilterConfig {
    #[must_use]
    pub fn includes(&self, result: &AggregatedResult) -> bool {
        let classification = result.classification();
        (!self.require_size || result.size().is_some_and(|s| !s.is_empty()))
            && (!self.require_seeds || result.seeds().is_some_and(|s| s != 0))
            && (!self.require_resolution || enabled(&self.resolutions, classification.resolution))
            && (!self.require_release_type
                || enabled(&self.release_types, classification.release_type))
    }

    /// Labels in `resolutions` / `release_types` that no table knows.
    #[must_use]
    pub fn unknown_labels(&self) -> Vec<String> {
        let resolutions = self
            .resolutions
            .iter()
            .filter(|label| !RESOLUTIONS.contains(label));
        let releases = self
            .release_types
            .iter()
            .filter(|label| !RELEASE_TYPES.contains(label));
        resolutions.chain(releases).cloned().collect()
    }
}

fn enabled(labels: &[String], label: Option<&str>) -> bool {
    label.is_some_and(|label| labels.iter().any(|l| l == label))
}
