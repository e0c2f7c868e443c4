//! Search configuration.
//!
//! Loaded from TOML. Every key is optional; a missing file yields the
//! defaults. Relative `providers_path` values resolve against the directory
//! of the config file that set them.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{DEFAULT_LOCATOR_TEMPLATE, FilterConfig, RankingConfig};
use crate::fetch::DEFAULT_TIMEOUT_SECS;
use crate::runner::DEFAULT_THREADS;
use crate::source::EnrichmentPolicy;

const THREADS_RANGE: std::ops::RangeInclusive<usize> = 1..=50;
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

/// Default descriptor file name, looked up next to the config file.
pub const DEFAULT_PROVIDERS_FILE: &str = "providers.json";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{key}`: {value}. Expected range: {expected}")]
    OutOfRange {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid config value for `{key}`: {reason}\n  Suggestion: {suggestion}")]
    Invalid {
        key: &'static str,
        reason: String,
        suggestion: &'static str,
    },
}

/// Everything a search needs besides the query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Descriptor file; defaults to `providers.json` beside the config file.
    pub providers_path: Option<PathBuf>,
    /// Concurrent sources (and concurrent detail fetches).
    pub threads: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Source ids to query; absent means all.
    pub enabled_sources: Option<Vec<String>>,
    pub enrichment_policy: EnrichmentPolicy,
    /// Template for the play locator; fields `magnet`, `info_hash`, `title`.
    pub locator_template: String,
    pub ranking: RankingConfig,
    pub filters: FilterConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers_path: None,
            threads: DEFAULT_THREADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            enabled_sources: None,
            enrichment_policy: EnrichmentPolicy::default(),
            locator_template: DEFAULT_LOCATOR_TEMPLATE.to_string(),
            ranking: RankingConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Reads, parses and validates a config file. Relative paths inside it
    /// are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&raw, path)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads `path` if given, else the default location; defaults when the
    /// default file does not exist.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; an explicit `path` must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("no config file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Checks value ranges and filter labels.
    ///
    /// # Errors
    ///
    /// [`ConfigError::OutOfRange`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !THREADS_RANGE.contains(&self.threads) {
            return Err(ConfigError::OutOfRange {
                key: "threads",
                value: self.threads.to_string(),
                expected: "1..=50",
            });
        }
        if !TIMEOUT_RANGE.contains(&self.timeout_secs) {
            return Err(ConfigError::OutOfRange {
                key: "timeout_secs",
                value: self.timeout_secs.to_string(),
                expected: "1..=300",
            });
        }
        if self.ranking.default_resolution_factor < 1 {
            return Err(ConfigError::OutOfRange {
                key: "ranking.default_resolution_factor",
                value: self.ranking.default_resolution_factor.to_string(),
                expected: "1..",
            });
        }
        let unknown = self.filters.unknown_labels();
        if !unknown.is_empty() {
            return Err(ConfigError::Invalid {
                key: "filters",
                reason: format!("unknown labels: {}", unknown.join(", ")),
                suggestion: "Use resolution labels like \"1080p\" or \"4K\" and release labels like \"WebDL\"",
            });
        }
        if self.locator_template.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "locator_template",
                reason: "empty template".to_string(),
                suggestion: "Remove the key to use \"{magnet}\"",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether a source id passes `enabled_sources`.
    #[must_use]
    pub fn is_enabled(&self, source_id: &str) -> bool {
        self.enabled_sources
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| id == source_id))
    }

    /// The descriptor file to load: the configured path, else
    /// `providers.json` in the default config directory.
    #[must_use]
    pub fn providers_path(&self) -> Option<PathBuf> {
        self.providers_path.clone().or_else(|| {
            resolve_default_config_path()
                .and_then(|path| path.parent().map(|dir| dir.join(DEFAULT_PROVIDERS_FILE)))
        })
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        if let Some(path) = &self.providers_path
            && path.is_relative()
        {
            self.providers_path = Some(dir.join(path));
        }
    }
}

/// Default config location.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/magneto/config.toml`
/// 2. `$HOME/.config/magneto/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("magneto").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("magneto")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
