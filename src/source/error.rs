//! Error types for sources.

use std::path::PathBuf;

use thiserror::Error;

use crate::document::PathError;
use crate::extract::ExtractError;
use crate::fetch::FetchError;
use crate::format::FormatError;

/// Any failure in one source's pipeline.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Extraction, pagination or page fetch failed
    #[error("source '{source_name}': {error}")]
    Extract {
        /// Source display name
        source_name: String,
        /// Underlying failure
        #[source]
        error: ExtractError,
    },

    /// The source has no keyword template for the requested query kind
    #[error("source '{source_name}' has no '{kind}' keyword template\n  Suggestion: Add a \"{kind}\" entry to the source's \"keywords\" block")]
    MissingQueryTemplate {
        /// Source display name
        source_name: String,
        /// Query kind (movie, show, season, episode)
        kind: &'static str,
    },

    /// The keyword template failed to render
    #[error("source '{source_name}': query template: {error}")]
    Query {
        /// Source display name
        source_name: String,
        /// Formatting failure
        #[source]
        error: FormatError,
    },

    /// A descriptor is structurally valid JSON but cannot be compiled
    #[error("invalid descriptor for source '{source_name}': {reason}")]
    Descriptor {
        /// Source display name
        source_name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The source task panicked
    #[error("source '{source_name}' panicked: {message}")]
    Panicked {
        /// Source display name
        source_name: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// The descriptor file could not be read
    #[error("cannot read descriptor file {path}: {source}\n  Suggestion: Check `providers_path` in the config or pass --providers")]
    Io {
        /// Descriptor file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The descriptor file is not valid JSON for the descriptor format
    #[error("cannot parse descriptor file {path}: {source}")]
    Parse {
        /// Descriptor file path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Wraps an extraction failure.
    pub fn extract(source_name: &str, error: impl Into<ExtractError>) -> Self {
        Self::Extract {
            source_name: source_name.to_string(),
            error: error.into(),
        }
    }

    /// Creates a descriptor error.
    pub fn descriptor(source_name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Descriptor {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a descriptor error from a path compilation failure.
    #[must_use]
    pub fn path(source_name: &str, field: &str, error: &PathError) -> Self {
        Self::descriptor(source_name, format!("{field}: {error}"))
    }

    /// Creates a descriptor error from a client construction failure.
    #[must_use]
    pub fn client(source_name: &str, error: &FetchError) -> Self {
        Self::descriptor(source_name, error)
    }
}
