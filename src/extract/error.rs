//! Error types for extraction.

use thiserror::Error;

use crate::document::{DocumentError, PathError};
use crate::fetch::FetchError;
use crate::format::FormatError;

/// Errors raised while turning fetched pages into records.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page could not be parsed as the declared document kind
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// A field path did not resolve against a row
    #[error("field '{field}': {source}")]
    Field {
        /// Field name from the descriptor's `data` block
        field: String,
        /// Resolution failure
        #[source]
        source: PathError,
    },

    /// A template (URL, next page or mutate rule) failed to render
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A page request failed
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ExtractError {
    /// Wraps a path failure for `field`.
    #[must_use]
    pub fn field(field: &str, source: PathError) -> Self {
        Self::Field {
            field: field.to_string(),
            source,
        }
    }
}
