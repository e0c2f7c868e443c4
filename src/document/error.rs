//! Error types for document construction and path resolution.

use thiserror::Error;

/// Errors raised while turning a response body into a [`super::Document`].
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    /// Payload could not be parsed in the declared format
    #[error("invalid {kind} document: {reason}\n  Suggestion: Check the source's `type` setting")]
    Malformed {
        /// Declared document kind
        kind: &'static str,
        /// Parser message
        reason: String,
    },

    /// Payload contained no elements
    #[error("document contains no elements")]
    Empty,
}

impl DocumentError {
    /// Creates a `Malformed` error for the given kind.
    #[must_use]
    pub fn malformed(kind: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while compiling or resolving a path expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The expression did not resolve against the tree
    #[error("path '{path}' not found: {reason}")]
    NotFound {
        /// The expression being resolved
        path: String,
        /// What was missing
        reason: String,
    },

    /// The expression is not valid path syntax
    #[error("invalid path '{path}': {reason}\n  Suggestion: Use ElementPath steps with an optional /@attr, /text() or /tail() suffix")]
    Syntax {
        /// The offending expression
        path: String,
        /// Why it was rejected
        reason: String,
    },
}

impl PathError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(path: &str, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Syntax` error.
    #[must_use]
    pub fn syntax(path: &str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
