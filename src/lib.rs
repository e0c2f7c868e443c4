//! Magneto Core Library
//!
//! Searches many torrent index sites at once from declarative source
//! descriptors, then de-duplicates the hits by info hash, classifies them
//! and ranks them.
//!
//! # Architecture
//!
//! Leaf-first:
//! - [`document`] - document trees (HTML, XML, JSON) and path expressions
//! - [`format`] - template formatter with a whitelisted function set
//! - [`fetch`] - page fetching behind the [`fetch::PageFetcher`] trait
//! - [`extract`] - record extraction, mutate rules and pagination
//! - [`source`] - descriptor loading and per-source query pipeline
//! - [`runner`] - concurrent multi-source execution with fault isolation
//! - [`magnet`] - magnet URI decomposition
//! - [`aggregate`] - de-duplication, classification and ranking
//! - [`search`] - host-facing entry point tying it all together
//! - [`config`] - TOML configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod config;
pub mod document;
pub mod extract;
pub mod fetch;
pub mod format;
pub mod magnet;
pub mod runner;
pub mod search;
pub mod source;
pub mod user_agent;
pub mod util;

// Re-export commonly used types
pub use aggregate::{Aggregator, DisplayRecord, FilterConfig, RankingConfig};
pub use config::{ConfigError, SearchConfig};
pub use document::{Document, DocumentKind, ElementPath, PathExpr};
pub use extract::Record;
pub use format::{Formatter, Title};
pub use magnet::{Magnet, MagnetError};
pub use runner::{Progress, Runner, SourceOutcome};
pub use search::{load_enabled_sources, perform_search};
pub use source::{EnrichmentPolicy, QueryKind, SearchQuery, Source, SourceDescriptor, SourceError};
