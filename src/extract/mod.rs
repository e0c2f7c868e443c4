//! Record extraction from document trees.
//!
//! An [`Extractor`] owns the compiled field paths and mutate rules of one
//! descriptor block. Rows are located with an [`ElementPath`]; each field is
//! then resolved relative to its row, and the mutate rules run in order over
//! the record (later rules see earlier outputs).

mod detail;
mod error;
pub mod pagination;
mod record;

pub use detail::DetailParser;
pub use error::ExtractError;
pub use pagination::{NextPage, NextPageKind, Pagination, ResultsParser};
pub use record::{Mutations, Record};

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::document::{Document, DocumentKind, ElementPath, NodeId, PathExpr};
use crate::format::Formatter;

/// Field paths, mutate rules and document kind for one descriptor block.
#[derive(Debug, Clone)]
pub struct Extractor {
    kind: DocumentKind,
    fields: IndexMap<String, PathExpr>,
    mutations: Mutations,
    formatter: Arc<Formatter>,
}

impl Extractor {
    #[must_use]
    pub fn new(
        kind: DocumentKind,
        fields: IndexMap<String, PathExpr>,
        mutations: Mutations,
        formatter: Arc<Formatter>,
    ) -> Self {
        Self {
            kind,
            fields,
            mutations,
            formatter,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    #[must_use]
    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Output keys of the mutate rules in application order.
    pub fn mutated_names(&self) -> impl Iterator<Item = &str> {
        self.mutations.iter().map(|(key, _)| key)
    }

    /// Parses a response body as this extractor's document kind.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Document`] when the body is not valid for the kind.
    pub fn parse_document(&self, body: &[u8]) -> Result<Document, ExtractError> {
        Ok(self.kind.parse(body)?)
    }

    /// One record per row matched by `rows`, fields resolved relative to the row.
    ///
    /// # Errors
    ///
    /// Fails on the first field that does not resolve or mutate rule that
    /// does not render.
    pub fn extract_many(
        &self,
        doc: &Document,
        rows: &ElementPath,
    ) -> Result<Vec<Record>, ExtractError> {
        let row_nodes = rows.find_all(doc, doc.root());
        debug!(rows = %rows.as_str(), count = row_nodes.len(), "matched result rows");
        row_nodes
            .into_iter()
            .map(|row| {
                let mut record = self.resolve_fields(doc, row)?;
                self.mutate(&mut record)?;
                Ok(record)
            })
            .collect()
    }

    /// A single record resolved from the document root.
    ///
    /// # Errors
    ///
    /// As [`Extractor::extract_many`].
    pub fn extract_one(&self, doc: &Document) -> Result<Record, ExtractError> {
        let mut record = self.resolve_fields(doc, doc.root())?;
        self.mutate(&mut record)?;
        Ok(record)
    }

    /// Resolves fields from the document root into `record`, then mutates it.
    ///
    /// # Errors
    ///
    /// As [`Extractor::extract_many`]; `record` may be partially updated.
    pub fn update(&self, doc: &Document, record: &mut Record) -> Result<(), ExtractError> {
        record.merge(self.resolve_fields(doc, doc.root())?);
        self.mutate(record)
    }

    /// One copy of `record` per row, each updated with that row's fields.
    ///
    /// # Errors
    ///
    /// As [`Extractor::extract_many`].
    pub fn fan_out(
        &self,
        doc: &Document,
        rows: &ElementPath,
        record: &Record,
    ) -> Result<Vec<Record>, ExtractError> {
        rows.find_all(doc, doc.root())
            .into_iter()
            .map(|row| {
                let mut updated = record.clone();
                updated.merge(self.resolve_fields(doc, row)?);
                self.mutate(&mut updated)?;
                Ok(updated)
            })
            .collect()
    }

    /// Applies the mutate rules in declaration order.
    ///
    /// # Errors
    ///
    /// [`ExtractError::Format`] when a rule references an unknown field or
    /// a disallowed function.
    pub fn mutate(&self, record: &mut Record) -> Result<(), ExtractError> {
        for (key, template) in self.mutations.iter() {
            let value = self.formatter.format(template, &record.to_fields())?;
            trace!(field = key, value = %value, "mutated field");
            record.insert(key, Some(value));
        }
        Ok(())
    }

    /// Resolves `expr` and swallows failures.
    #[must_use]
    pub fn try_resolve(doc: &Document, expr: &PathExpr) -> Option<String> {
        match expr.resolve(doc, doc.root()) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "optional path did not resolve");
                None
            }
        }
    }

    fn resolve_fields(&self, doc: &Document, node: NodeId) -> Result<Record, ExtractError> {
        self.fields
            .iter()
            .map(|(name, expr)| {
                expr.resolve(doc, node)
                    .map(|value| (name.clone(), value))
                    .map_err(|e| ExtractError::field(name, e))
            })
            .collect()
    }
}
