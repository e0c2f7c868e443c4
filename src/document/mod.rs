//! Document trees and path expressions.
//!
//! Every fetched page is turned into a [`Document`]: an immutable arena of
//! element nodes modelled after ElementTree (each element has a `text` before
//! its first child and a `tail` after its end tag). HTML, XML and JSON
//! payloads all end up in the same shape, so extraction code never needs to
//! know where a tree came from.
//!
//! # Example
//!
//! ```
//! use magneto_core::document::{DocumentKind, PathExpr};
//!
//! let doc = DocumentKind::Html
//!     .parse(b"<html><body><a href='/x'>Link</a></body></html>")
//!     .unwrap();
//! let href = PathExpr::compile(".//a/@href").unwrap();
//! assert_eq!(href.resolve(&doc, doc.root()).unwrap().as_deref(), Some("/x"));
//! ```

mod error;
mod html;
mod json;
mod path;
mod xml;

pub use error::{DocumentError, PathError};
pub use html::HtmlTree;
pub use json::JsonTree;
pub use path::{ElementPath, PathExpr, PathFacet};
pub use xml::XmlTree;

use std::fmt::Write as _;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Index of an element inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A single element of a document tree.
#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    tail: Option<String>,
    children: Vec<NodeId>,
}

impl Element {
    /// Element tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Looks up an attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes in document order.
    #[must_use]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Text content before the first child element.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Text content after this element's end tag.
    #[must_use]
    pub fn tail(&self) -> Option<&str> {
        self.tail.as_deref()
    }

    /// Child elements in document order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Immutable element tree with a lazily built child → parent index.
///
/// The parent index is only needed by ascending path segments (`..`) and
/// positional predicates, so it is computed on first use and then shared by
/// every resolution against the same document.
#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<Element>,
    parents: OnceLock<Vec<Option<NodeId>>>,
}

impl Document {
    /// The root element.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of elements in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the element stored under `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was produced by a different document.
    #[must_use]
    pub fn element(&self, id: NodeId) -> &Element {
        &self.nodes[id.0]
    }

    /// Returns the parent of `id`, or `None` for the root.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent_index().get(id.0).copied().flatten()
    }

    fn parent_index(&self) -> &[Option<NodeId>] {
        self.parents.get_or_init(|| {
            let mut parents = vec![None; self.nodes.len()];
            for (index, node) in self.nodes.iter().enumerate() {
                for child in &node.children {
                    parents[child.0] = Some(NodeId(index));
                }
            }
            parents
        })
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.element(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.element(next).children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of an element and all of its descendants
    /// (the element's own tail excluded).
    #[must_use]
    pub fn itertext(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let element = self.element(id);
        if let Some(text) = &element.text {
            out.push_str(text);
        }
        for child in &element.children {
            self.collect_text(*child, out);
            if let Some(tail) = &self.element(*child).tail {
                out.push_str(tail);
            }
        }
    }

    /// Serializes the element and its subtree as markup (tail excluded).
    #[must_use]
    pub fn serialize(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_element(id, &mut out);
        out
    }

    fn write_element(&self, id: NodeId, out: &mut String) {
        let element = self.element(id);
        let _ = write!(out, "<{}", element.tag);
        for (key, value) in &element.attributes {
            let _ = write!(out, " {key}=\"{}\"", quick_xml::escape::escape(value.as_str()));
        }
        if element.text.is_none() && element.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if let Some(text) = &element.text {
            out.push_str(&quick_xml::escape::escape(text.as_str()));
        }
        for child in &element.children {
            self.write_element(*child, out);
            if let Some(tail) = &self.element(*child).tail {
                out.push_str(&quick_xml::escape::escape(tail.as_str()));
            }
        }
        let _ = write!(out, "</{}>", element.tag);
    }
}

/// Builds a [`Document`] from a stream of start/text/end events.
///
/// Text goes to the open element's `text` until it has a child; after that
/// it is appended to the most recent child's `tail`.
#[derive(Debug, Default)]
pub(crate) struct DocumentBuilder {
    nodes: Vec<Element>,
    stack: Vec<NodeId>,
}

impl DocumentBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens a new element. A second top-level element is attached to the
    /// first one so the tree always has a single root.
    pub(crate) fn start(&mut self, tag: impl Into<String>, attributes: Vec<(String, String)>) {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element {
            tag: tag.into(),
            attributes,
            ..Element::default()
        });
        let parent = self
            .stack
            .last()
            .copied()
            .or_else(|| (id.0 > 0).then_some(NodeId(0)));
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        self.stack.push(id);
    }

    pub(crate) fn end(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn text(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        let Some(&open) = self.stack.last() else {
            return;
        };
        let target = match self.nodes[open.0].children.last() {
            Some(&last_child) => &mut self.nodes[last_child.0].tail,
            None => &mut self.nodes[open.0].text,
        };
        target.get_or_insert_with(String::new).push_str(content);
    }

    pub(crate) fn finish(self) -> Result<Document, DocumentError> {
        if self.nodes.is_empty() {
            return Err(DocumentError::Empty);
        }
        Ok(Document {
            nodes: self.nodes,
            parents: OnceLock::new(),
        })
    }
}

/// Shared construction interface of the document variants.
pub trait TreeBuilder {
    /// Parses raw response bytes into a document tree.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the payload cannot be parsed.
    fn build(content: &[u8]) -> Result<Document, DocumentError>;
}

/// Payload format of a fetched page, chosen when a descriptor is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// HTML markup (lenient, html5ever).
    #[default]
    Html,
    /// Well-formed XML (RSS/Torznab feeds).
    Xml,
    /// JSON mapped onto an element tree.
    Json,
}

impl DocumentKind {
    /// Builds a document from `content` using this kind's tree builder.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the payload cannot be parsed.
    pub fn parse(self, content: &[u8]) -> Result<Document, DocumentError> {
        match self {
            Self::Html => HtmlTree::build(content),
            Self::Xml => XmlTree::build(content),
            Self::Json => JsonTree::build(content),
        }
    }

    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut builder = DocumentBuilder::new();
        builder.start("root", vec![]);
        builder.text("lead");
        builder.start("a", vec![("href".to_string(), "x&y".to_string())]);
        builder.text("inner");
        builder.end();
        builder.text("after-a");
        builder.start("b", vec![]);
        builder.end();
        builder.end();
        builder.finish().unwrap()
    }

    #[test]
    fn test_builder_assigns_text_and_tail() {
        let doc = sample();
        let root = doc.element(doc.root());
        assert_eq!(root.text(), Some("lead"));
        let a = doc.element(root.children()[0]);
        assert_eq!(a.text(), Some("inner"));
        assert_eq!(a.tail(), Some("after-a"));
        assert_eq!(doc.element(root.children()[1]).tail(), None);
    }

    #[test]
    fn test_parent_index_covers_every_node() {
        let doc = sample();
        assert_eq!(doc.parent(doc.root()), None);
        for child in doc.descendants(doc.root()) {
            assert_eq!(doc.parent(child), Some(doc.root()));
        }
    }

    #[test]
    fn test_itertext_and_serialize() {
        let doc = sample();
        assert_eq!(doc.itertext(doc.root()), "leadinnerafter-a");
        assert_eq!(
            doc.serialize(doc.root()),
            "<root>lead<a href=\"x&amp;y\">inner</a>after-a<b /></root>"
        );
    }

    #[test]
    fn test_empty_builder_is_an_error() {
        assert!(matches!(
            DocumentBuilder::new().finish(),
            Err(DocumentError::Empty)
        ));
    }

    #[test]
    fn test_document_kind_deserializes_lowercase() {
        let kind: DocumentKind = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(kind, DocumentKind::Json);
        assert!(serde_json::from_str::<DocumentKind>("\"yaml\"").is_err());
    }
}
