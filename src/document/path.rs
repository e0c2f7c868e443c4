//! Path expressions over [`Document`] trees.
//!
//! Element paths follow the ElementPath subset of ElementTree:
//!
//! - `tag`, `*`, `.` steps separated by `/`, `//` for descendants
//! - predicates `[@attr]`, `[@attr='v']`, `[@attr!='v']`, `[tag]`,
//!   `[tag='v']`, `[.='v']`, `[n]`, `[last()]`, `[last()-n]`
//!
//! A [`PathExpr`] adds a facet suffix (`/@attr`, `/text()`, `/tail()`) and
//! `..` segments that climb to the parent of whatever the preceding fragment
//! matched, e.g. `.//a[@class='magnet']/../span/text()`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{Document, NodeId, PathError};
use crate::util::compile_static_regex;

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^(.+)/@([a-zA-Z0-9_:\- ]+)$"));
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^(.+)/text\(\)$"));
static TAIL_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^(.+)/tail\(\)$"));
static ASCEND_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\.{2,3}"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Context,
    Any,
    Tag(String),
}

impl NodeTest {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        match self {
            Self::Context | Self::Any => true,
            Self::Tag(tag) => doc.element(node).tag() == tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals {
        name: String,
        value: String,
        negate: bool,
    },
    HasChild(String),
    ChildTextEquals {
        tag: String,
        value: String,
        negate: bool,
    },
    TextEquals {
        value: String,
        negate: bool,
    },
    /// 1-based position among same-tag siblings.
    Index(usize),
    /// `last()` minus an offset.
    FromLast(usize),
}

impl Predicate {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let element = doc.element(node);
        match self {
            Self::HasAttribute(name) => element.attribute(name).is_some(),
            Self::AttributeEquals {
                name,
                value,
                negate,
            } => element
                .attribute(name)
                .is_some_and(|found| (found == value) != *negate),
            Self::HasChild(tag) => element
                .children()
                .iter()
                .any(|child| doc.element(*child).tag() == tag),
            Self::ChildTextEquals { tag, value, negate } => {
                element.children().iter().any(|child| {
                    doc.element(*child).tag() == tag && ((doc.itertext(*child) == *value) != *negate)
                })
            }
            Self::TextEquals { value, negate } => (doc.itertext(node) == *value) != *negate,
            Self::Index(position) => same_tag_siblings(doc, node)
                .and_then(|siblings| siblings.get(position - 1).copied())
                == Some(node),
            Self::FromLast(offset) => same_tag_siblings(doc, node)
                .and_then(|siblings| {
                    siblings
                        .len()
                        .checked_sub(offset + 1)
                        .map(|index| siblings[index])
                })
                == Some(node),
        }
    }
}

fn same_tag_siblings(doc: &Document, node: NodeId) -> Option<Vec<NodeId>> {
    let parent = doc.parent(node)?;
    let tag = doc.element(node).tag();
    Some(
        doc.element(parent)
            .children()
            .iter()
            .copied()
            .filter(|child| doc.element(*child).tag() == tag)
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled element path (no facet, no ascend segments).
///
/// Used directly for row locators, where every match is a row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ElementPath {
    source: String,
    steps: Vec<Step>,
}

impl ElementPath {
    /// Compiles an element path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Syntax`] for absolute paths, empty steps,
    /// unknown predicate forms or unbalanced brackets/quotes.
    pub fn compile(path: &str) -> Result<Self, PathError> {
        let steps = StepParser::new(path).parse()?;
        Ok(Self {
            source: path.to_string(),
            steps,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// All matches relative to `context`, in document order.
    #[must_use]
    pub fn find_all(&self, doc: &Document, context: NodeId) -> Vec<NodeId> {
        let mut current = vec![context];
        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for node in &current {
                let candidates: Vec<NodeId> = match (step.axis, &step.test) {
                    (_, NodeTest::Context) => vec![*node],
                    (Axis::Child, test) => doc
                        .element(*node)
                        .children()
                        .iter()
                        .copied()
                        .filter(|child| test.matches(doc, *child))
                        .collect(),
                    (Axis::Descendant, test) => doc
                        .descendants(*node)
                        .into_iter()
                        .filter(|child| test.matches(doc, *child))
                        .collect(),
                };
                next.extend(candidates.into_iter().filter(|c| seen.insert(*c)));
            }
            for predicate in &step.predicates {
                next.retain(|candidate| predicate.matches(doc, *candidate));
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// First match relative to `context`.
    #[must_use]
    pub fn find(&self, doc: &Document, context: NodeId) -> Option<NodeId> {
        self.find_all(doc, context).into_iter().next()
    }
}

impl TryFrom<String> for ElementPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::compile(&value)
    }
}

struct StepParser<'a> {
    path: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> StepParser<'a> {
    fn new(path: &'a str) -> Self {
        Self {
            path,
            chars: path.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: &str) -> bool {
        let len = expected.chars().count();
        let matches = self.chars.len() >= self.pos + len
            && self.chars[self.pos..self.pos + len]
                .iter()
                .copied()
                .eq(expected.chars());
        if matches {
            self.pos += len;
        }
        matches
    }

    fn error(&self, reason: impl Into<String>) -> PathError {
        PathError::syntax(self.path, reason)
    }

    fn parse(mut self) -> Result<Vec<Step>, PathError> {
        if self.chars.is_empty() {
            return Ok(Vec::new());
        }
        if self.peek() == Some('/') {
            return Err(self.error("absolute paths are not supported on elements"));
        }

        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        loop {
            steps.push(self.parse_step(axis)?);
            if self.pos >= self.chars.len() {
                break;
            }
            axis = if self.eat("//") {
                Axis::Descendant
            } else if self.eat("/") {
                Axis::Child
            } else {
                return Err(self.error(format!("unexpected character at offset {}", self.pos)));
            };
        }
        Ok(steps)
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step, PathError> {
        let test = match self.peek() {
            Some('.') => {
                self.pos += 1;
                if axis == Axis::Descendant {
                    return Err(self.error("'.' cannot follow '//'"));
                }
                NodeTest::Context
            }
            Some('*') => {
                self.pos += 1;
                NodeTest::Any
            }
            Some(c) if is_name_start(c) => NodeTest::Tag(self.parse_name()),
            _ => return Err(self.error(format!("expected a step at offset {}", self.pos))),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            self.pos += 1;
            let body = self.take_predicate_body()?;
            predicates.push(self.parse_predicate(body.trim())?);
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn take_predicate_body(&mut self) -> Result<String, PathError> {
        let mut body = String::new();
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match (quote, c) {
                (None, ']') => return Ok(body),
                (None, '\'' | '"') => quote = Some(c),
                (Some(q), c) if c == q => quote = None,
                _ => {}
            }
            body.push(c);
        }
        Err(self.error("unterminated predicate"))
    }

    fn parse_predicate(&self, body: &str) -> Result<Predicate, PathError> {
        if let Some(rest) = body.strip_prefix("last()") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Ok(Predicate::FromLast(0));
            }
            let offset = rest
                .strip_prefix('-')
                .and_then(|n| n.trim().parse::<usize>().ok())
                .ok_or_else(|| self.error(format!("unsupported position '{body}'")))?;
            return Ok(Predicate::FromLast(offset));
        }
        if body.chars().all(|c| c.is_ascii_digit()) && !body.is_empty() {
            let index: usize = body
                .parse()
                .map_err(|_| self.error(format!("invalid index '{body}'")))?;
            if index == 0 {
                return Err(self.error("positions are 1-based"));
            }
            return Ok(Predicate::Index(index));
        }

        let (subject, comparison) = split_comparison(body);
        let comparison = comparison
            .map(|(negate, raw)| unquote(raw).map(|value| (negate, value)))
            .transpose()
            .map_err(|reason| self.error(reason))?;

        if let Some(name) = subject.strip_prefix('@') {
            if !valid_name(name) {
                return Err(self.error(format!("invalid attribute name '{name}'")));
            }
            return Ok(match comparison {
                None => Predicate::HasAttribute(name.to_string()),
                Some((negate, value)) => Predicate::AttributeEquals {
                    name: name.to_string(),
                    value,
                    negate,
                },
            });
        }
        if subject == "." {
            let (negate, value) =
                comparison.ok_or_else(|| self.error("'.' predicate needs a comparison"))?;
            return Ok(Predicate::TextEquals { value, negate });
        }
        if valid_name(subject) {
            return Ok(match comparison {
                None => Predicate::HasChild(subject.to_string()),
                Some((negate, value)) => Predicate::ChildTextEquals {
                    tag: subject.to_string(),
                    value,
                    negate,
                },
            });
        }
        Err(self.error(format!("unsupported predicate '[{body}]'")))
    }
}

fn split_comparison(body: &str) -> (&str, Option<(bool, &str)>) {
    let quote_start = body.find(['\'', '"']).unwrap_or(body.len());
    let head = &body[..quote_start];
    if let Some(index) = head.find("!=") {
        return (body[..index].trim(), Some((true, body[index + 2..].trim())));
    }
    if let Some(index) = head.find('=') {
        return (body[..index].trim(), Some((false, body[index + 1..].trim())));
    }
    (body, None)
}

fn unquote(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && (open == '\'' || open == '"') => {
            Ok(chars.collect())
        }
        _ => Err(format!("expected a quoted value, found '{raw}'")),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

/// What a [`PathExpr`] yields once its element is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFacet {
    /// The element itself, serialized as markup.
    Element,
    /// An attribute value; missing attributes are an error.
    Attribute(String),
    /// The element's leading text (may be absent).
    Text,
    /// The text following the element (may be absent).
    Tail,
}

/// A compiled field path: element path, optional ascend segments and facet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct PathExpr {
    source: String,
    /// Fragments whose match is replaced by its parent before continuing.
    ascents: Vec<ElementPath>,
    target: ElementPath,
    facet: PathFacet,
}

impl PathExpr {
    /// Compiles a path expression.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Syntax`] if any fragment is not a valid element path.
    pub fn compile(expr: &str) -> Result<Self, PathError> {
        let (path, facet) = split_facet(expr);

        let fragments: Vec<&str> = ASCEND_RE.split(path).collect();
        let (last, leading) = fragments
            .split_last()
            .ok_or_else(|| PathError::syntax(expr, "empty path"))?;

        let mut ascents = Vec::with_capacity(leading.len());
        for (index, fragment) in leading.iter().enumerate() {
            let mut fragment = *fragment;
            if index > 0 {
                fragment = fragment.strip_prefix('/').unwrap_or(fragment);
            }
            fragment = fragment.strip_suffix('/').unwrap_or(fragment);
            ascents.push(ElementPath::compile(fragment).map_err(|e| rebase(e, expr))?);
        }

        let target = if leading.is_empty() {
            ElementPath::compile(last)
        } else {
            ElementPath::compile(&format!(".{last}"))
        }
        .map_err(|e| rebase(e, expr))?;

        Ok(Self {
            source: expr.to_string(),
            ascents,
            target,
            facet,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The selected facet.
    #[must_use]
    pub fn facet(&self) -> &PathFacet {
        &self.facet
    }

    /// Resolves the expression to an element, following ascend segments.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::NotFound`] if a fragment matches nothing or an
    /// ascent is attempted from the root.
    pub fn resolve_node(&self, doc: &Document, context: NodeId) -> Result<NodeId, PathError> {
        let mut node = context;
        for ascent in &self.ascents {
            let found = ascent.find(doc, node).ok_or_else(|| {
                PathError::not_found(&self.source, format!("no match for '{}'", ascent.as_str()))
            })?;
            node = doc.parent(found).ok_or_else(|| {
                PathError::not_found(&self.source, "cannot ascend above the root element")
            })?;
        }
        self.target.find(doc, node).ok_or_else(|| {
            PathError::not_found(&self.source, format!("no match for '{}'", self.target.as_str()))
        })
    }

    /// Resolves the expression and extracts its facet.
    ///
    /// `Ok(None)` means the element exists but has no text/tail.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::NotFound`] when the element or attribute is missing.
    pub fn resolve(&self, doc: &Document, context: NodeId) -> Result<Option<String>, PathError> {
        let node = self.resolve_node(doc, context)?;
        let element = doc.element(node);
        match &self.facet {
            PathFacet::Element => Ok(Some(doc.serialize(node))),
            PathFacet::Attribute(name) => element
                .attribute(name)
                .map(|value| Some(value.to_string()))
                .ok_or_else(|| {
                    PathError::not_found(&self.source, format!("attribute '{name}' missing"))
                }),
            PathFacet::Text => Ok(element.text().map(str::to_string)),
            PathFacet::Tail => Ok(element.tail().map(str::to_string)),
        }
    }
}

impl TryFrom<String> for PathExpr {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::compile(&value)
    }
}

fn split_facet(expr: &str) -> (&str, PathFacet) {
    if let Some(caps) = ATTR_RE.captures(expr)
        && let (Some(path), Some(name)) = (caps.get(1), caps.get(2))
    {
        return (path.as_str(), PathFacet::Attribute(name.as_str().to_string()));
    }
    if let Some(path) = TEXT_RE.captures(expr).and_then(|caps| caps.get(1)) {
        return (path.as_str(), PathFacet::Text);
    }
    if let Some(path) = TAIL_RE.captures(expr).and_then(|caps| caps.get(1)) {
        return (path.as_str(), PathFacet::Tail);
    }
    (expr, PathFacet::Element)
}

fn rebase(error: PathError, expr: &str) -> PathError {
    match error {
        PathError::Syntax { reason, .. } => PathError::syntax(expr, reason),
        other => other,
    }
}
