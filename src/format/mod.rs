//! Template formatting for request URLs and derived fields.
//!
//! Templates use `str.format`-style replacement fields:
//! `{name[.attr][!conversion][:spec]}`, with `{{` / `}}` for literal braces.
//!
//! | Part          | Meaning                                                        |
//! |---------------|----------------------------------------------------------------|
//! | `.attr`       | title override (`{title.original}`), falls back to the title  |
//! | `!u` `!l`     | upper / lower case                                             |
//! | `!A`          | strip accents                                                  |
//! | `!b`          | integer byte count as a human size (`1.50 kB`)                 |
//! | `:q`          | percent-escape everything but unreserved characters            |
//! | `:q+`         | percent-escape, spaces become `+`                              |
//! | `:f(..).g(..)`| whitelisted function chain (see [`FunctionRegistry`])          |
//! | `:>8` `:.2f`  | standard fill/align/width/precision                            |
//!
//! # Example
//!
//! ```
//! use magneto_core::format::{Fields, Formatter, TemplateValue};
//!
//! let mut fields = Fields::new();
//! fields.insert("query".into(), TemplateValue::from("the matrix"));
//! fields.insert("page".into(), TemplateValue::Integer(2));
//! let url = Formatter::new().format("/search/{query:q+}/{page}/", &fields).unwrap();
//! assert_eq!(url, "/search/the+matrix/2/");
//! ```

mod convert;
mod error;
mod functions;

pub use convert::{format_size, quote, quote_with, strip_accents};
pub use error::FormatError;
pub use functions::{FnValue, Function, FunctionChain, FunctionRegistry, Literal};

use indexmap::IndexMap;

use convert::StandardSpec;

/// A title with optional per-key overrides (`{title.original}`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Title {
    default: String,
    overrides: IndexMap<String, String>,
}

impl Title {
    #[must_use]
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            overrides: IndexMap::new(),
        }
    }

    /// Adds an override, e.g. a localized or original-language title.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, title: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), title.into());
        self
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.default
    }

    /// The override for `key`, or the main title.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.overrides.get(key).map_or(&self.default, String::as_str)
    }

    #[must_use]
    pub fn overrides(&self) -> &IndexMap<String, String> {
        &self.overrides
    }
}

/// A value available to templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// Renders as an empty string.
    Null,
    Text(String),
    Integer(i64),
    Title(Title),
}

impl TemplateValue {
    /// Plain-text rendering with no spec applied.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(text) => text.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Title(title) => title.as_str().to_string(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Option<String>> for TemplateValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Title> for TemplateValue {
    fn from(value: Title) -> Self {
        Self::Title(value)
    }
}

/// Named values a template can reference.
pub type Fields = IndexMap<String, TemplateValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(FieldRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRef {
    name: String,
    attr: Option<String>,
    conversion: Option<char>,
    spec: String,
}

impl FieldRef {
    fn display_name(&self) -> String {
        match &self.attr {
            Some(attr) => format!("{}.{attr}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Renders templates against a field set.
///
/// Owns its [`FunctionRegistry`]; share one formatter between sources
/// behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    functions: FunctionRegistry,
}

impl Formatter {
    /// A formatter with the standard function whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_registry(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Renders `template`.
    ///
    /// # Errors
    ///
    /// Any [`FormatError`]: malformed template, unknown field, unsupported
    /// conversion or function, or a value its format specifier cannot render.
    pub fn format(&self, template: &str, fields: &Fields) -> Result<String, FormatError> {
        let mut out = String::with_capacity(template.len());
        for segment in parse_template(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Field(field) => out.push_str(&self.render_field(template, &field, fields)?),
            }
        }
        Ok(out)
    }

    /// Checks that a template parses and that every function chain in it
    /// is whitelisted, without rendering anything.
    ///
    /// # Errors
    ///
    /// The same syntax and function errors [`Formatter::format`] would raise.
    pub fn validate(&self, template: &str) -> Result<(), FormatError> {
        for segment in parse_template(template)? {
            if let Segment::Field(field) = segment
                && is_function_chain(&field.spec)
            {
                self.functions.compile(&field.spec)?;
            }
        }
        Ok(())
    }

    fn render_field(
        &self,
        template: &str,
        field: &FieldRef,
        fields: &Fields,
    ) -> Result<String, FormatError> {
        let unknown = || FormatError::UnknownField {
            template: template.to_string(),
            name: field.display_name(),
        };
        let mut value = fields.get(&field.name).cloned().ok_or_else(unknown)?;
        if let Some(attr) = &field.attr {
            value = match value {
                TemplateValue::Title(title) => TemplateValue::Text(title.get(attr).to_string()),
                _ => return Err(unknown()),
            };
        }
        let name = field.display_name();
        if let Some(conversion) = field.conversion {
            value = convert::convert(&name, value, conversion)?;
        }

        let spec = field.spec.as_str();
        if spec.is_empty() {
            return Ok(value.render());
        }
        if spec == "q" {
            return Ok(quote(&value.render()));
        }
        let mut spec_chars = spec.chars();
        if let (Some('q'), Some(separator), None) =
            (spec_chars.next(), spec_chars.next(), spec_chars.next())
        {
            return Ok(quote_with(&value.render(), separator));
        }
        if is_function_chain(spec) {
            let chain = self.functions.compile(spec)?;
            return Ok(chain.apply(FnValue::Text(value.render()))?.to_string());
        }
        StandardSpec::parse(spec, template)?.apply(&name, &value)
    }
}

fn is_function_chain(spec: &str) -> bool {
    spec.ends_with(')') && spec.contains('(')
}

fn parse_template(template: &str) -> Result<Vec<Segment>, FormatError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.next_if_eq(&'{').is_some() => literal.push('{'),
            '}' if chars.next_if_eq(&'}').is_some() => literal.push('}'),
            '}' => return Err(FormatError::syntax(template, "single '}' encountered")),
            '{' => {
                let mut body = String::new();
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match (quote, c) {
                        (Some(q), c) if c == q => quote = None,
                        (Some(_), _) => {}
                        (None, '\'' | '"') => quote = Some(c),
                        (None, '{') => depth += 1,
                        (None, '}') if depth == 0 => {
                            closed = true;
                            break;
                        }
                        (None, '}') => depth -= 1,
                        _ => {}
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(FormatError::syntax(template, "unclosed replacement field"));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(parse_field(template, &body)?));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field(template: &str, body: &str) -> Result<FieldRef, FormatError> {
    let (head, spec) = match body.find(':') {
        Some(index) if !body[..index].contains(['(', '\'', '"']) => {
            (&body[..index], body[index + 1..].to_string())
        }
        _ => (body, String::new()),
    };
    let (reference, conversion) = match head.split_once('!') {
        Some((reference, conv)) => {
            let mut conv_chars = conv.chars();
            match (conv_chars.next(), conv_chars.next()) {
                (Some(c), None) => (reference, Some(c)),
                _ => {
                    return Err(FormatError::syntax(
                        template,
                        format!("expected a single conversion character after '!' in '{{{body}}}'"),
                    ));
                }
            }
        }
        None => (head, None),
    };
    let (name, attr) = match reference.split_once('.') {
        Some((name, attr)) => (name, Some(attr.to_string())),
        None => (reference, None),
    };
    let valid = |s: &str| {
        !s.is_empty()
            && !s.starts_with(|c: char| c.is_ascii_digit())
            && s.chars().all(|c| c.is_alphanumeric() || c == '_')
    };
    if !valid(name) || attr.as_deref().is_some_and(|a| !valid(a)) {
        return Err(FormatError::syntax(
            template,
            format!("invalid field reference '{{{body}}}'"),
        ));
    }
    Ok(FieldRef {
        name: name.to_string(),
        attr,
        conversion,
        spec,
    })
}
