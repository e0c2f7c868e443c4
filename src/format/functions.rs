//! Whitelisted function chains for template specs such as
//! `{title:replace('\s+', '-').lower()}`.
//!
//! Grammar:
//!
//! ```text
//! chain   := call ("." call)*
//! call    := ident "(" [literal ("," literal)*] ")"
//! literal := 'string' | "string" | integer | None
//! ```
//!
//! Every identifier is checked against the [`FunctionRegistry`] while the
//! chain is compiled, so nothing runs unless the whole chain is valid.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use super::FormatError;

/// A literal argument in a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Int(i64),
    None,
}

/// The value threaded through a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FnValue {
    Text(String),
    List(Vec<String>),
}

impl FnValue {
    fn into_text(self, function: &str) -> Result<String, String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::List(_) => Err(format!("{function}() expects text, got a list")),
        }
    }
}

impl fmt::Display for FnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{}'", item.replace('\\', "\\\\").replace('\'', "\\'"))?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Signature of a whitelisted function.
pub type Function = fn(FnValue, &[Literal]) -> Result<FnValue, String>;

/// The set of functions templates may call.
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: IndexMap<&'static str, Function>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FunctionRegistry {
    /// An empty registry; every call is rejected.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }

    /// `replace`, `split`, `get`, `strip`, `upper` and `lower`.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("replace", regex_replace);
        registry.register("split", split);
        registry.register("get", get_at_index);
        registry.register("strip", strip);
        registry.register("upper", |value, args| {
            expect_arity("upper", args, 0, 0)?;
            Ok(FnValue::Text(value.into_text("upper")?.to_uppercase()))
        });
        registry.register("lower", |value, args| {
            expect_arity("lower", args, 0, 0)?;
            Ok(FnValue::Text(value.into_text("lower")?.to_lowercase()))
        });
        registry
    }

    /// Adds (or replaces) a function.
    pub fn register(&mut self, name: &'static str, function: Function) {
        self.functions.insert(name, function);
    }

    /// Whether `name` may be called.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Parses and validates a chain without running it.
    ///
    /// # Errors
    ///
    /// [`FormatError::UnsupportedFunction`] for identifiers outside the
    /// registry, [`FormatError::InvalidExpression`] for anything that is not
    /// a chain of calls with literal arguments.
    pub fn compile(&self, expression: &str) -> Result<FunctionChain, FormatError> {
        let calls = ChainParser::new(expression).parse()?;
        let mut compiled = Vec::with_capacity(calls.len());
        for (name, args) in calls {
            let function = *self
                .functions
                .get(name.as_str())
                .ok_or_else(|| FormatError::UnsupportedFunction { name: name.clone() })?;
            compiled.push(CompiledCall {
                name,
                args,
                function,
            });
        }
        Ok(FunctionChain {
            expression: expression.into(),
            calls: compiled,
        })
    }
}

#[derive(Clone)]
struct CompiledCall {
    name: String,
    args: Vec<Literal>,
    function: Function,
}

/// A validated chain ready to run.
#[derive(Clone)]
pub struct FunctionChain {
    expression: Arc<str>,
    calls: Vec<CompiledCall>,
}

impl fmt::Debug for FunctionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionChain")
            .field("expression", &self.expression)
            .field(
                "calls",
                &self.calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FunctionChain {
    /// Runs every call in order, feeding each result into the next.
    ///
    /// # Errors
    ///
    /// [`FormatError::InvalidExpression`] if a call rejects its input or arguments.
    pub fn apply(&self, value: FnValue) -> Result<FnValue, FormatError> {
        self.calls.iter().try_fold(value, |value, call| {
            (call.function)(value, &call.args).map_err(|reason| {
                FormatError::invalid_expression(&self.expression, format!("{}(): {reason}", call.name))
            })
        })
    }
}

struct ChainParser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> ChainParser<'a> {
    fn new(expression: &'a str) -> Self {
        Self {
            expression,
            chars: expression.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> FormatError {
        FormatError::invalid_expression(self.expression, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FormatError> {
        self.skip_spaces();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}' at offset {}", self.pos)))
        }
    }

    fn parse(mut self) -> Result<Vec<(String, Vec<Literal>)>, FormatError> {
        let mut calls = Vec::new();
        loop {
            calls.push(self.parse_call()?);
            self.skip_spaces();
            match self.peek() {
                None => return Ok(calls),
                Some('.') => self.pos += 1,
                Some(c) => return Err(self.error(format!("unexpected '{c}' after call"))),
            }
        }
    }

    fn parse_call(&mut self) -> Result<(String, Vec<Literal>), FormatError> {
        self.skip_spaces();
        let name = self.parse_ident()?;
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_spaces();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok((name, args));
        }
        loop {
            args.push(self.parse_literal()?);
            self.skip_spaces();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok((name, args));
                }
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, FormatError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let ident: String = self.chars[start..self.pos].iter().collect();
        if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.error(format!("expected a function name at offset {start}")));
        }
        Ok(ident)
    }

    fn parse_literal(&mut self) -> Result<Literal, FormatError> {
        self.skip_spaces();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                self.parse_string(quote).map(Literal::Str)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                raw.parse()
                    .map(Literal::Int)
                    .map_err(|_| self.error(format!("invalid integer '{raw}'")))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.parse_ident()?;
                if ident == "None" {
                    Ok(Literal::None)
                } else {
                    Err(self.error(format!("'{ident}' is not a literal")))
                }
            }
            _ => Err(self.error(format!("expected a literal at offset {}", self.pos))),
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, FormatError> {
        let mut value = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == quote {
                return Ok(value);
            }
            if c != '\\' {
                value.push(c);
                continue;
            }
            match self.peek() {
                Some(escaped @ ('\\' | '\'' | '"')) => value.push(escaped),
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                // Unknown escapes keep their backslash so regex classes like \d survive.
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string literal"))
    }
}

fn expect_arity(name: &str, args: &[Literal], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        return Err(format!(
            "{name}() takes {min}..={max} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [Literal], index: usize, name: &str) -> Result<&'a str, String> {
    match args.get(index) {
        Some(Literal::Str(value)) => Ok(value),
        _ => Err(format!("argument {} of {name}() must be a string", index + 1)),
    }
}

/// Rewrites `\1` / `\g<name>` group references into `${1}` / `${name}`.
fn replacement_template(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    let mut group = String::new();
                    if chars.next_if_eq(&'<').is_some() {
                        for n in chars.by_ref() {
                            if n == '>' {
                                break;
                            }
                            group.push(n);
                        }
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

fn regex_replace(value: FnValue, args: &[Literal]) -> Result<FnValue, String> {
    expect_arity("replace", args, 2, 2)?;
    let text = value.into_text("replace")?;
    let pattern = string_arg(args, 0, "replace")?;
    let repl = string_arg(args, 1, "replace")?;
    let regex = Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
    Ok(FnValue::Text(
        regex
            .replace_all(&text, replacement_template(repl).as_str())
            .into_owned(),
    ))
}

fn split(value: FnValue, args: &[Literal]) -> Result<FnValue, String> {
    expect_arity("split", args, 0, 2)?;
    let text = value.into_text("split")?;
    let max_split = match args.get(1) {
        None | Some(Literal::None) => None,
        Some(Literal::Int(n)) => usize::try_from(*n).ok(),
        Some(Literal::Str(_)) => return Err("maxsplit must be an integer".to_string()),
    };
    let parts: Vec<String> = match args.first() {
        None | Some(Literal::None) => split_whitespace(&text, max_split),
        Some(Literal::Str(sep)) if sep.is_empty() => return Err("empty separator".to_string()),
        Some(Literal::Str(sep)) => match max_split {
            Some(n) => text.splitn(n + 1, sep.as_str()).map(str::to_string).collect(),
            None => text.split(sep.as_str()).map(str::to_string).collect(),
        },
        Some(Literal::Int(_)) => return Err("separator must be a string".to_string()),
    };
    Ok(FnValue::List(parts))
}

fn split_whitespace(text: &str, max_split: Option<usize>) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if max_split.is_some_and(|n| parts.len() == n) {
            parts.push(rest.to_string());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    parts
}

fn get_at_index(value: FnValue, args: &[Literal]) -> Result<FnValue, String> {
    expect_arity("get", args, 1, 1)?;
    let Some(Literal::Int(index)) = args.first() else {
        return Err("index must be an integer".to_string());
    };
    let items: Vec<String> = match value {
        FnValue::List(items) => items,
        FnValue::Text(text) => text.chars().map(String::from).collect(),
    };
    let len = i64::try_from(items.len()).map_err(|e| e.to_string())?;
    let resolved = if *index < 0 { len + index } else { *index };
    usize::try_from(resolved)
        .ok()
        .and_then(|i| items.into_iter().nth(i))
        .map(FnValue::Text)
        .ok_or_else(|| format!("index {index} out of range for length {len}"))
}

fn strip(value: FnValue, args: &[Literal]) -> Result<FnValue, String> {
    expect_arity("strip", args, 0, 1)?;
    let text = value.into_text("strip")?;
    let stripped = match args.first() {
        None | Some(Literal::None) => text.trim().to_string(),
        Some(Literal::Str(chars)) => text
            .trim_matches(|c: char| chars.contains(c))
            .to_string(),
        Some(Literal::Int(_)) => return Err("characters must be a string".to_string()),
    };
    Ok(FnValue::Text(stripped))
}
