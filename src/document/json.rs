//! JSON payloads mapped onto an element tree.
//!
//! Arrays become `<item>` children, object entries become children named
//! after their (sanitized) key, and scalars become element text, so the same
//! path expressions work for JSON APIs and HTML pages alike.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{Document, DocumentBuilder, DocumentError, TreeBuilder};
use crate::util::compile_static_regex;

const ROOT_TAG: &str = "root";
const ITEM_TAG: &str = "item";

static INVALID_TAG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[^a-zA-Z0-9\-_.]"));

/// JSON tree builder. The root element is `<root>`.
#[derive(Debug, Clone, Copy)]
pub struct JsonTree;

impl JsonTree {
    /// Builds a tree from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Never fails for a parsed value; the `Result` keeps the builder contract.
    pub fn from_value(value: &Value) -> Result<Document, DocumentError> {
        let mut builder = DocumentBuilder::new();
        builder.start(ROOT_TAG, Vec::new());
        append_value(&mut builder, value);
        builder.end();
        builder.finish()
    }
}

impl TreeBuilder for JsonTree {
    fn build(content: &[u8]) -> Result<Document, DocumentError> {
        let value: Value =
            serde_json::from_slice(content).map_err(|e| DocumentError::malformed("json", e))?;
        Self::from_value(&value)
    }
}

fn append_value(builder: &mut DocumentBuilder, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                builder.start(ITEM_TAG, Vec::new());
                append_value(builder, item);
                builder.end();
            }
        }
        Value::Object(entries) => {
            for (key, item) in entries {
                builder.start(sanitize_tag(key), Vec::new());
                append_value(builder, item);
                builder.end();
            }
        }
        Value::String(text) => builder.text(text),
        Value::Number(number) => builder.text(&number.to_string()),
        Value::Bool(flag) => builder.text(if *flag { "true" } else { "false" }),
        Value::Null => {}
    }
}

/// Strips characters that are not valid in a tag and prefixes `_` when the
/// result is empty or starts with a digit.
#[must_use]
pub(crate) fn sanitize_tag(key: &str) -> String {
    let tag = INVALID_TAG_CHARS.replace_all(key, "");
    if tag.is_empty() || tag.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{tag}")
    } else {
        tag.into_owned()
    }
}
