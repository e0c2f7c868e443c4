//! Extracted records and mutate rules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::format::{Fields, TemplateValue};

/// One extracted result: field name to value, in declaration order.
///
/// `None` means the addressed element exists but carried no text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, Option<String>>);

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field`, `None` when absent or null.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Option::as_deref)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Sets a field, keeping its original position when it already exists.
    pub fn insert(&mut self, field: impl Into<String>, value: Option<String>) {
        self.0.insert(field.into(), value);
    }

    /// Copies every field of `other` into this record.
    pub fn merge(&mut self, other: Record) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The record as template fields (null stays null).
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::from(v.clone())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Ordered `field = template` rules applied after raw extraction.
///
/// Descriptors write them as one map or a list of maps; either way the
/// declaration order is the application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MutateSpec")]
pub struct Mutations(Vec<(String, String)>);

#[derive(Deserialize)]
#[serde(untagged)]
enum MutateSpec {
    One(IndexMap<String, String>),
    Many(Vec<IndexMap<String, String>>),
}

impl From<MutateSpec> for Mutations {
    fn from(spec: MutateSpec) -> Self {
        match spec {
            MutateSpec::One(rules) => Self(rules.into_iter().collect()),
            MutateSpec::Many(groups) => Self(groups.into_iter().flatten().collect()),
        }
    }
}

impl Mutations {
    #[must_use]
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self(rules)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_insert_keeps_position() {
        let mut record: Record = [("title", Some("A".to_string())), ("magnet", None)]
            .into_iter()
            .collect();
        record.insert("title", Some("B".to_string()));
        let keys: Vec<_> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "magnet"]);
        assert_eq!(record.get("title"), Some("B"));
        assert_eq!(record.get("magnet"), None);
        assert!(record.contains("magnet"));
    }

    #[test]
    fn test_record_serializes_as_map() {
        let record: Record = [("title", Some("A".to_string())), ("size", None)]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"title":"A","size":null}"#
        );
    }

    #[test]
    fn test_mutations_accept_map_or_list() {
        let one: Mutations = serde_json::from_str(r#"{"a": "{x}", "b": "{a}"}"#).unwrap();
        let many: Mutations =
            serde_json::from_str(r#"[{"a": "{x}"}, {"b": "{a}", "c": "1"}]"#).unwrap();
        assert_eq!(one.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(many.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
