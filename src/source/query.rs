//! Typed search queries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::{Fields, TemplateValue, Title};

/// What kind of search is being run; selects the source keyword template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Free text, used as-is.
    Query,
    Movie,
    Show,
    Season,
    Episode,
}

impl QueryKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Movie => "movie",
            Self::Show => "show",
            Self::Season => "season",
            Self::Episode => "episode",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query plus the fields its keyword template may reference.
///
/// | Kind            | Fields                                      |
/// |-----------------|---------------------------------------------|
/// | `movie`, `show` | `tmdb_id`, `title`, `year`                  |
/// | `season`        | `tmdb_id`, `title`, `season`                |
/// | `episode`       | `tmdb_id`, `title`, `season`, `episode`     |
///
/// Missing optional values (`tmdb_id`, `year`) render as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    kind: QueryKind,
    text: Option<String>,
    fields: Fields,
}

impl SearchQuery {
    /// Free-text query.
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Query,
            text: Some(query.into()),
            fields: Fields::new(),
        }
    }

    #[must_use]
    pub fn movie(tmdb_id: Option<String>, title: Title, year: Option<i64>) -> Self {
        Self::media(QueryKind::Movie, tmdb_id, title, year)
    }

    #[must_use]
    pub fn show(tmdb_id: Option<String>, title: Title, year: Option<i64>) -> Self {
        Self::media(QueryKind::Show, tmdb_id, title, year)
    }

    #[must_use]
    pub fn season(tmdb_id: Option<String>, title: Title, season: i64) -> Self {
        let mut fields = base_fields(tmdb_id, title);
        fields.insert("season".to_string(), TemplateValue::Integer(season));
        Self {
            kind: QueryKind::Season,
            text: None,
            fields,
        }
    }

    #[must_use]
    pub fn episode(tmdb_id: Option<String>, title: Title, season: i64, episode: i64) -> Self {
        let mut fields = base_fields(tmdb_id, title);
        fields.insert("season".to_string(), TemplateValue::Integer(season));
        fields.insert("episode".to_string(), TemplateValue::Integer(episode));
        Self {
            kind: QueryKind::Episode,
            text: None,
            fields,
        }
    }

    fn media(kind: QueryKind, tmdb_id: Option<String>, title: Title, year: Option<i64>) -> Self {
        let mut fields = base_fields(tmdb_id, title);
        fields.insert(
            "year".to_string(),
            year.map_or(TemplateValue::Null, TemplateValue::Integer),
        );
        Self {
            kind,
            text: None,
            fields,
        }
    }

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Free text for [`QueryKind::Query`].
    #[must_use]
    pub fn raw_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

fn base_fields(tmdb_id: Option<String>, title: Title) -> Fields {
    let mut fields = Fields::new();
    fields.insert("tmdb_id".to_string(), TemplateValue::from(tmdb_id));
    fields.insert("title".to_string(), TemplateValue::Title(title));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_sets_per_kind() {
        let movie = SearchQuery::movie(None, Title::new("Heat"), Some(1995));
        let keys: Vec<_> = movie.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tmdb_id", "title", "year"]);
        assert_eq!(movie.fields()["tmdb_id"], TemplateValue::Null);

        let episode = SearchQuery::episode(Some("1399".into()), Title::new("GoT"), 1, 2);
        let keys: Vec<_> = episode.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tmdb_id", "title", "season", "episode"]);
        assert_eq!(episode.kind(), QueryKind::Episode);
    }

    #[test]
    fn test_text_query_has_no_fields() {
        let query = SearchQuery::text("ubuntu iso");
        assert_eq!(query.kind(), QueryKind::Query);
        assert_eq!(query.raw_text(), Some("ubuntu iso"));
        assert!(query.fields().is_empty());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(QueryKind::Season.to_string(), "season");
    }
}
