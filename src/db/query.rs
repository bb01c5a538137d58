// Copyright (C) 2026  Caprica Software Limited
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Query composition helpers.
//!
//! Listing queries are a fixed base statement plus one equality predicate per
//! filter field that is set. Predicates and their values are collected side by
//! side and always bound as parameters.

use rusqlite::types::Value;

use crate::model::{Filter, MediaKind};

/// Turns free text into an FTS4 prefix query.
///
/// Every run of alphanumeric characters becomes one prefix token; everything
/// else is dropped, which leaves no way to smuggle FTS operators or quotes
/// into the match expression. Returns `None` if nothing searchable remains.
pub(crate) fn fts_query(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("{}*", word.to_lowercase()))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// A `SELECT` under construction.
pub(crate) struct SelectBuilder {
    base: String,
    filters: Vec<&'static str>,
    params: Vec<Value>,
    tail: String,
}

impl SelectBuilder {
    /// Starts from a statement with no `WHERE` clause.
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            filters: Vec::new(),
            params: Vec::new(),
            tail: String::new(),
        }
    }

    pub(crate) fn kind(mut self, kind: MediaKind) -> Self {
        self.filters.push("kind = ?");
        self.params.push(Value::Integer(kind.code()));
        self
    }

    /// Adds a fixed predicate that binds nothing.
    pub(crate) fn predicate(mut self, predicate: &'static str) -> Self {
        self.filters.push(predicate);
        self
    }

    pub(crate) fn equals(mut self, predicate: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.filters.push(predicate);
            self.params.push(Value::Text(value.to_string()));
        }
        self
    }

    /// Applies the text constraints of a [`Filter`].
    pub(crate) fn filter(self, filter: &Filter) -> Self {
        self.equals("artist = ?", filter.artist.as_deref())
            .equals("album = ?", filter.album.as_deref())
            .equals("album_artist = ?", filter.album_artist.as_deref())
            .equals("genre = ?", filter.genre.as_deref())
    }

    /// Appends `GROUP BY`/`ORDER BY` text after the `WHERE` clause.
    pub(crate) fn then(mut self, tail: &str) -> Self {
        self.tail.push(' ');
        self.tail.push_str(tail);
        self
    }

    pub(crate) fn page(mut self, limit: i64, offset: i64) -> Self {
        self.tail.push_str(" LIMIT ? OFFSET ?");
        self.params.push(Value::Integer(limit));
        self.params.push(Value::Integer(offset));
        self
    }

    pub(crate) fn build(self) -> (String, Vec<Value>) {
        let mut sql = self.base;
        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }
        sql.push_str(&self.tail);
        (sql, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_makes_prefix_tokens() {
        assert_eq!(fts_query("x").as_deref(), Some("x*"));
        assert_eq!(fts_query("  Hello World ").as_deref(), Some("hello* world*"));
        assert_eq!(fts_query("it's").as_deref(), Some("it* s*"));
    }

    #[test]
    fn fts_query_drops_operators() {
        assert_eq!(fts_query("\"a\" OR -b*").as_deref(), Some("a* or* b*"));
        assert_eq!(fts_query("*** --"), None);
        assert_eq!(fts_query(""), None);
    }

    #[test]
    fn only_set_filter_fields_become_predicates() {
        let filter = Filter::new().with_artist("A").with_genre("G");
        let (sql, params) = SelectBuilder::new("SELECT filename FROM media")
            .kind(MediaKind::Audio)
            .filter(&filter)
            .then("ORDER BY filename")
            .page(10, 5)
            .build();

        assert_eq!(
            sql,
            "SELECT filename FROM media WHERE kind = ? AND artist = ? AND genre = ? \
             ORDER BY filename LIMIT ? OFFSET ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Integer(1),
                Value::Text("A".into()),
                Value::Text("G".into()),
                Value::Integer(10),
                Value::Integer(5),
            ]
        );
    }

    #[test]
    fn no_filters_means_no_where_clause() {
        let (sql, params) = SelectBuilder::new("SELECT COUNT(*) FROM media").build();
        assert_eq!(sql, "SELECT COUNT(*) FROM media");
        assert!(params.is_empty());
    }
}
