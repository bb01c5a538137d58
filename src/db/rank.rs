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

//! Relevance ranking for full-text matches.
//!
//! The `rank` SQL function consumes the FTS4 `matchinfo(media_fts, 'pcx')`
//! blob followed by one weight per indexed column. For every query phrase and
//! every column it adds `row hits / hits across all rows * column weight`,
//! so a term that is rare in a column counts for more than a common one.

use rusqlite::{
    Connection,
    functions::{Context, FunctionFlags},
};
use thiserror::Error;

/// Name under which the ranking function is registered.
pub(crate) const RANK_FUNCTION: &str = "rank";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum MatchInfoError {
    #[error("matchinfo blob length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("matchinfo blob is missing its phrase/column header")]
    MissingHeader,

    #[error("matchinfo blob declares {expected} hit entries but holds {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Decoded `pcx` matchinfo: phrase count, column count, then three words
/// per (phrase, column) pair.
#[derive(Debug, PartialEq)]
pub(crate) struct MatchInfo {
    phrases: usize,
    columns: usize,
    hits: Vec<u32>,
}

impl MatchInfo {
    pub(crate) fn decode(blob: &[u8]) -> Result<Self, MatchInfoError> {
        if blob.len() % 4 != 0 {
            return Err(MatchInfoError::Misaligned(blob.len()));
        }

        let words: Vec<u32> = blob
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let (header, hits) = match words.as_slice() {
            [phrases, columns, rest @ ..] => ((*phrases as usize, *columns as usize), rest),
            _ => return Err(MatchInfoError::MissingHeader),
        };

        let (phrases, columns) = header;
        let expected = phrases * columns * 3;
        if hits.len() < expected {
            return Err(MatchInfoError::Truncated {
                expected,
                actual: hits.len(),
            });
        }

        Ok(Self {
            phrases,
            columns,
            hits: hits[..expected].to_vec(),
        })
    }

    /// Returns `(hits in this row, hits in all rows)` for a phrase and column.
    fn hits(&self, phrase: usize, column: usize) -> (u32, u32) {
        let base = 3 * (phrase * self.columns + column);
        (self.hits[base], self.hits[base + 1])
    }

    /// Weighted relevance of the row this matchinfo describes.
    ///
    /// Columns without a weight contribute nothing.
    pub(crate) fn score(&self, weights: &[f64]) -> f64 {
        let mut score = 0.0;
        for phrase in 0..self.phrases {
            for (column, weight) in weights.iter().enumerate().take(self.columns) {
                let (row_hits, global_hits) = self.hits(phrase, column);
                if row_hits > 0 && global_hits > 0 {
                    score += f64::from(row_hits) / f64::from(global_hits) * weight;
                }
            }
        }
        score
    }
}

fn rank(ctx: &Context<'_>) -> rusqlite::Result<f64> {
    let blob = ctx
        .get_raw(0)
        .as_blob()
        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
    let info =
        MatchInfo::decode(blob).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;

    let weights = (1..ctx.len())
        .map(|i| ctx.get::<f64>(i))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(info.score(&weights))
}

/// Registers the ranking function on a freshly opened connection.
pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        RANK_FUNCTION,
        -1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        rank,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[test]
    fn decodes_header_and_hits() {
        // one phrase, two columns
        let info = MatchInfo::decode(&blob(&[1, 2, 1, 4, 2, 0, 3, 1])).unwrap();
        assert_eq!(info.hits(0, 0), (1, 4));
        assert_eq!(info.hits(0, 1), (0, 3));
    }

    #[test]
    fn rejects_malformed_blobs() {
        assert_eq!(
            MatchInfo::decode(&[0, 0, 0]).unwrap_err(),
            MatchInfoError::Misaligned(3)
        );
        assert_eq!(
            MatchInfo::decode(&blob(&[1])).unwrap_err(),
            MatchInfoError::MissingHeader
        );
        assert_eq!(
            MatchInfo::decode(&blob(&[2, 2, 1, 1, 1])).unwrap_err(),
            MatchInfoError::Truncated {
                expected: 12,
                actual: 3
            }
        );
    }

    #[test]
    fn score_weights_rare_hits_per_column() {
        // one phrase over title, artist, album
        let info = MatchInfo::decode(&blob(&[1, 3, 1, 2, 2, 0, 2, 2, 1, 2, 2])).unwrap();
        let score = info.score(&[1.0, 0.5, 0.75]);
        assert!((score - (0.5 + 0.375)).abs() < 1e-9);
    }

    #[test]
    fn registered_function_is_callable() {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();

        let score: f64 = conn
            .query_row(
                "SELECT rank(?1, 1.0, 0.5)",
                [blob(&[1, 2, 1, 1, 1, 1, 2, 1])],
                |row| row.get(0),
            )
            .unwrap();
        assert!((score - 1.25).abs() < 1e-9);
    }
}
