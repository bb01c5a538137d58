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

//! Database row mapping for domain models.
//!
//! This module provides the conversion logic between raw SQLite result rows
//! and high-level domain models, ensuring type-safe extraction of model
//! attributes from database queries.

use rusqlite::{
    Result, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};

use crate::model::{Album, MediaKind, MediaRecord};

/// The column list matching [`MediaRecord::from_row`], shared by the live
/// and attic tables.
pub(crate) const MEDIA_COLUMNS: &str = "filename, content_type, etag, title, date, artist, album, \
     album_artist, genre, disc_number, track_number, duration, width, height, latitude, \
     longitude, kind";

impl MediaRecord {
    /// Maps an SQLite row selected with [`MEDIA_COLUMNS`] to a record.
    ///
    /// # Errors
    ///
    /// Returns a [`rusqlite::Error`] if:
    /// * The row does not contain enough columns.
    /// * The data in a column cannot be converted to the required Rust type.
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            filename: row.get(0)?,
            content_type: row.get(1)?,
            etag: row.get(2)?,
            title: row.get(3)?,
            date: row.get(4)?,
            author: row.get(5)?,
            album: row.get(6)?,
            album_artist: row.get(7)?,
            genre: row.get(8)?,
            disc_number: row.get(9)?,
            track_number: row.get(10)?,
            duration: row.get(11)?,
            width: row.get(12)?,
            height: row.get(13)?,
            latitude: row.get(14)?,
            longitude: row.get(15)?,
            kind: row.get(16)?,
        })
    }
}

impl Album {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            title: row.get(0)?,
            artist: row.get(1)?,
        })
    }
}

impl MediaKind {
    /// The integer stored in the `kind` column.
    pub(crate) fn code(self) -> i64 {
        match self {
            MediaKind::Unknown => 0,
            MediaKind::Audio => 1,
            MediaKind::Video => 2,
            MediaKind::Image => 3,
        }
    }
}

impl ToSql for MediaKind {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for MediaKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(MediaKind::Unknown),
            1 => Ok(MediaKind::Audio),
            2 => Ok(MediaKind::Video),
            3 => Ok(MediaKind::Image),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}
