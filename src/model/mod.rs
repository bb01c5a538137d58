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

//! Domain models and core data structures.
//!
//! This module defines the central entities of the index: the per-file
//! [`MediaRecord`], the derived [`Album`] grouping, and the [`Filter`]
//! descriptor used by listing queries.
//!
//! Records are only ever produced by a [`MediaRecordBuilder`] (or by the
//! minimal fallback constructor used when tag extraction is unsafe), so a
//! record that exists is always complete.

mod builder;

pub use builder::{BuilderError, MediaRecordBuilder};

/// The broad category of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Unknown,
    Audio,
    Video,
    Image,
}

impl MediaKind {
    /// Maps a MIME content type onto a media kind.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type.split('/').next() {
            Some("audio") => MediaKind::Audio,
            Some("video") => MediaKind::Video,
            Some("image") => MediaKind::Image,
            _ => MediaKind::Unknown,
        }
    }
}

/// One indexed file.
///
/// Fields are read through accessors; the only way to change a stored record
/// is to build a new one and upsert it over the old path.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) etag: String,
    pub(crate) title: String,
    pub(crate) date: String,
    pub(crate) author: String,
    pub(crate) album: String,
    pub(crate) album_artist: String,
    pub(crate) genre: String,
    pub(crate) disc_number: i32,
    pub(crate) track_number: i32,
    pub(crate) duration: i32,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) kind: MediaKind,
}

impl MediaRecord {
    /// Creates a record carrying only identity fields.
    ///
    /// Used for files whose tags cannot (or must not) be parsed, so that they
    /// can still be found by name.
    pub(crate) fn minimal(
        filename: String,
        content_type: String,
        etag: String,
        title: String,
        kind: MediaKind,
    ) -> Self {
        Self {
            filename,
            content_type,
            etag,
            title,
            date: String::new(),
            author: String::new(),
            album: String::new(),
            album_artist: String::new(),
            genre: String::new(),
            disc_number: 0,
            track_number: 0,
            duration: 0,
            width: 0,
            height: 0,
            latitude: 0.0,
            longitude: 0.0,
            kind,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The change-tag the record was extracted under.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Free-text date as found in the file's tags.
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn album_artist(&self) -> &str {
        &self.album_artist
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn disc_number(&self) -> i32 {
        self.disc_number
    }

    pub fn track_number(&self) -> i32 {
        self.track_number
    }

    /// Duration in seconds.
    pub fn duration(&self) -> i32 {
        self.duration
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// An album, derived from records sharing album title and album artist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Album {
    pub title: String,
    pub artist: String,
}

impl Album {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// Constraints for the listing queries.
///
/// Unset fields impose no constraint. A negative `limit` means no limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            artist: None,
            album: None,
            album_artist: None,
            genre: None,
            offset: 0,
            limit: -1,
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_album_artist(mut self, album_artist: impl Into<String>) -> Self {
        self.album_artist = Some(album_artist.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
