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

//! Incremental construction of [`MediaRecord`]s.
//!
//! Extraction backends discover fields in whatever order the container
//! presents them. The builder accepts each field at most once, so a backend
//! that accidentally assigns the same field from two different tags fails
//! loudly instead of silently keeping whichever came last.

use thiserror::Error;

use crate::model::{MediaKind, MediaRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("field `{0}` was already set")]
    AlreadySet(&'static str),

    #[error("media kind must be set before building a record")]
    MissingKind,
}

/// Builder for [`MediaRecord`].
///
/// # Examples
///
/// ```
/// use mediaindex::model::{MediaKind, MediaRecordBuilder};
///
/// let mut builder = MediaRecordBuilder::new("/music/a.ogg");
/// builder.title("A")?.author("B")?.kind(MediaKind::Audio)?;
/// let record = builder.build()?;
/// assert_eq!(record.title(), "A");
/// # Ok::<(), mediaindex::model::BuilderError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MediaRecordBuilder {
    filename: String,
    content_type: Option<String>,
    etag: Option<String>,
    title: Option<String>,
    date: Option<String>,
    author: Option<String>,
    album: Option<String>,
    album_artist: Option<String>,
    genre: Option<String>,
    disc_number: Option<i32>,
    track_number: Option<i32>,
    duration: Option<i32>,
    width: Option<i32>,
    height: Option<i32>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    kind: Option<MediaKind>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), BuilderError> {
    if slot.is_some() {
        return Err(BuilderError::AlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

impl MediaRecordBuilder {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.content_type, value.into(), "content_type")?;
        Ok(self)
    }

    pub fn etag(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.etag, value.into(), "etag")?;
        Ok(self)
    }

    pub fn title(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.title, value.into(), "title")?;
        Ok(self)
    }

    pub fn date(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.date, value.into(), "date")?;
        Ok(self)
    }

    pub fn author(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.author, value.into(), "author")?;
        Ok(self)
    }

    pub fn album(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.album, value.into(), "album")?;
        Ok(self)
    }

    pub fn album_artist(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.album_artist, value.into(), "album_artist")?;
        Ok(self)
    }

    pub fn genre(&mut self, value: impl Into<String>) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.genre, value.into(), "genre")?;
        Ok(self)
    }

    pub fn disc_number(&mut self, value: i32) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.disc_number, value, "disc_number")?;
        Ok(self)
    }

    pub fn track_number(&mut self, value: i32) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.track_number, value, "track_number")?;
        Ok(self)
    }

    /// Duration in whole seconds.
    pub fn duration(&mut self, value: i32) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.duration, value, "duration")?;
        Ok(self)
    }

    pub fn width(&mut self, value: i32) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.width, value, "width")?;
        Ok(self)
    }

    pub fn height(&mut self, value: i32) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.height, value, "height")?;
        Ok(self)
    }

    pub fn latitude(&mut self, value: f64) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.latitude, value, "latitude")?;
        Ok(self)
    }

    pub fn longitude(&mut self, value: f64) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.longitude, value, "longitude")?;
        Ok(self)
    }

    pub fn kind(&mut self, value: MediaKind) -> Result<&mut Self, BuilderError> {
        set_once(&mut self.kind, value, "kind")?;
        Ok(self)
    }

    /// Produces the record.
    ///
    /// Unset text fields become empty strings and unset numbers zero; only
    /// the media kind is mandatory.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::MissingKind`] if no kind was set.
    pub fn build(&self) -> Result<MediaRecord, BuilderError> {
        let kind = self.kind.ok_or(BuilderError::MissingKind)?;

        Ok(MediaRecord {
            filename: self.filename.clone(),
            content_type: self.content_type.clone().unwrap_or_default(),
            etag: self.etag.clone().unwrap_or_default(),
            title: self.title.clone().unwrap_or_default(),
            date: self.date.clone().unwrap_or_default(),
            author: self.author.clone().unwrap_or_default(),
            album: self.album.clone().unwrap_or_default(),
            album_artist: self.album_artist.clone().unwrap_or_default(),
            genre: self.genre.clone().unwrap_or_default(),
            disc_number: self.disc_number.unwrap_or_default(),
            track_number: self.track_number.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
            width: self.width.unwrap_or_default(),
            height: self.height.unwrap_or_default(),
            latitude: self.latitude.unwrap_or_default(),
            longitude: self.longitude.unwrap_or_default(),
            kind,
        })
    }
}
