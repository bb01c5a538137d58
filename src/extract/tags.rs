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

//! Tag reading for audio and video containers.
//!
//! It utilizes `Lofty` for audio and MP4 style containers and defers images
//! to the EXIF reader.

use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};

use super::{DetectedFile, ExtractError, MetadataExtractor, detect_file, image};
use crate::model::{MediaKind, MediaRecord, MediaRecordBuilder};

/// The default extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagExtractor;

impl MetadataExtractor for TagExtractor {
    fn detect(&self, path: &Path) -> Result<DetectedFile, ExtractError> {
        detect_file(path)
    }

    fn extract(&self, file: &DetectedFile) -> Result<MediaRecord, ExtractError> {
        match file.kind {
            MediaKind::Audio | MediaKind::Video => read_tags(file),
            MediaKind::Image => image::read_exif(file),
            MediaKind::Unknown => Err(ExtractError::Unsupported {
                path: file.path.clone(),
                content_type: file.content_type.clone(),
            }),
        }
    }
}

fn text(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get(key)
        .and_then(|item| item.value().text())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Reads container tags and stream properties.
///
/// Missing tags are not an error: the title falls back to the file name and
/// the remaining fields stay empty. The album artist falls back to the
/// artist, so albums group under a single name.
///
/// # Errors
///
/// Returns [`ExtractError::Decode`] if the container cannot be parsed.
fn read_tags(file: &DetectedFile) -> Result<MediaRecord, ExtractError> {
    let tagged_file = Probe::open(&file.path)
        .and_then(|p| p.read())
        .map_err(|e| file.decode_error(e))?;

    let mut builder = MediaRecordBuilder::new(file.path.as_str());
    builder
        .content_type(file.content_type.as_str())?
        .etag(file.etag.as_str())?
        .kind(file.kind)?;

    let duration = i32::try_from(tagged_file.properties().duration().as_secs()).unwrap_or(i32::MAX);
    builder.duration(duration)?;

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());

    let title = tag
        .and_then(|t| t.title())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| file.fallback_title());
    builder.title(title)?;

    let Some(tag) = tag else {
        return Ok(builder.build()?);
    };

    let artist = tag.artist().map(|a| a.to_string()).unwrap_or_default();
    let album_artist = text(tag, &ItemKey::AlbumArtist).unwrap_or_else(|| artist.clone());
    builder.author(artist)?.album_artist(album_artist)?;

    if let Some(album) = tag.album() {
        builder.album(album)?;
    }
    if let Some(genre) = tag.genre() {
        builder.genre(genre)?;
    }
    if let Some(date) = text(tag, &ItemKey::RecordingDate).or_else(|| text(tag, &ItemKey::Year)) {
        builder.date(date)?;
    }
    if let Some(track) = tag.track().and_then(|n| i32::try_from(n).ok()) {
        builder.track_number(track)?;
    }
    if let Some(disc) = tag.disk().and_then(|n| i32::try_from(n).ok()) {
        builder.disc_number(disc)?;
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn undecodable_audio_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.flac");
        fs::write(&path, b"definitely not a flac stream").unwrap();

        let detected = TagExtractor.detect(&path).unwrap();
        assert!(matches!(
            TagExtractor.extract(&detected),
            Err(ExtractError::Decode { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let file = DetectedFile {
            path: "/x.bin".into(),
            etag: String::new(),
            content_type: "application/octet-stream".into(),
            kind: MediaKind::Unknown,
        };
        assert!(matches!(
            TagExtractor.extract(&file),
            Err(ExtractError::Unsupported { .. })
        ));
    }
}
