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

//! Metadata extraction.
//!
//! Extraction is a two step affair. [`MetadataExtractor::detect`] is cheap: it
//! stats the file, derives its change-tag and guesses the content type from
//! the file name. [`MetadataExtractor::extract`] is expensive and may fail on
//! malformed files, so callers only invoke it when the change-tag differs
//! from the indexed one.

mod image;
mod tags;

use std::{
    fs::{self, Metadata},
    io,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

use thiserror::Error;
use xxhash_rust::xxh3::Xxh3;

use crate::model::{BuilderError, MediaKind, MediaRecord};

pub use tags::TagExtractor;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),

    #[error("could not determine the content type of '{0}'")]
    UnknownType(String),

    #[error("'{path}' has unsupported content type '{content_type}'")]
    Unsupported { path: String, content_type: String },

    #[error("failed to decode '{path}': {reason}")]
    Decode { path: String, reason: String },

    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// A file that looks like indexable media, before its tags are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFile {
    pub path: String,
    pub etag: String,
    pub content_type: String,
    pub kind: MediaKind,
}

impl DetectedFile {
    /// The file name without directory or extension.
    pub fn fallback_title(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn decode_error(&self, reason: impl ToString) -> ExtractError {
        ExtractError::Decode {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// The detect/extract service used by the scanner and the live indexer.
pub trait MetadataExtractor: Send + Sync {
    /// Identifies the file and computes its change-tag.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be stat'ed, or its content type is unknown
    /// or not audio, video or image.
    fn detect(&self, path: &Path) -> Result<DetectedFile, ExtractError>;

    /// Reads the file's tags into a full record.
    fn extract(&self, file: &DetectedFile) -> Result<MediaRecord, ExtractError>;

    /// A record carrying only what detection knows, titled after the file.
    ///
    /// Used when [`MetadataExtractor::extract`] failed or is known to crash
    /// on this file.
    fn fallback_extract(&self, file: &DetectedFile) -> MediaRecord {
        MediaRecord::minimal(
            file.path.clone(),
            file.content_type.clone(),
            file.etag.clone(),
            file.fallback_title(),
            file.kind,
        )
    }
}

/// Detects a media file from its name and filesystem metadata.
///
/// # Errors
///
/// See [`MetadataExtractor::detect`].
pub fn detect_file(path: &Path) -> Result<DetectedFile, ExtractError> {
    let filename = path
        .to_str()
        .ok_or_else(|| ExtractError::NonUtf8Path(path.to_path_buf()))?;

    let meta = fs::metadata(path).map_err(|source| ExtractError::Io {
        path: filename.to_string(),
        source,
    })?;

    let content_type = if meta.is_dir() {
        "inode/directory".to_string()
    } else {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .ok_or_else(|| ExtractError::UnknownType(filename.to_string()))?
    };

    let kind = MediaKind::from_content_type(&content_type);
    if kind == MediaKind::Unknown {
        return Err(ExtractError::Unsupported {
            path: filename.to_string(),
            content_type,
        });
    }

    Ok(DetectedFile {
        path: filename.to_string(),
        etag: change_tag(&meta),
        content_type,
        kind,
    })
}

/// Derives the change-tag from inode, status-change time and size.
///
/// Any write to the file moves its ctime, so the tag changes whenever the
/// content may have changed, without reading the content.
pub fn change_tag(meta: &Metadata) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(&meta.ino().to_le_bytes());
    hasher.update(&meta.ctime().to_le_bytes());
    hasher.update(&meta.ctime_nsec().to_le_bytes());
    hasher.update(&meta.size().to_le_bytes());

    format!("{:016x}", hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detects_kind_from_extension() {
        let dir = TempDir::new().unwrap();
        let song = dir.path().join("song.mp3");
        let photo = dir.path().join("photo.jpg");
        fs::write(&song, b"not really audio").unwrap();
        fs::write(&photo, b"not really a photo").unwrap();

        let detected = detect_file(&song).unwrap();
        assert_eq!(detected.kind, MediaKind::Audio);
        assert_eq!(detected.content_type, "audio/mpeg");
        assert_eq!(detected.path, song.to_str().unwrap());
        assert_eq!(detected.etag.len(), 16);

        assert_eq!(detect_file(&photo).unwrap().kind, MediaKind::Image);
    }

    #[test]
    fn rejects_non_media() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.txt");
        fs::write(&text, b"hello").unwrap();

        assert!(matches!(
            detect_file(&text),
            Err(ExtractError::Unsupported { content_type, .. }) if content_type == "text/plain"
        ));
        assert!(matches!(
            detect_file(dir.path()),
            Err(ExtractError::Unsupported { .. })
        ));
        assert!(matches!(
            detect_file(&dir.path().join("gone.ogg")),
            Err(ExtractError::Io { .. })
        ));
    }

    #[test]
    fn change_tag_follows_modification() {
        let dir = TempDir::new().unwrap();
        let song = dir.path().join("song.ogg");
        fs::write(&song, b"one").unwrap();

        let first = detect_file(&song).unwrap().etag;
        assert_eq!(detect_file(&song).unwrap().etag, first);

        fs::write(&song, b"one more").unwrap();
        assert_ne!(detect_file(&song).unwrap().etag, first);
    }

    #[test]
    fn fallback_title_is_file_stem() {
        let file = DetectedFile {
            path: "/music/Some Song.flac".into(),
            etag: "1".into(),
            content_type: "audio/flac".into(),
            kind: MediaKind::Audio,
        };
        assert_eq!(file.fallback_title(), "Some Song");

        let record = TagExtractor.fallback_extract(&file);
        assert_eq!(record.title(), "Some Song");
        assert_eq!(record.etag(), "1");
        assert_eq!(record.kind(), MediaKind::Audio);
        assert_eq!(record.album(), "");
    }
}
