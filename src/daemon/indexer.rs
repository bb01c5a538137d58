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

//! Turning detected files into stored records.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    db::Store,
    extract::{DetectedFile, ExtractError, MetadataExtractor},
    model::MediaRecord,
};

/// What to do with a file whose tags cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExtractError {
    /// Leave it out of the index (bulk scans).
    Skip,
    /// Index it under its file name (live additions).
    Fallback,
}

/// Applies file events to the store.
pub struct Indexer {
    store: Arc<Store>,
    extractor: Arc<dyn MetadataExtractor>,
}

impl Indexer {
    pub fn new(store: Arc<Store>, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self { store, extractor }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn extractor(&self) -> Arc<dyn MetadataExtractor> {
        Arc::clone(&self.extractor)
    }

    /// Handles a file that appeared or changed on disk.
    ///
    /// # Returns
    ///
    /// Whether the store changed. Files that are not media, or whose
    /// change-tag is already indexed, leave it untouched.
    pub fn file_added(&self, path: &Path) -> Result<bool> {
        let file = match self.extractor.detect(path) {
            Ok(file) => file,
            Err(ExtractError::Unsupported { .. } | ExtractError::UnknownType(_)) => {
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        self.index(&file, OnExtractError::Fallback)
    }

    /// Extracts and stores `file` unless its change-tag is already indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written. Extraction
    /// failures are handled according to `on_error`.
    pub fn index(&self, file: &DetectedFile, on_error: OnExtractError) -> Result<bool> {
        if self.store.change_tag(&file.path)? == file.etag {
            return Ok(false);
        }

        let record = match self.guarded_extract(file)? {
            Ok(record) => record,
            Err(e) if on_error == OnExtractError::Skip => {
                warn!("not indexing {}: {e}", file.path);
                return Ok(false);
            }
            Err(e) => {
                warn!("indexing {} by name only: {e}", file.path);
                self.extractor.fallback_extract(file)
            }
        };

        self.store
            .upsert(&record)
            .with_context(|| format!("failed to store {}", file.path))?;
        debug!(path = %file.path, "indexed");

        Ok(true)
    }

    /// Runs extraction bracketed by a broken-file marker.
    ///
    /// If the process dies inside the extractor the marker survives, and the
    /// next attempt on the same change-tag uses the fallback record instead
    /// of crashing again.
    fn guarded_extract(&self, file: &DetectedFile) -> Result<Result<MediaRecord, ExtractError>> {
        if self.store.is_broken_file(&file.path, &file.etag)? {
            info!(path = %file.path, "extraction crashed before, using fallback");
            return Ok(Ok(self.extractor.fallback_extract(file)));
        }

        self.store.insert_broken_file(&file.path, &file.etag)?;
        let result = self.extractor.extract(file);
        self.store.remove_broken_file(&file.path)?;

        Ok(result)
    }

    pub fn file_deleted(&self, path: &Path) -> Result<bool> {
        let Some(path) = path.to_str() else {
            return Ok(false);
        };
        Ok(self.store.remove(path)?)
    }

    /// Drops every record below a directory that left the tree.
    pub fn dir_removed(&self, path: &Path) -> Result<usize> {
        let Some(path) = path.to_str() else {
            return Ok(0);
        };
        Ok(self.store.remove_under(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OpenMode;
    use crate::extract::detect_file;
    use crate::testing::CountingExtractor;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<CountingExtractor>, Indexer) {
        let dir = TempDir::new().unwrap();
        let store =
            Store::open(&dir.path().join("mediastore.db"), OpenMode::ReadWrite, None).unwrap();
        let extractor = Arc::new(CountingExtractor::default());
        let indexer = Indexer::new(Arc::new(store), extractor.clone());
        (dir, extractor, indexer)
    }

    #[test]
    fn unchanged_file_is_extracted_once() {
        let (dir, extractor, indexer) = setup();
        let song = dir.path().join("song.ogg");
        fs::write(&song, b"x").unwrap();

        assert!(indexer.file_added(&song).unwrap());
        assert!(!indexer.file_added(&song).unwrap());
        assert_eq!(extractor.extracted(), 1);
        assert_eq!(indexer.store().size().unwrap(), 1);

        fs::write(&song, b"changed").unwrap();
        assert!(indexer.file_added(&song).unwrap());
        assert_eq!(extractor.extracted(), 2);
    }

    #[test]
    fn non_media_is_ignored() {
        let (dir, extractor, indexer) = setup();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, b"x").unwrap();

        assert!(!indexer.file_added(&notes).unwrap());
        assert_eq!(extractor.extracted(), 0);
        assert_eq!(indexer.store().size().unwrap(), 0);
    }

    #[test]
    fn failed_extraction_falls_back_only_for_live_adds() {
        let (dir, extractor, indexer) = setup();
        extractor.set_failing(true);
        let song = dir.path().join("Broken Song.ogg");
        fs::write(&song, b"x").unwrap();
        let file = detect_file(&song).unwrap();

        assert!(!indexer.index(&file, OnExtractError::Skip).unwrap());
        assert_eq!(indexer.store().size().unwrap(), 0);

        assert!(indexer.file_added(&song).unwrap());
        let record = indexer.store().lookup(&file.path).unwrap();
        assert_eq!(record.title(), "Broken Song");
        assert!(!indexer.store().is_broken_file(&file.path, &file.etag).unwrap());
    }

    #[test]
    fn file_marked_broken_is_not_extracted_again() {
        let (dir, extractor, indexer) = setup();
        let song = dir.path().join("crasher.ogg");
        fs::write(&song, b"x").unwrap();
        let file = detect_file(&song).unwrap();

        // Left behind by a crash inside the extractor.
        indexer
            .store()
            .insert_broken_file(&file.path, &file.etag)
            .unwrap();

        assert!(indexer.index(&file, OnExtractError::Skip).unwrap());
        assert_eq!(extractor.extracted(), 0);
        assert_eq!(indexer.store().lookup(&file.path).unwrap().title(), "crasher");
    }

    #[test]
    fn scan_batch_stays_open_across_extractions() {
        let (dir, extractor, indexer) = setup();
        let reader =
            Store::open(&dir.path().join("mediastore.db"), OpenMode::ReadOnly, None).unwrap();

        indexer.store().begin_batch().unwrap();
        for name in ["one.ogg", "two.ogg", "three.ogg"] {
            let path = dir.path().join(name);
            fs::write(&path, b"x").unwrap();
            let file = detect_file(&path).unwrap();
            assert!(indexer.index(&file, OnExtractError::Skip).unwrap());
        }
        assert_eq!(extractor.extracted(), 3);
        assert_eq!(reader.size().unwrap(), 0);

        indexer.store().commit_batch().unwrap();
        assert_eq!(reader.size().unwrap(), 3);
    }

    #[test]
    fn deletions_reach_the_store() {
        let (dir, _extractor, indexer) = setup();
        let album = dir.path().join("album");
        fs::create_dir(&album).unwrap();
        let one = album.join("one.ogg");
        let two = album.join("two.ogg");
        fs::write(&one, b"1").unwrap();
        fs::write(&two, b"2").unwrap();
        indexer.file_added(&one).unwrap();
        indexer.file_added(&two).unwrap();

        assert!(indexer.file_deleted(&one).unwrap());
        assert!(!indexer.file_deleted(&one).unwrap());
        assert_eq!(indexer.dir_removed(&album).unwrap(), 1);
        assert_eq!(indexer.store().size().unwrap(), 0);
    }
}
