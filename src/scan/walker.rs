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

//! Lazy discovery of media files below a root.
//!
//! It utilizes `WalkDir` for directory traversal. Symbolic links are not
//! followed, and directories holding a scan-block marker are pruned along
//! with everything below them.

use std::{path::Path, sync::Arc};

use tracing::{debug, trace, warn};
use walkdir::{DirEntry, FilterEntry, IntoIter, WalkDir};

use super::roots::has_scan_block;
use crate::extract::{DetectedFile, ExtractError, MetadataExtractor};

type EntryFilter = fn(&DirEntry) -> bool;

/// Yields each detectable media file below a root, one at a time.
///
/// Only detection runs here; extraction is left to the caller, which can
/// skip it for files whose change-tag is already indexed.
pub struct DirectoryWalker {
    entries: FilterEntry<IntoIter, EntryFilter>,
    extractor: Arc<dyn MetadataExtractor>,
}

impl DirectoryWalker {
    pub fn new(root: &Path, extractor: Arc<dyn MetadataExtractor>) -> Self {
        let entries = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(is_scannable as EntryFilter);

        Self { entries, extractor }
    }
}

fn is_scannable(entry: &DirEntry) -> bool {
    !(entry.file_type().is_dir() && has_scan_block(entry.path()))
}

impl Iterator for DirectoryWalker {
    type Item = DetectedFile;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match self.extractor.detect(entry.path()) {
                Ok(file) => return Some(file),
                Err(ExtractError::Unsupported { .. } | ExtractError::UnknownType(_)) => {
                    trace!(path = %entry.path().display(), "not media");
                }
                Err(e) => debug!("skipping {}: {e}", entry.path().display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::SCAN_BLOCK_MARKER;
    use crate::testing::CountingExtractor;
    use std::{collections::BTreeSet, fs};
    use tempfile::TempDir;

    #[test]
    fn yields_media_files_recursively() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("one.ogg"), b"x").unwrap();
        fs::write(root.join("a/two.mp3"), b"x").unwrap();
        fs::write(root.join("a/b/three.jpg"), b"x").unwrap();
        fs::write(root.join("a/readme.txt"), b"x").unwrap();

        let extractor = Arc::new(CountingExtractor::default());
        let found: BTreeSet<String> = DirectoryWalker::new(root, extractor.clone())
            .map(|f| f.path)
            .collect();

        let expected: BTreeSet<String> = ["one.ogg", "a/two.mp3", "a/b/three.jpg"]
            .iter()
            .map(|p| root.join(p).to_str().unwrap().to_string())
            .collect();
        assert_eq!(found, expected);
        assert_eq!(extractor.extracted(), 0);
    }

    #[test]
    fn prunes_blocked_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("private/deeper")).unwrap();
        fs::write(root.join("private").join(SCAN_BLOCK_MARKER), b"").unwrap();
        fs::write(root.join("private/hidden.ogg"), b"x").unwrap();
        fs::write(root.join("private/deeper/hidden.ogg"), b"x").unwrap();
        fs::write(root.join("public.ogg"), b"x").unwrap();

        let found: Vec<String> =
            DirectoryWalker::new(root, Arc::new(CountingExtractor::default()))
                .map(|f| f.path)
                .collect();
        assert_eq!(found, vec![root.join("public.ogg").to_str().unwrap().to_string()]);
    }
}
