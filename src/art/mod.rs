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

//! Folder cover-art detection.
//!
//! Albums ripped to disk usually carry their artwork as an image next to the
//! tracks. Detecting it means listing the directory, so results are cached
//! per directory and only recomputed when the directory's modification time
//! moves.
//!
//! The cache keeps two generations. Lookups consult the current generation,
//! then the previous one, and always write into the current one. When the
//! current generation outgrows its capacity it becomes the previous one and
//! a fresh generation starts, dropping whatever was not touched since the
//! last rotation.

use std::{
    collections::HashMap,
    fs, mem,
    path::{Path, PathBuf},
    time::SystemTime,
};

use tracing::{debug, trace};

use crate::model::MediaRecord;

/// Entries per generation.
pub const DEFAULT_CAPACITY: usize = 50;

/// Candidate file names, in priority order. Matched case-insensitively.
const ART_BASENAMES: [&str; 5] = ["cover", "album", "albumart", ".folder", "folder"];
const ART_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

#[derive(Debug, Clone)]
struct ArtEntry {
    art: Option<PathBuf>,
    mtime: SystemTime,
}

#[derive(Debug, Default)]
struct Generation {
    number: u64,
    entries: HashMap<PathBuf, ArtEntry>,
}

#[derive(Debug)]
pub struct FolderArtCache {
    current: Generation,
    previous: Generation,
    capacity: usize,
    scans: u64,
}

impl Default for FolderArtCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FolderArtCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            current: Generation::default(),
            previous: Generation::default(),
            capacity,
            scans: 0,
        }
    }

    /// Returns the cover-art file in `dir`, if there is one.
    ///
    /// A directory that cannot be stat'ed has no art.
    pub fn get(&mut self, dir: &Path) -> Option<PathBuf> {
        let mtime = match fs::metadata(dir).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                trace!(dir = %dir.display(), "no folder art: {e}");
                return None;
            }
        };

        let cached = self
            .current
            .entries
            .get(dir)
            .or_else(|| self.previous.entries.get(dir))
            .filter(|entry| entry.mtime == mtime)
            .cloned();

        let entry = match cached {
            Some(entry) => entry,
            None => {
                self.scans += 1;
                ArtEntry {
                    art: find_art(dir),
                    mtime,
                }
            }
        };

        let art = entry.art.clone();
        self.insert(dir.to_path_buf(), entry);
        art
    }

    /// Returns the cover-art file next to a record's file.
    pub fn art_for(&mut self, record: &MediaRecord) -> Option<PathBuf> {
        Path::new(record.filename())
            .parent()
            .and_then(|dir| self.get(dir))
    }

    /// Number of the current generation, starting at zero.
    pub fn generation(&self) -> u64 {
        self.current.number
    }

    fn insert(&mut self, dir: PathBuf, entry: ArtEntry) {
        self.current.entries.insert(dir, entry);

        if self.current.entries.len() > self.capacity {
            let next = Generation {
                number: self.current.number + 1,
                entries: HashMap::new(),
            };
            self.previous = mem::replace(&mut self.current, next);
            debug!(generation = self.current.number, "rotated folder art cache");
        }
    }
}

fn find_art(dir: &Path) -> Option<PathBuf> {
    let names: Vec<String> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();

    ART_BASENAMES
        .iter()
        .flat_map(|base| ART_EXTENSIONS.iter().map(move |ext| format!("{base}.{ext}")))
        .find_map(|wanted| names.iter().find(|name| name.eq_ignore_ascii_case(&wanted)))
        .map(|name| dir.join(name))
}
