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

//! One-to-one mapping between watch handles and directory paths.

use std::{
    collections::HashMap,
    hash::Hash,
    path::{Path, PathBuf},
};

/// A bijection between watch handles and the directories they watch.
///
/// Inserting a pair first drops any existing pair that shares either side,
/// so each handle names one path and each path is watched once.
#[derive(Debug)]
pub struct WatchMap<H> {
    by_handle: HashMap<H, PathBuf>,
    by_path: HashMap<PathBuf, H>,
}

impl<H> Default for WatchMap<H> {
    fn default() -> Self {
        Self {
            by_handle: HashMap::new(),
            by_path: HashMap::new(),
        }
    }
}

impl<H: Eq + Hash + Clone> WatchMap<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: H, path: PathBuf) {
        self.remove_handle(&handle);
        self.remove_path(&path);
        self.by_path.insert(path.clone(), handle.clone());
        self.by_handle.insert(handle, path);
    }

    /// Drops the pair for `handle`, returning its path.
    pub fn remove_handle(&mut self, handle: &H) -> Option<PathBuf> {
        let path = self.by_handle.remove(handle)?;
        self.by_path.remove(&path);
        Some(path)
    }

    /// Drops the pair for `path`, returning its handle.
    pub fn remove_path(&mut self, path: &Path) -> Option<H> {
        let handle = self.by_path.remove(path)?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub fn path(&self, handle: &H) -> Option<&Path> {
        self.by_handle.get(handle).map(PathBuf::as_path)
    }

    pub fn handle(&self, path: &Path) -> Option<&H> {
        self.by_path.get(path)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    /// Watched paths equal to `dir` or below it.
    pub fn paths_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.by_path
            .keys()
            .filter(|path| path.starts_with(dir))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
