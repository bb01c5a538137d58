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

//! Live filesystem change tracking.
//!
//! A [`ChangeWatcher`] watches one directory tree through inotify and turns
//! raw kernel notifications into [`WatchHandler`] callbacks:
//!
//! * A new directory (created, moved in or closed after write) is watched
//!   immediately, and any files already inside it are reported as added.
//! * A regular file is reported as added once it is closed after writing or
//!   moved in. Bare creation is ignored since the file may still be
//!   mid-write.
//! * Deleting or moving out a watched directory drops the watches for its
//!   whole subtree. Deleting or moving out anything else is a file deletion.
//! * A watch the kernel ends (removal, unmount) is forgotten.
//! * A queue overflow is passed on, since events were lost.
//!
//! Watching a directory that vanishes or is unreadable in the meantime is
//! not an error; the directory is skipped.

mod event;
mod map;

use std::{
    fs, io,
    os::fd::{AsFd, BorrowedFd},
    path::{Path, PathBuf},
    time::Duration,
};

use inotify::{Inotify, WatchDescriptor};
use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::scan::has_scan_block;

pub use event::{EventKind, WatchEvent};
pub use map::WatchMap;

const EVENT_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watched paths must be absolute: {0}")]
    RelativePath(PathBuf),

    #[error("failed to initialise inotify: {0}")]
    Init(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Receives the semantic events of a [`ChangeWatcher`].
pub trait WatchHandler {
    fn file_added(&mut self, path: &Path);

    fn file_deleted(&mut self, path: &Path);

    fn dir_added(&mut self, _path: &Path) {}

    /// A directory left the tree. No per-file events follow for its content.
    fn dir_removed(&mut self, _path: &Path) {}

    /// Events below `root` were lost.
    fn overflowed(&mut self, _root: &Path) {}
}

/// Watches one directory tree.
#[derive(Debug)]
pub struct ChangeWatcher {
    inotify: Inotify,
    root: PathBuf,
    watches: WatchMap<WatchDescriptor>,
    buffer: Vec<u8>,
}

impl ChangeWatcher {
    /// Creates a watcher for the tree at `root`. Nothing is watched until
    /// [`ChangeWatcher::add_dir`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is relative or inotify cannot be
    /// initialised.
    pub fn new(root: &Path) -> Result<Self, WatchError> {
        if !root.is_absolute() {
            return Err(WatchError::RelativePath(root.to_path_buf()));
        }

        Ok(Self {
            inotify: Inotify::init().map_err(WatchError::Init)?,
            root: root.to_path_buf(),
            watches: WatchMap::new(),
            buffer: vec![0; EVENT_BUFFER_SIZE],
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Watches `dir` and every directory below it.
    ///
    /// Already watched directories are left alone, as are directories
    /// holding a scan-block marker.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RelativePath`] for a relative `dir`.
    pub fn add_dir(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.add_tree(dir, None)
    }

    fn add_tree(
        &mut self,
        dir: &Path,
        mut report: Option<&mut dyn WatchHandler>,
    ) -> Result<(), WatchError> {
        if !dir.is_absolute() {
            return Err(WatchError::RelativePath(dir.to_path_buf()));
        }

        let mut pending = vec![dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            if self.watches.contains_path(&dir) || has_scan_block(&dir) {
                continue;
            }

            match self.inotify.watches().add(&dir, event::watch_mask()) {
                Ok(wd) => {
                    trace!(dir = %dir.display(), "watching");
                    self.watches.insert(wd, dir.clone());
                }
                Err(e) => {
                    debug!("not watching {}: {e}", dir.display());
                    continue;
                }
            }

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("cannot list {}: {e}", dir.display());
                    continue;
                }
            };

            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    if let Some(handler) = report.as_deref_mut() {
                        handler.file_added(&entry.path());
                    }
                }
            }
        }

        Ok(())
    }

    /// Stops watching `dir` and everything below it.
    pub fn remove_dir(&mut self, dir: &Path) {
        for path in self.watches.paths_under(dir) {
            if let Some(wd) = self.watches.remove_path(&path) {
                // The kernel may already have dropped it.
                if let Err(e) = self.inotify.watches().remove(wd) {
                    trace!("removing watch for {}: {e}", path.display());
                }
            }
        }
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watches.contains_path(dir)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Dispatches every pending event without blocking.
    ///
    /// # Returns
    ///
    /// The number of events read.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from inotify fails for a reason other than
    /// there being nothing to read.
    pub fn process_events(&mut self, handler: &mut dyn WatchHandler) -> Result<usize, WatchError> {
        let mut count = 0;

        loop {
            let events = match self.read_pending() {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            };
            if events.is_empty() {
                break;
            }

            count += events.len();
            for event in events {
                self.dispatch(event, handler);
            }
        }

        Ok(count)
    }

    fn read_pending(&mut self) -> io::Result<Vec<WatchEvent>> {
        let watches = &self.watches;
        let events = self.inotify.read_events(&mut self.buffer)?;

        Ok(events
            .map(|raw| WatchEvent::decode(raw, watches))
            .collect())
    }

    fn dispatch(&mut self, event: WatchEvent, handler: &mut dyn WatchHandler) {
        match event.kind {
            EventKind::Overflow => {
                warn!(root = %self.root.display(), "inotify queue overflowed");
                handler.overflowed(&self.root);
                return;
            }
            EventKind::WatchEnded => {
                if let Some(path) = self.watches.remove_handle(&event.wd) {
                    debug!(dir = %path.display(), "watch ended");
                }
                return;
            }
            EventKind::Other => return,
            _ => {}
        }

        let Some(path) = event.path else {
            trace!(kind = ?event.kind, "event for an unknown watch");
            return;
        };

        match (event.kind, event.is_dir) {
            (EventKind::Created | EventKind::Written | EventKind::MovedIn, true) => {
                if let Err(e) = self.add_tree(&path, Some(&mut *handler)) {
                    warn!("cannot watch {}: {e}", path.display());
                }
                handler.dir_added(&path);
            }
            (EventKind::Created, false) => {
                trace!(path = %path.display(), "ignoring create until closed");
            }
            (EventKind::Written | EventKind::MovedIn, false) => handler.file_added(&path),
            (EventKind::Deleted | EventKind::MovedOut, true) => {
                self.remove_dir(&path);
                handler.dir_removed(&path);
            }
            (EventKind::Deleted | EventKind::MovedOut, false) => handler.file_deleted(&path),
            _ => {}
        }
    }

    /// Blocks until events are pending or `timeout` elapses.
    ///
    /// # Returns
    ///
    /// Whether events are pending. An interrupted wait reports none.
    pub fn wait(&self, timeout: Duration) -> Result<bool, WatchError> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.as_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(WatchError::Io(e.into())),
        }
    }
}

impl AsFd for ChangeWatcher {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inotify.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::SCAN_BLOCK_MARKER;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct Recorder {
        added: Vec<PathBuf>,
        deleted: Vec<PathBuf>,
        dirs_added: Vec<PathBuf>,
        dirs_removed: Vec<PathBuf>,
    }

    impl WatchHandler for Recorder {
        fn file_added(&mut self, path: &Path) {
            self.added.push(path.to_path_buf());
        }

        fn file_deleted(&mut self, path: &Path) {
            self.deleted.push(path.to_path_buf());
        }

        fn dir_added(&mut self, path: &Path) {
            self.dirs_added.push(path.to_path_buf());
        }

        fn dir_removed(&mut self, path: &Path) {
            self.dirs_removed.push(path.to_path_buf());
        }
    }

    fn pump_until(
        watcher: &mut ChangeWatcher,
        recorder: &mut Recorder,
        done: impl Fn(&Recorder) -> bool,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(recorder) && Instant::now() < deadline {
            watcher.wait(Duration::from_millis(100)).unwrap();
            watcher.process_events(recorder).unwrap();
        }
        assert!(done(recorder), "timed out waiting for events: {recorder:?}");
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(matches!(
            ChangeWatcher::new(Path::new("music")),
            Err(WatchError::RelativePath(_))
        ));

        let dir = TempDir::new().unwrap();
        let mut watcher = ChangeWatcher::new(dir.path()).unwrap();
        assert!(matches!(
            watcher.add_dir(Path::new("relative/dir")),
            Err(WatchError::RelativePath(_))
        ));
    }

    #[test]
    fn add_dir_is_recursive_and_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("blocked/inner")).unwrap();
        fs::write(dir.path().join("blocked").join(SCAN_BLOCK_MARKER), b"").unwrap();

        let mut watcher = ChangeWatcher::new(dir.path()).unwrap();
        watcher.add_dir(dir.path()).unwrap();
        assert_eq!(watcher.watch_count(), 3);
        assert!(watcher.is_watched(&dir.path().join("a/b")));
        assert!(!watcher.is_watched(&dir.path().join("blocked")));

        watcher.add_dir(dir.path()).unwrap();
        assert_eq!(watcher.watch_count(), 3);

        watcher.add_dir(&dir.path().join("vanished")).unwrap();
        assert_eq!(watcher.watch_count(), 3);
    }

    #[test]
    fn written_file_is_added_and_deletion_reported() {
        let dir = TempDir::new().unwrap();
        let mut watcher = ChangeWatcher::new(dir.path()).unwrap();
        watcher.add_dir(dir.path()).unwrap();
        let mut recorder = Recorder::default();

        let song = dir.path().join("song.ogg");
        fs::write(&song, b"data").unwrap();
        pump_until(&mut watcher, &mut recorder, |r| !r.added.is_empty());
        assert_eq!(recorder.added, vec![song.clone()]);

        fs::remove_file(&song).unwrap();
        pump_until(&mut watcher, &mut recorder, |r| !r.deleted.is_empty());
        assert_eq!(recorder.deleted, vec![song]);
    }

    #[test]
    fn new_subdirectory_becomes_watched() {
        let dir = TempDir::new().unwrap();
        let mut watcher = ChangeWatcher::new(dir.path()).unwrap();
        watcher.add_dir(dir.path()).unwrap();
        let mut recorder = Recorder::default();

        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        pump_until(&mut watcher, &mut recorder, |r| !r.dirs_added.is_empty());
        assert!(watcher.is_watched(&sub));

        let song = sub.join("song.ogg");
        fs::write(&song, b"data").unwrap();
        pump_until(&mut watcher, &mut recorder, |r| !r.added.is_empty());
        assert_eq!(recorder.added, vec![song]);

        fs::remove_file(sub.join("song.ogg")).unwrap();
        fs::remove_dir(&sub).unwrap();
        pump_until(&mut watcher, &mut recorder, |r| !r.dirs_removed.is_empty());
        assert_eq!(recorder.dirs_removed, vec![sub.clone()]);
        assert!(!watcher.is_watched(&sub));
    }

    #[test]
    fn moved_in_directory_reports_its_files() {
        let outside = TempDir::new().unwrap();
        let staged = outside.path().join("album");
        fs::create_dir(&staged).unwrap();
        fs::write(staged.join("one.ogg"), b"1").unwrap();
        fs::write(staged.join("two.ogg"), b"2").unwrap();

        // Same filesystem as the staging dir, so the rename is a move.
        let dir = outside.path().join("library");
        fs::create_dir(&dir).unwrap();
        let mut watcher = ChangeWatcher::new(&dir).unwrap();
        watcher.add_dir(&dir).unwrap();
        let mut recorder = Recorder::default();

        fs::rename(&staged, dir.join("album")).unwrap();
        pump_until(&mut watcher, &mut recorder, |r| r.added.len() == 2);

        let mut added = recorder.added.clone();
        added.sort();
        assert_eq!(
            added,
            vec![dir.join("album/one.ogg"), dir.join("album/two.ogg")]
        );
        assert!(watcher.is_watched(&dir.join("album")));
    }
}
