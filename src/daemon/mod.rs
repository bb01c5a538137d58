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

//! The scanner daemon.
//!
//! The daemon owns one [`ChangeWatcher`] per tracked root. A root is taken
//! on in four steps:
//!
//! 1. **Restore**: records archived for the root come back to life.
//! 2. **Prune**: records of files that vanished meanwhile are dropped.
//! 3. **Scan**: the tree is walked and every file whose change-tag moved is
//!    extracted and stored.
//! 4. **Watch**: live changes are applied as they happen.
//!
//! Removable volumes are tracked while mounted. On unmount their records are
//! archived rather than deleted, so re-inserting the volume is cheap.
//!
//! ## Event loop
//!
//! A single thread waits on every watcher, the mount table and the pending
//! invalidation deadline at once. The wait is capped so the stop flag set by
//! the signal handler is noticed promptly.

mod indexer;
mod invalidate;
mod volumes;

use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    os::fd::AsFd,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::Settings,
    db::{Store, dir_prefix},
    extract::MetadataExtractor,
    scan::{DirectoryWalker, check_root},
    watch::{ChangeWatcher, WatchHandler},
};

pub use indexer::{Indexer, OnExtractError};
pub use invalidate::{InvalidationSink, Invalidator, StampFile};
pub use volumes::{VolumeChange, VolumeMonitor};

/// Longest single wait of the event loop.
const MAX_WAIT: Duration = Duration::from_secs(1);

pub struct ScannerDaemon {
    settings: Settings,
    indexer: Indexer,
    watchers: BTreeMap<PathBuf, ChangeWatcher>,
    volumes: Option<VolumeMonitor>,
    invalidator: Invalidator,
    overflowed: BTreeSet<PathBuf>,
    /// Roots whose watches all ended, tracked again once they reappear.
    lost: BTreeSet<PathBuf>,
    stop: Arc<AtomicBool>,
}

/// Routes watcher callbacks to the indexer.
struct Dispatch<'a> {
    indexer: &'a Indexer,
    invalidator: &'a mut Invalidator,
    overflowed: &'a mut BTreeSet<PathBuf>,
}

impl Dispatch<'_> {
    fn changed(&mut self, changed: bool) {
        if changed {
            self.invalidator.schedule(Instant::now());
        }
    }
}

impl WatchHandler for Dispatch<'_> {
    fn file_added(&mut self, path: &Path) {
        match self.indexer.file_added(path) {
            Ok(changed) => self.changed(changed),
            Err(e) => warn!("failed to index {}: {e:#}", path.display()),
        }
    }

    fn file_deleted(&mut self, path: &Path) {
        match self.indexer.file_deleted(path) {
            Ok(changed) => self.changed(changed),
            Err(e) => warn!("failed to remove {}: {e:#}", path.display()),
        }
    }

    fn dir_added(&mut self, path: &Path) {
        debug!(dir = %path.display(), "directory added");
    }

    fn dir_removed(&mut self, path: &Path) {
        match self.indexer.dir_removed(path) {
            Ok(removed) => self.changed(removed > 0),
            Err(e) => warn!("failed to remove records below {}: {e:#}", path.display()),
        }
    }

    fn overflowed(&mut self, root: &Path) {
        self.overflowed.insert(root.to_path_buf());
    }
}

impl ScannerDaemon {
    pub fn new(
        settings: Settings,
        store: Arc<Store>,
        extractor: Arc<dyn MetadataExtractor>,
        sink: Box<dyn InvalidationSink>,
    ) -> Self {
        let invalidator = Invalidator::new(settings.invalidation_delay, sink);

        Self {
            settings,
            indexer: Indexer::new(store, extractor),
            watchers: BTreeMap::new(),
            volumes: None,
            invalidator,
            overflowed: BTreeSet::new(),
            lost: BTreeSet::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag that ends [`ScannerDaemon::run`] once set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn store(&self) -> &Arc<Store> {
        self.indexer.store()
    }

    /// Roots currently tracked.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.watchers.keys().map(PathBuf::as_path)
    }

    /// Tracks the persistent roots and every volume already mounted.
    ///
    /// Roots that cannot be tracked are logged and skipped.
    pub fn start(&mut self) {
        for root in self.settings.persistent_roots.clone() {
            self.track(&root);
        }

        match VolumeMonitor::open(&self.settings.media_root) {
            Ok(mut monitor) => {
                let changes = monitor.refresh().unwrap_or_else(|e| {
                    warn!("failed to read the mount table: {e}");
                    Vec::new()
                });
                self.volumes = Some(monitor);
                self.apply_volume_changes(changes);
            }
            Err(e) => warn!("not monitoring removable volumes: {e}"),
        }

        self.invalidator.schedule(Instant::now());

        info!(roots = self.watchers.len(), "daemon started");
    }

    fn track(&mut self, root: &Path) {
        if let Err(e) = self.add_root(root) {
            warn!("not tracking {}: {e:#}", root.display());
        }
    }

    /// Restores, prunes, scans and finally watches `root`.
    ///
    /// Roots that fail the trackability checks are skipped with a logged
    /// reason. Adding a tracked root again does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the watcher cannot be set up.
    pub fn add_root(&mut self, root: &Path) -> Result<()> {
        if self.watchers.contains_key(root) {
            return Ok(());
        }
        if let Err(reason) = check_root(root) {
            info!(root = %root.display(), "not tracking: {reason}");
            return Ok(());
        }

        let prefix = root_prefix(root)?;
        let store = Arc::clone(self.indexer.store());

        let restored = store.restore(&prefix)?;
        let pruned = store.prune_deleted()?;
        debug!(root = %root.display(), restored, pruned, "prepared root");

        let mut watcher = ChangeWatcher::new(root)?;
        self.scan_root(root)?;
        watcher.add_dir(root)?;

        info!(root = %root.display(), watches = watcher.watch_count(), "tracking");
        self.watchers.insert(root.to_path_buf(), watcher);
        self.invalidator.schedule(Instant::now());

        Ok(())
    }

    /// Stops tracking `root` and archives its records.
    pub fn remove_root(&mut self, root: &Path) -> Result<()> {
        self.watchers.remove(root);
        self.overflowed.remove(root);
        self.lost.remove(root);

        let archived = self.indexer.store().archive(&root_prefix(root)?)?;
        info!(root = %root.display(), archived, "stopped tracking");

        if archived > 0 {
            self.invalidator.schedule(Instant::now());
        }

        Ok(())
    }

    /// Walks `root` inside one store batch, committed at every commit
    /// interval.
    ///
    /// Each commit also signals consumers and drains pending watcher events,
    /// so a long scan neither hides its progress nor starves live changes.
    fn scan_root(&mut self, root: &Path) -> Result<()> {
        info!(root = %root.display(), "scanning");

        let started = Instant::now();
        let store = Arc::clone(self.indexer.store());
        let (mut seen, mut indexed) = (0usize, 0usize);

        store.begin_batch()?;
        let mut last_commit = Instant::now();

        for file in DirectoryWalker::new(root, self.indexer.extractor()) {
            seen += 1;
            match self.indexer.index(&file, OnExtractError::Skip) {
                Ok(true) => indexed += 1,
                Ok(false) => {}
                Err(e) => warn!("failed to index {}: {e:#}", file.path),
            }

            if last_commit.elapsed() >= self.settings.commit_interval {
                store.commit_batch()?;
                self.invalidator.schedule(Instant::now());
                self.pump_watchers();
                self.invalidator.fire_due(Instant::now());

                if self.stop.load(Ordering::SeqCst) {
                    info!(root = %root.display(), "stop requested, abandoning scan");
                    break;
                }

                store.begin_batch()?;
                last_commit = Instant::now();
            }
        }

        store.commit_batch()?;

        info!(
            root = %root.display(),
            seen,
            indexed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished"
        );

        Ok(())
    }

    fn pump_watchers(&mut self) {
        let mut dispatch = Dispatch {
            indexer: &self.indexer,
            invalidator: &mut self.invalidator,
            overflowed: &mut self.overflowed,
        };

        for (root, watcher) in &mut self.watchers {
            match watcher.process_events(&mut dispatch) {
                Ok(0) => {}
                Ok(count) => trace!(root = %root.display(), count, "processed events"),
                Err(e) => warn!("failed to read events for {}: {e}", root.display()),
            }
        }

        self.drop_dead_watchers();
    }

    /// Forgets roots whose watches all ended, archiving their records.
    ///
    /// This happens when the root itself is deleted, or its filesystem goes
    /// away without the mount table telling us.
    fn drop_dead_watchers(&mut self) {
        let dead: Vec<PathBuf> = self
            .watchers
            .iter()
            .filter(|(_, watcher)| watcher.watch_count() == 0)
            .map(|(root, _)| root.clone())
            .collect();

        for root in dead {
            warn!(root = %root.display(), "root disappeared");
            if let Err(e) = self.remove_root(&root) {
                warn!("failed to archive {}: {e:#}", root.display());
            }
            self.lost.insert(root);
        }
    }

    /// Tracks lost roots again once they are directories again.
    fn retrack_lost(&mut self) {
        let back: Vec<PathBuf> = self
            .lost
            .iter()
            .filter(|root| root.is_dir())
            .cloned()
            .collect();

        for root in back {
            self.lost.remove(&root);
            info!(root = %root.display(), "root reappeared");
            self.track(&root);
        }
    }

    /// Re-walks roots whose event queue overflowed.
    fn rescan_overflowed(&mut self) {
        for root in mem::take(&mut self.overflowed) {
            if !self.watchers.contains_key(&root) {
                continue;
            }

            info!(root = %root.display(), "rescanning after lost events");
            if let Err(e) = self.rescan(&root) {
                warn!("rescan of {} failed: {e:#}", root.display());
            }
        }
    }

    fn rescan(&mut self, root: &Path) -> Result<()> {
        self.indexer.store().prune_deleted()?;
        self.scan_root(root)?;

        // Directories created while events were lost are not watched yet.
        if let Some(watcher) = self.watchers.get_mut(root) {
            watcher.add_dir(root)?;
        }

        Ok(())
    }

    fn apply_volume_changes(&mut self, changes: Vec<VolumeChange>) {
        for change in changes {
            match change {
                VolumeChange::Mounted(root) => {
                    info!(volume = %root.display(), "volume mounted");
                    self.track(&root);
                }
                VolumeChange::Unmounted(root) => {
                    info!(volume = %root.display(), "volume unmounted");
                    if let Err(e) = self.remove_root(&root) {
                        warn!("failed to archive {}: {e:#}", root.display());
                    }
                }
            }
        }
    }

    /// Waits on every event source at once.
    ///
    /// # Returns
    ///
    /// Whether the mount table changed.
    fn wait(&self, timeout: Duration) -> Result<bool> {
        let mut fds: Vec<PollFd<'_>> = self
            .watchers
            .values()
            .map(|watcher| PollFd::new(watcher.as_fd(), PollFlags::POLLIN))
            .collect();

        let table = self.volumes.as_ref().map(|monitor| {
            fds.push(PollFd::new(monitor.as_fd(), PollFlags::POLLPRI));
            fds.len() - 1
        });

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(false),
            Err(e) => return Err(e).context("failed to wait for events"),
        }

        Ok(table
            .and_then(|index| fds[index].revents())
            .is_some_and(|events| events.intersects(PollFlags::POLLPRI | PollFlags::POLLERR)))
    }

    /// Runs one iteration of the event loop, waiting at most `max_wait`.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting itself fails.
    pub fn run_once(&mut self, max_wait: Duration) -> Result<()> {
        let timeout = self
            .invalidator
            .timeout(Instant::now())
            .map_or(max_wait, |due| due.min(max_wait));

        if self.wait(timeout)? {
            let changes = match self.volumes.as_mut().map(VolumeMonitor::refresh) {
                Some(Ok(changes)) => changes,
                Some(Err(e)) => {
                    warn!("failed to read the mount table: {e}");
                    Vec::new()
                }
                None => Vec::new(),
            };
            self.apply_volume_changes(changes);
        }

        self.pump_watchers();
        self.rescan_overflowed();
        self.retrack_lost();
        self.invalidator.fire_due(Instant::now());

        Ok(())
    }

    /// Runs the event loop until the stop flag is set.
    pub fn run(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            self.run_once(MAX_WAIT)?;
        }

        info!("stopping");
        self.invalidator.flush();
        self.indexer.store().commit_batch()?;

        Ok(())
    }
}

fn root_prefix(root: &Path) -> Result<String> {
    let root = root
        .to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", root.display()))?;
    Ok(dir_prefix(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OpenMode;
    use crate::testing::CountingExtractor;
    use std::{cell::Cell, fs, rc::Rc};
    use tempfile::TempDir;

    struct Counter(Rc<Cell<u32>>);

    impl InvalidationSink for Counter {
        fn invalidate(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Fixture {
        dir: TempDir,
        library: PathBuf,
        extractor: Arc<CountingExtractor>,
        notices: Rc<Cell<u32>>,
        daemon: ScannerDaemon,
    }

    fn fixture() -> Fixture {
        fixture_with(Duration::from_secs(10))
    }

    fn fixture_with(commit_interval: Duration) -> Fixture {
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");
        fs::create_dir(&library).unwrap();

        let settings = Settings {
            cache_dir: dir.path().to_path_buf(),
            db_path: dir.path().join("mediastore.db"),
            stamp_path: dir.path().join("mediastore.invalidated"),
            media_root: dir.path().join("media"),
            persistent_roots: vec![library.clone()],
            invalidation_delay: Duration::from_millis(10),
            commit_interval,
        };
        let store =
            Arc::new(Store::open(&settings.db_path, OpenMode::ReadWrite, None).unwrap());
        let extractor = Arc::new(CountingExtractor::default());
        let notices = Rc::new(Cell::new(0));
        let daemon = ScannerDaemon::new(
            settings,
            store,
            extractor.clone(),
            Box::new(Counter(Rc::clone(&notices))),
        );

        Fixture {
            dir,
            library,
            extractor,
            notices,
            daemon,
        }
    }

    fn run_until(daemon: &mut ScannerDaemon, done: impl Fn(&ScannerDaemon) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(daemon) && Instant::now() < deadline {
            daemon.run_once(Duration::from_millis(50)).unwrap();
        }
        assert!(done(daemon), "timed out");
    }

    fn size(daemon: &ScannerDaemon) -> usize {
        daemon.store().size().unwrap()
    }

    #[test]
    fn start_scans_existing_files_then_watches() {
        let mut f = fixture();
        fs::create_dir(f.library.join("album")).unwrap();
        fs::write(f.library.join("album/one.ogg"), b"1").unwrap();
        fs::write(f.library.join("cover.jpg"), b"2").unwrap();
        fs::write(f.library.join("notes.txt"), b"3").unwrap();

        f.daemon.start();
        assert_eq!(size(&f.daemon), 2);
        assert_eq!(f.extractor.extracted(), 2);
        assert_eq!(f.daemon.roots().collect::<Vec<_>>(), vec![f.library.as_path()]);

        // Adding a tracked root again does nothing.
        let root = f.library.clone();
        f.daemon.add_root(&root).unwrap();
        assert_eq!(f.extractor.extracted(), 2);
    }

    #[test]
    fn live_changes_reach_the_store() {
        let mut f = fixture();
        f.daemon.start();
        assert_eq!(size(&f.daemon), 0);

        let song = f.library.join("song.ogg");
        fs::write(&song, b"data").unwrap();
        run_until(&mut f.daemon, |d| size(d) == 1);
        let record = f.daemon.store().lookup(song.to_str().unwrap()).unwrap();
        assert_eq!(record.title(), "song (tagged)");

        fs::remove_file(&song).unwrap();
        run_until(&mut f.daemon, |d| size(d) == 0);

        let sub = f.library.join("sub");
        fs::create_dir(&sub).unwrap();
        // Let the directory event be handled before its content appears.
        for _ in 0..5 {
            f.daemon.run_once(Duration::from_millis(20)).unwrap();
        }
        fs::write(sub.join("late.ogg"), b"data").unwrap();
        run_until(&mut f.daemon, |d| size(d) == 1);

        fs::remove_file(sub.join("late.ogg")).unwrap();
        fs::remove_dir(&sub).unwrap();
        run_until(&mut f.daemon, |d| size(d) == 0);
    }

    #[test]
    fn changes_are_announced() {
        let mut f = fixture();
        f.daemon.start();
        run_until(&mut f.daemon, |d| !d.invalidator.is_pending());
        let after_start = f.notices.get();
        assert!(after_start >= 1);

        for name in ["a.ogg", "b.ogg", "c.ogg"] {
            fs::write(f.library.join(name), b"x").unwrap();
        }
        run_until(&mut f.daemon, |d| size(d) == 3);
        run_until(&mut f.daemon, |d| !d.invalidator.is_pending());
        assert!(f.notices.get() > after_start);
    }

    #[test]
    fn removed_root_is_archived_and_restored() {
        let mut f = fixture();
        fs::write(f.library.join("one.ogg"), b"1").unwrap();
        f.daemon.start();
        assert_eq!(size(&f.daemon), 1);

        let root = f.library.clone();
        f.daemon.remove_root(&root).unwrap();
        assert_eq!(size(&f.daemon), 0);
        assert_eq!(f.daemon.roots().count(), 0);

        f.daemon.add_root(&root).unwrap();
        assert_eq!(size(&f.daemon), 1);
        assert_eq!(f.extractor.extracted(), 1);
    }

    #[test]
    fn untrackable_roots_are_skipped() {
        let mut f = fixture();
        fs::write(f.library.join(crate::scan::SCAN_BLOCK_MARKER), b"").unwrap();
        fs::write(f.library.join("one.ogg"), b"1").unwrap();

        f.daemon.start();
        assert_eq!(f.daemon.roots().count(), 0);
        assert_eq!(size(&f.daemon), 0);
    }

    #[test]
    fn run_returns_once_stopped() {
        let mut f = fixture();
        f.daemon.start();
        f.daemon.stop_flag().store(true, Ordering::SeqCst);
        f.daemon.run().unwrap();
        assert!(!f.daemon.invalidator.is_pending());
    }

    #[test]
    fn deleted_root_is_tracked_again_once_recreated() {
        let mut f = fixture();
        f.daemon.start();
        fs::write(f.library.join("old.ogg"), b"1").unwrap();
        run_until(&mut f.daemon, |d| size(d) == 1);

        fs::remove_file(f.library.join("old.ogg")).unwrap();
        fs::remove_dir(&f.library).unwrap();
        run_until(&mut f.daemon, |d| d.roots().count() == 0);
        assert_eq!(size(&f.daemon), 0);

        fs::create_dir(&f.library).unwrap();
        let song = f.library.join("new.ogg");
        fs::write(&song, b"2").unwrap();
        run_until(&mut f.daemon, |d| d.roots().count() == 1 && size(d) == 1);
        assert!(f.daemon.store().lookup(song.to_str().unwrap()).is_ok());

        // Watched again, not just rescanned.
        fs::write(f.library.join("later.ogg"), b"3").unwrap();
        run_until(&mut f.daemon, |d| size(d) == 2);
    }

    #[test]
    fn overflow_rewalks_the_root() {
        let mut f = fixture();
        f.daemon.start();
        let missed = f.library.join("missed.ogg");
        fs::write(&missed, b"1").unwrap();

        let root = f.library.clone();
        let mut dispatch = Dispatch {
            indexer: &f.daemon.indexer,
            invalidator: &mut f.daemon.invalidator,
            overflowed: &mut f.daemon.overflowed,
        };
        dispatch.overflowed(&root);

        f.daemon.rescan_overflowed();
        assert!(f.daemon.overflowed.is_empty());
        assert!(f.daemon.store().lookup(missed.to_str().unwrap()).is_ok());
        assert_eq!(f.extractor.extracted(), 1);
    }

    #[test]
    fn long_scan_keeps_serving_live_events() {
        let mut f = fixture_with(Duration::ZERO);
        f.daemon.start();

        let other = f.dir.path().join("other");
        fs::create_dir(&other).unwrap();
        for name in ["a.ogg", "b.ogg"] {
            fs::write(other.join(name), b"x").unwrap();
        }

        // Queued on the library watcher, not read yet.
        let live = f.library.join("live.ogg");
        fs::write(&live, b"x").unwrap();

        f.daemon.add_root(&other).unwrap();
        assert!(f.daemon.store().lookup(live.to_str().unwrap()).is_ok());
        assert_eq!(size(&f.daemon), 3);
    }

    #[test]
    fn volume_changes_archive_and_restore() {
        let mut f = fixture();
        f.daemon.start();

        let volume = f.dir.path().join("media").join("DISK");
        fs::create_dir_all(&volume).unwrap();
        fs::write(volume.join("song.ogg"), b"x").unwrap();

        f.daemon
            .apply_volume_changes(vec![VolumeChange::Mounted(volume.clone())]);
        assert!(f.daemon.roots().any(|root| root == volume));
        assert_eq!(size(&f.daemon), 1);

        f.daemon
            .apply_volume_changes(vec![VolumeChange::Unmounted(volume.clone())]);
        assert!(!f.daemon.roots().any(|root| root == volume));
        assert_eq!(size(&f.daemon), 0);

        f.daemon
            .apply_volume_changes(vec![VolumeChange::Mounted(volume.clone())]);
        assert_eq!(size(&f.daemon), 1);
        assert_eq!(f.extractor.extracted(), 1);
    }
}
