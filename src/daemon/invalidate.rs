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

//! Debounced "index changed" notices.
//!
//! Consumers that cache query results are told when the index moved on. A
//! burst of changes results in a single notice, sent a fixed delay after the
//! first change of the burst.

use std::{
    fs,
    path::PathBuf,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::{debug, warn};

/// Where invalidation notices go.
pub trait InvalidationSink {
    fn invalidate(&mut self);
}

/// Rewrites a stamp file with the current time, for consumers to watch.
#[derive(Debug)]
pub struct StampFile {
    path: PathBuf,
}

impl StampFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl InvalidationSink for StampFile {
    fn invalidate(&mut self) {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        match fs::write(&self.path, format!("{stamp}\n")) {
            Ok(()) => debug!(path = %self.path.display(), "index invalidated"),
            Err(e) => warn!("failed to write {}: {e}", self.path.display()),
        }
    }
}

pub struct Invalidator {
    delay: Duration,
    deadline: Option<Instant>,
    sink: Box<dyn InvalidationSink>,
}

impl Invalidator {
    pub fn new(delay: Duration, sink: Box<dyn InvalidationSink>) -> Self {
        Self {
            delay,
            deadline: None,
            sink,
        }
    }

    /// Requests a notice. One already pending keeps its deadline.
    pub fn schedule(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the pending notice is due.
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Sends the pending notice if it is due.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.sink.invalidate();
                true
            }
            _ => false,
        }
    }

    /// Sends the pending notice now, if there is one.
    pub fn flush(&mut self) {
        if self.deadline.take().is_some() {
            self.sink.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};
    use tempfile::TempDir;

    struct Counter(Rc<Cell<u32>>);

    impl InvalidationSink for Counter {
        fn invalidate(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn invalidator() -> (Rc<Cell<u32>>, Invalidator) {
        let count = Rc::new(Cell::new(0));
        let inv = Invalidator::new(
            Duration::from_millis(100),
            Box::new(Counter(Rc::clone(&count))),
        );
        (count, inv)
    }

    #[test]
    fn burst_collapses_into_one_notice() {
        let (count, mut inv) = invalidator();
        let start = Instant::now();

        inv.schedule(start);
        inv.schedule(start + Duration::from_millis(50));
        inv.schedule(start + Duration::from_millis(90));

        assert!(!inv.fire_due(start + Duration::from_millis(99)));
        assert_eq!(count.get(), 0);
        assert!(inv.fire_due(start + Duration::from_millis(100)));
        assert_eq!(count.get(), 1);
        assert!(!inv.fire_due(start + Duration::from_millis(500)));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn timeout_counts_down_to_the_deadline() {
        let (_count, mut inv) = invalidator();
        let start = Instant::now();
        assert_eq!(inv.timeout(start), None);

        inv.schedule(start);
        assert_eq!(
            inv.timeout(start + Duration::from_millis(30)),
            Some(Duration::from_millis(70))
        );
        assert_eq!(
            inv.timeout(start + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn flush_sends_only_pending_notices() {
        let (count, mut inv) = invalidator();
        inv.flush();
        assert_eq!(count.get(), 0);

        inv.schedule(Instant::now());
        inv.flush();
        assert_eq!(count.get(), 1);
        assert!(!inv.is_pending());
    }

    #[test]
    fn stamp_file_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mediastore.invalidated");
        let mut sink = StampFile::new(path.clone());

        sink.invalidate();
        let stamp: u128 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert!(stamp > 0);
    }
}
