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

//! Decoded change notifications.

use std::{ffi::OsStr, path::PathBuf};

use inotify::{Event, EventMask, WatchDescriptor, WatchMask};

use super::map::WatchMap;

/// Events requested for every watched directory.
pub(crate) fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::CLOSE_WRITE
        | WatchMask::MOVED_TO
        | WatchMask::MOVED_FROM
        | WatchMask::DELETE
        | WatchMask::ONLYDIR
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    /// A file opened for writing was closed.
    Written,
    MovedIn,
    Deleted,
    MovedOut,
    /// The kernel dropped the watch (removed, or its filesystem unmounted).
    WatchEnded,
    /// The kernel queue overflowed and events were lost.
    Overflow,
    Other,
}

impl EventKind {
    pub fn from_mask(mask: EventMask) -> Self {
        if mask.contains(EventMask::Q_OVERFLOW) {
            EventKind::Overflow
        } else if mask.intersects(EventMask::IGNORED | EventMask::UNMOUNT) {
            EventKind::WatchEnded
        } else if mask.contains(EventMask::CLOSE_WRITE) {
            EventKind::Written
        } else if mask.contains(EventMask::MOVED_TO) {
            EventKind::MovedIn
        } else if mask.contains(EventMask::CREATE) {
            EventKind::Created
        } else if mask.contains(EventMask::DELETE) {
            EventKind::Deleted
        } else if mask.contains(EventMask::MOVED_FROM) {
            EventKind::MovedOut
        } else {
            EventKind::Other
        }
    }
}

/// A notification resolved against the watch table.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub wd: WatchDescriptor,
    pub kind: EventKind,
    pub is_dir: bool,
    /// Full path of the affected entry, if the watch is still known.
    pub path: Option<PathBuf>,
}

impl WatchEvent {
    pub(crate) fn decode(raw: Event<&OsStr>, watches: &WatchMap<WatchDescriptor>) -> Self {
        let path = watches.path(&raw.wd).map(|dir| match raw.name {
            Some(name) => dir.join(name),
            None => dir.to_path_buf(),
        });

        Self {
            kind: EventKind::from_mask(raw.mask),
            is_dir: raw.mask.contains(EventMask::ISDIR),
            wd: raw.wd,
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_masks() {
        assert_eq!(EventKind::from_mask(EventMask::CREATE), EventKind::Created);
        assert_eq!(
            EventKind::from_mask(EventMask::CREATE | EventMask::ISDIR),
            EventKind::Created
        );
        assert_eq!(
            EventKind::from_mask(EventMask::CLOSE_WRITE),
            EventKind::Written
        );
        assert_eq!(EventKind::from_mask(EventMask::MOVED_TO), EventKind::MovedIn);
        assert_eq!(EventKind::from_mask(EventMask::DELETE), EventKind::Deleted);
        assert_eq!(
            EventKind::from_mask(EventMask::MOVED_FROM),
            EventKind::MovedOut
        );
        assert_eq!(EventKind::from_mask(EventMask::MODIFY), EventKind::Other);
    }

    #[test]
    fn lifecycle_flags_take_precedence() {
        assert_eq!(
            EventKind::from_mask(EventMask::IGNORED),
            EventKind::WatchEnded
        );
        assert_eq!(
            EventKind::from_mask(EventMask::UNMOUNT | EventMask::IGNORED),
            EventKind::WatchEnded
        );
        assert_eq!(
            EventKind::from_mask(EventMask::Q_OVERFLOW),
            EventKind::Overflow
        );
    }
}
