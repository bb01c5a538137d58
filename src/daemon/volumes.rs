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

//! Removable volume discovery.
//!
//! Desktop automounters mount removable media below `/media/<user>`. The
//! kernel mount table lists them, and flags the open table file with a
//! priority event whenever a filesystem is mounted or unmounted.

use std::{
    collections::BTreeSet,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    os::fd::{AsFd, BorrowedFd},
    path::{Path, PathBuf},
};

const MOUNT_TABLE: &str = "/proc/self/mountinfo";

/// Index of the mount point in a mountinfo line.
const MOUNT_POINT_FIELD: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeChange {
    Mounted(PathBuf),
    Unmounted(PathBuf),
}

#[derive(Debug)]
pub struct VolumeMonitor {
    table: File,
    media_root: PathBuf,
    mounted: BTreeSet<PathBuf>,
}

impl VolumeMonitor {
    /// Opens the mount table. Nothing counts as mounted until the first
    /// [`VolumeMonitor::refresh`].
    pub fn open(media_root: &Path) -> io::Result<Self> {
        Ok(Self {
            table: File::open(MOUNT_TABLE)?,
            media_root: media_root.to_path_buf(),
            mounted: BTreeSet::new(),
        })
    }

    /// Re-reads the mount table and reports what changed since last time.
    pub fn refresh(&mut self) -> io::Result<Vec<VolumeChange>> {
        let mut table = String::new();
        self.table.seek(SeekFrom::Start(0))?;
        self.table.read_to_string(&mut table)?;

        let current = parse_mount_points(&table, &self.media_root);
        let changes = diff(&self.mounted, &current);
        self.mounted = current;

        Ok(changes)
    }

    pub fn mounted(&self) -> &BTreeSet<PathBuf> {
        &self.mounted
    }
}

impl AsFd for VolumeMonitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.table.as_fd()
    }
}

/// Mount points strictly below `media_root`.
pub(crate) fn parse_mount_points(table: &str, media_root: &Path) -> BTreeSet<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(MOUNT_POINT_FIELD))
        .map(|field| PathBuf::from(unescape(field)))
        .filter(|path| path.starts_with(media_root) && path != media_root)
        .collect()
}

/// Undoes the octal escaping (`\040` for a space) of mount table fields.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let digits = bytes.get(i + 1..i + 4).unwrap_or_default();
            if digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Unmounts first, then mounts, each in path order.
pub(crate) fn diff(before: &BTreeSet<PathBuf>, after: &BTreeSet<PathBuf>) -> Vec<VolumeChange> {
    before
        .difference(after)
        .cloned()
        .map(VolumeChange::Unmounted)
        .chain(after.difference(before).cloned().map(VolumeChange::Mounted))
        .collect()
}
