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

//! Heuristics deciding whether a directory is worth tracking.

use std::path::Path;

use thiserror::Error;

/// A file with this name suppresses scanning of the directory holding it.
pub const SCAN_BLOCK_MARKER: &str = ".nomedia";

const ROOT_DIRS: [&str; 3] = ["usr", "var", "bin"];
const WINDOWS_ROOT_DIR: &str = "Program Files";
const OPTICAL_DISC_DIRS: [&str; 3] = ["AUDIO_TS", "VIDEO_TS", "BDMV"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("not a directory")]
    NotADirectory,

    #[error("looks like the root of an operating system install")]
    RootLike,

    #[error("looks like an optical disc")]
    OpticalDisc,

    #[error("contains a scan-block marker")]
    ScanBlocked,
}

/// Checks that `path` can be tracked as a media root.
///
/// # Errors
///
/// Returns the first [`SkipReason`] that applies.
pub fn check_root(path: &Path) -> Result<(), SkipReason> {
    if !path.is_dir() {
        return Err(SkipReason::NotADirectory);
    }
    if is_rootlike(path) {
        return Err(SkipReason::RootLike);
    }
    if is_optical_disc(path) {
        return Err(SkipReason::OpticalDisc);
    }
    if has_scan_block(path) {
        return Err(SkipReason::ScanBlocked);
    }
    Ok(())
}

pub fn has_scan_block(dir: &Path) -> bool {
    dir.join(SCAN_BLOCK_MARKER).exists()
}

fn is_rootlike(path: &Path) -> bool {
    ROOT_DIRS.iter().all(|d| path.join(d).is_dir()) || path.join(WINDOWS_ROOT_DIR).is_dir()
}

fn is_optical_disc(path: &Path) -> bool {
    OPTICAL_DISC_DIRS.iter().any(|d| path.join(d).is_dir())
}
