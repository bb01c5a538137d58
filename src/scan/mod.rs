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

//! Media library discovery.
//!
//! This module handles the discovery of media files on the local filesystem:
//! which roots may be tracked at all, and the walk over a tracked root.

mod roots;
mod walker;

pub use roots::{SCAN_BLOCK_MARKER, SkipReason, check_root, has_scan_block};
pub use walker::DirectoryWalker;
