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

//! # Media index.
//!
//! Keeps a searchable catalogue of the audio, video and image files found
//! in a user's media directories and on removable volumes.
//!
//! * [`db`] holds the catalogue and answers queries against it.
//! * [`extract`] reads tags and image metadata from files.
//! * [`scan`] walks directory trees, and [`watch`] follows live changes.
//! * [`daemon`] ties these together into the long-running indexer.
//!
//! Other processes read the catalogue by opening the database read-only
//! with [`db::Store::open`].

pub mod art;
pub mod config;
pub mod daemon;
pub mod db;
pub mod extract;
pub mod model;
pub mod scan;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;
