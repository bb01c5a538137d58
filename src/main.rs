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

//! # Media indexing daemon.
//!
//! Scans the user's media directories and any removable volume mounted
//! below `/media/<user>`, keeps the index current while files change, and
//! rewrites a stamp file whenever consumers should refresh.
//!
//! Logging is controlled with `MEDIAINDEX_LOG`, using the usual
//! `tracing` filter syntax.

use std::{fs, sync::Arc, sync::atomic::Ordering};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mediaindex::{
    config,
    daemon::{ScannerDaemon, StampFile},
    db::{OpenMode, Store, dir_prefix},
    extract::TagExtractor,
};

const LOG_ENV: &str = "MEDIAINDEX_LOG";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::load_config();
    let settings = config::resolve(&config).context("Failed to resolve settings")?;

    fs::create_dir_all(&settings.cache_dir).with_context(|| {
        format!(
            "Failed to create cache directory {}",
            settings.cache_dir.display()
        )
    })?;

    // Records left live for volumes that were unmounted while we were down.
    let media_root = settings
        .media_root
        .to_str()
        .context("Media root is not valid UTF-8")?;
    let store = Store::open(
        &settings.db_path,
        OpenMode::ReadWrite,
        Some(&dir_prefix(media_root)),
    )
    .with_context(|| format!("Failed to open {}", settings.db_path.display()))?;

    info!(db = %settings.db_path.display(), "opened index");

    let sink = Box::new(StampFile::new(settings.stamp_path.clone()));
    let mut daemon = ScannerDaemon::new(settings, Arc::new(store), Arc::new(TagExtractor), sink);

    let stop = daemon.stop_flag();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
        .context("Failed to install signal handler")?;

    daemon.start();
    daemon.run().context("Daemon error occurred")
}
