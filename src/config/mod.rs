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

//! Daemon configuration.
//!
//! This module manages the daemon configuration file, and resolves it
//! together with the process environment into the [`Settings`] the daemon
//! runs with. [`resolve`] is the only place that reads the environment.

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_NAME: &str = "mediaindexd";

/// Overrides the directory holding the index.
pub const CACHE_DIR_ENV: &str = "MEDIASCANNER_CACHEDIR";
const USER_ENV: &str = "USER";

const DEFAULT_CACHE_SUBDIR: &str = "mediascanner-2.0";
const DB_FILE: &str = "mediastore.db";
const STAMP_FILE: &str = "mediastore.invalidated";
const REMOVABLE_MEDIA_DIR: &str = "/media";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub version: u32,
    /// Extra absolute directories to track besides the default ones.
    pub media_dirs: Vec<String>,
    /// Track the user's Music, Videos and Pictures directories.
    pub track_default_dirs: bool,
    pub invalidation_delay_ms: u64,
    pub commit_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            version: 1,
            media_dirs: vec![],
            track_default_dirs: true,
            invalidation_delay_ms: 1000,
            commit_interval_secs: 10,
        }
    }
}

pub fn load_config() -> DaemonConfig {
    confy::load(CONFIG_NAME, None).unwrap_or_else(|e| {
        warn!("using default configuration: {e}");
        DaemonConfig::default()
    })
}

/// Everything the daemon needs to know about its host, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_dir: PathBuf,
    pub db_path: PathBuf,
    pub stamp_path: PathBuf,
    /// Directory below which removable volumes get mounted.
    pub media_root: PathBuf,
    /// Roots tracked for the daemon's whole lifetime.
    pub persistent_roots: Vec<PathBuf>,
    pub invalidation_delay: Duration,
    pub commit_interval: Duration,
}

/// Host directories as reported by the platform.
#[derive(Debug, Clone, Default)]
pub(crate) struct HostDirs {
    pub(crate) home: Option<PathBuf>,
    pub(crate) cache: Option<PathBuf>,
    pub(crate) music: Option<PathBuf>,
    pub(crate) videos: Option<PathBuf>,
    pub(crate) pictures: Option<PathBuf>,
}

impl HostDirs {
    fn detect() -> Self {
        Self {
            home: dirs::home_dir(),
            cache: dirs::cache_dir(),
            music: dirs::audio_dir(),
            videos: dirs::video_dir(),
            pictures: dirs::picture_dir(),
        }
    }
}

/// Resolves `config` against the environment of this process.
///
/// # Errors
///
/// Returns an error if no cache directory can be determined, if `USER` is
/// unset, or if default directories are tracked and there is no home
/// directory.
pub fn resolve(config: &DaemonConfig) -> Result<Settings> {
    resolve_with(config, |key| env::var(key).ok(), &HostDirs::detect())
}

pub(crate) fn resolve_with(
    config: &DaemonConfig,
    var: impl Fn(&str) -> Option<String>,
    host: &HostDirs,
) -> Result<Settings> {
    let cache_dir = match var(CACHE_DIR_ENV).filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => host
            .cache
            .as_ref()
            .context("cannot determine the user cache directory")?
            .join(DEFAULT_CACHE_SUBDIR),
    };

    let user = var(USER_ENV)
        .filter(|user| !user.is_empty())
        .context("USER is not set")?;

    let mut persistent_roots = Vec::new();

    if config.track_default_dirs {
        let home = host
            .home
            .as_ref()
            .context("cannot determine the home directory")?;

        let defaults = [
            (&host.music, "Music"),
            (&host.videos, "Videos"),
            (&host.pictures, "Pictures"),
        ];
        for (dir, fallback) in defaults {
            let dir = dir.clone().unwrap_or_else(|| home.join(fallback));
            // An unset XDG directory points at home itself.
            if dir != *home {
                persistent_roots.push(dir);
            }
        }
    }

    for dir in &config.media_dirs {
        let dir = Path::new(dir);
        if dir.is_absolute() {
            persistent_roots.push(dir.to_path_buf());
        } else {
            warn!("ignoring relative media directory {}", dir.display());
        }
    }

    let mut seen = Vec::with_capacity(persistent_roots.len());
    persistent_roots.retain(|dir| {
        let fresh = !seen.contains(dir);
        seen.push(dir.clone());
        fresh
    });

    Ok(Settings {
        db_path: cache_dir.join(DB_FILE),
        stamp_path: cache_dir.join(STAMP_FILE),
        cache_dir,
        media_root: Path::new(REMOVABLE_MEDIA_DIR).join(user),
        persistent_roots,
        invalidation_delay: Duration::from_millis(config.invalidation_delay_ms),
        commit_interval: Duration::from_secs(config.commit_interval_secs),
    })
}
