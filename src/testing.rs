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

//! Test doubles shared by unit tests.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::{
    extract::{DetectedFile, ExtractError, MetadataExtractor, detect_file},
    model::{MediaRecord, MediaRecordBuilder},
};

/// Detects like the real extractor but never opens files. Counts how often
/// extraction ran and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct CountingExtractor {
    extracted: AtomicUsize,
    failing: AtomicBool,
}

impl CountingExtractor {
    pub(crate) fn extracted(&self) -> usize {
        self.extracted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl MetadataExtractor for CountingExtractor {
    fn detect(&self, path: &Path) -> Result<DetectedFile, ExtractError> {
        detect_file(path)
    }

    fn extract(&self, file: &DetectedFile) -> Result<MediaRecord, ExtractError> {
        self.extracted.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(file.decode_error("extractor told to fail"));
        }

        let mut builder = MediaRecordBuilder::new(file.path.as_str());
        builder
            .content_type(file.content_type.as_str())?
            .etag(file.etag.as_str())?
            .title(format!("{} (tagged)", file.fallback_title()))?
            .author("Test Artist")?
            .kind(file.kind)?;

        Ok(builder.build()?)
    }
}
