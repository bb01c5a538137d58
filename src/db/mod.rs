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

//! Data access layer.
//!
//! This module handles all interactions with the SQLite index, including
//! schema creation, record upserts, ranked full-text search and the
//! archival of records that belong to unmounted volumes.
//!
//! # Tables
//!
//! * `media` - One row per indexed file (the live table).
//! * `media_attic` - Rows of files whose volume is not currently mounted.
//! * `media_fts` - FTS4 shadow index over title, artist and album, kept in
//!   step with `media` by triggers.
//! * `schema_version` - A single row holding [`SCHEMA_VERSION`].
//!
//! Files whose extraction was in progress when the daemon last died are
//! recorded in a separate ledger database next to the index (see
//! [`ledger_path`]). It has its own connection in autocommit mode, so a
//! marker is durable the moment it is written while a scan batch on the
//! index stays open.
//!
//! # Concurrency
//!
//! The connection sits behind a mutex. Every public method takes the lock
//! for exactly one logical operation, so a [`Store`] can be shared between
//! the bulk scan and the live event path.
//!
//! # Performance
//!
//! Most functions in this module use [`rusqlite::Connection::prepare_cached`]
//! to reduce SQL parsing overhead.

mod model;
mod query;
mod rank;

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::model::{Album, Filter, MediaKind, MediaRecord};
use model::MEDIA_COLUMNS;
use query::{SelectBuilder, fts_query};

/// Version of the on-disk layout. Any other stored version causes the index
/// to be rebuilt from scratch when opened for writing.
pub const SCHEMA_VERSION: i32 = 11;

const DROP_SCHEMA: &str = "
    DROP TABLE IF EXISTS media;
    DROP TABLE IF EXISTS media_attic;
    DROP TABLE IF EXISTS media_fts;
    DROP TABLE IF EXISTS schema_version;
";

const CREATE_SCHEMA: &str = "
    CREATE TABLE schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE media (
        id INTEGER PRIMARY KEY,
        filename TEXT NOT NULL UNIQUE,
        content_type TEXT NOT NULL,
        etag TEXT NOT NULL,
        title TEXT NOT NULL,
        date TEXT NOT NULL,
        artist TEXT NOT NULL,
        album TEXT NOT NULL,
        album_artist TEXT NOT NULL,
        genre TEXT NOT NULL,
        disc_number INTEGER NOT NULL,
        track_number INTEGER NOT NULL,
        duration INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        kind INTEGER NOT NULL
    );

    CREATE INDEX idx_media_kind ON media (kind);
    CREATE INDEX idx_media_album ON media (album_artist, album);

    CREATE TABLE media_attic (
        filename TEXT NOT NULL UNIQUE,
        content_type TEXT NOT NULL,
        etag TEXT NOT NULL,
        title TEXT NOT NULL,
        date TEXT NOT NULL,
        artist TEXT NOT NULL,
        album TEXT NOT NULL,
        album_artist TEXT NOT NULL,
        genre TEXT NOT NULL,
        disc_number INTEGER NOT NULL,
        track_number INTEGER NOT NULL,
        duration INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        kind INTEGER NOT NULL
    );

    CREATE VIRTUAL TABLE media_fts USING fts4 (
        title,
        artist,
        album,
        tokenize=unicode61
    );

    CREATE TRIGGER media_ai AFTER INSERT ON media BEGIN
        INSERT INTO media_fts (docid, title, artist, album)
        VALUES (new.id, new.title, new.artist, new.album);
    END;

    CREATE TRIGGER media_bu BEFORE UPDATE ON media BEGIN
        DELETE FROM media_fts WHERE docid = old.id;
    END;

    CREATE TRIGGER media_au AFTER UPDATE ON media BEGIN
        INSERT INTO media_fts (docid, title, artist, album)
        VALUES (new.id, new.title, new.artist, new.album);
    END;

    CREATE TRIGGER media_bd BEFORE DELETE ON media BEGIN
        DELETE FROM media_fts WHERE docid = old.id;
    END;
";

const CREATE_LEDGER: &str = "
    CREATE TABLE IF NOT EXISTS broken_files (
        filename TEXT PRIMARY KEY NOT NULL,
        etag TEXT NOT NULL
    );
";

const PREFIX_MATCH: &str = "substr(filename, 1, length(?1)) = ?1";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no media record for '{0}'")]
    NotFound(String),

    #[error("schema version {found:?} does not match expected version {expected}")]
    SchemaMismatch { found: Option<i32>, expected: i32 },

    #[error("failed to switch to WAL mode, current mode: {0}")]
    JournalMode(String),

    #[error("the broken-file ledger is not available on a read-only store")]
    ReadOnly,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

/// The media index.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    /// Broken-file ledger, read-write stores only.
    ledger: Option<Mutex<Connection>>,
    mode: OpenMode,
}

impl Store {
    /// Opens (and if needed creates) the index at `path`.
    ///
    /// This function performs the following setup:
    /// * **Ranking**: Registers the `rank` SQL function on the connection.
    /// * **WAL Mode**: Enables Write-Ahead Logging (read-write only).
    /// * **Schema**: Creates the schema, dropping every table first if the
    ///   stored version differs from [`SCHEMA_VERSION`] (read-write only).
    /// * **Archival**: Moves every live record under `archive_prefix` into
    ///   the attic, so content of removable volumes is hidden until the
    ///   volume is seen again.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The database file cannot be opened.
    /// * The initial PRAGMA configurations fail.
    /// * The store is opened read-only and its schema version does not match.
    pub fn open(path: &Path, mode: OpenMode, archive_prefix: Option<&str>) -> Result<Self> {
        info!(path = %path.display(), ?mode, "opening media store");

        let conn = match mode {
            OpenMode::ReadWrite => Connection::open(path)?,
            OpenMode::ReadOnly => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };

        rank::register(&conn)?;
        conn.set_prepared_statement_cache_capacity(100);

        let ledger = match mode {
            OpenMode::ReadWrite => {
                configure(&conn)?;
                let rebuilt = ensure_schema(&conn)?;
                Some(Mutex::new(open_ledger(&ledger_path(path), rebuilt)?))
            }
            OpenMode::ReadOnly => {
                let found = schema_version(&conn)?;
                if found != Some(SCHEMA_VERSION) {
                    return Err(StoreError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
                None
            }
        };

        let store = Self {
            conn: Mutex::new(conn),
            ledger,
            mode,
        };

        if let Some(prefix) = archive_prefix {
            if mode == OpenMode::ReadWrite {
                let archived = store.archive(prefix)?;
                debug!(prefix, archived, "archived removable media at startup");
            } else {
                warn!(prefix, "ignoring archive prefix for a read-only store");
            }
        }

        Ok(store)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave the connection itself
        // in a torn state, so the guard is reused.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Connection>> {
        let ledger = self.ledger.as_ref().ok_or(StoreError::ReadOnly)?;
        Ok(ledger.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Inserts a record, replacing any existing record with the same path.
    ///
    /// Any attic row for the same path is discarded in the same step.
    pub fn upsert(&self, record: &MediaRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO media ({MEDIA_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT (filename) DO UPDATE SET
                content_type = excluded.content_type,
                etag = excluded.etag,
                title = excluded.title,
                date = excluded.date,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                genre = excluded.genre,
                disc_number = excluded.disc_number,
                track_number = excluded.track_number,
                duration = excluded.duration,
                width = excluded.width,
                height = excluded.height,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                kind = excluded.kind"
        );

        let mut conn = self.conn();
        let sp = conn.savepoint()?;

        sp.prepare_cached(&sql)?.execute(params![
            record.filename,
            record.content_type,
            record.etag,
            record.title,
            record.date,
            record.author,
            record.album,
            record.album_artist,
            record.genre,
            record.disc_number,
            record.track_number,
            record.duration,
            record.width,
            record.height,
            record.latitude,
            record.longitude,
            record.kind,
        ])?;

        sp.prepare_cached("DELETE FROM media_attic WHERE filename = ?1")?
            .execute([&record.filename])?;

        sp.commit()?;

        trace!(filename = %record.filename, "upserted record");

        Ok(())
    }

    /// Deletes the live record for `path`, returning whether one existed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let conn = self.conn();
        let removed = conn
            .prepare_cached("DELETE FROM media WHERE filename = ?1")?
            .execute([path])?;

        Ok(removed > 0)
    }

    /// Deletes every live record below the directory `dir`.
    pub fn remove_under(&self, dir: &str) -> Result<usize> {
        let prefix = dir_prefix(dir);
        let conn = self.conn();
        let removed = conn
            .prepare_cached(&format!("DELETE FROM media WHERE {PREFIX_MATCH}"))?
            .execute([&prefix])?;

        Ok(removed)
    }

    /// Fetches the live record for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the path is not indexed.
    pub fn lookup(&self, path: &str) -> Result<MediaRecord> {
        let conn = self.conn();
        let record = conn
            .prepare_cached(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media WHERE filename = ?1"
            ))?
            .query_row([path], MediaRecord::from_row)
            .optional()?;

        record.ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    /// Returns the stored change-tag for `path`, or an empty string if the
    /// path is unknown.
    pub fn change_tag(&self, path: &str) -> Result<String> {
        let conn = self.conn();
        let etag: Option<String> = conn
            .prepare_cached("SELECT etag FROM media WHERE filename = ?1")?
            .query_row([path], |row| row.get(0))
            .optional()?;

        Ok(etag.unwrap_or_default())
    }

    /// Searches records of `kind`.
    ///
    /// A blank term lists records in storage order. Otherwise each word of
    /// the term is matched as a prefix against title, artist and album, and
    /// results are ordered by descending relevance. A negative `limit`
    /// means no limit.
    pub fn search(&self, term: &str, kind: MediaKind, limit: i64) -> Result<Vec<MediaRecord>> {
        let term = term.trim();
        if term.is_empty() {
            let (sql, mut values) =
                SelectBuilder::new(&format!("SELECT {MEDIA_COLUMNS} FROM media"))
                    .kind(kind)
                    .then("ORDER BY id LIMIT ?")
                    .build();
            values.push(limit.into());

            let conn = self.conn();
            let mut stmt = conn.prepare_cached(&sql)?;
            let results = stmt
                .query_map(params_from_iter(values), MediaRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            return Ok(results);
        }

        let Some(fts) = fts_query(term) else {
            return Ok(Vec::new());
        };

        // Column weights: title 1.0, artist 0.5, album 0.75.
        let sql = format!(
            "SELECT {MEDIA_COLUMNS} FROM media
             JOIN (
                SELECT docid, rank(matchinfo(media_fts, 'pcx'), 1.0, 0.5, 0.75) AS score
                FROM media_fts
                WHERE media_fts MATCH ?1
             ) AS ranked ON media.id = ranked.docid
             WHERE media.kind = ?2
             ORDER BY ranked.score DESC, media.id
             LIMIT ?3"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        let results = stmt
            .query_map(params![fts, kind, limit], MediaRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(results)
    }

    /// Finds albums with a song matching `term` (all albums if the term is
    /// blank).
    pub fn search_albums(&self, term: &str, limit: i64) -> Result<Vec<Album>> {
        let term = term.trim();
        let mut builder = SelectBuilder::new("SELECT album, album_artist FROM media")
            .kind(MediaKind::Audio)
            .predicate("album <> ''");

        if !term.is_empty() {
            let Some(fts) = fts_query(term) else {
                return Ok(Vec::new());
            };
            builder = builder.equals(
                "id IN (SELECT docid FROM media_fts WHERE media_fts MATCH ?)",
                Some(fts.as_str()),
            );
        }

        let (sql, values) = builder
            .then("GROUP BY album, album_artist ORDER BY album_artist, album")
            .page(limit, 0)
            .build();

        self.query_albums(&sql, values)
    }

    /// Lists songs matching `filter`, in album and track order.
    pub fn list_songs(&self, filter: &Filter) -> Result<Vec<MediaRecord>> {
        let (sql, values) = SelectBuilder::new(&format!("SELECT {MEDIA_COLUMNS} FROM media"))
            .kind(MediaKind::Audio)
            .filter(filter)
            .then("ORDER BY album_artist, album, disc_number, track_number, title, filename")
            .page(filter.limit, filter.offset)
            .build();

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        let results = stmt
            .query_map(params_from_iter(values), MediaRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(results)
    }

    /// Lists the songs of one album, in disc and track order.
    pub fn album_songs(&self, album: &Album) -> Result<Vec<MediaRecord>> {
        self.list_songs(
            &Filter::new()
                .with_album(album.title.as_str())
                .with_album_artist(album.artist.as_str()),
        )
    }

    /// Lists albums having at least one song matching `filter`.
    pub fn list_albums(&self, filter: &Filter) -> Result<Vec<Album>> {
        let (sql, values) = SelectBuilder::new("SELECT album, album_artist FROM media")
            .kind(MediaKind::Audio)
            .predicate("album <> ''")
            .filter(filter)
            .then("GROUP BY album, album_artist ORDER BY album_artist, album")
            .page(filter.limit, filter.offset)
            .build();

        self.query_albums(&sql, values)
    }

    /// Lists distinct artists, or album artists if `by_album_artist` is set.
    pub fn list_artists(&self, by_album_artist: bool, filter: &Filter) -> Result<Vec<String>> {
        let (column, not_empty) = if by_album_artist {
            ("album_artist", "album_artist <> ''")
        } else {
            ("artist", "artist <> ''")
        };

        let (sql, values) = SelectBuilder::new(&format!("SELECT {column} FROM media"))
            .kind(MediaKind::Audio)
            .predicate(not_empty)
            .filter(filter)
            .then(&format!("GROUP BY {column} ORDER BY {column}"))
            .page(filter.limit, filter.offset)
            .build();

        self.query_strings(&sql, values)
    }

    /// Lists distinct genres of songs matching `filter`.
    pub fn list_genres(&self, filter: &Filter) -> Result<Vec<String>> {
        let (sql, values) = SelectBuilder::new("SELECT genre FROM media")
            .kind(MediaKind::Audio)
            .predicate("genre <> ''")
            .filter(filter)
            .then("GROUP BY genre ORDER BY genre")
            .page(filter.limit, filter.offset)
            .build();

        self.query_strings(&sql, values)
    }

    /// Whether any live record of `kind` exists.
    pub fn has_media(&self, kind: MediaKind) -> Result<bool> {
        let conn = self.conn();
        let exists = conn
            .prepare_cached("SELECT EXISTS (SELECT 1 FROM media WHERE kind = ?1)")?
            .query_row([kind], |row| row.get(0))?;

        Ok(exists)
    }

    fn query_albums(&self, sql: &str, values: Vec<rusqlite::types::Value>) -> Result<Vec<Album>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql)?;
        let results = stmt
            .query_map(params_from_iter(values), Album::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(results)
    }

    fn query_strings(&self, sql: &str, values: Vec<rusqlite::types::Value>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql)?;
        let results = stmt
            .query_map(params_from_iter(values), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(results)
    }

    /// Removes records whose file no longer exists on disk.
    ///
    /// The existence checks run without holding the store lock.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    pub fn prune_deleted(&self) -> Result<usize> {
        let filenames: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT filename FROM media")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
        };

        let missing: Vec<String> = filenames
            .into_iter()
            .filter(|filename| !Path::new(filename).exists())
            .collect();

        if !missing.is_empty() {
            let mut conn = self.conn();
            let sp = conn.savepoint()?;
            {
                let mut stmt = sp.prepare_cached("DELETE FROM media WHERE filename = ?1")?;
                for filename in &missing {
                    stmt.execute([filename])?;
                }
            }
            sp.commit()?;
        }

        info!(removed = missing.len(), "pruned deleted files");

        Ok(missing.len())
    }

    /// Moves every live record whose path starts with `prefix` to the attic.
    ///
    /// The move is a single transaction; on failure nothing is moved.
    ///
    /// # Returns
    ///
    /// The number of records archived.
    pub fn archive(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn();
        let sp = conn.savepoint()?;

        let moved = sp.execute(
            &format!(
                "INSERT OR REPLACE INTO media_attic ({MEDIA_COLUMNS})
                 SELECT {MEDIA_COLUMNS} FROM media WHERE {PREFIX_MATCH}"
            ),
            [prefix],
        )?;
        sp.execute(&format!("DELETE FROM media WHERE {PREFIX_MATCH}"), [prefix])?;

        sp.commit()?;

        debug!(prefix, moved, "archived records");

        Ok(moved)
    }

    /// Moves every attic record whose path starts with `prefix` back to the
    /// live table.
    ///
    /// Where a live record already exists for a path the live one is kept.
    ///
    /// # Returns
    ///
    /// The number of records restored.
    pub fn restore(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn();
        let sp = conn.savepoint()?;

        sp.execute(
            &format!(
                "DELETE FROM media_attic
                 WHERE {PREFIX_MATCH} AND filename IN (SELECT filename FROM media)"
            ),
            [prefix],
        )?;
        let moved = sp.execute(
            &format!(
                "INSERT INTO media ({MEDIA_COLUMNS})
                 SELECT {MEDIA_COLUMNS} FROM media_attic WHERE {PREFIX_MATCH}"
            ),
            [prefix],
        )?;
        sp.execute(
            &format!("DELETE FROM media_attic WHERE {PREFIX_MATCH}"),
            [prefix],
        )?;

        sp.commit()?;

        debug!(prefix, moved, "restored records");

        Ok(moved)
    }

    /// Number of live records.
    pub fn size(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .prepare_cached("SELECT COUNT(*) FROM media")?
            .query_row([], |row| row.get(0))?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Records that extraction of `path` is about to start.
    ///
    /// The marker is durable before the (possibly crashing) extraction runs,
    /// and an open scan batch is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] on a read-only store.
    pub fn insert_broken_file(&self, path: &str, etag: &str) -> Result<()> {
        let ledger = self.ledger()?;
        ledger
            .prepare_cached("INSERT OR REPLACE INTO broken_files (filename, etag) VALUES (?1, ?2)")?
            .execute(params![path, etag])?;

        Ok(())
    }

    /// Whether `path` was marked broken under this exact change-tag.
    pub fn is_broken_file(&self, path: &str, etag: &str) -> Result<bool> {
        let conn = self.ledger()?;
        let broken = conn
            .prepare_cached(
                "SELECT EXISTS (SELECT 1 FROM broken_files WHERE filename = ?1 AND etag = ?2)",
            )?
            .query_row(params![path, etag], |row| row.get(0))?;

        Ok(broken)
    }

    pub fn remove_broken_file(&self, path: &str) -> Result<()> {
        let conn = self.ledger()?;
        conn.prepare_cached("DELETE FROM broken_files WHERE filename = ?1")?
            .execute([path])?;

        Ok(())
    }

    /// Opens a scan batch: subsequent writes share one transaction until
    /// [`Store::commit_batch`]. The lock is not held in between.
    pub fn begin_batch(&self) -> Result<()> {
        let conn = self.conn();
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }

        Ok(())
    }

    /// Commits the open scan batch, if any.
    pub fn commit_batch(&self) -> Result<()> {
        let conn = self.conn();
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }

        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.commit_batch() {
            warn!("failed to commit pending batch: {e}");
        }
    }
}

/// Configures the connection the way the daemon expects.
///
/// * **WAL Mode**: Enables Write-Ahead Logging so readers are not blocked.
/// * **Performance Tuning**: Sets synchronous mode to `NORMAL` and increases
///   the cache size.
fn configure(conn: &Connection) -> Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    if journal_mode != "wal" {
        return Err(StoreError::JournalMode(journal_mode));
    }

    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = -16000; -- Use 16MB of RAM for cache
    ",
    )?;

    Ok(())
}

fn schema_version(conn: &Connection) -> rusqlite::Result<Option<i32>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(None);
    }

    conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .optional()
}

/// Creates the schema, discarding every table first if the stored version
/// is not [`SCHEMA_VERSION`].
///
/// This is only acceptable because the index is derived from the filesystem
/// and can always be rebuilt by rescanning.
///
/// # Returns
///
/// Whether the schema was (re)created.
fn ensure_schema(conn: &Connection) -> Result<bool> {
    let found = schema_version(conn)?;
    if found == Some(SCHEMA_VERSION) {
        return Ok(false);
    }

    match found {
        Some(found) => info!(found, expected = SCHEMA_VERSION, "rebuilding index for new schema"),
        None => info!("creating index schema"),
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(DROP_SCHEMA)?;
    tx.execute_batch(CREATE_SCHEMA)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    tx.commit()?;

    Ok(true)
}

/// Location of the broken-file ledger for the index at `db_path`.
pub fn ledger_path(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push("-broken");
    PathBuf::from(name)
}

/// Opens the ledger, emptying it when the index itself was rebuilt.
fn open_ledger(path: &Path, reset: bool) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(CREATE_LEDGER)?;

    if reset {
        conn.execute("DELETE FROM broken_files", [])?;
    }

    Ok(conn)
}

/// `dir` with exactly one trailing separator, for prefix matching.
pub fn dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}
