//! Library snapshot and lookup backends.
//!
//! Two backends answer the same three questions ("first record in this title
//! bucket / artist bucket / whole library that passes a test"):
//! - [`LibraryIndex`] loads every row once and answers from memory.
//! - [`SqliteBackend`] answers each lookup with a query against the store.
//!
//! Both return candidates in library row order, so a fixed library and a
//! fixed track list always resolve identically whichever backend is used.

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, Row};
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ResolveError, Result};
use crate::models::MediaRecord;
use crate::normalize::split_library_artists;
use crate::progress::{create_spinner, format_duration};

/// Columns every backend reads, in `MediaRecord` field order
const SELECT_COLUMNS: &str = "SELECT id, path, title, artist, album_artist, album, duration FROM media_file";

/// Index mapping a lowercased key to entry positions in load order
pub type BucketIndex = FxHashMap<String, Vec<usize>>;

// ============================================================================
// Library Entries
// ============================================================================

/// A library record with its lowercased match fields computed once.
#[derive(Clone, Debug)]
pub struct LibraryEntry {
    pub record: MediaRecord,
    pub title_lower: String,
    pub artist_lower: String,
    pub album_artist_lower: String,
}

impl LibraryEntry {
    pub fn new(record: MediaRecord) -> Self {
        Self {
            title_lower: record.title.to_lowercase(),
            artist_lower: record.artist.to_lowercase(),
            album_artist_lower: record.album_artist.to_lowercase(),
            record,
        }
    }
}

/// Acceptance test applied to each candidate, in order
pub type Accept<'a> = &'a dyn Fn(&LibraryEntry) -> bool;

/// Lookup contract shared by the in-memory index and the direct-query store.
pub trait LibraryBackend {
    /// First entry whose lowercased title equals `title_lower` and passes `accept`
    fn lookup_by_title(&self, title_lower: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>>;

    /// First entry crediting the artist token `artist` that passes `accept`
    fn lookup_by_artist(&self, artist: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>>;

    /// First entry of the whole library that passes `accept`
    fn scan(&self, accept: Accept<'_>) -> Result<Option<MediaRecord>>;

    /// Number of records in the library
    fn record_count(&self) -> Result<usize>;
}

/// Which backend a run uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Load the whole library once and match from memory
    #[default]
    Memory,
    /// Query the library store for every lookup (low memory, slower)
    Sqlite,
}

// ============================================================================
// Store Access
// ============================================================================

/// Open the library store read-only and verify it holds a `media_file` table.
pub fn open_library(path: &Path) -> Result<Connection> {
    let open_err = |source| ResolveError::LibraryOpen {
        path: path.to_path_buf(),
        source,
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(open_err)?;

    // Opening is lazy; touch the table so a wrong file fails here
    conn.query_row("SELECT COUNT(*) FROM media_file", [], |row| row.get::<_, i64>(0))
        .map_err(open_err)?;

    Ok(conn)
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<MediaRecord> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    Ok(MediaRecord {
        id: text(0)?,
        path: text(1)?,
        title: text(2)?,
        artist: text(3)?,
        album_artist: text(4)?,
        album: text(5)?,
        duration: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
    })
}

/// Read `limit` sample rows in library order
pub fn sample_records(conn: &Connection, limit: usize) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY rowid LIMIT ?1", SELECT_COLUMNS))?;
    let records = stmt
        .query_map([limit as i64], read_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

// ============================================================================
// In-memory Backend
// ============================================================================

/// One-shot snapshot of the library with title and artist buckets.
///
/// Built in a single pass and never mutated afterwards. Records whose title
/// and artist are both empty stay in the entry list but are not bucketed.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    entries: Vec<LibraryEntry>,
    title_index: BucketIndex,
    artist_index: BucketIndex,
}

impl LibraryIndex {
    /// Load every `media_file` row in row order.
    pub fn load(conn: &Connection) -> Result<Self> {
        let start = std::time::Instant::now();
        let spinner = create_spinner("Loading library");

        let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", SELECT_COLUMNS))?;
        let mut rows = stmt.query([])?;
        let mut index = Self::default();
        while let Some(row) = rows.next()? {
            index.push(read_record(row)?);
        }

        spinner.finish_with_message(format!("Loaded {} library records", index.len()));
        info!(
            records = index.len(),
            titles = index.title_bucket_count(),
            artists = index.artist_bucket_count(),
            "library index built in {}",
            format_duration(start.elapsed())
        );
        Ok(index)
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = MediaRecord>,
    {
        let mut index = Self::default();
        for record in records {
            index.push(record);
        }
        index
    }

    fn push(&mut self, record: MediaRecord) {
        let entry = LibraryEntry::new(record);
        let pos = self.entries.len();

        if !entry.title_lower.is_empty() {
            self.title_index
                .entry(entry.title_lower.clone())
                .or_default()
                .push(pos);
        }
        for token in split_library_artists(&entry.artist_lower) {
            self.artist_index.entry(token.to_string()).or_default().push(pos);
        }

        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn title_bucket_count(&self) -> usize {
        self.title_index.len()
    }

    pub fn artist_bucket_count(&self) -> usize {
        self.artist_index.len()
    }

    /// Entries filed under a title key, in load order
    pub fn title_bucket(&self, title_lower: &str) -> impl Iterator<Item = &LibraryEntry> {
        self.bucket(&self.title_index, title_lower)
    }

    /// Entries filed under an artist token, in load order
    pub fn artist_bucket(&self, artist: &str) -> impl Iterator<Item = &LibraryEntry> {
        self.bucket(&self.artist_index, artist)
    }

    fn bucket<'a>(
        &'a self,
        index: &'a BucketIndex,
        key: &str,
    ) -> impl Iterator<Item = &'a LibraryEntry> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|&pos| self.entries.get(pos))
    }
}

fn first_accepted<'a>(
    mut candidates: impl Iterator<Item = &'a LibraryEntry>,
    accept: Accept<'_>,
) -> Option<MediaRecord> {
    candidates.find(|entry| accept(*entry)).map(|entry| entry.record.clone())
}

impl LibraryBackend for LibraryIndex {
    fn lookup_by_title(&self, title_lower: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        Ok(first_accepted(self.title_bucket(title_lower), accept))
    }

    fn lookup_by_artist(&self, artist: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        Ok(first_accepted(self.artist_bucket(artist), accept))
    }

    fn scan(&self, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        Ok(first_accepted(self.entries.iter(), accept))
    }

    fn record_count(&self) -> Result<usize> {
        Ok(self.len())
    }
}

// ============================================================================
// Direct-query Backend
// ============================================================================

/// Answers lookups with queries against the open store.
///
/// SQLite's `LOWER()` only folds ASCII, so a `unicode_lower()` function is
/// registered that lowercases exactly like the in-memory index does.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn new(conn: Connection) -> Result<Self> {
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|s| s.to_lowercase()))
            },
        )?;
        debug!("registered unicode_lower on library connection");
        Ok(Self { conn })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(open_library(path)?)
    }

    fn first_row(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        accept: Accept<'_>,
    ) -> Result<Option<MediaRecord>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            let entry = LibraryEntry::new(read_record(row)?);
            if accept(&entry) {
                return Ok(Some(entry.record));
            }
        }
        Ok(None)
    }
}

impl LibraryBackend for SqliteBackend {
    fn lookup_by_title(&self, title_lower: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        if title_lower.is_empty() {
            return Ok(None);
        }
        let sql = format!("{} WHERE unicode_lower(title) = ?1 ORDER BY rowid", SELECT_COLUMNS);
        self.first_row(&sql, &[&title_lower], accept)
    }

    fn lookup_by_artist(&self, artist: &str, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        if artist.is_empty() {
            return Ok(None);
        }
        // Substring prefilter in SQL, exact token check in Rust
        let sql = format!(
            "{} WHERE instr(unicode_lower(artist), ?1) > 0 ORDER BY rowid",
            SELECT_COLUMNS
        );
        let token_match = |entry: &LibraryEntry| {
            split_library_artists(&entry.artist_lower).contains(&artist) && accept(entry)
        };
        self.first_row(&sql, &[&artist], &token_match)
    }

    fn scan(&self, accept: Accept<'_>) -> Result<Option<MediaRecord>> {
        let sql = format!("{} ORDER BY rowid", SELECT_COLUMNS);
        self.first_row(&sql, &[], accept)
    }

    fn record_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM media_file", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
