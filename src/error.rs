//! Fatal error conditions for a playlist run.
//!
//! Per-track problems (missing fields, no match, no file path) are never
//! errors; they land in the failure report. Only conditions that make the
//! whole run unusable surface here.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The library store could not be opened or is not a media library
    #[error("cannot open library {path}: {source}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The library store failed while being read
    #[error("library read failed: {0}")]
    Library(#[from] rusqlite::Error),

    /// The external track list could not be parsed
    #[error("invalid track list {path}: {source}")]
    TrackList {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure report or stats could not be serialized
    #[error("serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    /// Output path rejected before anything was opened
    #[error("unsafe output path: {0}")]
    UnsafeOutput(String),
}

impl ResolveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
