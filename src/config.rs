//! Run configuration.
//!
//! Everything a run needs is passed in explicitly; the binaries build these
//! structs from command-line arguments and environment fallbacks.

use std::path::PathBuf;

use crate::index::BackendKind;

/// Prefix the media server mounts the library under
pub const DEFAULT_MOUNT_PREFIX: &str = "/music";

/// Playlist name used when none is given
pub const DEFAULT_PLAYLIST_NAME: &str = "Spotify Playlist";

/// Suffix appended to the playlist stem for the failure report
pub const FAILURE_REPORT_SUFFIX: &str = "_failed_matches.json";

/// Settings for one library-to-playlist run
#[derive(Debug, Clone)]
pub struct Config {
    /// Library database (Navidrome `navidrome.db`)
    pub library_path: PathBuf,
    pub backend: BackendKind,
    pub export: ExportConfig,
}

impl Config {
    pub fn new(library_path: impl Into<PathBuf>, export: ExportConfig) -> Self {
        Self {
            library_path: library_path.into(),
            backend: BackendKind::default(),
            export,
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }
}

/// Settings for playlist and failure-report output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Written on the `#PLAYLIST:` line
    pub playlist_name: String,
    /// Joined in front of every library path
    pub mount_prefix: String,
    /// Directory for the failure report; `None` puts it next to the playlist
    pub report_dir: Option<PathBuf>,
}

impl ExportConfig {
    pub fn new(playlist_name: impl Into<String>) -> Self {
        Self {
            playlist_name: playlist_name.into(),
            ..Self::default()
        }
    }

    pub fn with_mount_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mount_prefix = prefix.into();
        self
    }

    pub fn with_report_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.report_dir = dir;
        self
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            playlist_name: DEFAULT_PLAYLIST_NAME.to_string(),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            report_dir: None,
        }
    }
}
