//! Resolve external playlist tracks against a local media library and
//! export an M3U playlist plus a report of unresolved tracks.

pub mod config;
pub mod error;
pub mod export;
pub mod index;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod safety;

pub use config::{Config, ExportConfig};
pub use error::{ResolveError, Result};
pub use export::{run_pipeline, spawn_pipeline, PlaylistExporter};
pub use index::{BackendKind, LibraryBackend, LibraryIndex, SqliteBackend};
pub use matcher::{MatchStrategy, Matcher};
pub use models::{ExternalTrack, FailureReason, MatchOutcome, MediaRecord};
