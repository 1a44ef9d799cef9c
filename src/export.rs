//! Playlist export and the end-to-end pipeline.
//!
//! The exporter walks the track list once, resolving each track through the
//! matcher, and keeps everything in memory until the loop is done. Writing
//! stages both artifacts as temporary files next to their destinations and
//! only then renames them into place, so a failed run leaves no truncated
//! playlist behind.

use crossbeam_channel::Receiver;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::{Config, ExportConfig, FAILURE_REPORT_SUFFIX};
use crate::error::{ResolveError, Result};
use crate::index::{open_library, BackendKind, LibraryBackend, LibraryIndex, SqliteBackend};
use crate::matcher::Matcher;
use crate::models::{ExternalTrack, FailedMatch, MatchOutcome, MatchingStats, RunSummary};
use crate::progress::{ChannelProgress, PipelineEvent, ProgressEvent, ProgressListener};
use crate::safety::validate_output_path;

pub const M3U_HEADER: &str = "#EXTM3U";

/// Join a library path under the mount prefix with exactly one `/` between them
pub fn join_mount(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// `<dir>/<playlist stem>_failed_matches.json`; `dir` defaults to the playlist's directory
pub fn failure_report_path(playlist_path: &Path, report_dir: Option<&Path>) -> PathBuf {
    let stem = playlist_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("playlist");
    let dir = report_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| parent_dir(playlist_path));
    dir.join(format!("{}{}", stem, FAILURE_REPORT_SUFFIX))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ============================================================================
// Exporter
// ============================================================================

pub struct PlaylistExporter {
    config: ExportConfig,
}

impl PlaylistExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Resolve every track and build both artifacts in memory.
    ///
    /// Every track ends up in exactly one of the playlist or the failure
    /// list. Only a backend failure aborts the loop.
    pub fn build(
        &self,
        tracks: &[ExternalTrack],
        matcher: &Matcher<'_>,
        listener: &dyn ProgressListener,
    ) -> Result<ExportPlan> {
        let start = Instant::now();
        let total = tracks.len();
        info!("Processing {} tracks...", total);
        listener.on_start(total);

        let mut lines = vec![
            M3U_HEADER.to_string(),
            format!("#PLAYLIST:{}", self.config.playlist_name),
        ];
        let mut failures = Vec::new();
        let mut stats = MatchingStats {
            library_records: matcher.backend().record_count()?,
            ..Default::default()
        };

        for (i, track) in tracks.iter().enumerate() {
            let resolution = matcher.resolve(track)?;
            stats.record(&resolution);

            match resolution.outcome {
                MatchOutcome::Matched(record) => {
                    lines.push(format!("#EXTINF:{},{}", track.duration_secs(), track.display()));
                    lines.push(join_mount(&self.config.mount_prefix, &record.path));
                }
                MatchOutcome::Unmatched(reason) => {
                    failures.push(FailedMatch::new(track, reason));
                }
            }

            listener.on_progress(ProgressEvent {
                processed: i + 1,
                total,
                matched: stats.total_matches,
            });
        }

        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        listener.on_finish(ProgressEvent {
            processed: total,
            total,
            matched: stats.total_matches,
        });

        Ok(ExportPlan {
            lines,
            failures,
            stats,
            report_dir: self.config.report_dir.clone(),
        })
    }
}

/// Paths actually written by [`ExportPlan::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub playlist: PathBuf,
    pub failure_report: Option<PathBuf>,
}

/// Fully built output of a run, not yet on disk
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub lines: Vec<String>,
    pub failures: Vec<FailedMatch>,
    pub stats: MatchingStats,
    report_dir: Option<PathBuf>,
}

impl ExportPlan {
    pub fn playlist_text(&self) -> String {
        self.lines.join("\n")
    }

    /// Pretty JSON for the failure report, `None` when every track matched
    pub fn failure_report_json(&self) -> Result<Option<String>> {
        if self.failures.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string_pretty(&self.failures)?))
    }

    pub fn summary(&self) -> RunSummary {
        self.stats.summary()
    }

    /// Write the playlist (and the failure report, if any) atomically.
    pub fn write(&self, playlist_path: &Path) -> Result<WrittenFiles> {
        let report = self.failure_report_json()?;
        let report_path = failure_report_path(playlist_path, self.report_dir.as_deref());

        // Stage everything before touching the destinations
        let staged_playlist = stage(playlist_path, &self.playlist_text())?;
        let staged_report = match &report {
            Some(json) => Some(stage(&report_path, json)?),
            None => None,
        };

        persist(staged_playlist, playlist_path)?;
        info!("M3U playlist written to: {}", playlist_path.display());

        let failure_report = match staged_report {
            Some(staged) => {
                persist(staged, &report_path)?;
                info!(
                    "{} failed matches written to: {}",
                    self.failures.len(),
                    report_path.display()
                );
                Some(report_path)
            }
            None => None,
        };

        Ok(WrittenFiles {
            playlist: playlist_path.to_path_buf(),
            failure_report,
        })
    }
}

fn stage(destination: &Path, contents: &str) -> Result<NamedTempFile> {
    let dir = parent_dir(destination);
    let mut file = NamedTempFile::new_in(&dir).map_err(|e| ResolveError::io(&dir, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ResolveError::io(file.path(), e))?;
    Ok(file)
}

fn persist(file: NamedTempFile, destination: &Path) -> Result<()> {
    file.persist(destination)
        .map_err(|e| ResolveError::io(destination, e.error))?;
    Ok(())
}

// ============================================================================
// Pipeline
// ============================================================================

/// Outcome of a complete run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub summary: RunSummary,
    pub stats: MatchingStats,
    pub files: WrittenFiles,
}

/// Open the library with the configured backend
pub fn open_backend(config: &Config) -> Result<Box<dyn LibraryBackend>> {
    info!("Opening library database: {}", config.library_path.display());
    let conn = open_library(&config.library_path)?;
    let backend: Box<dyn LibraryBackend> = match config.backend {
        BackendKind::Memory => Box::new(LibraryIndex::load(&conn)?),
        BackendKind::Sqlite => Box::new(SqliteBackend::new(conn)?),
    };
    Ok(backend)
}

/// Build the backend, resolve every track, write both artifacts.
pub fn run_pipeline(
    config: &Config,
    tracks: &[ExternalTrack],
    playlist_path: &Path,
    listener: &dyn ProgressListener,
) -> Result<PipelineResult> {
    validate_output_path(playlist_path, &[config.library_path.as_path()])?;

    let backend = open_backend(config)?;
    let matcher = Matcher::new(backend.as_ref());
    let exporter = PlaylistExporter::new(config.export.clone());

    let plan = exporter.build(tracks, &matcher, listener)?;
    let files = plan.write(playlist_path)?;

    let summary = plan.summary();
    info!("Completed! {}", summary);
    if summary.failed > 0 {
        warn!("{} tracks could not be resolved", summary.failed);
    }
    plan.stats.log_phase("final");

    Ok(PipelineResult {
        summary,
        stats: plan.stats,
        files,
    })
}

/// Run the whole pipeline on a dedicated worker thread.
///
/// Events are fire-and-forget: dropping the receiver never affects the run.
/// There is no cancellation; join the handle before starting another run
/// against the same output.
pub fn spawn_pipeline(
    config: Config,
    tracks: Vec<ExternalTrack>,
    playlist_path: PathBuf,
) -> (JoinHandle<Result<PipelineResult>>, Receiver<PipelineEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = std::thread::spawn(move || {
        let listener = ChannelProgress::new(tx.clone());
        let result = run_pipeline(&config, &tracks, &playlist_path, &listener);
        let event = match &result {
            Ok(done) => PipelineEvent::Finished(done.summary),
            Err(e) => PipelineEvent::Failed(e.to_string()),
        };
        let _ = tx.send(event);
        result
    });
    (handle, rx)
}
