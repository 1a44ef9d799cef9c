//! Core data models for playlist resolution.
//!
//! This module contains the library row, the external track descriptor,
//! match outcomes and the run statistics shared by the matcher, the
//! exporter and both binaries.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ResolveError, Result};

// ============================================================================
// Library Models
// ============================================================================

/// One row of the local media library (Navidrome `media_file`).
/// NULL text columns are read as empty strings.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: String,
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub duration: f64, // seconds, as stored by the library
}

impl MediaRecord {
    /// A match without a storage path cannot become a playlist entry
    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }
}

// ============================================================================
// External Track Models
// ============================================================================

/// Track descriptor from the external playlist source.
///
/// `artist_name` is a comma-joined credit list, first entry = primary artist.
/// Fields the fetcher emits but resolution ignores (`track_id`, `album_name`,
/// `popularity`, ...) are skipped during deserialization.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ExternalTrack {
    #[serde(default, deserialize_with = "lenient_string")]
    pub track_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub artist_name: String,
    #[serde(default, deserialize_with = "lenient_duration")]
    pub duration_ms: u64,
}

impl ExternalTrack {
    pub fn new(track_name: &str, artist_name: &str, duration_ms: u64) -> Self {
        Self {
            track_name: track_name.to_string(),
            artist_name: artist_name.to_string(),
            duration_ms,
        }
    }

    /// Whole seconds, truncated (215999 ms -> 215)
    pub fn duration_secs(&self) -> u64 {
        self.duration_ms / 1000
    }

    /// Display text used on the EXTINF line
    pub fn display(&self) -> String {
        format!("{} - {}", self.artist_name, self.track_name)
    }
}

/// Null and non-string values read as empty
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        _ => String::new(),
    })
}

/// Accepts integers, floats, numeric strings; everything else is 0
fn lenient_duration<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(0, coerce_duration_ms))
}

pub fn coerce_duration_ms(value: &Value) -> u64 {
    let ms = match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v as f64)
            .or_else(|| n.as_f64())
            .unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if ms.is_finite() && ms > 0.0 {
        ms as u64
    } else {
        0
    }
}

/// Parse a playlist JSON document (array of track objects)
pub fn parse_track_list(json: &str, origin: &std::path::Path) -> Result<Vec<ExternalTrack>> {
    serde_json::from_str(json).map_err(|source| ResolveError::TrackList {
        path: origin.to_path_buf(),
        source,
    })
}

/// Read a playlist JSON file produced by the external fetcher
pub fn load_track_list(path: &std::path::Path) -> Result<Vec<ExternalTrack>> {
    let json = std::fs::read_to_string(path).map_err(|e| ResolveError::io(path, e))?;
    parse_track_list(&json, path)
}

// ============================================================================
// Match Outcomes
// ============================================================================

/// Why a track did not become a playlist entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// A library record matched but has no storage path
    NoFilePath,
    /// No cascade step produced a candidate
    NoMatchFound,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchOutcome {
    Matched(MediaRecord),
    Unmatched(FailureReason),
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// Row of the failure report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMatch {
    pub track_name: String,
    pub artist_name: String,
    pub reason: FailureReason,
}

impl FailedMatch {
    pub fn new(track: &ExternalTrack, reason: FailureReason) -> Self {
        Self {
            track_name: track.track_name.clone(),
            artist_name: track.artist_name.clone(),
            reason,
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-strategy matching statistics for one run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct MatchingStats {
    // Cascade hits, in cascade order
    pub exact_title_matches: usize,
    pub core_title_matches: usize,
    pub title_scan_matches: usize,
    pub artist_first_matches: usize,

    // Failures
    pub no_file_path: usize,
    pub no_match_found: usize,

    // Totals
    pub total_tracks: usize,
    pub total_matches: usize,

    // Library shape
    pub library_records: usize,

    pub elapsed_seconds: f64,
}

impl MatchingStats {
    /// Calculate match rate as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.total_tracks == 0 {
            0.0
        } else {
            100.0 * self.total_matches as f64 / self.total_tracks as f64
        }
    }

    pub fn total_failures(&self) -> usize {
        self.no_file_path + self.no_match_found
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::debug!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ResolveError::io(path, e))?;
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            processed: self.total_tracks,
            matched: self.total_matches,
            failed: self.total_failures(),
            success_rate: self.match_rate(),
        }
    }
}

/// Completion summary reported at the end of every run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub matched: usize,
    pub failed: usize,
    pub success_rate: f64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Matched {} out of {} tracks ({} failed), success rate {:.1}%",
            self.matched, self.processed, self.failed, self.success_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(json: &str) -> Vec<ExternalTrack> {
        parse_track_list(json, Path::new("tracks.json")).unwrap()
    }

    #[test]
    fn test_duration_variants() {
        let tracks = parse(
            r#"[
                {"track_name": "a", "artist_name": "x", "duration_ms": 215999},
                {"track_name": "b", "artist_name": "x", "duration_ms": "1500"},
                {"track_name": "c", "artist_name": "x", "duration_ms": ""},
                {"track_name": "d", "artist_name": "x", "duration_ms": null},
                {"track_name": "e", "artist_name": "x"},
                {"track_name": "f", "artist_name": "x", "duration_ms": -20},
                {"track_name": "g", "artist_name": "x", "duration_ms": 2500.7}
            ]"#,
        );
        let durations: Vec<u64> = tracks.iter().map(|t| t.duration_ms).collect();
        assert_eq!(durations, vec![215999, 1500, 0, 0, 0, 0, 2500]);
        assert_eq!(tracks[0].duration_secs(), 215);
    }

    #[test]
    fn test_extra_fields_and_missing_names() {
        let tracks = parse(
            r#"[{"track_id": "1x", "track_name": null, "album_name": "Alb",
                 "popularity": "", "duration_ms": 1000}]"#,
        );
        assert_eq!(tracks[0].track_name, "");
        assert_eq!(tracks[0].artist_name, "");
        assert_eq!(tracks[0].duration_ms, 1000);
    }

    #[test]
    fn test_invalid_track_list_is_error() {
        let err = parse_track_list("{not json", Path::new("bad.json")).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_failure_reason_serialization() {
        let failed = FailedMatch::new(
            &ExternalTrack::new("Unknown Song", "Nobody", 1000),
            FailureReason::NoMatchFound,
        );
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"track_name":"Unknown Song","artist_name":"Nobody","reason":"NoMatchFound"}"#
        );
        assert_eq!(
            serde_json::to_string(&FailureReason::NoFilePath).unwrap(),
            r#""NoFilePath""#
        );
    }

    #[test]
    fn test_match_rate() {
        let mut stats = MatchingStats::default();
        assert_eq!(stats.match_rate(), 0.0);
        stats.total_tracks = 4;
        stats.total_matches = 3;
        stats.no_match_found = 1;
        assert_eq!(stats.match_rate(), 75.0);
        let summary = stats.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.to_string(),
            "Matched 3 out of 4 tracks (1 failed), success rate 75.0%"
        );
    }

    #[test]
    fn test_has_path() {
        let mut record = MediaRecord::default();
        assert!(!record.has_path());
        record.path = "  ".to_string();
        assert!(record.has_path());
        record.path = "A/b.flac".to_string();
        assert!(record.has_path());
    }
}
