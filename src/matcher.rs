//! Cascading track matcher.
//!
//! A track is resolved by walking [`CASCADE`] from strict to loose and
//! stopping at the first strategy that returns a record:
//! 1. **Exact title**: title bucket lookup, artist test
//! 2. **Core title**: bucket lookup on the title without its parenthetical
//! 3. **Title scan**: whole library in load order, title and artist substring tests
//! 4. **Artist first**: primary artist's bucket, title substring test
//!
//! Steps 1-2 are bucket lookups and settle the common case without a full
//! scan. "First" is always first in library row order, so results are
//! reproducible for a fixed library and track list. There is no scoring:
//! an ambiguous library resolves to whichever candidate comes first.

use tracing::trace;

use crate::error::Result;
use crate::index::{LibraryBackend, LibraryEntry};
use crate::models::{ExternalTrack, FailureReason, MatchOutcome, MatchingStats, MediaRecord};
use crate::normalize::TrackQuery;

/// A single cascade step: pure lookup against the backend
pub type StrategyFn = fn(&dyn LibraryBackend, &TrackQuery) -> Result<Option<MediaRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    ExactTitle,
    CoreTitle,
    TitleScan,
    ArtistFirst,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStrategy::ExactTitle => write!(f, "exact title"),
            MatchStrategy::CoreTitle => write!(f, "core title"),
            MatchStrategy::TitleScan => write!(f, "title scan"),
            MatchStrategy::ArtistFirst => write!(f, "artist first"),
        }
    }
}

/// Default strategy order
pub const CASCADE: [(MatchStrategy, StrategyFn); 4] = [
    (MatchStrategy::ExactTitle, exact_title),
    (MatchStrategy::CoreTitle, core_title),
    (MatchStrategy::TitleScan, title_scan),
    (MatchStrategy::ArtistFirst, artist_first),
];

// ============================================================================
// Strategies
// ============================================================================

fn artist_accepted(query: &TrackQuery, entry: &LibraryEntry) -> bool {
    query.accepts_artist(&entry.artist_lower, &entry.album_artist_lower)
}

/// Title bucket for the full lowercased title
pub fn exact_title(backend: &dyn LibraryBackend, query: &TrackQuery) -> Result<Option<MediaRecord>> {
    backend.lookup_by_title(&query.title_lower, &|entry: &LibraryEntry| artist_accepted(query, entry))
}

/// Title bucket for the title with its "(feat. ...)"-style suffix removed.
/// Skipped when the core title equals the full title; an empty core title
/// has no bucket.
pub fn core_title(backend: &dyn LibraryBackend, query: &TrackQuery) -> Result<Option<MediaRecord>> {
    if !query.has_distinct_core_title() {
        return Ok(None);
    }
    backend.lookup_by_title(&query.core_title, &|entry: &LibraryEntry| artist_accepted(query, entry))
}

/// Full library scan with substring tests on title and artist
pub fn title_scan(backend: &dyn LibraryBackend, query: &TrackQuery) -> Result<Option<MediaRecord>> {
    backend.scan(&|entry: &LibraryEntry| query.accepts_title(&entry.title_lower) && artist_accepted(query, entry))
}

/// Primary artist's bucket; artist is implied, only the title is tested.
/// An empty primary artist has no bucket.
pub fn artist_first(backend: &dyn LibraryBackend, query: &TrackQuery) -> Result<Option<MediaRecord>> {
    backend.lookup_by_artist(&query.primary_artist, &|entry: &LibraryEntry| {
        query.accepts_title(&entry.title_lower)
    })
}

// ============================================================================
// Matcher
// ============================================================================

/// Result of resolving one track
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: MatchOutcome,
    /// Strategy that produced the candidate (also set for `NoFilePath`)
    pub strategy: Option<MatchStrategy>,
}

impl Resolution {
    pub fn unmatched() -> Self {
        Self {
            outcome: MatchOutcome::Unmatched(FailureReason::NoMatchFound),
            strategy: None,
        }
    }
}

/// Resolves external tracks against a library backend.
pub struct Matcher<'a> {
    backend: &'a dyn LibraryBackend,
    strategies: Vec<(MatchStrategy, StrategyFn)>,
}

impl<'a> Matcher<'a> {
    pub fn new(backend: &'a dyn LibraryBackend) -> Self {
        Self::with_strategies(backend, CASCADE.to_vec())
    }

    pub fn with_strategies(
        backend: &'a dyn LibraryBackend,
        strategies: Vec<(MatchStrategy, StrategyFn)>,
    ) -> Self {
        Self {
            backend,
            strategies,
        }
    }

    pub fn backend(&self) -> &'a dyn LibraryBackend {
        self.backend
    }

    /// Run the cascade for one track. Errors only on backend failure.
    pub fn resolve(&self, track: &ExternalTrack) -> Result<Resolution> {
        let Some(query) = TrackQuery::from_track(track) else {
            trace!(title = %track.track_name, artist = %track.artist_name, "missing title or artist");
            return Ok(Resolution::unmatched());
        };

        for (strategy, run) in &self.strategies {
            if let Some(record) = run(self.backend, &query)? {
                trace!(title = %track.track_name, %strategy, id = %record.id, "matched");
                let outcome = if record.has_path() {
                    MatchOutcome::Matched(record)
                } else {
                    MatchOutcome::Unmatched(FailureReason::NoFilePath)
                };
                return Ok(Resolution {
                    outcome,
                    strategy: Some(*strategy),
                });
            }
        }

        Ok(Resolution::unmatched())
    }
}

impl MatchingStats {
    /// Count one resolution
    pub fn record(&mut self, resolution: &Resolution) {
        self.total_tracks += 1;
        match resolution.outcome {
            MatchOutcome::Matched(_) => {
                self.total_matches += 1;
                match resolution.strategy {
                    Some(MatchStrategy::ExactTitle) => self.exact_title_matches += 1,
                    Some(MatchStrategy::CoreTitle) => self.core_title_matches += 1,
                    Some(MatchStrategy::TitleScan) => self.title_scan_matches += 1,
                    Some(MatchStrategy::ArtistFirst) => self.artist_first_matches += 1,
                    None => {}
                }
            }
            MatchOutcome::Unmatched(FailureReason::NoFilePath) => self.no_file_path += 1,
            MatchOutcome::Unmatched(FailureReason::NoMatchFound) => self.no_match_found += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LibraryIndex;

    fn record(id: &str, title: &str, artist: &str, album_artist: &str, path: &str) -> MediaRecord {
        MediaRecord {
            id: id.to_string(),
            path: path.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album_artist: album_artist.to_string(),
            ..Default::default()
        }
    }

    fn query(title: &str, artist: &str) -> TrackQuery {
        TrackQuery::from_track(&ExternalTrack::new(title, artist, 0)).unwrap()
    }

    fn found_id(result: Result<Option<MediaRecord>>) -> Option<String> {
        result.unwrap().map(|r| r.id)
    }

    #[test]
    fn test_exact_title_matches_artist_or_album_artist() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Hello", "Someone Else", "", "a"),
            record("2", "HELLO", "Various", "Adele", "b"),
        ]);
        assert_eq!(found_id(exact_title(&index, &query("hello", "Adele"))), Some("2".into()));
        assert_eq!(found_id(exact_title(&index, &query("Hello There", "Adele"))), None);
    }

    #[test]
    fn test_exact_title_accepts_primary_artist() {
        let index = LibraryIndex::from_records(vec![record("1", "Run", "Mustard", "", "a")]);
        assert_eq!(found_id(exact_title(&index, &query("Run", "Mustard, Migos"))), Some("1".into()));
    }

    #[test]
    fn test_core_title_strips_feature_suffix() {
        let index = LibraryIndex::from_records(vec![record("1", "Lose Control", "Missy Elliott", "", "a")]);
        let q = query("Lose Control (feat. Ciara & Fat Man Scoop)", "Missy Elliott, Ciara");
        assert_eq!(found_id(exact_title(&index, &q)), None);
        assert_eq!(found_id(core_title(&index, &q)), Some("1".into()));
    }

    #[test]
    fn test_core_title_skipped_without_parenthesis() {
        let index = LibraryIndex::from_records(vec![record("1", "Song", "Band", "", "a")]);
        assert_eq!(found_id(core_title(&index, &query("Song", "Band"))), None);
    }

    #[test]
    fn test_title_scan_uses_substring() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Song - Remastered 2011", "Other", "", "a"),
            record("2", "Song - Remastered 2011", "The Band", "", "b"),
        ]);
        assert_eq!(found_id(title_scan(&index, &query("Song", "The Band"))), Some("2".into()));
    }

    #[test]
    fn test_artist_first_uses_token_bucket() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Intro", "Guest • Headliner", "", "a"),
            record("2", "Big Intro Jam", "Headliner", "", "b"),
        ]);
        // Neither artist field contains the full credit "headliner, guest2"
        // but "headliner" is a token of both records
        let q = query("Intro", "Headliner, Guest2");
        assert_eq!(found_id(artist_first(&index, &q)), Some("1".into()));
    }

    #[test]
    fn test_title_scan_accepts_core_title() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Other Song", "Someone", "", "a"),
            record("2", "Song - Remastered", "Band", "", "b"),
        ]);
        let q = query("Song (feat. X)", "Band");
        assert_eq!(found_id(title_scan(&index, &q)), Some("2".into()));

        let resolution = Matcher::new(&index)
            .resolve(&ExternalTrack::new("Song (feat. X)", "Band", 0))
            .unwrap();
        assert_eq!(resolution.strategy, Some(MatchStrategy::TitleScan));
        assert!(matches!(resolution.outcome, MatchOutcome::Matched(ref r) if r.id == "2"));
    }

    #[test]
    fn test_artist_first_accepts_core_title() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Other Tune", "Band", "", "a"),
            record("2", "Song - Remastered", "Band", "", "b"),
        ]);
        let q = query("Song (feat. X)", "Band");
        assert_eq!(found_id(artist_first(&index, &q)), Some("2".into()));
    }

    #[test]
    fn test_artist_first_requires_exact_token() {
        let index = LibraryIndex::from_records(vec![record("1", "Intro", "The Headliners", "", "a")]);
        assert_eq!(found_id(artist_first(&index, &query("Intro", "Headliner"))), None);
    }

    #[test]
    fn test_cascade_prefers_exact_title() {
        // Record 1 would satisfy the scan, record 2 is the exact title hit
        let index = LibraryIndex::from_records(vec![
            record("1", "Say My Name (Remix)", "Destiny's Child", "", "remix.flac"),
            record("2", "Say My Name", "Destiny's Child", "", "DC/SayMyName.flac"),
        ]);
        let matcher = Matcher::new(&index);
        let resolution = matcher
            .resolve(&ExternalTrack::new("Say My Name", "Destiny's Child", 271000))
            .unwrap();
        assert_eq!(resolution.strategy, Some(MatchStrategy::ExactTitle));
        match resolution.outcome {
            MatchOutcome::Matched(r) => assert_eq!(r.path, "DC/SayMyName.flac"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_empty_path_is_no_file_path() {
        let index = LibraryIndex::from_records(vec![record("1", "Ghost", "Band", "", "")]);
        let resolution = Matcher::new(&index)
            .resolve(&ExternalTrack::new("Ghost", "Band", 0))
            .unwrap();
        assert_eq!(resolution.outcome, MatchOutcome::Unmatched(FailureReason::NoFilePath));
        assert_eq!(resolution.strategy, Some(MatchStrategy::ExactTitle));
    }

    #[test]
    fn test_missing_fields_are_no_match() {
        let index = LibraryIndex::from_records(vec![record("1", "Anything", "Anyone", "", "a")]);
        let matcher = Matcher::new(&index);
        for track in [
            ExternalTrack::new("", "Anyone", 0),
            ExternalTrack::new("Anything", "", 0),
        ] {
            assert_eq!(matcher.resolve(&track).unwrap(), Resolution::unmatched());
        }
    }

    #[test]
    fn test_leading_parenthesis_title_matches_any_title_by_artist() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Angie", "Someone Else", "", "a"),
            record("2", "Paint It Black", "The Rolling Stones", "", "b"),
        ]);
        let resolution = Matcher::new(&index)
            .resolve(&ExternalTrack::new("(I Can't Get No) Satisfaction", "The Rolling Stones", 0))
            .unwrap();
        assert_eq!(resolution.strategy, Some(MatchStrategy::TitleScan));
        assert!(matches!(resolution.outcome, MatchOutcome::Matched(ref r) if r.id == "2"));
    }

    #[test]
    fn test_leading_comma_artist_accepts_any_artist() {
        let index = LibraryIndex::from_records(vec![record("1", "Intro", "Somebody", "", "a")]);
        let resolution = Matcher::new(&index)
            .resolve(&ExternalTrack::new("Intro", ", Guest", 0))
            .unwrap();
        assert_eq!(resolution.strategy, Some(MatchStrategy::ExactTitle));
        assert!(matches!(resolution.outcome, MatchOutcome::Matched(ref r) if r.id == "1"));
    }

    #[test]
    fn test_empty_partial_keys_have_no_bucket() {
        let index = LibraryIndex::from_records(vec![
            record("1", "", "Solo", "", "a"),
            record("2", "Intro", "Somebody", "", "b"),
        ]);
        let q = query("(Live) Intro", ", Guest");
        assert_eq!(found_id(core_title(&index, &q)), None);
        assert_eq!(found_id(artist_first(&index, &q)), None);
    }

    #[test]
    fn test_no_match_found() {
        let index = LibraryIndex::from_records(vec![record("1", "Say My Name", "Destiny's Child", "", "a")]);
        let resolution = Matcher::new(&index)
            .resolve(&ExternalTrack::new("Unknown Song", "Nobody", 1000))
            .unwrap();
        assert_eq!(resolution, Resolution::unmatched());
    }

    #[test]
    fn test_custom_strategy_order() {
        let index = LibraryIndex::from_records(vec![
            record("1", "Song Extended", "Band", "", "scan.flac"),
            record("2", "Song", "Band", "", "exact.flac"),
        ]);
        let matcher = Matcher::with_strategies(
            &index,
            vec![(MatchStrategy::TitleScan, title_scan as StrategyFn)],
        );
        let resolution = matcher.resolve(&ExternalTrack::new("Song", "Band", 0)).unwrap();
        assert_eq!(resolution.strategy, Some(MatchStrategy::TitleScan));
        assert!(matches!(resolution.outcome, MatchOutcome::Matched(ref r) if r.id == "1"));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = MatchingStats::default();
        stats.record(&Resolution {
            outcome: MatchOutcome::Matched(MediaRecord::default()),
            strategy: Some(MatchStrategy::CoreTitle),
        });
        stats.record(&Resolution {
            outcome: MatchOutcome::Unmatched(FailureReason::NoFilePath),
            strategy: Some(MatchStrategy::ExactTitle),
        });
        stats.record(&Resolution::unmatched());
        assert_eq!(stats.total_tracks, 3);
        assert_eq!(stats.core_title_matches, 1);
        assert_eq!(stats.exact_title_matches, 0);
        assert_eq!(stats.no_file_path, 1);
        assert_eq!(stats.no_match_found, 1);
    }
}
