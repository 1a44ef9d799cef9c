//! Normalization rules for library/track matching.
//!
//! The cascade only ever compares lowercased strings by equality or
//! substring. The folding helpers at the bottom are for failure diagnostics
//! and are never consulted by the cascade.
//!
//! CRITICAL: changing a key function here changes which bucket a track lands
//! in. Run the matcher tests after any change.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::ExternalTrack;

/// Separator the library uses to join multiple artists ("A • B").
/// The external source uses ", " instead.
pub const LIBRARY_ARTIST_DELIMITER: char = '•';

/// Separator of the external source's artist credit list
pub const EXTERNAL_ARTIST_DELIMITER: char = ',';

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Leading article, stripped by the diagnostic fold only
pub static LEADING_THE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^the\s+").unwrap());

// ============================================================================
// MATCH KEYS
// ============================================================================

pub fn lower(s: &str) -> String {
    s.to_lowercase()
}

/// First comma-delimited artist, trimmed and lowercased.
/// e.g. "Mustard, Migos" → "mustard"
pub fn primary_artist(artist_name: &str) -> String {
    artist_name
        .split(EXTERNAL_ARTIST_DELIMITER)
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Title text before the first parenthesis, trimmed and lowercased.
/// e.g. "Lose Control (feat. Ciara)" → "lose control"
pub fn core_title(track_name: &str) -> String {
    match track_name.find('(') {
        Some(idx) => track_name[..idx].trim().to_lowercase(),
        None => track_name.to_lowercase(),
    }
}

/// Split a lowercased library artist field into its individual artists.
/// Tokens are trimmed, empties dropped, duplicates kept once in first-seen order.
pub fn split_library_artists(artist_lower: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in artist_lower.split(LIBRARY_ARTIST_DELIMITER).map(str::trim) {
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Precomputed lookup keys for one external track.
///
/// `core_title` equals `title_lower` when the title has no parenthesis.
/// Either partial key may be empty ("(Intro) Song", ", Guest"); an empty
/// key is kept and, like any empty substring, is contained in every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackQuery {
    pub title_lower: String,
    pub core_title: String,
    pub artist_lower: String,
    pub primary_artist: String,
}

impl TrackQuery {
    /// Returns `None` when the track lacks a title or an artist.
    pub fn from_track(track: &ExternalTrack) -> Option<Self> {
        if track.track_name.trim().is_empty() || track.artist_name.trim().is_empty() {
            return None;
        }

        Some(Self {
            title_lower: lower(&track.track_name),
            core_title: core_title(&track.track_name),
            artist_lower: lower(&track.artist_name),
            primary_artist: primary_artist(&track.artist_name),
        })
    }

    /// Whether the core-title lookup has anything to add over the exact one
    pub fn has_distinct_core_title(&self) -> bool {
        self.core_title != self.title_lower
    }

    /// Artist acceptance test shared by the title-driven strategies:
    /// the record's artist or album artist contains the full credit or the
    /// primary artist.
    pub fn accepts_artist(&self, artist_lower: &str, album_artist_lower: &str) -> bool {
        [artist_lower, album_artist_lower].iter().any(|field| {
            field.contains(self.artist_lower.as_str()) || field.contains(self.primary_artist.as_str())
        })
    }

    /// Title acceptance test for the loose strategies
    pub fn accepts_title(&self, title_lower: &str) -> bool {
        title_lower.contains(self.title_lower.as_str()) || title_lower.contains(self.core_title.as_str())
    }
}

// ============================================================================
// DIAGNOSTIC FOLDING
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "naïve" → "naive"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Aggressive comparison key used when analyzing failures:
/// ASCII fold, collapse whitespace, drop a leading "the ".
pub fn fold_key(s: &str) -> String {
    let folded = fold_to_ascii(s);
    let collapsed = MULTI_SPACE.replace_all(folded.trim(), " ");
    LEADING_THE.replace(&collapsed, "").to_string()
}
