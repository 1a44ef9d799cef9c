//! Analyze a failure report and test which relaxed probes would rescue each track.
//!
//! Diagnostic only: nothing here feeds back into playlist generation.
//!
//! Usage: analyze-failures <mix_failed_matches.json> --db navidrome.db [--samples N]

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

use navidrome_m3u::index::{open_library, LibraryEntry, LibraryIndex};
use navidrome_m3u::models::{FailedMatch, FailureReason};
use navidrome_m3u::normalize::{core_title, fold_key, fold_to_ascii, primary_artist};
use navidrome_m3u::progress::{create_progress_bar, format_duration};

/// Minimum normalized Levenshtein similarity for the near-title probe
const NEAR_TITLE_THRESHOLD: f64 = 0.85;

#[derive(Parser)]
#[command(name = "analyze-failures")]
#[command(about = "Test recovery probes against tracks from a failure report")]
struct Args {
    /// Failure report written next to a playlist
    report: PathBuf,

    #[arg(long, env = "DATABASE_PATH", default_value = "navidrome.db")]
    db: PathBuf,

    /// Number of near-title suggestions to print
    #[arg(long, default_value = "20")]
    samples: usize,
}

/// Library keys folded once for all probes
struct FoldedLibrary<'a> {
    index: &'a LibraryIndex,
    by_ascii_title: FxHashMap<String, Vec<usize>>,
    by_folded_title: FxHashMap<String, Vec<usize>>,
}

impl<'a> FoldedLibrary<'a> {
    fn new(index: &'a LibraryIndex) -> Self {
        let mut by_ascii_title: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut by_folded_title: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (pos, entry) in index.entries().iter().enumerate() {
            if entry.title_lower.is_empty() {
                continue;
            }
            by_ascii_title
                .entry(fold_to_ascii(&entry.title_lower))
                .or_default()
                .push(pos);
            by_folded_title
                .entry(fold_key(&entry.title_lower))
                .or_default()
                .push(pos);
        }
        Self {
            index,
            by_ascii_title,
            by_folded_title,
        }
    }

    fn entries<'b>(
        &'b self,
        map: &'b FxHashMap<String, Vec<usize>>,
        key: &str,
    ) -> impl Iterator<Item = &'b LibraryEntry> {
        let entries: &'b [LibraryEntry] = self.index.entries();
        map.get(key)
            .into_iter()
            .flatten()
            .filter_map(move |&pos| entries.get(pos))
    }
}

fn artist_contains(entry: &LibraryEntry, folded_artist: &str) -> bool {
    fold_to_ascii(&entry.artist_lower).contains(folded_artist)
        || fold_to_ascii(&entry.album_artist_lower).contains(folded_artist)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let start = Instant::now();

    let json = std::fs::read_to_string(&args.report)
        .with_context(|| format!("Failed to read {}", args.report.display()))?;
    let failures: Vec<FailedMatch> =
        serde_json::from_str(&json).context("Failed to parse failure report")?;
    info!("Loaded {} failed matches", failures.len());

    let conn = open_library(&args.db)?;
    let index = LibraryIndex::load(&conn)?;
    drop(conn);
    let library = FoldedLibrary::new(&index);

    let no_file_path = failures
        .iter()
        .filter(|f| f.reason == FailureReason::NoFilePath)
        .count();
    let unmatched: Vec<&FailedMatch> = failures
        .iter()
        .filter(|f| f.reason == FailureReason::NoMatchFound)
        .collect();

    println!("\nAnalyzing {} unmatched tracks in parallel...", unmatched.len());

    let ascii_fold = AtomicUsize::new(0);
    let article_fold = AtomicUsize::new(0);
    let near_title = AtomicUsize::new(0);
    let artist_missing = AtomicUsize::new(0);
    let suggestions: Mutex<Vec<(String, String, String, f64)>> = Mutex::new(Vec::new());

    let pb = create_progress_bar(unmatched.len() as u64, "Probing");
    unmatched.par_iter().for_each(|failed| {
        let primary_lower = primary_artist(&failed.artist_name);
        let primary = fold_to_ascii(&primary_lower);
        let core = core_title(&failed.track_name);
        let title = if core.is_empty() {
            failed.track_name.to_lowercase()
        } else {
            core
        };

        if primary.is_empty() {
            pb.inc(1);
            return;
        }

        let ascii_key = fold_to_ascii(&title);
        let folded_key = fold_key(&title);

        if library
            .entries(&library.by_ascii_title, &ascii_key)
            .any(|e| artist_contains(e, &primary))
        {
            ascii_fold.fetch_add(1, Ordering::Relaxed);
        } else if library
            .entries(&library.by_folded_title, &folded_key)
            .any(|e| artist_contains(e, &primary))
        {
            article_fold.fetch_add(1, Ordering::Relaxed);
        } else {
            let bucket: Vec<&LibraryEntry> = library.index.artist_bucket(&primary_lower).collect();
            if bucket.is_empty() {
                artist_missing.fetch_add(1, Ordering::Relaxed);
            } else if let Some((entry, score)) = bucket
                .iter()
                .map(|e| (*e, strsim::normalized_levenshtein(&folded_key, &fold_key(&e.title_lower))))
                .filter(|(_, score)| *score >= NEAR_TITLE_THRESHOLD)
                .max_by(|a, b| a.1.total_cmp(&b.1))
            {
                near_title.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut list) = suggestions.lock() {
                    list.push((
                        failed.artist_name.clone(),
                        failed.track_name.clone(),
                        entry.record.title.clone(),
                        score,
                    ));
                }
            }
        }
        pb.inc(1);
    });
    pb.finish_with_message("Probing done");

    let total = unmatched.len().max(1) as f64;
    let pct = |n: usize| 100.0 * n as f64 / total;
    let ascii_fold = ascii_fold.into_inner();
    let article_fold = article_fold.into_inner();
    let near_title = near_title.into_inner();
    let artist_missing = artist_missing.into_inner();
    let rescued = ascii_fold + article_fold + near_title;

    println!("\n{:=<60}", "");
    println!("Failure analysis ({} failures)", failures.len());
    println!("  No file path: {}", no_file_path);
    println!("  No match found: {}", unmatched.len());
    println!("  Rescued by ASCII folding: {} ({:.1}%)", ascii_fold, pct(ascii_fold));
    println!("  Rescued by article/space folding: {} ({:.1}%)", article_fold, pct(article_fold));
    println!("  Rescued by near title (>= {:.2}): {} ({:.1}%)", NEAR_TITLE_THRESHOLD, near_title, pct(near_title));
    println!("  Artist not in library: {} ({:.1}%)", artist_missing, pct(artist_missing));
    println!("  Total rescuable: {} ({:.1}%)", rescued, pct(rescued));
    println!("{:=<60}", "");

    let mut suggestions = suggestions.into_inner().unwrap_or_default();
    suggestions.sort_by(|a, b| b.3.total_cmp(&a.3).then_with(|| a.1.cmp(&b.1)));
    if !suggestions.is_empty() {
        println!("\nNear-title suggestions:");
        for (artist, wanted, found, score) in suggestions.iter().take(args.samples) {
            println!("  [{:.2}] {} - {}  =>  {}", score, artist, wanted, found);
        }
    }

    println!("\nElapsed: {}", format_duration(start.elapsed()));
    Ok(())
}
