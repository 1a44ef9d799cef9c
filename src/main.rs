use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use navidrome_m3u::config::{Config, ExportConfig, DEFAULT_MOUNT_PREFIX};
use navidrome_m3u::export::run_pipeline;
use navidrome_m3u::index::{open_library, sample_records, BackendKind, LibraryIndex};
use navidrome_m3u::models::load_track_list;
use navidrome_m3u::progress::{format_duration, set_log_only, BarProgress};
use navidrome_m3u::safety::validate_output_path;

#[derive(Parser)]
#[command(name = "navidrome-m3u")]
#[command(about = "Resolve a Spotify playlist export against a Navidrome library and write an M3U playlist")]
struct Args {
    /// Navidrome SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = "navidrome.db", global = true)]
    db: PathBuf,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an M3U playlist and a failure report
    Generate(GenerateArgs),
    /// Print sample library records
    List {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Check that the library opens and report its shape
    Check,
}

#[derive(ClapArgs)]
struct GenerateArgs {
    /// Name written on the #PLAYLIST line
    #[arg(default_value = "Spotify Playlist")]
    playlist_name: String,

    /// Playlist JSON exported from Spotify
    #[arg(default_value = "playlist_tracks.json")]
    tracks: PathBuf,

    /// Output playlist (.m3u / .m3u8)
    #[arg(default_value = "navidrome_playlist.m3u")]
    output: PathBuf,

    /// Only process the first N tracks
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long, value_enum, default_value_t = BackendKind::Memory)]
    backend: BackendKind,

    /// Prefix the media server mounts the library under
    #[arg(long, env = "MOUNT_PREFIX", default_value = DEFAULT_MOUNT_PREFIX)]
    mount_prefix: String,

    /// Directory for the failure report (default: next to the playlist)
    #[arg(long, env = "OUTPUT_DIR")]
    report_dir: Option<PathBuf>,

    /// Write per-strategy matching stats as JSON
    #[arg(long)]
    stats: Option<PathBuf>,
}

fn generate(db: PathBuf, args: GenerateArgs) -> Result<()> {
    let start = Instant::now();

    validate_output_path(&args.output, &[db.as_path(), args.tracks.as_path()])
        .context("Refusing to write playlist")?;

    let mut tracks = load_track_list(&args.tracks)
        .with_context(|| format!("Failed to read track list {}", args.tracks.display()))?;
    if let Some(limit) = args.limit {
        tracks.truncate(limit);
        info!("Processing {} tracks (limited to first {})", tracks.len(), limit);
    }

    let export = ExportConfig::new(args.playlist_name)
        .with_mount_prefix(args.mount_prefix)
        .with_report_dir(args.report_dir);
    let config = Config::new(db, export).with_backend(args.backend);

    let progress = BarProgress::new(tracks.len());
    let result = run_pipeline(&config, &tracks, &args.output, &progress)
        .context("Playlist generation failed")?;

    if let Some(path) = args.stats {
        result
            .stats
            .write_to_file(&path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        info!("Stats written to: {}", path.display());
    }

    println!("\n{:=<60}", "");
    println!("Playlist complete!");
    println!("  Processed: {}", result.summary.processed);
    println!("  Matched: {}", result.summary.matched);
    println!("  Failed: {}", result.summary.failed);
    println!("  Success rate: {:.1}%", result.summary.success_rate);
    println!("  Playlist: {}", result.files.playlist.display());
    if let Some(report) = &result.files.failure_report {
        println!("  Failure report: {}", report.display());
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}

fn list(db: PathBuf, limit: usize) -> Result<()> {
    let conn = open_library(&db)?;
    let records = sample_records(&conn, limit)?;

    if records.is_empty() {
        println!("No songs found in the database.");
        return Ok(());
    }

    println!("Sample songs from database:\n");
    for record in records {
        println!("{}", serde_json::to_string_pretty(&record)?);
        println!("{:-<40}", "");
    }
    Ok(())
}

fn check(db: PathBuf) -> Result<()> {
    let start = Instant::now();
    let conn = open_library(&db)?;
    let index = LibraryIndex::load(&conn)?;

    println!("Database connection successful: {}", db.display());
    println!("  Tracks: {}", index.len());
    println!("  Distinct titles: {}", index.title_bucket_count());
    println!("  Distinct artists: {}", index.artist_bucket_count());
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    Ok(())
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
    set_log_only(args.log_only);

    match args.command {
        Command::Generate(generate_args) => generate(args.db, generate_args),
        Command::List { limit } => list(args.db, limit),
        Command::Check => check(args.db),
    }
}
