//! Safety checks that run before any output file is touched.
//!
//! A playlist run replaces its output file, so a mistyped argument order
//! ("generate name out.m3u tracks.json") must never overwrite the library
//! database or the track list.

use std::path::Path;

use crate::error::{ResolveError, Result};

/// Extensions accepted for playlist output
pub const PLAYLIST_EXTENSIONS: [&str; 2] = ["m3u", "m3u8"];

/// Validates that a playlist output path is safe to overwrite.
///
/// Checks:
/// - Output must have an `.m3u` or `.m3u8` extension
/// - Output cannot be the same as any of the provided source paths
///
/// # Arguments
/// * `output` - The playlist path that will be created/overwritten
/// * `source_paths` - Inputs of the run (library DB, track list) that must not match the output
pub fn validate_output_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if !PLAYLIST_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ResolveError::UnsafeOutput(format!(
            "output file '{}' must end in .m3u or .m3u8",
            output.display()
        )));
    }

    for source in source_paths {
        if output == *source {
            return Err(ResolveError::UnsafeOutput(format!(
                "output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            )));
        }
    }

    Ok(())
}
