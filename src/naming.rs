//! Path sanitizing and the library naming conventions
//!
//! The conventions here are what media-library front ends look for:
//! `Title (Year)/Season N/S01E02.nfo` and friends.

use tracing::debug;

/// Fixed name of the series descriptor at the library root
pub const SERIES_NFO_NAME: &str = "tvshow.nfo";

/// Fixed name of the season descriptor inside a season folder
pub const SEASON_NFO_NAME: &str = "season.nfo";

/// Season artwork inside a season folder
pub const SEASON_POSTER_NAME: &str = "poster.jpg";

/// Directory holding the rename outputs, relative to the library root
pub const RENAME_DIR: &str = "rename";
pub const RENAME_MAP_NAME: &str = "rename_map.csv";
pub const RENAME_PREVIEW_NAME: &str = "rename_preview.txt";

fn is_reserved(c: char) -> bool {
    matches!(c, '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Normalizes a slash-delimited path into filesystem-safe segments
///
/// Each segment has `\ : * ? " < > |` replaced with `_` and is trimmed.
/// Empty segments and the relative segments `.` and `..` are dropped, so the
/// result can never climb out of the directory it is joined onto.
/// Sanitizing twice yields the same result as sanitizing once.
pub fn sanitize_path(path: &str) -> String {
    path.split('/')
        .filter_map(|segment| {
            let cleaned: String = segment
                .chars()
                .map(|c| if is_reserved(c) { '_' } else { c })
                .collect();
            let cleaned = cleaned.trim();
            match cleaned {
                "" => None,
                "." | ".." => {
                    debug!(segment, "dropping relative path segment");
                    None
                }
                _ => Some(cleaned.to_string()),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sanitizes a single file or folder name
///
/// Like a path segment, but `/` is replaced as well. Returns `None` when
/// nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || is_reserved(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => None,
        _ => Some(cleaned.to_string()),
    }
}

/// Splits a filename into base name and extension (including the dot)
///
/// A leading dot does not start an extension, so `.hidden` has none.
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// `S01E02` code for a season/episode pair
pub fn season_episode_code(season: u32, episode: u32) -> String {
    format!("S{season:02}E{episode:02}")
}

/// Root folder of the library: the sanitized title, plus ` (YEAR)` when known
///
/// The year is sanitized like the title, so the result is always a single
/// path segment.
pub fn series_root_folder_name(title: &str, year: &str) -> String {
    let safe = sanitize_file_name(title).unwrap_or_else(|| "Unknown".to_string());
    match sanitize_file_name(year) {
        Some(year) => format!("{safe} ({year})"),
        None => safe,
    }
}

/// `Season N`, without zero padding
pub fn season_folder_name(season: u32) -> String {
    format!("Season {season}")
}

/// Standard episode descriptor name, e.g. `S01E02.nfo`
pub fn episode_nfo_name(season: u32, episode: u32) -> String {
    format!("{}.nfo", season_episode_code(season, episode))
}

/// Episode thumbnail name, e.g. `S01E02-thumb.jpg`
pub fn episode_thumb_name(season: u32, episode: u32) -> String {
    format!("{}-thumb.jpg", season_episode_code(season, episode))
}

/// Descriptor named after the media file, e.g. `Show - 01.nfo`
///
/// Returns `None` when the original name sanitizes to nothing.
pub fn same_as_media_nfo_name(original: &str) -> Option<String> {
    let (base, _) = split_ext(original.trim());
    sanitize_file_name(base).map(|safe| format!("{safe}.nfo"))
}
