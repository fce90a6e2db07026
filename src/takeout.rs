//! Reading a Google Takeout playlist folder.
//!
//! Layout:
//! - `<folder>/Metadata.csv` — one row, `Title` column holds the playlist name.
//! - `<folder>/Tracks/*.csv` — one CSV per track with columns `Title`,
//!   `Artist`, `Album`, `Duration (ms)` and `Playlist Index`.
//!
//! Takeout also drops files named like `(12).csv` next to the tracks; those
//! are not tracks and are skipped.
use crate::models::LocalTrack;
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static AUX_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(\d+\)\.csv$").unwrap());

#[derive(Debug, Deserialize)]
struct MetadataRow {
    #[serde(rename = "Title", default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackRow {
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Artist", default)]
    artist: Option<String>,
    #[serde(rename = "Album", default)]
    album: Option<String>,
    #[serde(rename = "Duration (ms)", default)]
    duration_ms: Option<String>,
    #[serde(rename = "Playlist Index", default)]
    playlist_index: Option<String>,
}

fn decode(s: Option<String>) -> String {
    html_escape::decode_html_entities(s.as_deref().unwrap_or("")).into_owned()
}

fn parse_number<T: std::str::FromStr + Default>(s: Option<&str>) -> T {
    s.map(str::trim)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or_default()
}

fn first_row<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let row = rdr
        .deserialize::<T>()
        .next()
        .ok_or_else(|| anyhow!("{} has no data rows", path.display()))?
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(row)
}

/// Name of the exported playlist.
pub fn playlist_name(folder: &Path) -> Result<String> {
    let row: MetadataRow = first_row(&folder.join("Metadata.csv"))?;
    let name = decode(row.title);
    if name.is_empty() {
        return Err(anyhow!("Metadata.csv in {} has an empty Title", folder.display()));
    }
    Ok(name)
}

/// Return true for track CSVs, false for the numbered auxiliary files.
fn is_track_file(path: &Path) -> bool {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    is_csv && !AUX_FILE_RE.is_match(name)
}

pub fn list_track_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let tracks_dir = folder.join("Tracks");
    if !tracks_dir.is_dir() {
        return Err(anyhow!("no Tracks directory in {}", folder.display()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(&tracks_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.is_file())
        .filter(|p| is_track_file(p))
        .collect();
    files.sort();
    Ok(files)
}

pub fn parse_track_file(path: &Path) -> Result<LocalTrack> {
    let row: TrackRow = first_row(path)?;
    Ok(LocalTrack {
        title: decode(row.title),
        artist: decode(row.artist),
        album: decode(row.album),
        duration_ms: parse_number(row.duration_ms.as_deref()),
        playlist_index: parse_number(row.playlist_index.as_deref()),
    })
}

/// Parse every track in the folder, ordered by playlist index.
pub fn load_tracks(folder: &Path) -> Result<Vec<LocalTrack>> {
    let mut tracks = Vec::new();
    for path in list_track_files(folder)? {
        tracks.push(parse_track_file(&path)?);
    }
    tracks.sort_by_key(|t| t.playlist_index);
    log::debug!("Loaded {} tracks from {}", tracks.len(), folder.display());
    Ok(tracks)
}
