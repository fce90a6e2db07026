use crate::models::LocalTrack;
use crate::util::sanitize_file_stem;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Persists the tracks that did not make it into the playlist.
pub trait FailureReporter: Send + Sync {
    /// Returns where the report went, if anywhere.
    fn report(&self, playlist_name: &str, tracks: &[LocalTrack]) -> Result<Option<PathBuf>>;
}

#[derive(Serialize)]
struct FailedRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Artist")]
    artist: &'a str,
    #[serde(rename = "Album")]
    album: &'a str,
    #[serde(rename = "Duration (ms)")]
    duration_ms: u64,
}

/// Writes `<playlist>_failedTracks.csv` in the same column layout as the
/// takeout track files, so it can be re-read with the takeout parser.
pub struct CsvFailureReporter {
    dir: PathBuf,
}

impl CsvFailureReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn report_path(&self, playlist_name: &str) -> PathBuf {
        report_path_in(&self.dir, playlist_name)
    }
}

pub fn report_path_in(dir: &Path, playlist_name: &str) -> PathBuf {
    dir.join(format!("{}_failedTracks.csv", sanitize_file_stem(playlist_name)))
}

impl FailureReporter for CsvFailureReporter {
    fn report(&self, playlist_name: &str, tracks: &[LocalTrack]) -> Result<Option<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating report dir {}", self.dir.display()))?;
        let path = self.report_path(playlist_name);
        let mut wtr = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        if tracks.is_empty() {
            wtr.write_record(["Title", "Artist", "Album", "Duration (ms)"])?;
        }
        for t in tracks {
            wtr.serialize(FailedRow {
                title: &t.title,
                artist: &t.artist,
                album: &t.album,
                duration_ms: t.duration_ms,
            })?;
        }
        wtr.flush()?;
        log::info!("Wrote {} failed tracks to {}", tracks.len(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_name_is_sanitized() {
        let p = report_path_in(Path::new("out"), "My Mix/2020");
        assert_eq!(p, Path::new("out").join("My_Mix_2020_failedTracks.csv"));
    }

    #[test]
    fn writes_header_and_rows() {
        let td = tempfile::tempdir().unwrap();
        let r = CsvFailureReporter::new(td.path());
        let t = LocalTrack {
            title: "Tom, Dick & Harry".into(),
            artist: "Band".into(),
            album: "Album".into(),
            duration_ms: 1234,
            playlist_index: 7,
        };
        let path = r.report("Mix", &[t]).unwrap().unwrap();
        let s = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines[0], "Title,Artist,Album,Duration (ms)");
        assert_eq!(lines[1], "\"Tom, Dick & Harry\",Band,Album,1234");
    }

    #[test]
    fn empty_report_has_header_only() {
        let td = tempfile::tempdir().unwrap();
        let path = CsvFailureReporter::new(td.path()).report("Mix", &[]).unwrap().unwrap();
        let s = std::fs::read_to_string(path).unwrap();
        assert_eq!(s.trim_end(), "Title,Artist,Album,Duration (ms)");
    }
}
