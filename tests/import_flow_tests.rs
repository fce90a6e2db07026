use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tokio::sync::watch;

use takeout_playlist_import::api::mock::MockProvider;
use takeout_playlist_import::config::Config;
use takeout_playlist_import::import::run_import;
use takeout_playlist_import::models::CatalogTrack;
use takeout_playlist_import::report::CsvFailureReporter;

struct Row<'a> {
    title: &'a str,
    artist: &'a str,
    album: &'a str,
    duration_ms: u64,
}

fn make_folder(root: &Path, name: &str, rows: &[Row]) -> PathBuf {
    let folder = root.join("playlist");
    let tracks = folder.join("Tracks");
    fs::create_dir_all(&tracks).unwrap();
    fs::write(folder.join("Metadata.csv"), format!("Title\n{}\n", name)).unwrap();
    for (i, r) in rows.iter().enumerate() {
        fs::write(
            tracks.join(format!("{}.csv", r.title.replace(' ', "_"))),
            format!(
                "Title,Album,Artist,Duration (ms),Playlist Index\n\"{}\",\"{}\",\"{}\",{},{}\n",
                r.title, r.album, r.artist, r.duration_ms, i
            ),
        )
        .unwrap();
    }
    folder
}

fn hit(uri: &str, artist: &str, album: &str, duration_ms: u64) -> CatalogTrack {
    CatalogTrack {
        title: uri.to_uppercase(),
        album: album.into(),
        artists: vec![artist.into()],
        explicit: false,
        duration_ms,
        uri: uri.into(),
    }
}

fn never_cancelled() -> watch::Receiver<bool> {
    // the last value stays readable after the sender is gone
    watch::channel(false).1
}

fn scripted_provider() -> MockProvider {
    let p = MockProvider::new();
    p.add_existing_playlist("other", "Something Else");
    p.set_search_results("Alpha", vec![hit("alpha", "Band", "Album", 1000)]);
    // primary search misses, fallback finds the live cut
    p.set_search_results("Song (Live)", vec![hit("noise", "Someone", "Elsewhere", 5)]);
    p.set_search_results("Song Band", vec![hit("live", "Band", "Live", 200_500)]);
    // two local entries of the same recording
    p.set_search_results("Beta", vec![hit("beta", "Band", "Album", 2000)]);
    p.set_search_results("Beta (Remastered)", vec![hit("beta", "Band", "Album", 2000)]);
    p.fail_search("Broken");
    p.fail_search("Broken Band");
    p
}

fn rows() -> Vec<Row<'static>> {
    vec![
        Row { title: "Alpha", artist: "Band", album: "Album", duration_ms: 1000 },
        Row { title: "Song (Live)", artist: "Band", album: "Album", duration_ms: 200_000 },
        Row { title: "Beta", artist: "Band", album: "Album", duration_ms: 2000 },
        Row { title: "Beta (Remastered)", artist: "Band", album: "Album", duration_ms: 2000 },
        Row { title: "Broken", artist: "Band", album: "Album", duration_ms: 1 },
        Row { title: "Nowhere", artist: "Nobody", album: "None", duration_ms: 1 },
    ]
}

#[tokio::test]
async fn every_track_is_added_or_reported() {
    let td = tempdir().unwrap();
    let folder = make_folder(td.path(), "Road Trip", &rows());
    let cfg = Config { report_dir: td.path().join("reports"), ..Config::default() };
    let provider = scripted_provider();
    let reporter = CsvFailureReporter::new(cfg.report_dir.clone());

    let summary = run_import(&cfg, &folder, &provider, &reporter, never_cancelled())
        .await
        .unwrap();

    assert_eq!(summary.total_tracks, 6);
    assert_eq!(summary.result.total(), 6);
    assert_eq!(summary.result.added_tracks.len(), 4);
    let failed: Vec<&str> = summary.result.failed.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(failed, vec!["Broken", "Nowhere"]);
    assert_eq!(summary.result.added_uris, vec!["alpha", "live", "beta"]);
    assert_eq!(provider.created_playlists(), vec![("Road Trip".to_string(), false)]);

    let report = summary.report_path.unwrap();
    assert_eq!(report.file_name().unwrap(), "Road_Trip_failedTracks.csv");
    let body = fs::read_to_string(report).unwrap();
    assert!(body.starts_with("Title,Artist,Album,Duration (ms)"));
    assert!(body.contains("Broken,Band,Album,1"));
    assert!(body.contains("Nowhere,Nobody,None,1"));
}

#[tokio::test]
async fn rerun_reuses_playlist_and_adds_nothing() {
    let td = tempdir().unwrap();
    let folder = make_folder(td.path(), "Road Trip", &rows());
    let cfg = Config { report_dir: td.path().to_path_buf(), ..Config::default() };
    let provider = scripted_provider();
    let reporter = CsvFailureReporter::new(cfg.report_dir.clone());

    let first = run_import(&cfg, &folder, &provider, &reporter, never_cancelled()).await.unwrap();
    let second = run_import(&cfg, &folder, &provider, &reporter, never_cancelled()).await.unwrap();

    assert_eq!(first.playlist_id, second.playlist_id);
    assert_eq!(provider.created_playlists().len(), 1);
    assert!(second.result.added_uris.is_empty());
    assert_eq!(second.result.added_tracks.len(), 4);
    assert_eq!(provider.tracks_in(&first.playlist_id), vec!["alpha", "live", "beta"]);
}

#[tokio::test]
async fn failing_batch_only_reports_its_tracks() {
    let td = tempdir().unwrap();
    let folder = make_folder(td.path(), "Mix", &rows());
    let cfg = Config {
        report_dir: td.path().to_path_buf(),
        batch_size: 2,
        ..Config::default()
    };
    let provider = scripted_provider();
    provider.fail_add_call(0);
    let reporter = CsvFailureReporter::new(cfg.report_dir.clone());

    let summary = run_import(&cfg, &folder, &provider, &reporter, never_cancelled()).await.unwrap();

    assert_eq!(provider.add_calls().len(), 2);
    let failed: Vec<&str> = summary.result.failed.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(failed, vec!["Broken", "Nowhere", "Alpha", "Song (Live)"]);
    assert_eq!(summary.result.added_uris, vec!["beta"]);
    assert_eq!(summary.result.total(), 6);
}

#[tokio::test]
async fn playlist_creation_failure_is_fatal() {
    let td = tempdir().unwrap();
    let folder = make_folder(td.path(), "Mix", &rows());
    let cfg = Config { report_dir: td.path().join("reports"), ..Config::default() };
    let provider = scripted_provider();
    provider.fail_create_playlist();
    let reporter = CsvFailureReporter::new(cfg.report_dir.clone());

    let res = run_import(&cfg, &folder, &provider, &reporter, never_cancelled()).await;
    assert!(res.is_err());
    assert!(provider.search_calls().is_empty());
    assert!(!cfg.report_dir.exists());
}

#[tokio::test]
async fn cancelled_run_reports_everything_unsent() {
    let td = tempdir().unwrap();
    let folder = make_folder(td.path(), "Mix", &rows());
    let cfg = Config { report_dir: td.path().to_path_buf(), ..Config::default() };
    let provider = scripted_provider();
    let reporter = CsvFailureReporter::new(cfg.report_dir.clone());
    let (tx, rx) = watch::channel(true);

    let summary = run_import(&cfg, &folder, &provider, &reporter, rx).await.unwrap();
    drop(tx);

    assert!(provider.search_calls().is_empty());
    assert!(provider.add_calls().is_empty());
    assert_eq!(summary.result.failed.len(), 6);
    assert!(summary.report_path.is_some());
}
