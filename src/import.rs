use crate::api::Provider;
use crate::config::Config;
use crate::matcher::TrackMatcher;
use crate::models::{MatchOutcome, SyncResult};
use crate::report::FailureReporter;
use crate::resolver::PlaylistResolver;
use crate::syncer::PlaylistSyncer;
use crate::takeout;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

#[derive(Debug)]
pub struct ImportSummary {
    pub playlist_name: String,
    pub playlist_id: String,
    pub total_tracks: usize,
    pub result: SyncResult,
    pub report_path: Option<PathBuf>,
}

/// Import one takeout playlist folder.
///
/// Ingestion and playlist resolution errors abort the run. Per-track and
/// per-batch problems end up in the failure report instead. Tracks are
/// searched one at a time; when `cancel` flips, the remaining tracks are not
/// searched and are reported as failed.
pub async fn run_import(
    cfg: &Config,
    folder: &Path,
    provider: &dyn Provider,
    reporter: &dyn FailureReporter,
    cancel: watch::Receiver<bool>,
) -> Result<ImportSummary> {
    log::info!("Using folder: {}", folder.display());
    let playlist_name = takeout::playlist_name(folder).context("reading playlist metadata")?;
    let tracks = takeout::load_tracks(folder).context("reading track files")?;
    log::info!("Importing {} tracks into {} via {}", tracks.len(), playlist_name, provider.name());

    let playlist_id = PlaylistResolver::new(provider, cfg.page_size)
        .resolve(&playlist_name)
        .await?;

    let matcher = TrackMatcher::new(provider, cfg.search_limit);
    let total_tracks = tracks.len();
    let mut outcomes = Vec::with_capacity(total_tracks);
    for (i, local) in tracks.into_iter().enumerate() {
        let matched = if *cancel.borrow() {
            None
        } else {
            log::debug!("[{}/{}] {} - {}", i + 1, total_tracks, local.artist, local.title);
            matcher.find_match(&local).await
        };
        outcomes.push(MatchOutcome { local, matched });
    }
    if *cancel.borrow() {
        log::warn!("Import cancelled during matching; unsearched tracks will be reported");
    }

    let result = PlaylistSyncer::new(provider, cfg.batch_size)
        .with_cancel(cancel)
        .sync(outcomes, &playlist_id)
        .await;

    let report_path = match reporter.report(&playlist_name, &result.failed) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to write failed-tracks report: {:#}", e);
            None
        }
    };

    Ok(ImportSummary {
        playlist_name,
        playlist_id,
        total_tracks,
        result,
        report_path,
    })
}
