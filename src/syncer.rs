use crate::api::PlaylistDirectory;
use crate::models::{CandidateKey, LocalTrack, MatchOutcome, SyncResult};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;

/// One distinct catalog entry and every local track that resolved to it.
struct Group {
    uri: String,
    title: String,
    locals: Vec<LocalTrack>,
}

/// Collapse matched tracks by structural identity, keeping first-seen order.
/// Unmatched tracks are returned separately, in input order.
fn group_outcomes(outcomes: Vec<MatchOutcome>) -> (Vec<Group>, Vec<LocalTrack>) {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<CandidateKey, usize> = HashMap::new();
    let mut unmatched = Vec::new();
    for outcome in outcomes {
        let Some(candidate) = outcome.matched else {
            unmatched.push(outcome.local);
            continue;
        };
        let key = candidate.key();
        match index.get(&key).copied() {
            Some(i) => groups[i].locals.push(outcome.local),
            None => {
                index.insert(key, groups.len());
                groups.push(Group {
                    uri: candidate.track.uri,
                    title: candidate.track.title,
                    locals: vec![outcome.local],
                });
            }
        }
    }
    (groups, unmatched)
}

/// Fold groups that share a URI into the first one, so a track whose catalog
/// metadata differs between searches is still sent only once.
fn merge_same_uri(groups: Vec<Group>) -> Vec<Group> {
    let mut merged: Vec<Group> = Vec::with_capacity(groups.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for g in groups {
        match seen.get(&g.uri).copied() {
            Some(i) => merged[i].locals.extend(g.locals),
            None => {
                seen.insert(g.uri.clone(), merged.len());
                merged.push(g);
            }
        }
    }
    merged
}

/// Applies matched tracks to a playlist in bounded batches and accounts for
/// every local track as either added or failed.
pub struct PlaylistSyncer<'a, D: PlaylistDirectory + ?Sized> {
    directory: &'a D,
    batch_size: usize,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a, D: PlaylistDirectory + ?Sized> PlaylistSyncer<'a, D> {
    pub fn new(directory: &'a D, batch_size: usize) -> Self {
        Self { directory, batch_size: batch_size.max(1), cancel: None }
    }

    /// Stop issuing batches once the flag turns true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    async fn existing_uris(&self, playlist_id: &str) -> HashSet<String> {
        match self.directory.list_playlist_tracks(playlist_id).await {
            Ok(uris) => uris.into_iter().collect(),
            Err(e) => {
                warn!("Could not list tracks already in {}: {:#}; assuming empty", playlist_id, e);
                HashSet::new()
            }
        }
    }

    pub async fn sync(&self, outcomes: Vec<MatchOutcome>, playlist_id: &str) -> SyncResult {
        let mut result = SyncResult::default();
        let (groups, unmatched) = group_outcomes(outcomes);
        result.failed.extend(unmatched);

        let groups = merge_same_uri(groups);
        let existing = if self.cancelled() {
            HashSet::new()
        } else {
            self.existing_uris(playlist_id).await
        };
        let (present, pending): (Vec<Group>, Vec<Group>) =
            groups.into_iter().partition(|g| existing.contains(&g.uri));
        for g in present {
            info!("{} already in playlist, skipping", g.title);
            result.already_present_uris.push(g.uri);
            result.added_tracks.extend(g.locals);
        }

        info!(
            "Adding {} songs: {}",
            pending.len(),
            pending.iter().map(|g| g.title.as_str()).collect::<Vec<_>>().join(", ")
        );

        let mut chunks = pending.chunks(self.batch_size);
        let mut batch_no = 0usize;
        while let Some(chunk) = chunks.next() {
            if self.cancelled() {
                warn!("Import cancelled; {} batches not sent", chunks.len() + 1);
                for g in std::iter::once(chunk).chain(chunks.by_ref()).flatten() {
                    result.failed.extend(g.locals.iter().cloned());
                }
                break;
            }
            batch_no += 1;
            let uris: Vec<String> = chunk.iter().map(|g| g.uri.clone()).collect();
            info!("Adding batch {} of {} songs", batch_no, uris.len());
            match self.directory.add_tracks(playlist_id, &uris).await {
                Ok(()) => {
                    result.added_uris.extend(uris);
                    for g in chunk {
                        result.added_tracks.extend(g.locals.iter().cloned());
                    }
                }
                Err(e) => {
                    warn!("Failed to add batch {}: {:#}", batch_no, e);
                    for g in chunk {
                        result.failed.extend(g.locals.iter().cloned());
                    }
                }
            }
        }

        info!(
            "Sync finished: {} tracks in playlist, {} failed",
            result.added_tracks.len(),
            result.failed.len()
        );
        result
    }
}
