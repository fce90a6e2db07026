use serde::{Deserialize, Serialize};

/// One track parsed from a takeout track CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrack {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub playlist_index: i64,
}

/// A search hit as returned by the catalog, metadata already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub title: String,
    pub album: String,
    pub artists: Vec<String>,
    pub explicit: bool,
    pub duration_ms: u64,
    /// Remote identifier used for playlist mutation (e.g. "spotify:track:...").
    pub uri: String,
}

/// A catalog hit considered for one local track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCandidate {
    pub track: CatalogTrack,
    pub local: LocalTrack,
}

impl RemoteCandidate {
    pub fn new(track: CatalogTrack, local: &LocalTrack) -> Self {
        Self { track, local: local.clone() }
    }

    pub fn uri(&self) -> &str {
        &self.track.uri
    }

    pub fn key(&self) -> CandidateKey {
        CandidateKey::from(&self.track)
    }
}

/// Structural identity of a catalog entry, used to collapse duplicates.
/// The originating local track is deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    pub uri: String,
    pub title: String,
    pub album: String,
    pub artists: Vec<String>,
    pub duration_ms: u64,
    pub explicit: bool,
}

impl From<&CatalogTrack> for CandidateKey {
    fn from(t: &CatalogTrack) -> Self {
        Self {
            uri: t.uri.clone(),
            title: t.title.clone(),
            album: t.album.clone(),
            artists: t.artists.clone(),
            duration_ms: t.duration_ms,
            explicit: t.explicit,
        }
    }
}

/// Per-track output of the matcher, in playlist order.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub local: LocalTrack,
    pub matched: Option<RemoteCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistSummary>,
    pub has_next: bool,
}

/// Outcome of one sync. Every input track ends up in exactly one of
/// `added_tracks` or `failed`.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Identifiers committed by this run, deduped, in commit order.
    pub added_uris: Vec<String>,
    /// Identifiers skipped because the playlist already contained them.
    pub already_present_uris: Vec<String>,
    /// Local tracks whose identifier is now in the playlist.
    pub added_tracks: Vec<LocalTrack>,
    pub failed: Vec<LocalTrack>,
}

impl SyncResult {
    pub fn total(&self) -> usize {
        self.added_tracks.len() + self.failed.len()
    }
}
