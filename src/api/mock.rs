use super::{CatalogSearch, PlaylistDirectory, Provider};
use crate::models::{CatalogTrack, PlaylistPage, PlaylistSummary};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Default)]
struct MockState {
    catalog: HashMap<String, Vec<CatalogTrack>>,
    failing_queries: HashSet<String>,
    playlists: Vec<PlaylistSummary>,
    playlist_tracks: HashMap<String, Vec<String>>,
    failing_add_calls: HashSet<usize>,
    fail_create: bool,
    fail_list: bool,
    fail_list_tracks: bool,
    search_calls: Vec<String>,
    list_offsets: Vec<u32>,
    created: Vec<(String, bool)>,
    add_calls: Vec<Vec<String>>,
    track_list_calls: usize,
}

/// In-memory provider used in tests and dry runs.
/// Search results are scripted per exact query string; every call is recorded
/// so tests can assert on the sequence of remote operations.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self { state: Mutex::new(MockState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Script the results for an exact query.
    pub fn set_search_results(&self, query: &str, results: Vec<CatalogTrack>) {
        self.state().catalog.insert(query.to_string(), results);
    }

    /// Make searches for `query` fail with a transport-style error.
    pub fn fail_search(&self, query: &str) {
        self.state().failing_queries.insert(query.to_string());
    }

    /// Seed an existing playlist owned by the user.
    pub fn add_existing_playlist(&self, id: &str, name: &str) {
        self.state().playlists.push(PlaylistSummary { id: id.into(), name: name.into() });
    }

    /// Make the add-tracks call with this zero-based index fail.
    pub fn fail_add_call(&self, index: usize) {
        self.state().failing_add_calls.insert(index);
    }

    pub fn fail_create_playlist(&self) {
        self.state().fail_create = true;
    }

    /// Make every playlist listing fail.
    pub fn fail_list_playlists(&self) {
        self.state().fail_list = true;
    }

    /// Make listing the tracks of a playlist fail.
    pub fn fail_list_playlist_tracks(&self) {
        self.state().fail_list_tracks = true;
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.state().search_calls.clone()
    }

    pub fn list_offsets(&self) -> Vec<u32> {
        self.state().list_offsets.clone()
    }

    /// (name, public) for every created playlist.
    pub fn created_playlists(&self) -> Vec<(String, bool)> {
        self.state().created.clone()
    }

    pub fn add_calls(&self) -> Vec<Vec<String>> {
        self.state().add_calls.clone()
    }

    /// How many times the tracks of a playlist were listed.
    pub fn track_list_calls(&self) -> usize {
        self.state().track_list_calls
    }

    pub fn tracks_in(&self, playlist_id: &str) -> Vec<String> {
        self.state().playlist_tracks.get(playlist_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CatalogSearch for MockProvider {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        let mut st = self.state();
        st.search_calls.push(query.to_string());
        if st.failing_queries.contains(query) {
            return Err(anyhow!("mock search failed for {}", query));
        }
        let mut hits = st.catalog.get(query).cloned().unwrap_or_default();
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

#[async_trait]
impl PlaylistDirectory for MockProvider {
    async fn current_user_id(&self) -> Result<String> {
        Ok("mock_user".into())
    }

    async fn list_playlists(&self, _user_id: &str, limit: u32, offset: u32) -> Result<PlaylistPage> {
        let mut st = self.state();
        st.list_offsets.push(offset);
        if st.fail_list {
            return Err(anyhow!("mock list playlists failed at offset {}", offset));
        }
        let start = (offset as usize).min(st.playlists.len());
        let end = (start + limit as usize).min(st.playlists.len());
        Ok(PlaylistPage {
            items: st.playlists[start..end].to_vec(),
            has_next: end < st.playlists.len(),
        })
    }

    async fn create_playlist(&self, _user_id: &str, name: &str, public: bool) -> Result<String> {
        let mut st = self.state();
        if st.fail_create {
            return Err(anyhow!("mock create playlist failed"));
        }
        info!("MockProvider: create_playlist {}", name);
        let id = format!("mock-playlist-{}", st.created.len() + 1);
        st.created.push((name.to_string(), public));
        st.playlists.push(PlaylistSummary { id: id.clone(), name: name.to_string() });
        Ok(id)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let mut st = self.state();
        let index = st.add_calls.len();
        st.add_calls.push(uris.to_vec());
        if st.failing_add_calls.contains(&index) {
            return Err(anyhow!("mock add tracks failed for call {}", index));
        }
        info!("MockProvider: add_tracks {} -> {} tracks", playlist_id, uris.len());
        st.playlist_tracks
            .entry(playlist_id.to_string())
            .or_default()
            .extend(uris.iter().cloned());
        Ok(())
    }

    async fn list_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut st = self.state();
        st.track_list_calls += 1;
        if st.fail_list_tracks {
            return Err(anyhow!("mock list tracks failed for {}", playlist_id));
        }
        Ok(st.playlist_tracks.get(playlist_id).cloned().unwrap_or_default())
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
}
