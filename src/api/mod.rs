pub mod spotify;
pub mod mock;
pub mod spotify_auth;

use crate::models::{CatalogTrack, PlaylistPage};
use anyhow::Result;

/// Catalog search: the only read the matcher needs.
#[async_trait::async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Search tracks by free-text query; results keep the service's order.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>>;
}

/// Playlist operations used by the resolver and the syncer.
#[async_trait::async_trait]
pub trait PlaylistDirectory: Send + Sync {
    /// Id of the authenticated user.
    async fn current_user_id(&self) -> Result<String>;

    /// One page of the user's playlists.
    async fn list_playlists(&self, user_id: &str, limit: u32, offset: u32) -> Result<PlaylistPage>;

    /// Create a playlist and return its remote id.
    async fn create_playlist(&self, user_id: &str, name: &str, public: bool) -> Result<String>;

    /// Add tracks (URIs) to playlist (batching done by caller)
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// URIs already in the playlist. Default implementation reports none.
    async fn list_playlist_tracks(&self, _playlist_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// A remote service offering both halves.
pub trait Provider: CatalogSearch + PlaylistDirectory {
    /// Return the provider's name (for logging, UI, etc)
    fn name(&self) -> &str;
}
