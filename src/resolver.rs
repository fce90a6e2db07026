use crate::api::PlaylistDirectory;
use anyhow::{Context, Result};
use log::{debug, info};

/// Finds the user's playlist with an exact name, creating a private one when
/// none exists.
pub struct PlaylistResolver<'a, D: PlaylistDirectory + ?Sized> {
    directory: &'a D,
    page_size: u32,
}

impl<'a, D: PlaylistDirectory + ?Sized> PlaylistResolver<'a, D> {
    pub fn new(directory: &'a D, page_size: u32) -> Self {
        Self { directory, page_size: page_size.max(1) }
    }

    /// Return the id of the first playlist named exactly `name`
    /// (case-sensitive), walking pages only until one is found.
    pub async fn find_existing(&self, user_id: &str, name: &str) -> Result<Option<String>> {
        let mut offset = 0u32;
        loop {
            let page = self
                .directory
                .list_playlists(user_id, self.page_size, offset)
                .await
                .with_context(|| format!("listing playlists at offset {}", offset))?;
            debug!("Fetched {} playlists at offset {}", page.items.len(), offset);
            if let Some(found) = page.items.into_iter().find(|p| p.name == name) {
                return Ok(Some(found.id));
            }
            if !page.has_next {
                return Ok(None);
            }
            offset += self.page_size;
        }
    }

    pub async fn resolve(&self, name: &str) -> Result<String> {
        let user_id = self.directory.current_user_id().await.context("fetching current user")?;
        if let Some(id) = self.find_existing(&user_id, name).await? {
            info!("Playlist {} exists, adding to existing ({})", name, id);
            return Ok(id);
        }
        info!("Creating playlist: {}", name);
        let id = self
            .directory
            .create_playlist(&user_id, name, false)
            .await
            .with_context(|| format!("creating playlist {}", name))?;
        Ok(id)
    }
}
