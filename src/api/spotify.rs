use super::{CatalogSearch, PlaylistDirectory, Provider};
use crate::db;
use crate::models::{CatalogTrack, PlaylistPage, PlaylistSummary};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const PROVIDER_NAME: &str = "spotify";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Everything needed to talk to the Web API on behalf of one user.
/// Built once per run (see `spotify_auth::load_credentials`) and handed to
/// the provider; nothing is read from globals afterwards.
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    /// Absent when the token was obtained with PKCE.
    pub client_secret: Option<String>,
    pub token: StoredToken,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Deserialize)]
struct SearchTracks {
    #[serde(default)]
    items: Vec<Option<TrackObject>>,
}

#[derive(Deserialize)]
struct TrackObject {
    name: String,
    album: NamedObject,
    #[serde(default)]
    artists: Vec<NamedObject>,
    #[serde(default)]
    explicit: bool,
    duration_ms: u64,
    uri: String,
}

#[derive(Deserialize)]
struct NamedObject {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct PlaylistsResponse {
    #[serde(default)]
    items: Vec<Option<PlaylistObject>>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistObject {
    id: String,
    #[serde(default)]
    name: String,
}

impl From<TrackObject> for CatalogTrack {
    fn from(t: TrackObject) -> Self {
        CatalogTrack {
            title: t.name,
            album: t.album.name,
            artists: t.artists.into_iter().map(|a| a.name).collect(),
            explicit: t.explicit,
            duration_ms: t.duration_ms,
            uri: t.uri,
        }
    }
}

/// Spotify provider backed by Spotify Web API.
/// Refreshed tokens are persisted to the credentials DB when one is configured.
/// Endpoints may be overridden by SPOTIFY_AUTH_BASE and SPOTIFY_API_BASE env vars (useful for tests).
pub struct SpotifyProvider {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
    db_path: Option<PathBuf>,
    max_retries: u32,
    token: tokio::sync::Mutex<StoredToken>,
    user_id: tokio::sync::Mutex<Option<String>>,
}

impl SpotifyProvider {
    pub fn new(credentials: SpotifyCredentials, db_path: Option<PathBuf>, max_retries: u32) -> Self {
        Self {
            client: Client::new(),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret.filter(|s| !s.is_empty()),
            db_path,
            max_retries,
            token: tokio::sync::Mutex::new(credentials.token),
            user_id: tokio::sync::Mutex::new(None),
        }
    }

    pub fn auth_base() -> String {
        env::var("SPOTIFY_AUTH_BASE").unwrap_or_else(|_| "https://accounts.spotify.com".into())
    }
    pub fn api_base() -> String {
        // include v1 path by default
        env::var("SPOTIFY_API_BASE").unwrap_or_else(|_| "https://api.spotify.com/v1".into())
    }

    async fn persist_token(&self, st: &StoredToken) -> Result<()> {
        let Some(db_path) = self.db_path.clone() else {
            return Ok(());
        };
        let s = serde_json::to_string(st)?;
        tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
            let conn = db::open_or_create(&db_path)?;
            db::save_credential_raw(&conn, PROVIDER_NAME, &s, None, None)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn refresh_token_internal(&self, cur: &mut StoredToken) -> Result<()> {
        let refresh_token = cur
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow!("no refresh token"))?;
        let url = format!("{}/api/token", Self::auth_base());
        let mut req = self.client.post(&url);
        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        match &self.client_secret {
            Some(secret) => {
                let auth_header = format!(
                    "Basic {}",
                    general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, secret))
                );
                req = req.header(AUTHORIZATION, auth_header);
            }
            None => params.push(("client_id", self.client_id.clone())),
        }
        let resp = req.form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to refresh token: {} - {}", status, body));
        }
        let j: serde_json::Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("no access_token"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(3600);
        cur.access_token = access_token;
        cur.token_type = "Bearer".into();
        cur.expires_at = Utc::now().timestamp() + expires_in;
        if let Some(s) = j["scope"].as_str() {
            cur.scope = Some(s.to_string());
        }
        // Spotify may rotate the refresh token.
        if let Some(rt) = j["refresh_token"].as_str() {
            cur.refresh_token = Some(rt.to_string());
        }
        Ok(())
    }

    /// Save a refreshed token. Failures are logged; the token in memory is kept.
    async fn persist_or_warn(&self, st: &StoredToken) {
        if let Err(e) = self.persist_token(st).await {
            warn!("Could not save refreshed Spotify token: {:#}", e);
        }
    }

    async fn refresh_now(&self) -> Result<()> {
        let mut lock = self.token.lock().await;
        let mut cur = lock.clone();
        self.refresh_token_internal(&mut cur).await?;
        *lock = cur;
        self.persist_or_warn(&lock).await;
        Ok(())
    }

    async fn get_bearer(&self) -> Result<String> {
        let mut lock = self.token.lock().await;
        let now = Utc::now().timestamp();
        if now + 30 >= lock.expires_at && lock.refresh_token.is_some() {
            debug!("Spotify token is near expiry, refreshing");
            let mut cur = lock.clone();
            self.refresh_token_internal(&mut cur).await?;
            *lock = cur;
            self.persist_or_warn(&lock).await;
        }
        Ok(format!("Bearer {}", lock.access_token))
    }

    /// Send a request built by `build`, refreshing the token once on 401 and
    /// honoring `Retry-After` on 429 up to `max_retries` times.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let mut refreshed = false;
        let mut rate_limited: u32 = 0;
        loop {
            let bearer = self.get_bearer().await?;
            let resp = build(&bearer).send().await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("Got 401 from Spotify; attempting token refresh");
                self.refresh_now().await?;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && rate_limited < self.max_retries {
                rate_limited += 1;
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                warn!(
                    "Spotify rate limit hit (attempt {}); retrying in {}s",
                    rate_limited,
                    retry_after + 1
                );
                tokio::time::sleep(Duration::from_secs(retry_after + 1)).await;
                continue;
            }

            return Ok(resp);
        }
    }

    async fn expect_success(resp: Response, what: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let txt = resp.text().await.unwrap_or_default();
        Err(anyhow!("{} failed: {} => {}", what, status, txt))
    }
}

#[async_trait]
impl CatalogSearch for SpotifyProvider {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            Self::api_base(),
            urlencoding::encode(query),
            limit
        );
        let resp = self
            .send_authorized(|bearer| {
                self.client
                    .get(&url)
                    .header(AUTHORIZATION, bearer)
                    .header(ACCEPT, "application/json")
            })
            .await?;
        let resp = Self::expect_success(resp, "search").await?;
        let body: SearchResponse = resp.json().await.context("decoding search response")?;
        Ok(body
            .tracks
            .items
            .into_iter()
            .flatten()
            .map(CatalogTrack::from)
            .collect())
    }
}

#[async_trait]
impl PlaylistDirectory for SpotifyProvider {
    async fn current_user_id(&self) -> Result<String> {
        {
            let g = self.user_id.lock().await;
            if let Some(u) = g.as_ref() {
                return Ok(u.clone());
            }
        }
        let url = format!("{}/me", Self::api_base());
        let resp = self
            .send_authorized(|bearer| self.client.get(&url).header(AUTHORIZATION, bearer))
            .await?;
        let resp = Self::expect_success(resp, "fetch /me").await?;
        let j: serde_json::Value = resp.json().await?;
        let id = j["id"]
            .as_str()
            .ok_or_else(|| anyhow!("no id"))?
            .to_string();
        let mut g = self.user_id.lock().await;
        *g = Some(id.clone());
        Ok(id)
    }

    async fn list_playlists(&self, user_id: &str, limit: u32, offset: u32) -> Result<PlaylistPage> {
        let url = format!(
            "{}/users/{}/playlists?limit={}&offset={}",
            Self::api_base(),
            url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect::<String>(),
            limit,
            offset
        );
        let resp = self
            .send_authorized(|bearer| self.client.get(&url).header(AUTHORIZATION, bearer))
            .await?;
        let resp = Self::expect_success(resp, "list playlists").await?;
        let body: PlaylistsResponse = resp.json().await.context("decoding playlists page")?;
        Ok(PlaylistPage {
            items: body
                .items
                .into_iter()
                .flatten()
                .map(|p| PlaylistSummary { id: p.id, name: p.name })
                .collect(),
            has_next: body.next.is_some(),
        })
    }

    async fn create_playlist(&self, user_id: &str, name: &str, public: bool) -> Result<String> {
        let url = format!(
            "{}/users/{}/playlists",
            Self::api_base(),
            url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect::<String>()
        );
        let body = json!({
            "name": name,
            "description": "Imported from Google Play Music takeout",
            "public": public
        });
        let resp = self
            .send_authorized(|bearer| {
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, bearer)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body)
            })
            .await?;
        let resp = Self::expect_success(resp, "create playlist").await?;
        let j: serde_json::Value = resp.json().await?;
        let id = j["id"]
            .as_str()
            .ok_or_else(|| anyhow!("no id"))?
            .to_string();
        Ok(id)
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let url = format!("{}/playlists/{}/tracks", Self::api_base(), playlist_id);
        let body = json!({ "uris": uris });
        let resp = self
            .send_authorized(|bearer| {
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, bearer)
                    .json(&body)
            })
            .await?;
        Self::expect_success(resp, "add tracks").await?;
        Ok(())
    }

    async fn list_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let mut next: Option<String> = Some(format!(
            "{}/playlists/{}/tracks?fields=items(track(uri)),next&limit=100",
            Self::api_base(),
            playlist_id
        ));

        while let Some(url) = next {
            let resp = self
                .send_authorized(|bearer| self.client.get(&url).header(AUTHORIZATION, bearer))
                .await?;
            let resp = Self::expect_success(resp, "list playlist tracks").await?;
            let j: serde_json::Value = resp.json().await?;
            if let Some(items) = j["items"].as_array() {
                for it in items {
                    if let Some(uri) = it["track"]["uri"].as_str() {
                        uris.push(uri.to_string());
                    }
                }
            }
            next = j["next"].as_str().map(|s| s.to_string());
        }
        Ok(uris)
    }
}

impl Provider for SpotifyProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
