use super::spotify::{SpotifyCredentials, SpotifyProvider, StoredToken, PROVIDER_NAME};
use crate::config::Config;
use crate::db;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use tracing::{info, warn};
use url::Url;

/// Scopes needed to find and fill the user's private playlists.
pub const SCOPES: &[&str] = &["playlist-read-private", "playlist-modify-private"];

/// Manual OAuth helper:
/// 1. Build the Spotify authorization URL and print it.
/// 2. User opens it in a browser, approves and gets redirected to the redirect URI (which may fail if it's a dummy).
/// 3. User pastes the full redirect URL (or just the `code` value) into this CLI.
/// 4. The code is exchanged for an access_token + refresh_token.
/// 5. The tokens are stored in the DB credentials table as JSON.
///
/// Without a client secret the flow uses PKCE (S256).
#[derive(Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

/// PKCE verifier and its S256 challenge.
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    pub fn challenge_for(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(hash)
    }
}

/// Build the authorize URL. `challenge` is set for PKCE flows.
pub fn authorize_url(
    client_id: &str,
    redirect_uri: &str,
    challenge: Option<&str>,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", SpotifyProvider::auth_base()))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("show_dialog", "true");
        if let Some(c) = challenge {
            q.append_pair("code_challenge_method", "S256")
                .append_pair("code_challenge", c);
        }
    }
    Ok(url)
}

/// Pull the authorization code out of whatever the user pasted: either the
/// full redirect URL or the bare code.
pub fn extract_code(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("no authorization code provided"));
    }
    let parsed = match Url::parse(input) {
        Ok(u) => u,
        Err(_) => return Ok(input.to_string()),
    };
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .ok_or_else(|| anyhow!("no code in redirect URL"))?
        .1
        .into_owned();
    Ok(code)
}

fn prompt(label: &str) -> Result<String> {
    println!("{}", label);
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub async fn run_spotify_auth(cfg: &Config) -> Result<()> {
    let client_id = if cfg.spotify_client_id.is_empty() {
        prompt("Enter your Spotify client_id:")?
    } else {
        cfg.spotify_client_id.clone()
    };
    if client_id.is_empty() {
        return Err(anyhow!("no client_id provided"));
    }
    let client_secret = if cfg.spotify_client_secret.is_empty() {
        prompt("Enter your Spotify client_secret (leave blank to use PKCE):")?
    } else {
        cfg.spotify_client_secret.clone()
    };
    let client_secret = Some(client_secret).filter(|s| !s.is_empty());
    let redirect_uri = cfg.spotify_redirect_uri.clone();

    let pkce = client_secret.is_none().then(PkcePair::generate);
    let url = authorize_url(
        &client_id,
        &redirect_uri,
        pkce.as_ref().map(|p| p.challenge.as_str()),
    )?;

    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    let input = prompt("Paste the redirect URL (or the authorization code):")?;
    let code = extract_code(&input)?;

    let stored_token = exchange_code(
        &client_id,
        client_secret.as_deref(),
        &redirect_uri,
        &code,
        pkce.as_ref().map(|p| p.verifier.as_str()),
    )
    .await?;
    let token_json = serde_json::to_string(&stored_token)?;

    // Persist to DB (blocking)
    let db_path = cfg.db_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
        let conn = db::open_or_create(&db_path)?;
        db::save_credential_raw(
            &conn,
            PROVIDER_NAME,
            &token_json,
            Some(&client_id),
            Some(client_secret.as_deref().unwrap_or("")),
        )?;
        Ok(())
    })
    .await??;

    info!("Spotify tokens saved to {}", cfg.db_path.display());
    println!("Saved tokens. You can now run `import --path <folder>`.");
    Ok(())
}

/// Exchange an authorization code for a token.
pub async fn exchange_code(
    client_id: &str,
    client_secret: Option<&str>,
    redirect_uri: &str,
    code: &str,
    verifier: Option<&str>,
) -> Result<StoredToken> {
    let client = Client::new();
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    let mut req = client.post(format!("{}/api/token", SpotifyProvider::auth_base()));
    if let Some(secret) = client_secret {
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", client_id, secret))
        );
        req = req.header("Authorization", auth_header);
    } else {
        params.push(("client_id", client_id));
    }
    if let Some(v) = verifier {
        params.push(("code_verifier", v));
    }
    let resp = req.form(&params).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }

    let tr: TokenResponse = resp.json().await?;
    Ok(StoredToken {
        access_token: tr.access_token,
        token_type: tr.token_type,
        expires_at: chrono::Utc::now().timestamp() + tr.expires_in,
        refresh_token: tr.refresh_token,
        scope: tr.scope,
    })
}

/// Load the stored Spotify token and client registration.
/// Fails when `auth` has not been run yet.
pub async fn load_credentials(cfg: &Config) -> Result<SpotifyCredentials> {
    let db_path = cfg.db_path.clone();
    let row = tokio::task::spawn_blocking(move || {
        let conn = db::open_or_create(&db_path)?;
        db::load_credential_with_client(&conn, PROVIDER_NAME)
    })
    .await??;
    let (token_json, db_client_id, db_client_secret) = row.ok_or_else(|| {
        anyhow!("no Spotify credentials stored; run the `auth` command first")
    })?;
    let token: StoredToken =
        serde_json::from_str(&token_json).context("parse stored Spotify token")?;

    // Config values win over what was stored at auth time.
    let client_id = Some(cfg.spotify_client_id.clone())
        .filter(|s| !s.is_empty())
        .or(db_client_id)
        .ok_or_else(|| anyhow!("no Spotify client_id configured or stored"))?;
    let client_secret = Some(cfg.spotify_client_secret.clone())
        .filter(|s| !s.is_empty())
        .or(db_client_secret)
        .filter(|s| !s.is_empty());

    Ok(SpotifyCredentials { client_id, client_secret, token })
}

/// Load stored credentials, running `authorize` once when that fails
/// (nothing stored yet, unreadable token) and then loading again.
pub async fn load_or_authorize<F, Fut>(cfg: &Config, authorize: F) -> Result<SpotifyCredentials>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match load_credentials(cfg).await {
        Ok(credentials) => Ok(credentials),
        Err(e) => {
            warn!("{:#}; starting interactive authorization", e);
            authorize().await?;
            load_credentials(cfg).await
        }
    }
}
