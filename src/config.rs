use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Spotify rejects add-tracks requests with more than this many URIs.
pub const SPOTIFY_MAX_BATCH: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // path to database file holding provider credentials
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Directory the failed-tracks CSV is written to.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    // Matching / sync policy
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries_on_error: u32,

    // Spotify app registration. When empty, `auth` prompts for them.
    #[serde(default)]
    pub spotify_client_id: String,
    #[serde(default)]
    pub spotify_client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub spotify_redirect_uri: String,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("takeout-playlist-import")
        .join("credentials.db")
}
fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("takeout-playlist-import")
        .join("logs")
}
fn default_report_dir() -> PathBuf { ".".into() }
fn default_search_limit() -> u32 { 20 }
fn default_page_size() -> u32 { 50 }
fn default_batch_size() -> usize { 15 }
fn default_max_retries() -> u32 { 3 }
fn default_redirect_uri() -> String { "http://127.0.0.1:8888/".into() }

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            report_dir: default_report_dir(),
            search_limit: default_search_limit(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_retries_on_error: default_max_retries(),
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            spotify_redirect_uri: default_redirect_uri(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Default location of the config file, `<config_dir>/takeout-playlist-import/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("takeout-playlist-import").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_limit == 0 || self.page_size == 0 {
            return Err(anyhow!("search_limit and page_size must be greater than zero"));
        }
        if self.batch_size == 0 || self.batch_size > SPOTIFY_MAX_BATCH {
            return Err(anyhow!(
                "batch_size must be between 1 and {}, got {}",
                SPOTIFY_MAX_BATCH,
                self.batch_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_reference_policy() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.search_limit, 20);
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.batch_size, 15);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let cfg: Config = toml::from_str("batch_size = 101").unwrap();
        assert!(cfg.validate().is_err());
        let cfg: Config = toml::from_str("batch_size = 0").unwrap();
        assert!(cfg.validate().is_err());
    }
}
