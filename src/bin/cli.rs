use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing::subscriber as tracing_subscriber_global;
use anyhow::{Result, Context};
use takeout_playlist_import as lib;
use lib::api::spotify::SpotifyProvider;
use lib::config::Config;
use lib::report::CsvFailureReporter;

#[derive(Parser)]
#[command(name = "takeout-playlist-import", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a takeout playlist folder into Spotify
    Import {
        /// Path to playlist folder from Takeout
        #[arg(long, value_name = "FOLDER")]
        path: String,
    },
    /// Authorize Spotify and store tokens in DB (interactive)
    Auth,
    /// Validate config file and exit
    ConfigValidate,
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    // Explicit --config must exist; otherwise use the per-user config file
    // when present and built-in defaults when not.
    match explicit {
        Some(p) => Config::from_path(p).with_context(|| format!("loading config from {}", p.display())),
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(p) => Config::from_path(&p).with_context(|| format!("loading config from {}", p.display())),
            None => Ok(Config::default()),
        },
    }
}

/// Exit code for a forced quit after a second interrupt.
const FORCED_EXIT: i32 = 130;

/// Turn the first interrupt into a cancel request and the second into a
/// forced exit code. Returns `None` when the signal source goes away.
async fn relay_interrupts<F, Fut>(
    mut next_interrupt: F,
    cancel: tokio::sync::watch::Sender<bool>,
) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    if !next_interrupt().await {
        return None;
    }
    tracing::warn!("Interrupt received; finishing current request and stopping (press Ctrl-C again to quit)");
    let _ = cancel.send(true);
    if !next_interrupt().await {
        return None;
    }
    tracing::warn!("Second interrupt; exiting now");
    Some(FORCED_EXIT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ConfigValidate = cli.command {
        match load_config(cli.config.as_ref()) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {:#}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = load_config(cli.config.as_ref())?;

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "takeout-import.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    match cli.command {
        Commands::Auth => {
            lib::api::spotify_auth::run_spotify_auth(&cfg).await?;
        }
        Commands::Import { path } => {
            let folder = lib::util::strip_trailing_separator(&path);
            let credentials = lib::api::spotify_auth::load_or_authorize(&cfg, || {
                lib::api::spotify_auth::run_spotify_auth(&cfg)
            })
            .await?;
            let provider = SpotifyProvider::new(
                credentials,
                Some(cfg.db_path.clone()),
                cfg.max_retries_on_error,
            );
            let reporter = CsvFailureReporter::new(cfg.report_dir.clone());

            // First Ctrl-C stops after the request in flight and unsent tracks
            // are reported; a second one exits immediately.
            let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                let next = || async { tokio::signal::ctrl_c().await.is_ok() };
                if let Some(code) = relay_interrupts(next, cancel_tx).await {
                    std::process::exit(code);
                }
            });

            let summary = lib::import::run_import(&cfg, &folder, &provider, &reporter, cancel_rx)
                .await
                .with_context(|| format!("importing {}", folder.display()))?;

            println!(
                "{}: {} of {} tracks in playlist {} ({} newly added, {} already present), {} failed",
                summary.playlist_name,
                summary.result.added_tracks.len(),
                summary.total_tracks,
                summary.playlist_id,
                summary.result.added_uris.len(),
                summary.result.already_present_uris.len(),
                summary.result.failed.len()
            );
            if let Some(p) = summary.report_path {
                println!("Failed tracks written to {}", p.display());
            }
        }
        // handled before logging setup
        Commands::ConfigValidate => {}
    }

    Ok(())
}
