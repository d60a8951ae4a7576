//! osufetch Core - Beatmap & Replay Acquisition
//!
//! This crate resolves the beatmap files and replay data an offline miss
//! analyzer needs: a remote API client spanning the key-authenticated and
//! bearer-authenticated surfaces, a retrying beatmap file downloader, and
//! a scanner over the local binary beatmap database.

mod api;
mod cursor;
mod database;
mod error;

pub use api::{ApiClient, ApiHosts, ReplayRateLimiter, RetryDownloader, TokenManager};
pub use cursor::ByteCursor;
pub use database::DatabaseScanner;
pub use error::FetchError;

use osufetch_types::{Config, FetchEvent, ResolveSource, ResolvedBeatmap};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// The main osufetch instance: local database first, remote fallback.
pub struct OsufetchCore {
    /// Remote API client
    api: ApiClient,
    /// Retrying beatmap file downloader
    downloader: RetryDownloader,
    /// Local database scanner, present when an installation is configured
    scanner: Option<DatabaseScanner>,
    /// Songs folder the scanner resolves into
    songs_dir: Option<PathBuf>,
    /// Where remotely fetched beatmaps land
    downloads_dir: PathBuf,
    /// Event broadcaster
    event_tx: broadcast::Sender<FetchEvent>,
}

impl OsufetchCore {
    /// Create a new core instance against the production hosts.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::with_hosts(config, ApiHosts::default())
    }

    /// Create a core instance against explicit hosts (used by tests).
    pub fn with_hosts(config: &Config, hosts: ApiHosts) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("osufetch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let (event_tx, _) = broadcast::channel(256);

        let api = ApiClient::with_hosts(http.clone(), &config.credentials, hosts.clone(), event_tx.clone());
        let downloader = RetryDownloader::new(http, hosts.files, event_tx.clone());

        Ok(Self {
            api,
            downloader,
            scanner: config.db_path().map(DatabaseScanner::new),
            songs_dir: config.songs_dir(),
            downloads_dir: config.downloads_dir.clone(),
            event_tx,
        })
    }

    /// Subscribe to diagnostic events.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.event_tx.subscribe()
    }

    /// The remote API client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The retrying downloader.
    pub fn downloader(&self) -> &RetryDownloader {
        &self.downloader
    }

    /// Resolve a beatmap file from its content hash.
    ///
    /// The local database is tried first; on a miss the hash is resolved
    /// to an online id and the file is downloaded into the configured
    /// downloads directory. `Ok(None)` means the hash is unknown both
    /// locally and remotely.
    pub async fn resolve_beatmap(
        &self,
        hash: &str,
    ) -> Result<Option<ResolvedBeatmap>, FetchError> {
        if let (Some(scanner), Some(songs_dir)) = (&self.scanner, &self.songs_dir) {
            let scanner = scanner.clone();
            let songs_dir = songs_dir.clone();
            let target = hash.to_string();
            let found = tokio::task::spawn_blocking(move || {
                scanner.resolve_beatmap_path(&songs_dir, &target)
            })
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

            if let Some(path) = found {
                info!("beatmap {} resolved from local database", hash);
                let _ = self.event_tx.send(FetchEvent::BeatmapResolved {
                    hash: hash.to_string(),
                    source: ResolveSource::LocalDatabase,
                });
                return Ok(Some(ResolvedBeatmap {
                    beatmap_id: None,
                    path,
                    source: ResolveSource::LocalDatabase,
                }));
            }
        }

        let Some(beatmap_id) = self.api.lookup_beatmap_by_hash(hash).await? else {
            return Ok(None);
        };

        let path = self
            .downloader
            .ensure_beatmap_file(&beatmap_id, &self.downloads_dir)
            .await?;

        info!("beatmap {} resolved remotely as id {}", hash, beatmap_id);
        let _ = self.event_tx.send(FetchEvent::BeatmapResolved {
            hash: hash.to_string(),
            source: ResolveSource::Remote,
        });

        Ok(Some(ResolvedBeatmap {
            beatmap_id: Some(beatmap_id),
            path,
            source: ResolveSource::Remote,
        }))
    }
}
