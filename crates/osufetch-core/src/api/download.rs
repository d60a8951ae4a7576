//! Retrying beatmap file downloader
//!
//! Streams a beatmap file from the raw file endpoint to disk. Transient
//! network failures are logged and retried without a ceiling; attempts are
//! separated by bounded exponential backoff and a cancellation flag is
//! observed between attempts. The file is staged as `<target>.part` and
//! renamed into place so the idempotence check never observes a partial
//! download.

use crate::error::FetchError;
use futures::StreamExt;
use osufetch_types::FetchEvent;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Fetches beatmap files to local storage, retrying until they exist.
#[derive(Clone)]
pub struct RetryDownloader {
    http: Client,
    /// Host serving raw beatmap files by id.
    files_base: String,
    backoff_base: Duration,
    backoff_cap: Duration,
    cancelled: Arc<AtomicBool>,
    event_tx: broadcast::Sender<FetchEvent>,
}

impl RetryDownloader {
    pub fn new(
        http: Client,
        files_base: impl Into<String>,
        event_tx: broadcast::Sender<FetchEvent>,
    ) -> Self {
        Self {
            http,
            files_base: files_base.into(),
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            cancelled: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// Override the retry backoff bounds.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Abandon in-flight retry loops at their next attempt boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Make sure `<dest_dir>/<beatmap_id>.osu` exists and return its path.
    ///
    /// Returns immediately with no network call when the file is already
    /// present, including when it appears through some concurrent means
    /// between attempts.
    pub async fn ensure_beatmap_file(
        &self,
        beatmap_id: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let target = dest_dir.join(format!("{}.osu", beatmap_id));
        let mut attempt: u32 = 0;
        let mut backoff = self.backoff_base;

        loop {
            if fs::try_exists(&target).await? {
                return Ok(target);
            }
            if self.cancelled.load(Ordering::Acquire) {
                return Err(FetchError::Cancelled);
            }

            fs::create_dir_all(dest_dir).await?;

            match self.try_download(beatmap_id, &target).await {
                Ok(()) => {
                    info!("beatmap {} downloaded to {}", beatmap_id, target.display());
                    let _ = self.event_tx.send(FetchEvent::DownloadCompleted {
                        beatmap_id: beatmap_id.to_string(),
                        path: target.clone(),
                    });
                    return Ok(target);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    warn!(
                        "beatmap {} download attempt {} failed: {}",
                        beatmap_id, attempt, e
                    );
                    let _ = self.event_tx.send(FetchEvent::DownloadRetried {
                        beatmap_id: beatmap_id.to_string(),
                        attempt,
                        error: e.to_string(),
                    });
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.backoff_cap);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_download(&self, beatmap_id: &str, target: &Path) -> Result<(), FetchError> {
        let url = format!("{}/osu/{}", self.files_base, beatmap_id);
        let response = self.http.get(&url).send().await?.error_for_status()?;

        let part = target.with_extension("osu.part");
        let mut file = File::create(&part).await?;

        if let Err(e) = Self::write_stream(response, &mut file).await {
            drop(file);
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }

        file.sync_all().await?;
        drop(file);
        fs::rename(&part, target).await?;
        Ok(())
    }

    async fn write_stream(response: reqwest::Response, file: &mut File) -> Result<(), FetchError> {
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        Ok(())
    }
}
