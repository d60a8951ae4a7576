//! Shared types for osufetch
//!
//! This crate contains the data structures shared between the CLI
//! and the core acquisition library.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Game Types
// ============================================================================

/// Ruleset a beatmap record belongs to, as encoded in the local database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Standard,
    Taiko,
    CatchTheBeat,
    Mania,
}

impl GameMode {
    /// Decode the one-byte mode code stored per record.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(GameMode::Standard),
            1 => Some(GameMode::Taiko),
            2 => Some(GameMode::CatchTheBeat),
            3 => Some(GameMode::Mania),
            _ => None,
        }
    }
}

/// Which of a user's score lists to index into on the v2 API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Best,
    Recent,
    Firsts,
}

impl ScoreKind {
    /// Path segment used by the `users/{id}/scores/{type}` endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreKind::Best => "best",
            ScoreKind::Recent => "recent",
            ScoreKind::Firsts => "firsts",
        }
    }
}

/// Where a resolved beatmap file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveSource {
    LocalDatabase,
    Remote,
}

/// A beatmap file located on disk, either from the local database or
/// downloaded from the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedBeatmap {
    /// Online beatmap id, known only when the remote path was taken.
    pub beatmap_id: Option<String>,
    pub path: PathBuf,
    pub source: ResolveSource,
}

// ============================================================================
// Configuration
// ============================================================================

/// API credentials for the two authentication surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Static v1 API key, passed as a query parameter.
    pub api_key: String,
    /// OAuth client id for the client-credentials grant.
    pub client_id: String,
    /// OAuth client secret for the client-credentials grant.
    pub client_secret: String,
}

/// Application configuration, persisted as JSON by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub credentials: Credentials,
    /// Game installation directory containing `osu!.db` and `Songs/`.
    pub osu_dir: Option<PathBuf>,
    /// Where remotely fetched beatmap files are written.
    pub downloads_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let downloads_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osufetch")
            .join("beatmaps");

        Self {
            credentials: Credentials::default(),
            osu_dir: None,
            downloads_dir,
        }
    }
}

impl Config {
    /// Path of the local beatmap database, if an installation is configured.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.osu_dir.as_ref().map(|dir| dir.join("osu!.db"))
    }

    /// Path of the songs folder, if an installation is configured.
    pub fn songs_dir(&self) -> Option<PathBuf> {
        self.osu_dir.as_ref().map(|dir| dir.join("Songs"))
    }
}

// ============================================================================
// Events
// ============================================================================

/// Structured diagnostic events emitted by the acquisition layer.
///
/// Hosts subscribe and route these instead of the layer writing to any
/// global sink; dropped receivers are ignored.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FetchEvent {
    /// A new bearer token was obtained.
    TokenRefreshed { expires_in_secs: u64 },
    /// A replay download was delayed by the sliding-window limiter.
    ReplayThrottled { wait_ms: u64 },
    /// A beatmap file download attempt failed and will be retried.
    DownloadRetried {
        beatmap_id: String,
        attempt: u32,
        error: String,
    },
    /// A beatmap file finished downloading.
    DownloadCompleted { beatmap_id: String, path: PathBuf },
    /// A beatmap was resolved to a local path.
    BeatmapResolved { hash: String, source: ResolveSource },
}
