//! Remote API client for the two authentication surfaces
//!
//! The v1 surface authenticates with a static key passed as a query
//! parameter; the v2 surface authenticates with a short-lived OAuth bearer
//! token. Score payloads stay opaque `serde_json::Value` trees with
//! path-based field access.

mod download;
mod rate_limit;
mod token;

pub use download::RetryDownloader;
pub use rate_limit::ReplayRateLimiter;
pub use token::TokenManager;

use crate::error::FetchError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use osufetch_types::{Credentials, FetchEvent, ScoreKind};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// Base URLs of the remote surfaces, injectable for tests.
#[derive(Debug, Clone)]
pub struct ApiHosts {
    /// v1 key-authenticated API, e.g. `https://osu.ppy.sh/api`.
    pub v1: String,
    /// v2 bearer-authenticated API, e.g. `https://osu.ppy.sh/api/v2`.
    pub v2: String,
    /// OAuth token endpoint for the client-credentials grant.
    pub oauth_token: String,
    /// Host serving raw beatmap files by id.
    pub files: String,
}

impl Default for ApiHosts {
    fn default() -> Self {
        Self {
            v1: "https://osu.ppy.sh/api".to_string(),
            v2: "https://osu.ppy.sh/api/v2".to_string(),
            oauth_token: "https://osu.ppy.sh/oauth/token".to_string(),
            files: "https://osu.ppy.sh".to_string(),
        }
    }
}

/// Client for user, beatmap, score and replay lookups.
pub struct ApiClient {
    http: Client,
    api_key: String,
    hosts: ApiHosts,
    token: TokenManager,
    replay_limiter: ReplayRateLimiter,
}

impl ApiClient {
    pub fn new(
        http: Client,
        credentials: &Credentials,
        event_tx: broadcast::Sender<FetchEvent>,
    ) -> Self {
        Self::with_hosts(http, credentials, ApiHosts::default(), event_tx)
    }

    pub fn with_hosts(
        http: Client,
        credentials: &Credentials,
        hosts: ApiHosts,
        event_tx: broadcast::Sender<FetchEvent>,
    ) -> Self {
        let token = TokenManager::new(
            http.clone(),
            hosts.oauth_token.clone(),
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            event_tx.clone(),
        );
        let replay_limiter = ReplayRateLimiter::new(event_tx);

        Self {
            http,
            api_key: credentials.api_key.clone(),
            hosts,
            token,
            replay_limiter,
        }
    }

    /// The bearer token manager, exposed for lifetime reporting.
    pub fn token_manager(&self) -> &TokenManager {
        &self.token
    }

    // ========================================================================
    // v1 key-authenticated surface
    // ========================================================================

    async fn request_v1(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.hosts.v1, endpoint);
        let response = self
            .http
            .get(&url)
            .query(&[("k", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// Resolve a user name to its numeric id.
    ///
    /// An empty result set fails with [`FetchError::UserNotFound`].
    pub async fn lookup_user_id(&self, username: &str) -> Result<String, FetchError> {
        let result = self
            .request_v1("get_user", &[("u", username), ("type", "string")])
            .await?;

        let users = result.as_array().ok_or_else(|| FetchError::MalformedResponse {
            endpoint: "get_user".to_string(),
            reason: format!("expected array, got {}", result),
        })?;

        match users.first() {
            Some(user) => field_as_string(user, "user_id").ok_or_else(|| {
                FetchError::MalformedResponse {
                    endpoint: "get_user".to_string(),
                    reason: "first element missing user_id".to_string(),
                }
            }),
            None => Err(FetchError::UserNotFound(username.to_string())),
        }
    }

    /// Resolve a beatmap hash to its online id; `Ok(None)` on no match.
    pub async fn lookup_beatmap_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<String>, FetchError> {
        let result = self.request_v1("get_beatmaps", &[("h", hash)]).await?;

        let maps = result.as_array().ok_or_else(|| FetchError::MalformedResponse {
            endpoint: "get_beatmaps".to_string(),
            reason: format!("expected array, got {}", result),
        })?;

        Ok(maps.first().and_then(|map| field_as_string(map, "beatmap_id")))
    }

    /// Download the replay data of a score.
    ///
    /// Goes through the sliding-window limiter before the request. A
    /// response without a `content` payload yields `Ok(None)`, not an
    /// error.
    pub async fn fetch_replay_bytes(
        &self,
        score_id: &str,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        self.replay_limiter.admit().await;

        let result = self.request_v1("get_replay", &[("s", score_id)]).await?;
        match result.get("content").and_then(Value::as_str) {
            Some(content) => Ok(Some(BASE64.decode(content)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // v2 bearer-authenticated surface
    // ========================================================================

    async fn request_v2(&self, endpoint: &str) -> Result<Value, FetchError> {
        let bearer = self.token.ensure_valid().await?;
        let url = format!("{}/{}", self.hosts.v2, endpoint);
        let response = self.http.get(&url).bearer_auth(bearer).send().await?;
        Ok(response.json().await?)
    }

    /// Fetch the score at `index` of one of a user's score lists.
    ///
    /// Yields `Ok(None)` ("no eligible score") when the position is empty
    /// or the score has no replay or is a perfect play.
    pub async fn fetch_user_score(
        &self,
        user_id: &str,
        kind: ScoreKind,
        index: u32,
        include_failed: bool,
    ) -> Result<Option<Value>, FetchError> {
        let endpoint = format!(
            "users/{}/scores/{}?mode=osu&include_fails={}&limit=1&offset={}",
            user_id,
            kind.as_str(),
            include_failed as u8,
            index
        );
        let result = self.request_v2(&endpoint).await?;

        match result.as_array().and_then(|scores| scores.first()) {
            Some(score) => Ok(filter_eligible(&endpoint, score)),
            None => {
                warn!("{} failed: {}", endpoint, result);
                Ok(None)
            }
        }
    }

    /// Fetch the score at `index` of a beatmap's leaderboard.
    ///
    /// Same eligibility filter as [`Self::fetch_user_score`].
    pub async fn fetch_beatmap_score(
        &self,
        beatmap_id: &str,
        index: usize,
    ) -> Result<Option<Value>, FetchError> {
        let endpoint = format!("beatmaps/{}/scores", beatmap_id);
        let result = self.request_v2(&endpoint).await?;

        match result
            .get("scores")
            .and_then(Value::as_array)
            .and_then(|scores| scores.get(index))
        {
            Some(score) => Ok(filter_eligible(&endpoint, score)),
            None => {
                warn!("{} failed: {}", endpoint, result);
                Ok(None)
            }
        }
    }
}

/// Keep a score only when it is replay-backed and not a full combo.
///
/// Perfect plays have no misses to analyze downstream, and a score
/// without stored replay data cannot be replayed at all. A score missing
/// either field is logged and treated as not eligible.
fn filter_eligible(endpoint: &str, score: &Value) -> Option<Value> {
    let replay = score.get("replay").and_then(Value::as_bool);
    let perfect = score.get("perfect").and_then(Value::as_bool);

    match (replay, perfect) {
        (Some(replay), Some(perfect)) => (replay && !perfect).then(|| score.clone()),
        _ => {
            warn!("{} returned score with unexpected shape: {}", endpoint, score);
            None
        }
    }
}

/// Read a field that v1 serves as a string but v2 serves as a number.
fn field_as_string(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
