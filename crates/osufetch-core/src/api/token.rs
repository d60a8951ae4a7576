//! OAuth bearer token management for the v2 API
//!
//! The token is obtained through a client-credentials grant and replaced
//! wholesale when it expires. Refresh is lazy: nothing runs in the
//! background, the next checked use pays for the exchange.

use crate::error::FetchError;
use osufetch_types::FetchEvent;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::info;

struct Token {
    value: String,
    expires_in: Duration,
    issued_at: Instant,
}

impl Token {
    fn remaining(&self, now: Instant) -> Duration {
        self.expires_in
            .saturating_sub(now.duration_since(self.issued_at))
    }
}

/// Owns the current bearer token and its expiry countdown.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    /// Lock is held across the whole check-and-refresh so concurrent
    /// callers cannot both decide to refresh on a stale read.
    token: Mutex<Option<Token>>,
    event_tx: broadcast::Sender<FetchEvent>,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        event_tx: broadcast::Sender<FetchEvent>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
            event_tx,
        }
    }

    /// Return a token with remaining lifetime, refreshing first if needed.
    ///
    /// A failed refresh surfaces [`FetchError::TokenRefresh`] and leaves
    /// the previous (expired) token in place; callers must not proceed
    /// with a v2 request in that case.
    pub async fn ensure_valid(&self) -> Result<String, FetchError> {
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.remaining(Instant::now()) > Duration::ZERO {
                return Ok(token.value.clone());
            }
        }

        let refreshed = self.refresh().await?;
        let value = refreshed.value.clone();
        *slot = Some(refreshed);
        Ok(value)
    }

    /// Lifetime left on the current token, clamped to zero. A missing
    /// token reports zero.
    pub async fn remaining_lifetime(&self) -> Duration {
        let slot = self.token.lock().await;
        slot.as_ref()
            .map(|token| token.remaining(Instant::now()))
            .unwrap_or_default()
    }

    async fn refresh(&self) -> Result<Token, FetchError> {
        // Count lifetime from before the exchange so clock time spent on
        // the request is not credited to the token.
        let issued_at = Instant::now();

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", "public"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| FetchError::TokenRefresh(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::TokenRefresh(e.to_string()))?;

        let value = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::TokenRefresh("response missing access_token".into()))?
            .to_string();
        let expires_in_secs = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .ok_or_else(|| FetchError::TokenRefresh("response missing expires_in".into()))?;

        info!("bearer token refreshed, expires in {}s", expires_in_secs);
        let _ = self.event_tx.send(FetchEvent::TokenRefreshed {
            expires_in_secs,
        });

        Ok(Token {
            value,
            expires_in: Duration::from_secs(expires_in_secs),
            issued_at,
        })
    }

    #[cfg(test)]
    async fn install_token(&self, value: &str, expires_in: Duration) {
        *self.token.lock().await = Some(Token {
            value: value.to_string(),
            expires_in,
            issued_at: Instant::now(),
        });
    }
}
