//! Error types for the acquisition layer

use thiserror::Error;

/// Errors surfaced by the acquisition layer.
///
/// "No data" outcomes (missing beatmap, no eligible score, absent replay
/// payload) are never errors; they are `Ok(None)` on the calls that can
/// produce them.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No user named {0}")]
    UserNotFound(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("Replay payload was not valid base64: {0}")]
    ReplayDecode(#[from] base64::DecodeError),

    #[error("Download was cancelled")]
    Cancelled,
}

impl FetchError {
    /// Check if this error is transient at the network layer.
    ///
    /// The retrying downloader keeps going on these and surfaces
    /// everything else.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let io = FetchError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io.is_transient());
        assert!(!FetchError::UserNotFound("x".into()).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }
}
