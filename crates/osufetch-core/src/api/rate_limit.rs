//! Sliding-window limiter for replay downloads
//!
//! The replay endpoint tolerates at most 10 downloads starting within any
//! trailing 60-second interval. This is a sliding window over admission
//! timestamps, not a token bucket: bursts are smoothed by waiting out the
//! oldest admission instead of resetting at clock boundaries.

use osufetch_types::FetchEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Maximum admissions inside one window span.
const WINDOW_CAP: usize = 10;
/// Length of the trailing interval.
const WINDOW_SPAN: Duration = Duration::from_secs(60);

/// Admission gate shared by all replay fetches.
#[derive(Clone)]
pub struct ReplayRateLimiter {
    window: Arc<Mutex<VecDeque<Instant>>>,
    event_tx: broadcast::Sender<FetchEvent>,
}

impl ReplayRateLimiter {
    pub fn new(event_tx: broadcast::Sender<FetchEvent>) -> Self {
        Self {
            window: Arc::new(Mutex::new(VecDeque::new())),
            event_tx,
        }
    }

    /// Block until a replay download may start, then record its start time.
    ///
    /// The window lock is held across prune, wait and record so concurrent
    /// callers serialize; two tasks can never both pass the cap check on a
    /// stale read.
    pub async fn admit(&self) {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        Self::prune(&mut window, now);

        if window.len() >= WINDOW_CAP {
            if let Some(oldest) = window.front().copied() {
                let wait = WINDOW_SPAN.saturating_sub(now.duration_since(oldest));
                debug!("replay window full, waiting {:?}", wait);
                let _ = self.event_tx.send(FetchEvent::ReplayThrottled {
                    wait_ms: wait.as_millis() as u64,
                });
                sleep(wait).await;
                Self::prune(&mut window, Instant::now());
            }
        }

        window.push_back(Instant::now());
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= WINDOW_SPAN {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}
