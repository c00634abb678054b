//! Client-side rate limiting for SceneBot calls.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum-interval gate shared by every call a client makes.
///
/// Replaces the app's process-global last-call timestamp with an explicit
/// object owned by the client. The mutex makes check-then-claim atomic, so
/// two racing calls cannot both pass inside one interval.
pub struct CallGate {
    min_interval: Duration,
    last_claim: Mutex<Option<Instant>>,
}

impl CallGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_claim: Mutex::new(None),
        }
    }

    /// Claim the gate for one call.
    ///
    /// `Err` carries how long until a claim can succeed. The claim instant
    /// advances only on success; rejected attempts do not push the window.
    pub fn try_claim(&self) -> std::result::Result<(), Duration> {
        let mut last = self.last_claim.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(prev) = *last {
            let elapsed = now.duration_since(prev);
            if elapsed < self.min_interval {
                return Err(self.min_interval - elapsed);
            }
        }

        *last = Some(now);
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
