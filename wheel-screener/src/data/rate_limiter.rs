//! Minimum-interval gate for upstream request throttling.
//!
//! Unlike a token bucket this only guarantees a fixed gap between
//! consecutive calls. One gate is shared by every option-chain and
//! historical-data request of a process.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Global elapsed-time gate.
#[derive(Debug)]
pub struct MinIntervalGate {
    /// Required gap between two calls
    min_interval: Duration,
    /// When the previous caller was released
    last_call: Mutex<Option<Instant>>,
    /// Name for logging
    name: String,
}

impl MinIntervalGate {
    pub fn new(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            name: name.into(),
        }
    }

    /// Gate from a delay in (fractional) seconds.
    pub fn from_secs_f64(name: impl Into<String>, secs: f64) -> Self {
        Self::new(name, Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until at least `min_interval` has passed since the previous call.
    ///
    /// The lock is held while sleeping so concurrent callers queue up and
    /// are released one interval apart.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!(
                    gate = %self.name,
                    wait_ms = remaining.as_millis() as u64,
                    "Waiting for minimum call interval"
                );
                tokio::time::sleep(remaining).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}

/// Shared gate handle.
pub type SharedGate = Arc<MinIntervalGate>;

// ============================================================================
// Tests
// ============================================================================
