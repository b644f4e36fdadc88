//! Connection health tracking with rate-limited failure warnings.
//!
//! A streak of failed sends usually means a misconfigured endpoint or
//! certificate chain. The first failure of a streak is logged immediately;
//! later ones are counted and summarised at most once per warn interval so a
//! dead indexer does not flood the host's log. The streak resets on the next
//! successful send.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{info, warn};
use parking_lot::Mutex;

use super::transmitter::TransmissionError;

/// Clock returning milliseconds since the UNIX epoch; injectable for tests.
pub type TimeProvider = Box<dyn Fn() -> u64 + Send + Sync>;

/// Point-in-time view of the sender's connection health.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Sends that have failed since the last success.
    pub consecutive_failures: u64,
    /// Description of the most recent failure in the current streak.
    pub last_error: Option<String>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

/// Tracks consecutive send failures for one sender instance.
pub struct ConnectionHealth {
    endpoint: String,
    consecutive_failures: AtomicU64,
    suppressed: AtomicU64,
    last_warn: AtomicU64,
    warn_interval: u64,
    last_error: Mutex<Option<String>>,
    time_provider: TimeProvider,
}

impl ConnectionHealth {
    pub fn new(endpoint: impl Into<String>, warn_interval: Duration) -> Self {
        Self::with_time_provider(endpoint, warn_interval, Box::new(system_time_provider))
    }

    pub fn with_time_provider(
        endpoint: impl Into<String>,
        warn_interval: Duration,
        time_provider: TimeProvider,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            consecutive_failures: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            last_warn: AtomicU64::new(0),
            warn_interval: u64::try_from(warn_interval.as_millis()).unwrap_or(u64::MAX),
            last_error: Mutex::new(None),
            time_provider,
        }
    }

    /// Count a failed send and warn if the streak just started or the
    /// interval has elapsed.
    pub fn record_failure(&self, err: &TransmissionError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_error.lock() = Some(err.to_string());

        let now = (self.time_provider)();
        let prev = self.last_warn.load(Ordering::Relaxed);
        if failures == 1 || now.saturating_sub(prev) >= self.warn_interval {
            let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
            if suppressed > 0 {
                warn!(
                    "splunk_tcp: {failures} consecutive send failures to {} ({suppressed} not logged): {err}",
                    self.endpoint
                );
            } else {
                warn!("splunk_tcp: send to {} failed: {err}", self.endpoint);
            }
            self.last_warn.store(now, Ordering::Relaxed);
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reset the failure streak after a successful send.
    pub fn record_success(&self) {
        let failures = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if failures > 0 {
            self.suppressed.store(0, Ordering::Relaxed);
            *self.last_error.lock() = None;
            info!(
                "splunk_tcp: delivery to {} recovered after {failures} failed send(s)",
                self.endpoint
            );
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Returns the current time in milliseconds since the UNIX epoch.
///
/// Returns 0 if the system clock is before the UNIX epoch.
pub fn system_time_provider() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
