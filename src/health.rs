//! Liveness classification for running engines.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Running, heartbeat recent.
    Healthy,
    /// Not started yet, or reset and waiting for a new `run()`.
    Idle,
    /// Running, but no cycle has started within twice the sync interval
    /// (or the current backoff plus one interval, if longer).
    Stale,
    /// Circuit breaker tripped; needs an external restart.
    Paused,
    Stopped,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Idle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Idle => "idle",
            HealthStatus::Stale => "stale",
            HealthStatus::Paused => "paused",
            HealthStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a running engine may go without a heartbeat.
///
/// Twice the sync interval, stretched while backing off so a scheduled
/// retry further out than that is not reported stale.
pub fn freshness_window(sync_interval: Duration, backoff: Option<Duration>) -> Duration {
    let base = sync_interval.saturating_mul(2);
    match backoff {
        Some(delay) => base.max(delay.saturating_add(sync_interval)),
        None => base,
    }
}

/// Whether a running engine's last heartbeat falls within `window`.
pub fn heartbeat_is_fresh(
    last_heartbeat: Option<DateTime<Utc>>,
    window: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(beat) = last_heartbeat else {
        return false;
    };
    // A negative elapsed time (clock skew) still counts as fresh.
    match now.signed_duration_since(beat).to_std() {
        Ok(elapsed) => elapsed <= window,
        Err(_) => true,
    }
}

/// Health of one engine, as reported by the supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub source: String,
    pub owner: String,
    pub status: HealthStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_window_is_twice_the_interval() {
        let now = Utc::now();
        let window = freshness_window(Duration::from_secs(300), None);
        assert_eq!(window, Duration::from_secs(600));
        assert!(!heartbeat_is_fresh(None, window, now));
        assert!(heartbeat_is_fresh(Some(now - chrono::Duration::seconds(599)), window, now));
        assert!(heartbeat_is_fresh(Some(now - chrono::Duration::seconds(600)), window, now));
        assert!(!heartbeat_is_fresh(Some(now - chrono::Duration::seconds(601)), window, now));
    }

    #[test]
    fn backoff_stretches_the_window() {
        let interval = Duration::from_secs(10);
        assert_eq!(
            freshness_window(interval, Some(Duration::from_secs(60))),
            Duration::from_secs(70)
        );
        // A short backoff never shrinks the normal window.
        assert_eq!(
            freshness_window(Duration::from_secs(300), Some(Duration::from_secs(60))),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn idle_counts_as_healthy() {
        assert!(HealthStatus::Idle.is_healthy());
        assert!(!HealthStatus::Stale.is_healthy());
        assert_eq!(HealthStatus::Paused.to_string(), "paused");
    }
}
