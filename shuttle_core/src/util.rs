//! Common time/period helpers for shuttle_core.

use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Poll period for a configured interval in milliseconds.
/// - Clamps to [1, 1000] ms so a zero interval cannot spin.
#[inline]
#[must_use]
pub fn poll_period(interval_ms: u64) -> Duration {
    Duration::from_millis(interval_ms.clamp(1, MILLIS_PER_SEC))
}

/// Polling rate in Hz for a configured interval in milliseconds.
#[inline]
#[must_use]
pub fn poll_rate_hz(interval_ms: u64) -> u64 {
    MILLIS_PER_SEC / interval_ms.clamp(1, MILLIS_PER_SEC)
}

/// Local wall-clock timestamp in the run log format.
#[must_use]
pub fn timestamp(t: &chrono::DateTime<chrono::Local>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
