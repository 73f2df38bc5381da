// Focused tests for poll period helpers.
use std::time::Duration;

use shuttle_core::util::{poll_period, poll_rate_hz};

#[test]
fn poll_period_clamps() {
    assert_eq!(poll_period(20), Duration::from_millis(20));
    // 0 would spin; floor at 1 ms
    assert_eq!(poll_period(0), Duration::from_millis(1));
    assert_eq!(poll_period(5_000), Duration::from_secs(1));
}

#[test]
fn poll_rate_matches_period() {
    assert_eq!(poll_rate_hz(20), 50);
    assert_eq!(poll_rate_hz(1), 1000);
    assert_eq!(poll_rate_hz(0), 1000);
    assert_eq!(poll_rate_hz(u64::MAX), 1);
}
