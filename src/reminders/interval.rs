//! Polling interval policy.
//!
//! The configured interval is a (possibly fractional) number of hours.
//! Anything non-positive, non-finite, or too small to yield a whole
//! millisecond is replaced by [`DEFAULT_CHECK_INTERVAL_HOURS`].

use std::time::Duration;

use tracing::warn;

/// Substitute used when the configured interval is unusable (six minutes).
pub const DEFAULT_CHECK_INTERVAL_HOURS: f64 = 0.1;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Resolve a configured hour interval into a concrete polling period.
#[must_use]
pub fn resolve_period(configured_hours: f64) -> Duration {
    match period_from_hours(configured_hours) {
        Some(period) => period,
        None => {
            warn!(
                configured_hours,
                fallback_hours = DEFAULT_CHECK_INTERVAL_HOURS,
                "invalid reminder check interval, using fallback"
            );
            period_from_hours(DEFAULT_CHECK_INTERVAL_HOURS).unwrap_or(Duration::from_secs(360))
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn period_from_hours(hours: f64) -> Option<Duration> {
    if !hours.is_finite() || hours <= 0.0 {
        return None;
    }
    let millis = (hours * MILLIS_PER_HOUR).round();
    if millis < 1.0 || millis > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_millis(millis as u64))
}
