//! Retry backoff schedule.

use std::time::Duration;

/// Delay before the first retry, in seconds.
pub const BASE_DELAY_SECS: u64 = 60;

/// Upper bound on the retry delay, in seconds.
pub const MAX_DELAY_SECS: u64 = 3600;

/// Seconds a record with `attempts` failed retries must wait since its last
/// update before it is due again: `min(60 * 2^attempts, 3600)`.
#[must_use]
pub fn backoff_delay_secs(attempts: u32) -> u64 {
    2u64.checked_pow(attempts)
        .and_then(|factor| BASE_DELAY_SECS.checked_mul(factor))
        .map_or(MAX_DELAY_SECS, |delay| delay.min(MAX_DELAY_SECS))
}

/// [`backoff_delay_secs`] as a [`Duration`].
#[must_use]
pub fn backoff_delay(attempts: u32) -> Duration {
    Duration::from_secs(backoff_delay_secs(attempts))
}
