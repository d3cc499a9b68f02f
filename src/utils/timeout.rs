//! Validation of the configured retry delays

use std::time::Duration;

use crate::utils::errors::WatchError;

/// Longest single retry delay accepted (5 minutes)
pub const MAX_RETRY_INTERVAL_MS: u64 = 300_000;

/// Validate the delay sequence and convert it to durations
///
/// # Arguments
/// * `intervals_ms` - Delays in milliseconds, in backoff order
///
/// # Returns
/// * `Ok(Vec<Duration>)` - Non-empty sequence of validated delays
/// * `Err(WatchError::Config)` - Empty sequence, a zero delay, or a delay
///   above `MAX_RETRY_INTERVAL_MS`
///
/// # Example
/// ```ignore
/// let delays = validate_retry_intervals(&[1000, 5000, 20000])?;
/// ```
pub fn validate_retry_intervals(intervals_ms: &[u64]) -> Result<Vec<Duration>, WatchError> {
    if intervals_ms.is_empty() {
        return Err(WatchError::Config(
            "retry_intervals_ms must contain at least one delay".to_string(),
        ));
    }

    intervals_ms
        .iter()
        .enumerate()
        .map(|(i, &ms)| {
            if ms == 0 {
                return Err(WatchError::Config(format!(
                    "retry_intervals_ms[{i}] is 0; delays must be at least 1ms"
                )));
            }
            if ms > MAX_RETRY_INTERVAL_MS {
                return Err(WatchError::Config(format!(
                    "retry_intervals_ms[{}] cannot exceed {}ms ({} minutes). Received: {}ms ({:.1} minutes)",
                    i,
                    MAX_RETRY_INTERVAL_MS,
                    MAX_RETRY_INTERVAL_MS / 60_000,
                    ms,
                    ms as f64 / 60_000.0
                )));
            }
            Ok(Duration::from_millis(ms))
        })
        .collect()
}
