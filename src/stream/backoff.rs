//! Exponential reconnect backoff.

use std::time::Duration;

/// Delay before reconnect attempt number `attempt + 1`.
///
/// Doubles from `base` per completed attempt: 1s, 2s, 4s, 8s, ... capped at
/// `ceiling`.
pub fn backoff_delay(base: Duration, attempt: u32, ceiling: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(ceiling)
}
