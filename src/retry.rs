//! Jittered delays between bounded retry attempts.

use std::time::Duration;

use rand::Rng;

/// Initial delay in milliseconds
const INITIAL_DELAY_MS: u64 = 250;

/// Maximum delay in milliseconds
const MAX_DELAY_MS: u64 = 5_000;

/// Jitter factor (fraction of the base delay)
const JITTER_FACTOR: f64 = 0.1;

/// Delay before the given retry attempt (1-based).
///
/// Grows exponentially up to a cap, with ±10% jitter so concurrent
/// retries spread out instead of hammering the remote in lockstep.
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = INITIAL_DELAY_MS
        .saturating_mul(1u64 << exponent)
        .min(MAX_DELAY_MS) as f64;

    let jitter_range = base * JITTER_FACTOR;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_millis((base + jitter).max(1.0) as u64)
}
