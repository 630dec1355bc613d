//! Retry backoff evaluation.
//!
//! Jobs carry their retry policy as data attached at enqueue time (max
//! attempts, initial delay, multiplier). The queue calls into this module to
//! compute the delay before re-running a failed attempt; exponential backoff
//! with an upper cap and optional jitter to prevent thundering herd.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Compute the backoff delay before retry number `attempt` (1-based).
///
/// Attempt 1 waits `initial_delay`, attempt 2 waits
/// `initial_delay * multiplier`, and so on, capped at `max_delay`. When
/// jitter is enabled the result is uniformly stretched into
/// `[delay, 2 * delay]`.
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = config.backoff_multiplier.powi(exponent as i32);
    let raw = Duration::from_secs_f64(config.initial_delay.as_secs_f64() * factor);
    let capped = raw.min(config.max_delay);

    if config.jitter {
        add_jitter(capped)
    } else {
        capped
    }
}

/// Add random jitter to a delay.
///
/// Uniformly distributed between 0% and 100% of the delay, so the actual
/// delay lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
