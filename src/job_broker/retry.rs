//! Retry backoff: `2^(attempt+1) + U(0,1)` seconds.
//!
//! Grounded on `job_manager.py::_worker`'s `delay = (2 ** attempt) +
//! random.uniform(0, 1)`. One fixed formula doesn't call for PostHog's
//! generalized `RetryPolicy` coefficient/ceiling machinery
//! (`hook-common/src/retry.rs`) — that precedent justifies giving backoff
//! its own small module rather than inlining the arithmetic in the worker
//! loop, not a generic policy struct.

use std::time::Duration;

/// Delay before attempt `attempt` (0-indexed: the first retry after the
/// initial attempt is `attempt = 0`).
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt + 1);
    let jitter: f64 = rand::random::<f64>();
    Duration::from_secs_f64(base as f64 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delay_grows_exponentially_with_bounded_jitter() {
        for attempt in 0..5 {
            let delay = backoff_delay(attempt).as_secs_f64();
            let base = 2f64.powi(attempt as i32 + 1);
            assert!(delay >= base, "attempt {attempt}: {delay} should be >= {base}");
            assert!(delay < base + 1.0, "attempt {attempt}: {delay} should be < {}", base + 1.0);
        }
    }

    proptest! {
        /// "Backoff monotonicity": `delay(k+1) > delay(k)` with base 2, for
        /// any attempt count the retry loop could reach.
        #[test]
        fn delay_at_next_attempt_always_exceeds_the_max_possible_at_this_one(attempt in 0u32..20) {
            let this_max = 2f64.powi(attempt as i32 + 1) + 1.0;
            let next_min = 2f64.powi(attempt as i32 + 2);
            prop_assert!(next_min > this_max);
        }

        #[test]
        fn delay_is_always_within_its_jitter_band(attempt in 0u32..20) {
            let delay = backoff_delay(attempt).as_secs_f64();
            let base = 2f64.powi(attempt as i32 + 1);
            prop_assert!(delay >= base && delay < base + 1.0);
        }
    }
}
