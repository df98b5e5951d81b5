//! Pure exponential backoff computation for retry scheduling.
//!
//! Kept free of any store dependency so both the store implementation and
//! tests can compute the expected `next_run_at` without touching a
//! database.

use chrono::{DateTime, Duration, Utc};

/// An hour is a generous, sensible cap; unbounded `i64` exponentiation of
/// small bases otherwise overflows quickly once `attempts` climbs into the
/// dozens.
pub const MAX_BACKOFF_SECONDS: i64 = 3600;

/// `backoff_base ^ attempts` seconds, saturating at [`MAX_BACKOFF_SECONDS`].
/// `attempts` is the *new* attempt count (1-indexed) — the failure number
/// being scheduled, not the count before this failure.
pub fn delay_seconds(backoff_base: i64, attempts: i64) -> i64 {
    let base = backoff_base.max(1);
    let mut delay: i64 = 1;
    for _ in 0..attempts {
        delay = delay.saturating_mul(base);
        if delay >= MAX_BACKOFF_SECONDS {
            return MAX_BACKOFF_SECONDS;
        }
    }
    delay
}

pub fn next_run_at(now: DateTime<Utc>, backoff_base: i64, attempts: i64) -> DateTime<Utc> {
    now + Duration::seconds(delay_seconds(backoff_base, attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_is_base_to_the_one() {
        assert_eq!(delay_seconds(2, 1), 2);
        assert_eq!(delay_seconds(2, 2), 4);
        assert_eq!(delay_seconds(2, 3), 8);
    }

    #[test]
    fn base_one_never_backs_off() {
        assert_eq!(delay_seconds(1, 5), 1);
    }

    #[test]
    fn clamps_at_max() {
        assert_eq!(delay_seconds(2, 20), MAX_BACKOFF_SECONDS);
    }

    #[test]
    fn next_run_at_adds_delay_to_now() {
        let now = Utc::now();
        let at = next_run_at(now, 2, 3);
        assert_eq!((at - now).num_seconds(), 8);
    }
}
