//! General utilities shared across the application.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Computes `base * multiplier^exponent`, rounded to whole milliseconds.
///
/// Used for retry backoff. The exponent is capped so a misconfigured
/// multiplier cannot overflow the duration.
#[must_use]
pub fn backoff_delay(base: Duration, multiplier: f64, exponent: u32) -> Duration {
    let factor = multiplier.powi(exponent.min(32) as i32);
    let millis = (base.as_millis() as f64 * factor).round();
    if millis.is_finite() && millis >= 0.0 {
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically() {
        let base = Duration::from_millis(2000);
        assert_eq!(backoff_delay(base, 1.5, 0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 1.5, 1), Duration::from_millis(3000));
        assert_eq!(backoff_delay(base, 1.5, 2), Duration::from_millis(4500));
    }

    #[test]
    fn backoff_with_unit_multiplier_is_constant() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1.0, 5), base);
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
