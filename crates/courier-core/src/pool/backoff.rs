//! Reconnect backoff

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectSettings;

/// Exponential backoff with equal jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&ReconnectSettings::default())
    }
}

impl From<&ReconnectSettings> for BackoffPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            base: Duration::from_millis(settings.base_delay_ms),
            cap: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay after the given failed attempt (0-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay after the given failed attempt, uniformly in `[ceiling/2, ceiling]`
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        if spread == 0 {
            return ceiling;
        }
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_until_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.ceiling(0), Duration::from_secs(1));
        assert_eq!(policy.ceiling(1), Duration::from_secs(2));
        assert_eq!(policy.ceiling(4), Duration::from_secs(16));
        assert_eq!(policy.ceiling(5), Duration::from_secs(30));
        assert_eq!(policy.ceiling(40), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_is_jittered_within_bounds() {
        let policy = BackoffPolicy::default();
        for attempt in 0..8 {
            let ceiling = policy.ceiling(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay >= ceiling / 2, "{:?} below half of {:?}", delay, ceiling);
                assert!(delay <= ceiling, "{:?} above {:?}", delay, ceiling);
            }
        }
    }

    #[test]
    fn test_zero_base() {
        let policy = BackoffPolicy {
            base: Duration::ZERO,
            cap: Duration::ZERO,
            max_attempts: 3,
        };
        assert_eq!(policy.delay(2), Duration::ZERO);
    }
}
