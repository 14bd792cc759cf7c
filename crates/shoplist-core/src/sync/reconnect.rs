//! Reconnection backoff

use std::time::Duration;

/// How a disconnected client retries the server
///
/// Attempts are numbered from 1. Each attempt waits `initial_delay` times
/// `multiplier` to the power of the attempt number minus one, capped at
/// `max_delay`. After `max_attempts` failures the client gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Constant delay between a fixed number of attempts
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
            max_attempts,
        }
    }

    /// Policy that never retries
    pub fn never() -> Self {
        Self::fixed(Duration::ZERO, 0)
    }

    /// Delay before `attempt`, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            if delay >= self.max_delay {
                break;
            }
            delay = delay.saturating_mul(self.multiplier);
        }
        Some(delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(16)));
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = ReconnectPolicy {
            max_attempts: 100,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(6), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(100), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(50), 3);
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_for(4), None);
    }

    #[test]
    fn test_never_retries() {
        assert_eq!(ReconnectPolicy::never().delay_for(1), None);
    }

    #[test]
    fn test_attempt_zero_is_invalid() {
        assert_eq!(ReconnectPolicy::default().delay_for(0), None);
    }
}
