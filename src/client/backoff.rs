//! Reconnect delay computation.

use std::time::Duration;

use rand::{Rng, rng};

/// Exponential backoff with multiplicative jitter.
///
/// The delay for attempt `n` (zero based) is `min(initial * growth^n, max)`, then
/// stretched by `1 + random * jitter` with `random` uniform in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per attempt.
    pub growth_factor: f64,
    /// Upper bound before jitter.
    pub max_delay: Duration,
    /// Maximum relative stretch added by jitter.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            growth_factor: 1.5,
            max_delay: Duration::from_millis(30_000),
            jitter_factor: 0.5,
        }
    }
}

impl ReconnectPolicy {
    /// Capped delay for `attempt`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Delay for `attempt` with an explicit jitter sample in `[0, 1)`.
    pub fn delay_with_jitter(&self, attempt: u32, random: f64) -> Duration {
        let random = random.clamp(0.0, 1.0);
        self.base_delay(attempt)
            .mul_f64(1.0 + random * self.jitter_factor.max(0.0))
    }

    /// Delay for `attempt` using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        let random: f64 = rng().random();
        self.delay_with_jitter(attempt, random)
    }

    /// Largest delay this policy can produce.
    pub fn max_jittered_delay(&self) -> Duration {
        self.max_delay.mul_f64(1.0 + self.jitter_factor.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_grows_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_millis(1_000));
        assert_eq!(policy.base_delay(1), Duration::from_millis(1_500));
        assert_eq!(policy.base_delay(2), Duration::from_millis(2_250));

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.base_delay(39), policy.max_delay);
        assert_eq!(policy.base_delay(u32::MAX), policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_with_jitter(0, 0.0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_with_jitter(0, 1.0), Duration::from_millis(1_500));
        assert_eq!(policy.max_jittered_delay(), Duration::from_millis(45_000));

        for attempt in 0..30 {
            let delay = policy.delay(attempt);
            assert!(delay >= policy.base_delay(attempt));
            assert!(delay <= policy.max_jittered_delay());
        }
    }
}
