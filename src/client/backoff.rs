//! Reconnect delay calculation
//!
//! `delay = min(base * 2^attempt, cap) + uniform[0, jitter_max)`

use std::time::Duration;

use rand::Rng;

use crate::config::ClientConfig;

/// Exponential backoff with additive jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub jitter_max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter_max: Duration) -> Self {
        Self {
            base,
            cap,
            jitter_max,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_delay, config.cap_delay, config.jitter_max)
    }

    /// Deterministic part of the delay for `attempt`
    ///
    /// Saturates at `cap` instead of overflowing for large attempts.
    pub fn exponential(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Full delay for `attempt`, jitter drawn from the thread RNG
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.exponential(attempt) + self.jitter_with(rng)
    }

    fn jitter_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_micros = self.jitter_max.as_micros() as u64;
        if max_micros == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rng.gen_range(0..max_micros))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_first_attempt_range() {
        let backoff = Backoff::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let delay = backoff.delay_with(1, &mut rng);
            assert!(delay >= Duration::from_millis(2000), "{:?}", delay);
            assert!(delay < Duration::from_millis(2300), "{:?}", delay);
        }
    }

    #[test]
    fn test_exponential_sequence() {
        let backoff = Backoff::default();
        let expected_ms = [1000, 2000, 4000, 8000, 16000, 30000, 30000];
        for (attempt, ms) in expected_ms.iter().enumerate() {
            assert_eq!(
                backoff.exponential(attempt as u32),
                Duration::from_millis(*ms)
            );
        }
    }

    #[test]
    fn test_non_decreasing_and_bounded() {
        let backoff = Backoff::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut previous = Duration::ZERO;
        for attempt in 0..=64 {
            let exp = backoff.exponential(attempt);
            assert!(exp >= previous);
            previous = exp;

            let delay = backoff.delay_with(attempt, &mut rng);
            assert!(delay < Duration::from_millis(30_300));
        }
    }

    #[test]
    fn test_zero_jitter() {
        let backoff = Backoff::new(
            Duration::from_millis(5),
            Duration::from_millis(40),
            Duration::ZERO,
        );
        assert_eq!(backoff.delay(2), Duration::from_millis(20));
        assert_eq!(backoff.delay(10), Duration::from_millis(40));
    }
}
