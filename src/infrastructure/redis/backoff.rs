//! Delay schedule for re-subscribing to the queue trigger channels

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Attempt counter over a [`ReconnectConfig`].
///
/// The n-th consecutive failure waits `initial * multiplier^(n-1)`, capped at
/// `max`, then spread by up to `jitter` of itself in either direction.
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the given attempt (1-based) before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let growth = self.config.multiplier.max(1.0).powi(exponent);
        let millis = (self.config.initial_delay_ms as f64 * growth)
            .min(self.config.max_delay_ms as f64)
            .max(1.0);

        Duration::from_millis(millis as u64)
    }

    /// Register a failed attempt and return how long to wait before the next one
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let base = self.base_delay(self.attempt).as_millis() as f64;

        let spread = base * self.config.jitter.clamp(0.0, 1.0);
        if spread < 1.0 {
            return Duration::from_millis(base as u64);
        }

        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_millis((base + offset).max(1.0) as u64)
    }

    /// Called once a subscription is established
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(initial: u64, max: u64, multiplier: f64, jitter: f64) -> ReconnectBackoff {
        ReconnectBackoff::new(ReconnectConfig {
            initial_delay_ms: initial,
            max_delay_ms: max,
            multiplier,
            jitter,
        })
    }

    #[test]
    fn test_first_retry_waits_initial_delay() {
        let mut backoff = schedule(500, 60_000, 2.0, 0.0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2_000));
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = schedule(1_000, 5_000, 10.0, 0.0);
        assert_eq!(backoff.base_delay(2), Duration::from_millis(5_000));
        assert_eq!(backoff.base_delay(u32::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn test_multiplier_below_one_does_not_shrink() {
        let backoff = schedule(800, 5_000, 0.5, 0.0);
        assert_eq!(backoff.base_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_reset_after_subscribe() {
        let mut backoff = schedule(100, 10_000, 2.0, 0.0);
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let mut backoff = ReconnectBackoff::new(ReconnectConfig::default());
        for _ in 0..20 {
            let attempt = backoff.attempt() + 1;
            let base = backoff.base_delay(attempt).as_millis() as f64;
            let delay = backoff.next_delay().as_millis() as f64;
            assert!(delay >= base * 0.8 - 1.0);
            assert!(delay <= base * 1.2 + 1.0);
        }
    }
}
