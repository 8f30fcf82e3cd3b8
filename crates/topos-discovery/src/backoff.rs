//! Backoff between failed resolution cycles

use rand::Rng;
use std::time::Duration;
use topos_core::BackoffConfig;

/// Exponential backoff with optional jitter.
///
/// `next_delay` returns the delay to wait before the next attempt and grows
/// the stored delay by `multiplier`, capped at `max_delay`. `reset` returns
/// to `initial_delay` after a success.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,

    /// Delay handed out by the next call to `next_delay`, before jitter
    current: Duration,

    /// Consecutive failures since the last reset
    failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let grown = base.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(grown.min(self.config.max_delay.as_secs_f64()));
        self.failures = self.failures.saturating_add(1);
        self.jittered(base)
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.failures = 0;
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return base;
        }
        let spread = rand::rng().random_range(-self.config.jitter..=self.config.jitter);
        let secs = (base.as_secs_f64() * (1.0 + spread)).max(0.0);
        Duration::from_secs_f64(secs.min(self.config.max_delay.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let mut backoff = Backoff::new(config(0.0));
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff.failures(), 6);
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = Backoff::new(config(0.0));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_delay(), Duration::from_millis(400));

        backoff.reset();
        assert_eq!(backoff.current_delay(), Duration::from_millis(100));
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut backoff = Backoff::new(config(0.5));
        for _ in 0..50 {
            let base = backoff.current_delay();
            let delay = backoff.next_delay();
            assert!(delay >= base.mul_f64(0.5) - Duration::from_micros(1));
            assert!(delay <= Duration::from_millis(1000));
        }
    }
}
