//! Reconnect backoff shared by the heartbeat and watch streams.
//!
//! Delays grow exponentially from `base_delay_ms` by `multiplier` per attempt
//! and are capped at `max_delay_ms`. Jitter only ever shortens a delay, so the
//! cap holds even after jittering. Jitter spreads reconnects of many game
//! servers that lost the same sidecar at the same moment.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt (milliseconds)
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Multiplier applied per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for any delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Fraction of the delay that may be randomly removed, in `[0, 1]`
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay() -> u64 {
    200
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// Deterministic delay for a zero-based attempt number, without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let max = self.max_delay_ms as f64;
        let exp = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = (self.base_delay_ms as f64 * exp).min(max);
        // NaN/inf collapse to the cap
        if millis.is_finite() {
            Duration::from_millis(millis.max(0.0) as u64)
        } else {
            Duration::from_millis(self.max_delay_ms)
        }
    }

    /// Delay for `attempt` with up to `jitter` of it randomly removed.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return delay;
        }
        let cut = rand::rng().random_range(0.0..=self.jitter.min(1.0));
        delay.mul_f64(1.0 - cut)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(SdkError::Config(
                "backoff.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(SdkError::Config(
                "backoff.multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SdkError::Config(
                "backoff.max_delay_ms must not be smaller than backoff.base_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SdkError::Config(
                "backoff.jitter must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Attempt counter on top of a [`BackoffConfig`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the next reconnect attempt; advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.jittered(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Number of attempts handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called after every successful (re)connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 1_000,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_exponential_growth_until_cap() {
        let config = no_jitter();
        assert_eq!(config.delay(0), Duration::from_millis(100));
        assert_eq!(config.delay(1), Duration::from_millis(200));
        assert_eq!(config.delay(2), Duration::from_millis(400));
        assert_eq!(config.delay(3), Duration::from_millis(800));
        assert_eq!(config.delay(4), Duration::from_millis(1_000));
        assert_eq!(config.delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_delays_non_decreasing() {
        let config = no_jitter();
        let delays: Vec<_> = (0..20).map(|a| config.delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = BackoffConfig {
            jitter: 0.5,
            ..no_jitter()
        };
        for attempt in 0..10 {
            let full = config.delay(attempt);
            for _ in 0..50 {
                let d = config.jittered(attempt);
                assert!(d <= full, "jittered {d:?} exceeds {full:?}");
                assert!(d >= full.mul_f64(0.5));
            }
        }
    }

    #[test]
    fn test_counter_resets() {
        let mut backoff = Backoff::new(no_jitter());
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate() {
        assert!(BackoffConfig::default().validate().is_ok());
        assert!(
            BackoffConfig {
                jitter: 1.5,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            BackoffConfig {
                multiplier: 0.5,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            BackoffConfig {
                base_delay_ms: 5_000,
                max_delay_ms: 1_000,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
    }
}
