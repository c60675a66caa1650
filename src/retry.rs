//! Retry delay policies.
//!
//! Used between correction attempts and by the HTTP completion client for
//! transient failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay for non-immediate strategies.
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default upper bound for growing delays.
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// How long to wait before retry number `attempt` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry right away.
    #[default]
    Immediate,
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// Uniformly random delay in `[0, exponential delay]` ("full jitter").
    Jittered { base: Duration, max: Duration },
}

impl RetryPolicy {
    /// Returns the delay before the given retry (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => exponential(base, max, attempt),
            Self::Jittered { base, max } => {
                let ceiling = exponential(base, max, attempt).as_millis() as u64;
                if ceiling == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
            }
        }
    }

    /// Sleeps for the delay of the given retry, skipping the timer when zero.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before retry");
            tokio::time::sleep(delay).await;
        }
    }
}

fn exponential(base: Duration, max: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(max)
}

/// Retry strategy names as they appear in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    Immediate,
    Fixed,
    Exponential,
    Jittered,
}

/// Serializable retry settings (`[correction.retry]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub strategy: RetryStrategy,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Builds the runtime policy from these settings.
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms));
        match self.strategy {
            RetryStrategy::Immediate => RetryPolicy::Immediate,
            RetryStrategy::Fixed => RetryPolicy::Fixed(base),
            RetryStrategy::Exponential => RetryPolicy::Exponential { base, max },
            RetryStrategy::Jittered => RetryPolicy::Jittered { base, max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_has_no_delay() {
        assert_eq!(RetryPolicy::Immediate.delay_for(1), Duration::ZERO);
        assert_eq!(RetryPolicy::Immediate.delay_for(5), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::Fixed(Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(60), Duration::from_millis(500));
    }

    #[test]
    fn test_jittered_stays_within_bounds() {
        let policy = RetryPolicy::Jittered {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
        };
        for attempt in 1..=6 {
            let ceiling = RetryPolicy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_millis(1_000),
            }
            .delay_for(attempt);
            assert!(policy.delay_for(attempt) <= ceiling);
        }
    }

    #[test]
    fn test_config_builds_policy() {
        let config: RetryConfig = toml::from_str(
            r#"
strategy = "exponential"
base_delay_ms = 10
max_delay_ms = 40
"#,
        )
        .unwrap();
        assert_eq!(
            config.policy(),
            RetryPolicy::Exponential {
                base: Duration::from_millis(10),
                max: Duration::from_millis(40),
            }
        );
    }

    #[test]
    fn test_default_config_is_immediate() {
        assert_eq!(RetryConfig::default().policy(), RetryPolicy::Immediate);
    }

    #[test]
    fn test_wait_immediate_returns() {
        tokio_test::block_on(RetryPolicy::Immediate.wait(1));
    }
}
