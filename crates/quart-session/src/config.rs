//! Channel timing configuration.

use std::time::Duration;

use quart_core::config::{NetworkConfig, ReconnectConfig};

/// Exponential backoff used while dialing the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Wait after the first refused dial.
    pub initial_delay: Duration,
    /// Ceiling for any single wait.
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Retries before the dial fails; `None` keeps dialing until cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            max_attempts: Some(config.max_attempts),
        }
    }
}

impl ReconnectPolicy {
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let grown = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

/// Limits applied to one party's links.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub receive_timeout: Duration,
    pub key_poll_interval: Duration,
    pub key_wait_timeout: Duration,
    pub max_frame_bytes: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for ChannelConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            receive_timeout: Duration::from_secs(config.receive_timeout_secs),
            key_poll_interval: Duration::from_millis(config.key_poll_interval_ms),
            key_wait_timeout: Duration::from_secs(config.key_wait_timeout_secs),
            max_frame_bytes: config.max_frame_bytes,
            reconnect: ReconnectPolicy::from(&config.reconnect),
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_follows_config_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, Some(20));
    }

    #[test]
    fn exponential_backoff_delays() {
        let policy = ReconnectPolicy::default();

        // 100ms, 200ms, 400ms, ... capped at 5s
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(3200));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn retry_with_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn retry_unlimited() {
        let policy = ReconnectPolicy {
            max_attempts: None,
            ..Default::default()
        };
        assert!(policy.should_retry(u32::MAX));
    }

    #[test]
    fn channel_config_converts_units() {
        let network = NetworkConfig {
            receive_timeout_secs: 7,
            key_poll_interval_ms: 40,
            ..NetworkConfig::default()
        };
        let channel = ChannelConfig::from(&network);
        assert_eq!(channel.receive_timeout, Duration::from_secs(7));
        assert_eq!(channel.key_poll_interval, Duration::from_millis(40));
        assert_eq!(channel.max_frame_bytes, 64 * 1024 * 1024);
    }
}
