//! Retry policy with exponential backoff.

use std::time::Duration;

use fedigraph_common::RetrySettings;

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed attempts after which a task is given up.
    pub max_attempts: i32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            multiplier: settings.multiplier,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let factor = self.multiplier.powi(attempt.max(0));
        let delay_secs = self.initial_delay.as_secs_f64() * factor;

        // powi overflows to infinity long before the cap matters
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }

    /// Whether a task that has failed `attempt` times may be tried again.
    #[must_use]
    pub const fn should_retry(&self, attempt: i32) -> bool {
        attempt < self.max_attempts
    }

    /// `delay_for_attempt` as a chrono duration, for scheduling rows.
    pub(crate) fn backoff(&self, attempt: i32) -> chrono::Duration {
        chrono::Duration::from_std(self.delay_for_attempt(attempt))
            .unwrap_or_else(|_| chrono::Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(120));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(240));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(480));
    }

    #[test]
    fn test_max_delay() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(7200),
            multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(7200));
        assert_eq!(config.delay_for_attempt(5000), Duration::from_secs(7200));
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!config.should_retry(4));
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            max_attempts: 8,
            initial_delay_secs: 5,
            max_delay_secs: 30,
            multiplier: 3.0,
            ..RetrySettings::default()
        };
        let config = RetryConfig::from(&settings);

        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(15));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(30));
    }
}
