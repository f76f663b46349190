//! Configuration for the stability stack

use crate::error::{Result, StabilityError};
use crate::operation::resilience::{CircuitBreakerConfig, RetryConfig, ThrottleConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration, one field per tunable decorator knob
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Circuit breaker cool-down at the threshold, in milliseconds
    pub breaker_cool_down_ms: u64,

    /// Retry attempts including the first
    pub max_attempts: u32,

    /// Delay between retry attempts, in milliseconds
    pub retry_delay_ms: u64,

    /// Throttle tokens per interval
    pub max_calls: u32,

    /// Throttle replenish interval, in milliseconds
    pub throttle_interval_ms: u64,

    /// Debounce window in milliseconds (0 disables debouncing)
    pub debounce_window_ms: u64,

    /// Per-call deadline applied by the caller, in milliseconds
    pub call_timeout_ms: u64,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            breaker_cool_down_ms: 2000,
            max_attempts: 3,
            retry_delay_ms: 100,
            max_calls: 10,
            throttle_interval_ms: 1000,
            debounce_window_ms: 0,
            call_timeout_ms: 500,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = parse(&lookup, "STABILITY_FAILURE_THRESHOLD")? {
            config.failure_threshold = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_BREAKER_COOL_DOWN_MS")? {
            config.breaker_cool_down_ms = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_MAX_ATTEMPTS")? {
            config.max_attempts = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_RETRY_DELAY_MS")? {
            config.retry_delay_ms = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_MAX_CALLS")? {
            config.max_calls = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_THROTTLE_INTERVAL_MS")? {
            config.throttle_interval_ms = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_DEBOUNCE_WINDOW_MS")? {
            config.debounce_window_ms = v;
        }
        if let Some(v) = parse(&lookup, "STABILITY_CALL_TIMEOUT_MS")? {
            config.call_timeout_ms = v;
        }

        if let Some(level) = lookup("STABILITY_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("STABILITY_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(StabilityError::Config(format!(
                        "invalid STABILITY_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            base_cool_down: Duration::from_millis(self.breaker_cool_down_ms),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            max_calls: self.max_calls,
            interval: Duration::from_millis(self.throttle_interval_ms),
        }
    }

    /// Debounce window, `None` when disabled
    pub fn debounce_window(&self) -> Option<Duration> {
        (self.debounce_window_ms > 0).then(|| Duration::from_millis(self.debounce_window_ms))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| StabilityError::Config(format!("invalid {key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_calls, 10);
        assert_eq!(config.call_timeout(), Duration::from_millis(500));
        assert_eq!(config.debounce_window(), None);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_config_from_env() {
        // This test uses default values since env vars aren't set
        let config = Config::from_env().unwrap();
        assert!(config.max_attempts > 0);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STABILITY_FAILURE_THRESHOLD", "7"),
            ("STABILITY_BREAKER_COOL_DOWN_MS", "250"),
            ("STABILITY_RETRY_DELAY_MS", " 20 "),
            ("STABILITY_DEBOUNCE_WINDOW_MS", "40"),
            ("STABILITY_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.circuit_breaker().failure_threshold, 7);
        assert_eq!(
            config.circuit_breaker().base_cool_down,
            Duration::from_millis(250)
        );
        assert_eq!(config.retry().delay, Duration::from_millis(20));
        assert_eq!(config.debounce_window(), Some(Duration::from_millis(40)));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = Config::from_lookup(lookup(&[("STABILITY_MAX_CALLS", "lots")])).unwrap_err();
        assert!(matches!(err, StabilityError::Config(msg) if msg.contains("STABILITY_MAX_CALLS")));
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        let err = Config::from_lookup(lookup(&[("STABILITY_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, StabilityError::Config(_)));
    }
}
