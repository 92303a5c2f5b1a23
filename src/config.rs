//! Client configuration.
//!
//! Every field has a default, so a configuration file only needs to name the remote instance:
//!
//! ```yaml
//! instance: deploy.example.com:8080
//! rate_limit:
//!   burst: 20
//! backoff:
//!   randomization_factor: 0.5
//! ```

use crate::error::{ConfigError, DeployError};
use crate::rate_limit::TokenBucket;
use crate::retry::RetryPolicy;
use crate::{Backoff, Jitter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Project whose deployments are synthetic health checks rather than user traffic.
pub const DEFAULT_PROBER_PROJECT: &str = "kubeflow-prober-deploy";

/// Top-level configuration for [`DeploymentClient`](crate::DeploymentClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base address of the remote service. `http://` is assumed when no scheme is given.
    #[serde(default)]
    pub instance: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Retry budget in seconds when the caller supplies no deadline.
    #[serde(default = "default_max_elapsed_secs")]
    pub default_max_elapsed_secs: u64,

    /// Deployments for this project are excluded from user completion counts.
    #[serde(default = "default_prober_project")]
    pub prober_project: String,
}

const fn default_request_timeout_secs() -> u64 {
    60
}

const fn default_max_elapsed_secs() -> u64 {
    30 * 60
}

fn default_prober_project() -> String {
    DEFAULT_PROBER_PROJECT.to_owned()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            default_max_elapsed_secs: default_max_elapsed_secs(),
            prober_project: default_prober_project(),
        }
    }
}

/// Token bucket shared by every call to one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Milliseconds between token refills.
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
    /// Bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

const fn default_refill_interval_ms() -> u64 {
    1000
}

const fn default_burst() -> u32 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { refill_interval_ms: default_refill_interval_ms(), burst: default_burst() }
    }
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Proportional jitter in `[0, 1]`. Unset means no jitter.
    #[serde(default)]
    pub randomization_factor: Option<f64>,
}

const fn default_initial_interval_ms() -> u64 {
    3000
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_max_interval_ms() -> u64 {
    60_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            randomization_factor: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `instance` with every other field defaulted.
    pub fn new(instance: impl Into<String>) -> Self {
        Self { instance: instance.into(), ..Self::default() }
    }

    /// Parse and validate a YAML (or JSON) document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.trim().is_empty() {
            return Err(ConfigError::Missing("instance"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid("rate_limit.burst must be > 0".into()));
        }
        if self.rate_limit.refill_interval_ms == 0 {
            return Err(ConfigError::Invalid("rate_limit.refill_interval_ms must be > 0".into()));
        }
        if self.default_max_elapsed_secs == 0 {
            return Err(ConfigError::Invalid("default_max_elapsed_secs must be > 0".into()));
        }
        self.backoff()?;
        self.jitter()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn default_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.default_max_elapsed_secs)
    }

    pub fn backoff(&self) -> Result<Backoff, ConfigError> {
        let b = &self.backoff;
        if b.initial_interval_ms == 0 {
            return Err(ConfigError::Invalid("backoff.initial_interval_ms must be > 0".into()));
        }
        Backoff::exponential(Duration::from_millis(b.initial_interval_ms))
            .with_multiplier(b.multiplier)
            .and_then(|backoff| backoff.with_max(Duration::from_millis(b.max_interval_ms)))
            .map_err(|e| ConfigError::Invalid(format!("backoff: {}", e)))
    }

    pub fn jitter(&self) -> Result<Jitter, ConfigError> {
        match self.backoff.randomization_factor {
            None => Ok(Jitter::None),
            Some(factor) => Jitter::proportional(factor)
                .map_err(|e| ConfigError::Invalid(format!("backoff.randomization_factor: {}", e))),
        }
    }

    pub fn token_bucket(&self) -> TokenBucket {
        TokenBucket::new(
            Duration::from_millis(self.rate_limit.refill_interval_ms),
            self.rate_limit.burst,
        )
    }

    /// Retry policy for both orchestrator loops: transport, rate-limit and not-ready failures
    /// are retried, everything else is permanent.
    pub fn retry_policy(&self) -> Result<RetryPolicy<DeployError>, ConfigError> {
        RetryPolicy::builder()
            .backoff(self.backoff()?)
            .with_jitter(self.jitter()?)
            .max_elapsed(self.default_max_elapsed())
            .should_retry(DeployError::is_retryable)
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = ClientConfig::from_yaml_str("instance: deploy.example.com").unwrap();
        assert_eq!(config.rate_limit, RateLimitConfig { refill_interval_ms: 1000, burst: 100 });
        assert_eq!(config.backoff.initial_interval_ms, 3000);
        assert_eq!(config.backoff.multiplier, 1.5);
        assert_eq!(config.backoff.max_interval_ms, 60_000);
        assert_eq!(config.default_max_elapsed(), Duration::from_secs(1800));
        assert_eq!(config.prober_project, DEFAULT_PROBER_PROJECT);
        assert_eq!(config.jitter().unwrap(), Jitter::None);
    }

    #[test]
    fn backoff_from_config_grows_and_caps() {
        let backoff = ClientConfig::new("x").backoff().unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(3000));
        assert_eq!(backoff.delay(2), Duration::from_millis(4500));
        assert_eq!(backoff.delay(3), Duration::from_millis(6750));
        assert_eq!(backoff.delay(50), Duration::from_secs(60));
    }

    #[test]
    fn json_is_accepted() {
        let config = ClientConfig::from_yaml_str(
            r#"{"instance": "http://localhost:8080", "rate_limit": {"burst": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.rate_limit.refill_interval_ms, 1000);
        assert_eq!(config.token_bucket().capacity(), 5);
    }

    #[test]
    fn missing_instance_is_rejected() {
        let err = ClientConfig::from_yaml_str("rate_limit: {burst: 1}").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("instance")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            "instance: x\nrate_limit: {burst: 0}",
            "instance: x\nrate_limit: {refill_interval_ms: 0}",
            "instance: x\nbackoff: {multiplier: 0.5}",
            "instance: x\nbackoff: {initial_interval_ms: 0}",
            "instance: x\nbackoff: {initial_interval_ms: 5000, max_interval_ms: 1000}",
            "instance: x\nbackoff: {randomization_factor: 1.5}",
            "instance: x\ndefault_max_elapsed_secs: 0",
            "instance: x\nrequest_timeout_secs: 0",
        ];
        for raw in cases {
            assert!(
                matches!(ClientConfig::from_yaml_str(raw), Err(ConfigError::Invalid(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn randomization_factor_selects_proportional_jitter() {
        let raw = "instance: x\nbackoff: {randomization_factor: 0.5}";
        let config = ClientConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.jitter().unwrap(), Jitter::Proportional(0.5));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = ClientConfig::from_yaml_str("instance: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn retry_policy_uses_configured_ceiling() {
        let mut config = ClientConfig::new("x");
        config.default_max_elapsed_secs = 90;
        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.default_max_elapsed(), Duration::from_secs(90));
    }
}
