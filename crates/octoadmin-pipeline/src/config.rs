use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the outermost behavior does with a panicking handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every failure, panics included, becomes a `Failure` outcome.
    #[default]
    Convert,
    /// Errors become `Failure` outcomes; panics are logged and resumed.
    PropagatePanics,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub logging: RequestLoggingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.logging.identity_lookup_timeout_ms == 0 {
            return Err("pipeline.logging.identity_lookup_timeout_ms must be > 0".into());
        }
        self.performance.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLoggingConfig {
    /// Upper bound on the best-effort identity lookup before a request is logged.
    #[serde(default = "default_identity_lookup_timeout_ms")]
    pub identity_lookup_timeout_ms: u64,
}

fn default_identity_lookup_timeout_ms() -> u64 {
    50
}

impl RequestLoggingConfig {
    pub fn identity_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_lookup_timeout_ms)
    }
}

impl Default for RequestLoggingConfig {
    fn default() -> Self {
        Self {
            identity_lookup_timeout_ms: default_identity_lookup_timeout_ms(),
        }
    }
}

/// Slow-request thresholds.
///
/// The process is warming up during its first `warmup_executions` requests
/// or its first `warmup_period_secs` seconds, whichever lasts longer; the
/// higher `warmup_threshold_ms` applies meanwhile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_warmup_executions")]
    pub warmup_executions: u64,
    #[serde(default = "default_warmup_period_secs")]
    pub warmup_period_secs: u64,
    #[serde(default = "default_warmup_threshold_ms")]
    pub warmup_threshold_ms: u64,
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
}

fn default_warmup_executions() -> u64 {
    100
}
fn default_warmup_period_secs() -> u64 {
    60
}
fn default_warmup_threshold_ms() -> u64 {
    2_000
}
fn default_threshold_ms() -> u64 {
    500
}

impl PerformanceConfig {
    pub fn warmup_period(&self) -> Duration {
        Duration::from_secs(self.warmup_period_secs)
    }

    pub fn warmup_threshold(&self) -> Duration {
        Duration::from_millis(self.warmup_threshold_ms)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.threshold_ms == 0 || self.warmup_threshold_ms == 0 {
            return Err("pipeline.performance thresholds must be > 0".into());
        }
        if self.warmup_threshold_ms < self.threshold_ms {
            return Err(
                "pipeline.performance.warmup_threshold_ms must be >= threshold_ms".into(),
            );
        }
        Ok(())
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            warmup_executions: default_warmup_executions(),
            warmup_period_secs: default_warmup_period_secs(),
            warmup_threshold_ms: default_warmup_threshold_ms(),
            threshold_ms: default_threshold_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.failure_policy, FailurePolicy::Convert);
        assert_eq!(config.performance.threshold(), Duration::from_millis(500));
        assert_eq!(
            config.logging.identity_lookup_timeout(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let config = PerformanceConfig {
            warmup_threshold_ms: 100,
            threshold_ms: 500,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("warmup_threshold_ms"));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = PerformanceConfig {
            threshold_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
