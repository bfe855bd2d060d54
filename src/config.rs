//! Configuration loading, validation, and environment-based overrides.

use crate::error::{WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub matcher: MatcherConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            matcher: MatcherConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn load_from_env() -> WorkflowResult<Self> {
        let mut config = AppConfig::default();

        if let Ok(val) = std::env::var("CASHAPP_LOG_LEVEL") {
            config.logging.level = val;
        }
        if let Ok(val) = std::env::var("CASHAPP_SERVICE_NAME") {
            config.service.name = val;
        }
        if let Ok(val) = std::env::var("CASHAPP_PHONE_COUNTRY_CODE") {
            config.matcher.phone_country_code = val;
        }
        if let Ok(val) = std::env::var("CASHAPP_MAX_ACTIVE_RUNS") {
            config.orchestrator.max_active_runs = val.parse().map_err(|_| {
                WorkflowError::InvalidInput(
                    "CASHAPP_MAX_ACTIVE_RUNS must be an integer".to_string(),
                )
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning `InvalidInput` rather than panicking
    /// on a bad value.
    pub fn validate(&self) -> WorkflowResult<()> {
        self.service.validate()?;
        self.matcher.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "cashapp-engine".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServiceConfig {
    fn validate(&self) -> WorkflowResult<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::InvalidInput(
                "service.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Tuning for the matcher and alias resolver (C3-C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// ISO country calling code used to normalize national-format phone numbers
    /// (e.g. "254" for Kenya: a leading-0 number becomes +254...).
    pub phone_country_code: String,
    /// Expected total digit length of a national number (excluding the leading 0),
    /// used to reject malformed numbers rather than silently normalizing them.
    pub phone_national_digits: usize,
    /// Minimum fuzzy ratio (0..1) for alias/name matching, spec §4.3 step 5-6.
    pub fuzzy_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            phone_country_code: "254".to_string(),
            phone_national_digits: 9,
            fuzzy_threshold: 0.85,
        }
    }
}

impl MatcherConfig {
    fn validate(&self) -> WorkflowResult<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(WorkflowError::InvalidInput(
                "matcher.fuzzy_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tuning for the orchestrator façade (C8) and worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Above this many concurrently active runs, `start` returns
    /// `rejected_overloaded` instead of admitting the run.
    pub max_active_runs: usize,
    /// Number of workers pulling ready runs from the history store.
    pub worker_pool_size: usize,
    /// Lease TTL granted to a worker while it owns a run.
    pub lease_ttl_secs: u64,
    /// Overall wall-clock deadline for a single run.
    pub run_deadline_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_active_runs: 10_000,
            worker_pool_size: 8,
            lease_ttl_secs: 30,
            run_deadline_secs: 24 * 3600,
        }
    }
}

impl OrchestratorConfig {
    fn validate(&self) -> WorkflowResult<()> {
        if self.worker_pool_size == 0 {
            return Err(WorkflowError::InvalidInput(
                "orchestrator.worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.lease_ttl_secs == 0 {
            return Err(WorkflowError::InvalidInput(
                "orchestrator.lease_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        AppConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn rejects_out_of_range_fuzzy_threshold() {
        let mut config = AppConfig::default();
        config.matcher.fuzzy_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
