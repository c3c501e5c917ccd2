//! # Acquisition Configuration
//!
//! Operator-tunable settings for task defaults, per-domain rate limits and the
//! worker pool.
//!
//! ## Sources
//!
//! Settings are layered, later sources winning:
//!
//! 1. `config/acquisition.toml`
//! 2. `config/acquisition.<environment>.toml` (optional)
//! 3. `ACQUISITION__<SECTION>__<KEY>` environment variables
//!
//! Every struct carries serde defaults, so a file only needs the values it
//! changes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use acquisition_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let policy = manager.config().rate_limits.policy_for("example.com");
//! println!("concurrency cap: {}", policy.concurrency_cap);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_SEED};
use crate::resilience::DomainPolicy;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub tasks: TaskDefaults,
    pub rate_limits: RateLimitConfig,
    pub worker: WorkerConfig,
}

/// Defaults applied by the task factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefaults {
    /// Mixed into every task id; changing it re-keys all tasks
    pub seed: String,
    pub max_attempts: u32,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Per-domain admission policies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Applied to any domain without an explicit entry
    pub default: DomainPolicy,
    pub domains: Vec<DomainPolicyOverride>,
}

/// Policy for one named domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPolicyOverride {
    pub domain: String,
    #[serde(flatten)]
    pub policy: DomainPolicy,
}

impl RateLimitConfig {
    pub fn policy_for(&self, domain: &str) -> DomainPolicy {
        self.domains
            .iter()
            .find(|entry| entry.domain == domain)
            .map(|entry| entry.policy.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    /// Delay before a task that hit an infrastructure error is offered again
    pub error_requeue_delay_seconds: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            poll_interval_ms: 250,
            error_requeue_delay_seconds: 5.0,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AcquisitionConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tasks.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "tasks.max_attempts",
                "0",
                "max_attempts must be at least 1",
            ));
        }

        self.rate_limits
            .default
            .validate()
            .map_err(|reason| ConfigurationError::invalid_value("rate_limits.default", "policy", reason))?;

        for entry in &self.rate_limits.domains {
            if entry.domain.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "rate_limits.domains.domain",
                    "",
                    "domain must not be empty",
                ));
            }
            entry.policy.validate().map_err(|reason| {
                ConfigurationError::invalid_value("rate_limits.domains", entry.domain.clone(), reason)
            })?;
        }

        if self.worker.pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.pool_size",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if !self.worker.error_requeue_delay_seconds.is_finite()
            || self.worker.error_requeue_delay_seconds < 0.0
        {
            return Err(ConfigurationError::invalid_value(
                "worker.error_requeue_delay_seconds",
                self.worker.error_requeue_delay_seconds.to_string(),
                "delay must be a non-negative number of seconds",
            ));
        }

        Ok(())
    }
}
