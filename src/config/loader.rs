//! Configuration Loader
//!
//! Environment-aware configuration loading: base TOML file, optional
//! environment overlay, then `ACQUISITION__*` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::AcquisitionConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "acquisition";
const ENV_PREFIX: &str = "ACQUISITION";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: AcquisitionConfig,
    environment: String,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load `config/acquisition.toml` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load a specific base file with environment auto-detection
    pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_path_with_env(path, &environment)
    }

    /// Load a specific base file with an explicit environment.
    ///
    /// Useful in tests that must not touch process-wide environment variables
    /// for environment selection.
    pub fn load_from_path_with_env(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_path = path.as_ref().to_path_buf();
        if !config_path.is_file() {
            return Err(ConfigurationError::config_file_not_found(config_path));
        }

        let overlay_path = Self::environment_overlay_path(&config_path, environment);
        debug!(
            environment = %environment,
            config_path = %config_path.display(),
            overlay_path = %overlay_path.display(),
            "Loading acquisition configuration"
        );

        let merged = Config::builder()
            .add_source(File::from(config_path.clone()).required(true))
            .add_source(File::from(overlay_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_path.display().to_string(), e))?;

        let config: AcquisitionConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::deserialize_error)?;

        config.validate()?;

        info!(
            environment = %environment,
            domains = config.rate_limits.domains.len(),
            pool_size = config.worker.pool_size,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: AcquisitionConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: PathBuf::new(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// ACQUISITION_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("ACQUISITION_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `$ACQUISITION_CONFIG_DIR/acquisition.toml`, else `config/acquisition.toml`
    pub fn default_config_path() -> PathBuf {
        if let Ok(dir) = env::var("ACQUISITION_CONFIG_DIR") {
            return PathBuf::from(dir).join(format!("{CONFIG_FILE_STEM}.toml"));
        }
        PathBuf::from("config").join(format!("{CONFIG_FILE_STEM}.toml"))
    }

    /// `config/acquisition.toml` + `test` -> `config/acquisition.test.toml`
    fn environment_overlay_path(base: &Path, environment: &str) -> PathBuf {
        let stem = base
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(CONFIG_FILE_STEM);
        base.with_file_name(format!("{stem}.{environment}.toml"))
    }
}
