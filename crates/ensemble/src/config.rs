//! Configuration structures for an ensemble run.
//!
//! The configuration system supports:
//! - Bundled defaults (include_str! from ensemble.toml)
//! - User overrides (~/.config/ensemble/ensemble.toml, then ./ensemble.toml)
//! - Automatic merging with user values taking precedence

use config::{Config, File, FileFormat};
use derive_getters::Getters;
use ensemble_cache::CacheConfig;
use ensemble_core::CategorySpec;
use ensemble_dispatch::DispatchConfig;
use ensemble_error::{ConfigError, EnsembleResult};
use ensemble_rate_limit::{ProviderLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../../../ensemble.toml");

/// Everything needed to wire an [`Ensemble`](crate::Ensemble).
///
/// # Example
///
/// ```toml
/// [dispatch]
/// max_concurrent_tasks = 10
/// max_concurrent_per_provider = 3
///
/// [providers.openai]
/// requests_per_minute = 500
/// burst_capacity = 50
///
/// [retry]
/// max_retries = 3
/// base_delay_ms = 1000
///
/// [cache]
/// max_entries = 1000
/// default_ttl_secs = 3600
///
/// [categories.winner]
/// priority = "critical"
/// has_fallback = true
/// default_value = "home"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Getters)]
pub struct EnsembleConfig {
    /// Concurrency caps and pacing.
    #[serde(default)]
    dispatch: DispatchConfig,

    /// Rate limits keyed by provider bucket.
    #[serde(default)]
    providers: BTreeMap<String, ProviderLimitConfig>,

    /// Retry policy for every call.
    #[serde(default)]
    retry: RetryConfig,

    /// Result cache settings.
    #[serde(default)]
    cache: CacheConfig,

    /// Result category metadata.
    #[serde(default)]
    categories: BTreeMap<String, CategorySpec>,
}

impl EnsembleConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> EnsembleResult<Self> {
        debug!("Loading configuration from file");

        let parsed = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        Ok(parsed)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> EnsembleResult<Self> {
        let parsed = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        Ok(parsed)
    }

    /// Bundled defaults only.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled file fails to parse.
    pub fn bundled() -> EnsembleResult<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Load configuration with precedence: current dir > home dir > bundled default.
    ///
    /// User config files are optional and silently skipped if not found.
    ///
    /// ```no_run
    /// use ensemble::EnsembleConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = EnsembleConfig::load()?;
    /// config.validate_for_run()?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if any present source fails to parse.
    #[instrument]
    pub fn load() -> EnsembleResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/ensemble/ensemble.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("ensemble").required(false));

        let parsed = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        Ok(parsed)
    }

    /// Replace the provider limits.
    pub fn with_providers(mut self, providers: BTreeMap<String, ProviderLimitConfig>) -> Self {
        self.providers = providers;
        self
    }

    /// Add or replace one provider's limits.
    pub fn with_provider(mut self, name: impl Into<String>, limits: ProviderLimitConfig) -> Self {
        self.providers.insert(name.into(), limits);
        self
    }

    /// Replace the dispatch settings.
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the cache settings.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Add or replace one category spec.
    pub fn with_category(mut self, name: impl Into<String>, spec: CategorySpec) -> Self {
        self.categories.insert(name.into(), spec);
        self
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;
        self.retry.validate()?;
        self.cache
            .validate()
            .map_err(|e| ConfigError::new(format!("cache: {}", e.kind())))?;
        for (name, limits) in &self.providers {
            limits.validate(name)?;
        }
        for (name, spec) in &self.categories {
            for dependency in &spec.depends_on {
                if dependency == name {
                    return Err(ConfigError::new(format!(
                        "categories.{} cannot depend on itself",
                        name
                    )));
                }
                if !self.categories.contains_key(dependency) {
                    return Err(ConfigError::new(format!(
                        "categories.{} depends on unknown category '{}'",
                        name, dependency
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate for a batch run, which additionally needs a provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no provider
    /// is configured.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.providers.is_empty() {
            return Err(ConfigError::new("no providers configured"));
        }
        Ok(())
    }
}
