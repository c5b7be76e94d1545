//! Service configuration
//!
//! Environment variables are read once, here, at startup. Everything below
//! receives resolved values; nothing else in the crate looks at the process
//! environment.

use crate::cache::config::CacheConfig;
use crate::cost::OptimizerConfig;
use crate::error::{CoreError, Result};
use crate::retention::policy::{DataCategory, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ENVIRONMENT: &str = "SPLITBOT_ENVIRONMENT";
pub const ENV_BACKEND: &str = "SPLITBOT_BACKEND";
pub const ENV_REDIS_URL: &str = "SPLITBOT_REDIS_URL";
pub const ENV_DEFAULT_REGION: &str = "SPLITBOT_DEFAULT_REGION";
pub const ENV_WORKERS: &str = "SPLITBOT_WORKERS";
pub const ENV_RECONCILE_INTERVAL_SECS: &str = "SPLITBOT_RECONCILE_INTERVAL_SECS";
pub const ENV_BASE_TTL_SECS: &str = "SPLITBOT_BASE_TTL_SECS";

/// Deployment environment
///
/// Only `Test` relaxes consent: a missing record then reads as granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(CoreError::ConfigError(format!("unknown environment '{}'", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Test => write!(f, "test"),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
    /// Degraded mode: cache always misses, memory writes fail
    Null,
}

impl FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            "null" | "none" => Ok(BackendKind::Null),
            other => Err(CoreError::ConfigError(format!("unknown backend '{}'", other))),
        }
    }
}

/// Top-level configuration for [`AssistantCore`](crate::service::AssistantCore)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub environment: Environment,

    pub backend: BackendKind,

    /// Connection URL when `backend` is `Redis`
    pub redis_url: Option<String>,

    /// Maximum concurrent background tasks
    pub workers: usize,

    /// Interval between expiry reconciliation sweeps
    pub reconcile_interval: Duration,

    /// Per-category retention shortening, in days
    pub retention_overrides: BTreeMap<DataCategory, u32>,

    pub cache: CacheConfig,

    pub optimizer: OptimizerConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            backend: BackendKind::Memory,
            redis_url: None,
            workers: 8,
            reconcile_interval: Duration::from_secs(3600),
            retention_overrides: BTreeMap::new(),
            cache: CacheConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Production preset
    pub fn production() -> Self {
        Self::default()
    }

    /// In-memory, default-grant preset for test suites
    pub fn testing() -> Self {
        Self {
            environment: Environment::Test,
            backend: BackendKind::Memory,
            workers: 2,
            reconcile_interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Load `.env` if present, then read `SPLITBOT_*` variables over the defaults
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_ENVIRONMENT) {
            config.environment = v.parse()?;
        }
        if let Some(v) = get(ENV_BACKEND) {
            config.backend = v.parse()?;
        }
        config.redis_url = get(ENV_REDIS_URL);
        if let Some(v) = get(ENV_DEFAULT_REGION) {
            config.cache.default_region = v.trim().to_uppercase();
        }
        if let Some(v) = get(ENV_WORKERS) {
            config.workers = parse_number(ENV_WORKERS, &v)?;
        }
        if let Some(v) = get(ENV_RECONCILE_INTERVAL_SECS) {
            config.reconcile_interval = Duration::from_secs(parse_number(ENV_RECONCILE_INTERVAL_SECS, &v)?);
        }
        if let Some(v) = get(ENV_BASE_TTL_SECS) {
            config.cache.base_ttl = Duration::from_secs(parse_number(ENV_BASE_TTL_SECS, &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CoreError::ConfigError("workers must be greater than 0".to_string()));
        }
        if self.reconcile_interval.is_zero() {
            return Err(CoreError::ConfigError(
                "reconcile_interval must be greater than 0".to_string(),
            ));
        }
        if self.backend == BackendKind::Redis && self.redis_url.is_none() {
            return Err(CoreError::ConfigError(format!(
                "redis backend selected but {} is not set",
                ENV_REDIS_URL
            )));
        }
        self.cache.validate().map_err(CoreError::ConfigError)?;
        self.optimizer.validate().map_err(CoreError::ConfigError)?;
        self.retention_policy()?;
        Ok(())
    }

    /// Statutory retention table with this deployment's overrides applied
    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        let mut policy = RetentionPolicy::standard();
        for (category, days) in &self.retention_overrides {
            policy = policy
                .with_override(*category, *days)
                .map_err(|e| CoreError::ConfigError(e.to_string()))?;
        }
        Ok(policy)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::ConfigError(format!("{} must be a number, got '{}'", name, value)))
}

/// Builder for [`CoreConfig`]
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    environment: Option<Environment>,
    backend: Option<BackendKind>,
    redis_url: Option<String>,
    workers: Option<usize>,
    reconcile_interval: Option<Duration>,
    retention_overrides: BTreeMap<DataCategory, u32>,
    cache: Option<CacheConfig>,
    optimizer: Option<OptimizerConfig>,
}

impl CoreConfigBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = Some(interval);
        self
    }

    /// Shorten one category's retention window
    pub fn retention_days(mut self, category: DataCategory, days: u32) -> Self {
        self.retention_overrides.insert(category, days);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn build(self) -> CoreConfig {
        let defaults = CoreConfig::default();

        CoreConfig {
            environment: self.environment.unwrap_or(defaults.environment),
            backend: self.backend.unwrap_or(defaults.backend),
            redis_url: self.redis_url.or(defaults.redis_url),
            workers: self.workers.unwrap_or(defaults.workers),
            reconcile_interval: self.reconcile_interval.unwrap_or(defaults.reconcile_interval),
            retention_overrides: self.retention_overrides,
            cache: self.cache.unwrap_or(defaults.cache),
            optimizer: self.optimizer.unwrap_or(defaults.optimizer),
        }
    }
}
