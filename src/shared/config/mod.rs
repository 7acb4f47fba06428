//! Sync configuration
//!
//! Provides the configuration shared by the spawner, coordinators and the
//! server binary. Values come from the builder, a TOML file, or `TRIPSYNC_*`
//! environment variables; anything unset keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SUBJECT_PREFIX: &str = "trips";
pub const DEFAULT_QUEUE_GROUP: &str = "coordinators";
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_COUNTER_TTL_MS: u64 = 180_000;
pub const DEFAULT_DELIVERY_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_TRIP_DAYS: usize = 366;

/// Collaboration backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First token of every bus subject
    pub subject_prefix: String,
    /// Queue group coordinators subscribe with
    pub queue_group: String,
    /// Period of the coordinator liveness ticker
    pub liveness_interval_ms: u64,
    /// TTL applied to the stored sequence counter
    pub counter_ttl_ms: u64,
    /// Bound of the ingest to apply queue
    pub delivery_queue_capacity: usize,
    /// Upper bound on itinerary days produced by date-range regeneration
    pub max_trip_days: usize,
    /// Base URL of the routing service
    pub routing_url: Option<String>,
    /// Base URL of the media signing service
    pub media_url: Option<String>,
    /// SQLite URL of the document store
    pub database_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            queue_group: DEFAULT_QUEUE_GROUP.to_string(),
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL_MS,
            counter_ttl_ms: DEFAULT_COUNTER_TTL_MS,
            delivery_queue_capacity: DEFAULT_DELIVERY_QUEUE_CAPACITY,
            max_trip_days: DEFAULT_MAX_TRIP_DAYS,
            routing_url: None,
            media_url: None,
            database_url: None,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn counter_ttl(&self) -> Duration {
        Duration::from_millis(self.counter_ttl_ms)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Build from `TRIPSYNC_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = SyncConfig::default();

        if let Some(value) = env_var("TRIPSYNC_SUBJECT_PREFIX") {
            config.subject_prefix = value;
        }
        if let Some(value) = env_var("TRIPSYNC_QUEUE_GROUP") {
            config.queue_group = value;
        }
        if let Some(value) = env_var("TRIPSYNC_LIVENESS_INTERVAL_MS") {
            config.liveness_interval_ms = parse_env("TRIPSYNC_LIVENESS_INTERVAL_MS", &value)?;
        }
        if let Some(value) = env_var("TRIPSYNC_COUNTER_TTL_MS") {
            config.counter_ttl_ms = parse_env("TRIPSYNC_COUNTER_TTL_MS", &value)?;
        }
        if let Some(value) = env_var("TRIPSYNC_DELIVERY_QUEUE_CAPACITY") {
            config.delivery_queue_capacity = parse_env("TRIPSYNC_DELIVERY_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = env_var("TRIPSYNC_MAX_TRIP_DAYS") {
            config.max_trip_days = parse_env("TRIPSYNC_MAX_TRIP_DAYS", &value)?;
        }
        config.routing_url = env_var("TRIPSYNC_ROUTING_URL").or(config.routing_url);
        config.media_url = env_var("TRIPSYNC_MEDIA_URL").or(config.media_url);
        config.database_url = env_var("DATABASE_URL").or(config.database_url);

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subject_prefix.is_empty()
            || self.subject_prefix.contains(['.', '*', '>', ' '])
        {
            return Err(ConfigError::invalid(
                "subject_prefix",
                "must be a single non-wildcard subject token",
            ));
        }
        if self.queue_group.is_empty() {
            return Err(ConfigError::invalid("queue_group", "must not be empty"));
        }
        if self.delivery_queue_capacity == 0 {
            return Err(ConfigError::invalid("delivery_queue_capacity", "must be positive"));
        }
        if self.liveness_interval_ms == 0 {
            return Err(ConfigError::invalid("liveness_interval_ms", "must be positive"));
        }
        if self.counter_ttl_ms <= self.liveness_interval_ms {
            return Err(ConfigError::invalid(
                "counter_ttl_ms",
                "must be larger than liveness_interval_ms",
            ));
        }
        for (field, url) in [("routing_url", &self.routing_url), ("media_url", &self.media_url)] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidUrl(format!("{}: {}", field, url)));
                }
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Env {
        name,
        message: e.to_string(),
    })
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.subject_prefix = prefix.into();
        self
    }

    pub fn queue_group(mut self, group: impl Into<String>) -> Self {
        self.config.queue_group = group.into();
        self
    }

    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.config.liveness_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn counter_ttl(mut self, ttl: Duration) -> Self {
        self.config.counter_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn delivery_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.delivery_queue_capacity = capacity;
        self
    }

    pub fn max_trip_days(mut self, days: usize) -> Self {
        self.config.max_trip_days = days;
        self
    }

    pub fn routing_url(mut self, url: impl Into<String>) -> Self {
        self.config.routing_url = Some(url.into());
        self
    }

    pub fn media_url(mut self, url: impl Into<String>) -> Self {
        self.config.media_url = Some(url.into());
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
    #[error("invalid environment variable {name}: {message}")]
    Env { name: &'static str, message: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
