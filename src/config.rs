//! Runtime configuration loaded from TOML with environment overrides.
//!
//! Every section is defaulted, so an empty file (or no file) yields a
//! working local configuration.

use crate::provider::domain::CallStrategy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`DatabaseConfig::url`].
pub const DATABASE_URL_ENV: &str = "OUTCALL_DATABASE_URL";
/// Environment variable overriding [`ProviderConfig::api_key`].
pub const PROVIDER_API_KEY_ENV: &str = "OUTCALL_PROVIDER_API_KEY";
/// Environment variable overriding [`ClassifierConfig::api_key`].
pub const CLASSIFIER_API_KEY_ENV: &str = "OUTCALL_CLASSIFIER_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutcallConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Call provider client settings.
    pub provider: ProviderConfig,
    /// Classifier client settings.
    pub classifier: ClassifierConfig,
    /// Status reconciliation settings.
    pub reconcile: ReconcileConfig,
    /// Poll schedule settings.
    pub schedule: ScheduleConfig,
    /// Work queue settings.
    pub queues: QueueConfig,
    /// Poll-run flag settings.
    pub poll_run: PollRunConfig,
    /// Statistics cache settings.
    pub cache: CacheConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `PostgreSQL` URL; the in-memory store is used when unset.
    pub url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
}

/// Call provider client settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider API base URL.
    pub base_url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Strategy applied to new job groups.
    pub strategy: CallStrategy,
}

/// Classifier client settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Prompt template overriding the built-in one.
    pub prompt_template: Option<String>,
    /// Attempts per classification for transport failures before the note
    /// falls back to manual follow-up.
    pub max_attempts: u32,
    /// Delay between classification attempts in milliseconds.
    pub retry_delay_ms: u64,
}

/// Status reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Assignments per provider batch lookup, clamped to the provider
    /// ceiling.
    pub page_size: u32,
    /// Attempts per page for transport failures.
    pub max_attempts: u32,
    /// Delay between page attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Delay before parked pages are retried, in milliseconds.
    pub parked_retry_delay_ms: u64,
}

/// Poll schedule settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Decaying one-shot poll tiers, in order.
    pub tiers: Vec<PollTierConfig>,
    /// Interval of the coarse sweep over all calling campaigns.
    pub sweep_interval_secs: u64,
    /// Ceiling on one-shot polls per campaign.
    pub max_one_shot_polls: u32,
}

/// One tier of the decaying schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollTierConfig {
    /// Seconds between polls within the tier.
    pub interval_secs: u64,
    /// Seconds after calling started at which the tier ends.
    pub until_secs: u64,
}

/// Work queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Workers per named queue.
    pub workers_per_queue: usize,
    /// Pending units per queue before submissions wait.
    pub capacity: usize,
    /// Attempts per unit.
    pub max_attempts: u32,
    /// Delay between unit attempts in milliseconds.
    pub retry_delay_ms: u64,
}

/// Poll-run flag settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollRunConfig {
    /// Age after which a held flag counts as abandoned.
    pub stale_after_secs: u64,
}

/// Statistics cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of cached organization statistics.
    pub stats_ttl_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 8,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_owned(),
            api_key: None,
            timeout_secs: 10,
            strategy: CallStrategy::default(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: None,
            model: "gpt-4o-mini".to_owned(),
            timeout_secs: 30,
            prompt_template: None,
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_attempts: 3,
            retry_delay_ms: 500,
            parked_retry_delay_ms: 5_000,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                PollTierConfig {
                    interval_secs: 10,
                    until_secs: 120,
                },
                PollTierConfig {
                    interval_secs: 30,
                    until_secs: 600,
                },
            ],
            sweep_interval_secs: 300,
            max_one_shot_polls: 40,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers_per_queue: 2,
            capacity: 1_024,
            max_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl Default for PollRunConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 900,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { stats_ttl_secs: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

impl ReconcileConfig {
    /// Returns the delay between page attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the delay before parked pages are retried.
    #[must_use]
    pub const fn parked_retry_delay(&self) -> Duration {
        Duration::from_millis(self.parked_retry_delay_ms)
    }
}

impl ClassifierConfig {
    /// Returns the delay between classification attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl QueueConfig {
    /// Returns the delay between unit attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl PollRunConfig {
    /// Returns the staleness window.
    #[must_use]
    pub fn stale_after(&self) -> chrono::Duration {
        seconds(self.stale_after_secs)
    }
}

impl CacheConfig {
    /// Returns the time-to-live of cached statistics.
    #[must_use]
    pub fn stats_ttl(&self) -> chrono::Duration {
        seconds(self.stats_ttl_secs)
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl OutcallConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from an optional file, applies environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or
    /// when validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(file) => {
                let text = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
                    path: file.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides secrets and the database URL from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty(DATABASE_URL_ENV) {
            self.database.url = Some(url);
        }
        if let Some(key) = non_empty(PROVIDER_API_KEY_ENV) {
            self.provider.api_key = Some(key);
        }
        if let Some(key) = non_empty(CLASSIFIER_API_KEY_ENV) {
            self.classifier.api_key = Some(key);
        }
    }

    /// Rejects values that would stall or disable reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.reconcile.page_size == 0, "reconcile.page_size must be positive"),
            (self.reconcile.max_attempts == 0, "reconcile.max_attempts must be positive"),
            (self.queues.max_attempts == 0, "queues.max_attempts must be positive"),
            (self.queues.workers_per_queue == 0, "queues.workers_per_queue must be positive"),
            (self.queues.capacity == 0, "queues.capacity must be positive"),
            (self.schedule.tiers.is_empty(), "schedule.tiers must not be empty"),
            (
                self.schedule.sweep_interval_secs == 0,
                "schedule.sweep_interval_secs must be positive",
            ),
            (self.provider.timeout_secs == 0, "provider.timeout_secs must be positive"),
            (self.classifier.timeout_secs == 0, "classifier.timeout_secs must be positive"),
            (self.classifier.max_attempts == 0, "classifier.max_attempts must be positive"),
            (self.database.max_connections == 0, "database.max_connections must be positive"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(ConfigError::Invalid((*message).to_owned()));
        }

        let mut previous_until = 0;
        for tier in &self.schedule.tiers {
            if tier.interval_secs == 0 || tier.until_secs <= previous_until {
                return Err(ConfigError::Invalid(
                    "schedule.tiers need positive intervals and increasing bounds".to_owned(),
                ));
            }
            previous_until = tier.until_secs;
        }
        Ok(())
    }
}
