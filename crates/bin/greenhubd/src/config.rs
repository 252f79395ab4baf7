//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `greenhub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use greenhub_adapter_mqtt::MqttConfig;
use greenhub_adapter_notify_http::{NotifyConfig, WebhookConfig};
use greenhub_app::executor::NotificationDefaults;
use greenhub_app::notification::RetryPolicy;
use greenhub_domain::rule::{Priority, TargetChannel};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    pub engine: EngineConfig,
    pub notifications: NotificationsConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Pipeline sizing and timing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pending action jobs kept before the oldest is dropped.
    pub queue_capacity: usize,
    /// Tasks draining the action queue.
    pub action_workers: usize,
    /// How long a cached reading stays usable for evaluation.
    pub cache_ttl_secs: u64,
    /// Period of the stale-sensor sweep.
    pub sweep_interval_secs: u64,
    /// Record every evaluation, including silent non-matches.
    pub audit_all_evaluations: bool,
    /// Deadline for publishing a device command.
    pub publish_timeout_secs: u64,
    /// Messages buffered per topic before ingestion drops new ones.
    pub ingest_channel_depth: usize,
}

/// Notification defaults, retry policy and transport endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub defaults: DefaultsConfig,
    pub retry: RetryConfig,
    pub transports: NotifyConfig,
}

/// Values applied to notify actions that leave a field unset.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub channel: String,
    pub target_channel: TargetChannel,
    pub priority: Priority,
    pub user: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per transport, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `greenhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("greenhub.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("GREENHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("GREENHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("GREENHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("GREENHUB_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("GREENHUB_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = var("GREENHUB_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(url) = var("GREENHUB_WEBHOOK_URL") {
            let bearer_token = var("GREENHUB_WEBHOOK_TOKEN").or_else(|| {
                self.notifications
                    .transports
                    .webhook
                    .take()
                    .and_then(|webhook| webhook.bearer_token)
            });
            self.notifications.transports.webhook = Some(WebhookConfig { url, bearer_token });
        }
        if let Some(audit) = var("GREENHUB_AUDIT_ALL").and_then(|val| val.parse().ok()) {
            self.engine.audit_all_evaluations = audit;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "engine.queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.engine.action_workers == 0 {
            return Err(ConfigError::Validation(
                "engine.action_workers must be non-zero".to_string(),
            ));
        }
        if self.engine.cache_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.cache_ttl_secs must be non-zero".to_string(),
            ));
        }
        if self.notifications.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "notifications.retry.max_attempts must be non-zero".to_string(),
            ));
        }
        if self.mqtt.telemetry_topics.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.telemetry_topics must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Sweep period; never shorter than one second.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

impl NotificationsConfig {
    #[must_use]
    pub fn defaults(&self) -> NotificationDefaults {
        NotificationDefaults {
            channel: self.defaults.channel.clone(),
            target_channel: self.defaults.target_channel,
            priority: self.defaults.priority,
            user: self.defaults.user.clone(),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.retry.attempt_timeout_secs),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:greenhub.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "greenhubd=info,greenhub=info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            action_workers: 2,
            cache_ttl_secs: 300,
            sweep_interval_secs: 60,
            audit_all_evaluations: false,
            publish_timeout_secs: 5,
            ingest_channel_depth: 32,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let defaults = NotificationDefaults::default();
        Self {
            channel: defaults.channel,
            target_channel: defaults.target_channel,
            priority: defaults.priority,
            user: defaults.user,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            attempt_timeout_secs: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
