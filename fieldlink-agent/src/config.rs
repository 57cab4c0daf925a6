//! Configuration for the fieldlink agent.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use fieldlink_agent_framework::{AgentConfig, AgentError, LoggingConfig, env_override};
use serde::{Deserialize, Serialize};

use crate::identity::{DeviceIdentity, RegistrationPolicy};
use crate::retry::RetryPolicy;
use crate::sources::SourceConfig;

/// Environment variable overriding `collector.host`.
pub const ENV_COLLECTOR_HOST: &str = "FIELDLINK_COLLECTOR_HOST";
/// Environment variable overriding `device.token`.
pub const ENV_TOKEN: &str = "FIELDLINK_TOKEN";
/// Environment variable overriding `device.id`.
pub const ENV_DEVICE_ID: &str = "FIELDLINK_DEVICE_ID";
/// Environment variable overriding `device.description`.
pub const ENV_DESCRIPTION: &str = "FIELDLINK_DESCRIPTION";

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldlinkConfig {
    /// Collector API settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Durable queue location.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Collection cadence.
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Retry worker policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Registration backoff.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Sensor sources polled every collection tick.
    #[serde(default = "crate::sources::default_sources")]
    pub sources: Vec<SourceConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Base URL of the collector (default: "http://localhost:3000").
    #[serde(default = "default_collector_host")]
    pub host: String,

    /// Timeout for metric and status exports (default: 10).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a single registration request (default: 5).
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: default_collector_host(),
            request_timeout_secs: default_request_timeout(),
            registration_timeout_secs: default_registration_timeout(),
        }
    }
}

fn default_collector_host() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_registration_timeout() -> u64 {
    5
}

impl CollectorConfig {
    /// Host with any trailing slash removed.
    pub fn base_url(&self) -> String {
        self.host.trim_end_matches('/').to_string()
    }

    /// Export request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Device identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier. Use "auto" to use the hostname.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable device description.
    #[serde(default = "default_description")]
    pub description: String,

    /// Bearer token from a previous registration (default: empty).
    #[serde(default)]
    pub token: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            description: default_description(),
            token: String::new(),
        }
    }
}

fn default_device_id() -> String {
    "test-device-001".to_string()
}

fn default_description() -> String {
    "A test device located in test location".to_string()
}

/// Durable queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue database file (default: "data.redb").
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
        }
    }
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data.redb")
}

/// Collection cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Seconds between collection ticks (default: 5).
    #[serde(default = "default_collection_interval")]
    pub interval_secs: u64,

    /// Also export device status snapshots (default: true).
    #[serde(default = "default_true")]
    pub device_status: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_collection_interval(),
            device_status: true,
        }
    }
}

fn default_collection_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Retry worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delivery attempts per entry per cycle (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts on the same entry (default: 1000).
    #[serde(default = "default_attempt_pause")]
    pub attempt_pause_ms: u64,

    /// Pause between sweeps of the queue (default: 10).
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_pause_ms: default_attempt_pause(),
            cycle_interval_secs: default_cycle_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_pause() -> u64 {
    1000
}

fn default_cycle_interval() -> u64 {
    10
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_pause: Duration::from_millis(self.attempt_pause_ms),
            cycle_interval: Duration::from_secs(self.cycle_interval_secs),
        }
    }
}

/// Registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Seconds to wait before retrying a failed registration (default: 10).
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            backoff_secs: default_backoff(),
        }
    }
}

fn default_backoff() -> u64 {
    10
}

impl FieldlinkConfig {
    /// Get the device id to use, resolving "auto" if needed.
    pub fn device_id(&self) -> String {
        if self.device.id == "auto" {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        } else {
            self.device.id.clone()
        }
    }

    /// Initial identity snapshot handed to the bootstrapper.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_id: self.device_id(),
            description: self.device.description.clone(),
            token: self.device.token.clone(),
        }
    }

    /// Registration policy derived from the collector and registration sections.
    pub fn registration_policy(&self) -> RegistrationPolicy {
        RegistrationPolicy {
            backoff: Duration::from_secs(self.registration.backoff_secs),
            request_timeout: Duration::from_secs(self.collector.registration_timeout_secs),
        }
    }
}

impl AgentConfig for FieldlinkConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn apply_env_overrides(&mut self) {
        if let Some(host) = env_override(ENV_COLLECTOR_HOST) {
            self.collector.host = host;
        }
        if let Some(token) = env_override(ENV_TOKEN) {
            self.device.token = token;
        }
        if let Some(id) = env_override(ENV_DEVICE_ID) {
            self.device.id = id;
        }
        if let Some(description) = env_override(ENV_DESCRIPTION) {
            self.device.description = description;
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        let host = &self.collector.host;
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(AgentError::validation(format!(
                "collector.host must be an http(s) URL, got '{}'",
                host
            )));
        }

        if self.collector.request_timeout_secs == 0 || self.collector.registration_timeout_secs == 0
        {
            return Err(AgentError::validation("collector timeouts must be > 0"));
        }

        if self.device.id.trim().is_empty() {
            return Err(AgentError::validation("device.id must not be empty"));
        }

        if self.collection.interval_secs == 0 {
            return Err(AgentError::validation(
                "collection.interval_secs must be > 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AgentError::validation("retry.max_attempts must be > 0"));
        }

        if self.retry.cycle_interval_secs == 0 {
            return Err(AgentError::validation(
                "retry.cycle_interval_secs must be > 0",
            ));
        }

        if self.registration.backoff_secs == 0 {
            return Err(AgentError::validation(
                "registration.backoff_secs must be > 0",
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id()) {
                return Err(AgentError::validation(format!(
                    "duplicate source id '{}'",
                    source.id()
                )));
            }
        }

        Ok(())
    }
}
