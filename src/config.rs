//! Configuration for the fake job queue.
//!
//! Settings can be built in code, read from a TOML file, or taken from
//! `FAKEQUEUE_*` environment variables.
//!
//! ```rust
//! use fakequeue::config::{FakeQueueConfig, UnmappedQueuePolicy};
//! use std::time::Duration;
//!
//! let config = FakeQueueConfig::new()
//!     .with_id_prefix("job-")
//!     .with_id_width(6)
//!     .with_backoff_delay(Duration::from_millis(250))
//!     .with_unmapped_queue_policy(UnmappedQueuePolicy::Reject);
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::{
    FakeQueueError, Result,
    id::{DEFAULT_ID_PREFIX, DEFAULT_ID_WIDTH},
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration as StdDuration};

/// Widest zero-padded counter that still fits a `u64`.
const MAX_ID_WIDTH: usize = 20;

/// Module for serializing std::time::Duration as human-readable strings
mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        if millis == 0 {
            serializer.serialize_str("0s")
        } else if millis % 1000 != 0 {
            serializer.serialize_str(&format!("{}ms", millis))
        } else {
            let secs = duration.as_secs();
            if secs % 3600 == 0 {
                serializer.serialize_str(&format!("{}h", secs / 3600))
            } else if secs % 60 == 0 {
                serializer.serialize_str(&format!("{}m", secs / 60))
            } else {
                serializer.serialize_str(&format!("{}s", secs))
            }
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(D::Error::custom)
    }

    /// Parse a duration string like "500ms", "30s", "5m", "1h", "90", etc.
    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();

        // Handle just numbers (assume seconds)
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Duration::from_secs(secs));
        }

        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
            return Ok(Duration::from_millis(millis));
        }

        if s.len() < 2 {
            return Err(format!("Invalid duration format: {}", s));
        }

        let (num_str, suffix) = s.split_at(s.len() - 1);
        let num: u64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

        match suffix {
            "s" => Ok(Duration::from_secs(num)),
            "m" => Ok(Duration::from_secs(num * 60)),
            "h" => Ok(Duration::from_secs(num * 3600)),
            "d" => Ok(Duration::from_secs(num * 86400)),
            _ => Err(format!(
                "Invalid duration suffix: {}. Use ms, s, m, h, or d",
                suffix
            )),
        }
    }
}

/// What dispatch does with a queue that has no registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedQueuePolicy {
    /// Leave the queue's jobs where they are and carry on.
    #[default]
    Ignore,
    /// Fail the dispatch call with `FakeQueueError::NoHandler`.
    Reject,
}

impl FromStr for UnmappedQueuePolicy {
    type Err = FakeQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(UnmappedQueuePolicy::Ignore),
            "reject" => Ok(UnmappedQueuePolicy::Reject),
            other => Err(FakeQueueError::Config(format!(
                "Unknown unmapped queue policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for UnmappedQueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmappedQueuePolicy::Ignore => f.write_str("ignore"),
            UnmappedQueuePolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Settings for a [`FakeJobQueue`](crate::FakeJobQueue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeQueueConfig {
    /// Constant prefix of every job id
    pub id_prefix: String,

    /// Number of zero-padded digits after the prefix
    pub id_width: usize,

    /// Redelivery delay applied when a handler asks for backoff
    #[serde(with = "duration_human")]
    pub backoff_delay: StdDuration,

    /// Dispatch behaviour for queues without a handler
    pub unmapped_queue_policy: UnmappedQueuePolicy,
}

impl Default for FakeQueueConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            id_width: DEFAULT_ID_WIDTH,
            backoff_delay: StdDuration::from_secs(1),
            unmapped_queue_policy: UnmappedQueuePolicy::default(),
        }
    }
}

impl FakeQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn with_id_width(mut self, width: usize) -> Self {
        self.id_width = width;
        self
    }

    pub fn with_backoff_delay(mut self, delay: StdDuration) -> Self {
        self.backoff_delay = delay;
        self
    }

    pub fn with_unmapped_queue_policy(mut self, policy: UnmappedQueuePolicy) -> Self {
        self.unmapped_queue_policy = policy;
        self
    }

    /// Check the settings can drive a queue.
    pub fn validate(&self) -> Result<()> {
        if self.id_prefix.is_empty() {
            return Err(FakeQueueError::Config("id_prefix must not be empty".to_string()));
        }
        if self.id_width == 0 || self.id_width > MAX_ID_WIDTH {
            return Err(FakeQueueError::Config(format!(
                "id_width must be between 1 and {}, got {}",
                MAX_ID_WIDTH, self.id_width
            )));
        }
        self.backoff_delay_chrono()?;
        Ok(())
    }

    pub(crate) fn backoff_delay_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.backoff_delay).map_err(|e| {
            FakeQueueError::Config(format!(
                "backoff_delay {:?} out of range: {}",
                self.backoff_delay, e
            ))
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("FAKEQUEUE_ID_PREFIX") {
            config.id_prefix = prefix;
        }
        if let Ok(width) = std::env::var("FAKEQUEUE_ID_WIDTH") {
            config.id_width = width.parse().unwrap_or(config.id_width);
        }
        if let Ok(delay) = std::env::var("FAKEQUEUE_BACKOFF_DELAY_MS") {
            if let Ok(millis) = delay.parse::<u64>() {
                config.backoff_delay = StdDuration::from_millis(millis);
            }
        }
        if let Ok(policy) = std::env::var("FAKEQUEUE_UNMAPPED_QUEUE_POLICY") {
            config.unmapped_queue_policy = policy.parse()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = FakeQueueConfig::default();
        assert_eq!(config.id_prefix, "fakej0bqee");
        assert_eq!(config.id_width, 15);
        assert_eq!(config.backoff_delay, StdDuration::from_secs(1));
        assert_eq!(config.unmapped_queue_policy, UnmappedQueuePolicy::Ignore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(FakeQueueConfig::new().with_id_prefix("").validate().is_err());
        assert!(FakeQueueConfig::new().with_id_width(0).validate().is_err());
        assert!(FakeQueueConfig::new().with_id_width(21).validate().is_err());
        assert!(FakeQueueConfig::new().with_id_width(20).validate().is_ok());
        assert!(FakeQueueConfig::new()
            .with_backoff_delay(StdDuration::MAX)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("fakequeue.toml");

        let config = FakeQueueConfig::new()
            .with_id_prefix("job-")
            .with_backoff_delay(StdDuration::from_millis(1500))
            .with_unmapped_queue_policy(UnmappedQueuePolicy::Reject);

        config.save_to_file(&config_path).unwrap();

        let toml_content = std::fs::read_to_string(&config_path).unwrap();
        assert!(toml_content.contains("backoff_delay = \"1500ms\""));
        assert!(toml_content.contains("unmapped_queue_policy = \"reject\""));

        let loaded = FakeQueueConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("partial.toml");
        std::fs::write(&config_path, "backoff_delay = \"5m\"\n").unwrap();

        let loaded = FakeQueueConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.backoff_delay, StdDuration::from_secs(300));
        assert_eq!(loaded.id_prefix, "fakej0bqee");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = FakeQueueConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(FakeQueueError::Io(_))));
    }

    #[test]
    fn test_env_config() {
        unsafe {
            std::env::set_var("FAKEQUEUE_ID_PREFIX", "env-");
            std::env::set_var("FAKEQUEUE_ID_WIDTH", "4");
            std::env::set_var("FAKEQUEUE_BACKOFF_DELAY_MS", "250");
            std::env::set_var("FAKEQUEUE_UNMAPPED_QUEUE_POLICY", "Reject");
        }

        let config = FakeQueueConfig::from_env().unwrap();

        assert_eq!(config.id_prefix, "env-");
        assert_eq!(config.id_width, 4);
        assert_eq!(config.backoff_delay, StdDuration::from_millis(250));
        assert_eq!(config.unmapped_queue_policy, UnmappedQueuePolicy::Reject);

        // Clean up
        unsafe {
            std::env::remove_var("FAKEQUEUE_ID_PREFIX");
            std::env::remove_var("FAKEQUEUE_ID_WIDTH");
            std::env::remove_var("FAKEQUEUE_BACKOFF_DELAY_MS");
            std::env::remove_var("FAKEQUEUE_UNMAPPED_QUEUE_POLICY");
        }
    }

    #[test]
    fn test_parse_duration() {
        use duration_human::parse_duration;

        assert_eq!(parse_duration("90").unwrap(), StdDuration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), StdDuration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), StdDuration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), StdDuration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), StdDuration::from_secs(3600));
        assert_eq!(parse_duration("1d").unwrap(), StdDuration::from_secs(86400));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("fastms").is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("ignore".parse::<UnmappedQueuePolicy>().unwrap(), UnmappedQueuePolicy::Ignore);
        assert_eq!(" REJECT ".parse::<UnmappedQueuePolicy>().unwrap(), UnmappedQueuePolicy::Reject);
        assert!("crash".parse::<UnmappedQueuePolicy>().is_err());
        assert_eq!(UnmappedQueuePolicy::Reject.to_string(), "reject");
    }
}
