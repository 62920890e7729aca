//! Sync core configuration.
//!
//! # Responsibility
//! - Define retry and logging settings with defaults.
//! - Load and validate settings from a JSON document.
//!
//! # Invariants
//! - A validated `RetryPolicy` has `max_attempts >= 1` and
//!   `base_delay_ms <= max_delay_ms`.
//! - Missing keys fall back to defaults; unknown keys are rejected.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 50;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;
const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_LOG_FILES: usize = 5;

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read config `{path}`: {source}"),
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Retries without waiting; used where wall-clock delay is unwanted.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay to wait before retry number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Rolling file log settings consumed by `logging::init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for log files. `None` disables file logging.
    pub log_dir: Option<String>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

/// Top-level sync core configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Backoff for mutation calls and subscription re-establishment.
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        crate::logging::normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RetryPolicy, SyncConfig};
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SyncConfig::from_json_str("{}").expect("empty config should parse");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = SyncConfig::from_json_str(r#"{"retry": {"max_attempts": 5}}"#)
            .expect("partial config should parse");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
    }

    #[test]
    fn rejects_invalid_values_and_unknown_keys() {
        let zero = SyncConfig::from_json_str(r#"{"retry": {"max_attempts": 0}}"#)
            .expect_err("zero attempts must be rejected");
        assert!(matches!(zero, ConfigError::Invalid(_)));

        let inverted =
            SyncConfig::from_json_str(r#"{"retry": {"base_delay_ms": 10, "max_delay_ms": 1}}"#)
                .expect_err("inverted delays must be rejected");
        assert!(matches!(inverted, ConfigError::Invalid(_)));

        let level = SyncConfig::from_json_str(r#"{"logging": {"level": "loud"}}"#)
            .expect_err("unknown level must be rejected");
        assert!(matches!(level, ConfigError::Invalid(_)));

        let unknown = SyncConfig::from_json_str(r#"{"retries": {}}"#)
            .expect_err("unknown key must be rejected");
        assert!(matches!(unknown, ConfigError::Parse(_)));
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskboard.json");
        std::fs::write(&path, r#"{"logging": {"level": "warn", "max_files": 2}}"#).unwrap();

        let config = SyncConfig::load(&path).expect("config file should load");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.max_files, 2);

        let missing = SyncConfig::load(dir.path().join("missing.json"))
            .expect_err("missing file must fail");
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
