//! Runtime configuration for the sync engine.
//!
//! # Responsibility
//! - Provide defaults, JSON file loading, and environment overrides.
//! - Reject values the engine cannot run with.
//!
//! # Invariants
//! - A config returned by `load`/`from_json_str` has passed `validate`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_RELOAD_INTERVAL_MS: &str = "HEXSYNC_RELOAD_INTERVAL_MS";
pub const ENV_FAILURE_GRACE_MS: &str = "HEXSYNC_FAILURE_GRACE_MS";
pub const ENV_PRESENCE_STALE_MS: &str = "HEXSYNC_PRESENCE_STALE_MS";
pub const ENV_LOG_LEVEL: &str = "HEXSYNC_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HEXSYNC_LOG_DIR";

const DEFAULT_RELOAD_INTERVAL_MS: i64 = 5_000;
const DEFAULT_FAILURE_GRACE_MS: i64 = 2_000;
const DEFAULT_PRESENCE_STALE_MS: i64 = 30_000;

/// Engine timing and logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of full reloads while the feed is failing.
    pub reload_interval_ms: i64,
    /// How long a failure must last before reloads start.
    pub failure_grace_ms: i64,
    pub presence_stale_ms: i64,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reload_interval_ms: DEFAULT_RELOAD_INTERVAL_MS,
            failure_grace_ms: DEFAULT_FAILURE_GRACE_MS,
            presence_stale_ms: DEFAULT_PRESENCE_STALE_MS,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rotated log files; `None` disables file logs.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    /// Environment variable present but not parseable.
    Env { key: &'static str, value: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Env { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl SyncConfig {
    /// Parses and validates a JSON document; missing keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `HEXSYNC_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; used directly by tests.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = read_millis(&lookup, ENV_RELOAD_INTERVAL_MS)? {
            self.reload_interval_ms = value;
        }
        if let Some(value) = read_millis(&lookup, ENV_FAILURE_GRACE_MS)? {
            self.failure_grace_ms = value;
        }
        if let Some(value) = read_millis(&lookup, ENV_PRESENCE_STALE_MS)? {
            self.presence_stale_ms = value;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            self.logging.level = level.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|value| !value.trim().is_empty()) {
            self.logging.dir = Some(PathBuf::from(dir.trim()));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reload_interval_ms <= 0 {
            return Err(ConfigError::Invalid(format!(
                "reload_interval_ms must be positive, got {}",
                self.reload_interval_ms
            )));
        }
        if self.failure_grace_ms < 0 {
            return Err(ConfigError::Invalid(format!(
                "failure_grace_ms cannot be negative, got {}",
                self.failure_grace_ms
            )));
        }
        if self.presence_stale_ms <= 0 {
            return Err(ConfigError::Invalid(format!(
                "presence_stale_ms must be positive, got {}",
                self.presence_stale_ms
            )));
        }
        crate::logging::normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be absolute, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

fn read_millis<F>(lookup: &F, key: &'static str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConfigError::Env { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SyncConfig, ENV_FAILURE_GRACE_MS, ENV_LOG_LEVEL};
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SyncConfig::from_json_str(r#"{"reload_interval_ms": 1000}"#).unwrap();
        assert_eq!(config.reload_interval_ms, 1000);
        assert_eq!(config.presence_stale_ms, SyncConfig::default().presence_stale_ms);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let err = SyncConfig::from_json_str(r#"{"reload_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_FAILURE_GRACE_MS, "750"), (ENV_LOG_LEVEL, "WARN")]);
        let config = SyncConfig::default()
            .with_overrides(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.failure_grace_ms, 750);
        assert_eq!(config.logging.level, "WARN");

        let err = SyncConfig::default()
            .with_overrides(|key| (key == ENV_FAILURE_GRACE_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"presence_stale_ms": 10000, "logging": {{"level": "debug"}}}}"#)
            .unwrap();
        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.presence_stale_ms, 10_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
