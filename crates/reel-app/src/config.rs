//! Application configuration loading from file and environment variables.

use reel_db::DbRuntimeSettings;
use serde::Deserialize;
use thiserror::Error;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reel_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "reel.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_connect_timeout_ms() -> u64 {
    DbRuntimeSettings::default().connect_timeout_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Connection tunables handed to the database layer.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `REEL_DB_PATH` overrides `database.path`
/// - `REEL_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `REEL_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `REEL_DB_CONNECT_TIMEOUT_MS` overrides `database.connect_timeout_ms`
/// - `REEL_LOG_LEVEL` overrides `logging.level`
/// - `REEL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns `ConfigError::Parse` on invalid TOML or mistyped values.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("REEL_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(parsed) = var("REEL_DB_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.database.busy_timeout_ms = parsed;
    }
    if let Some(parsed) = var("REEL_DB_POOL_MAX_SIZE").and_then(|v| v.parse().ok()) {
        config.database.pool_max_size = parsed;
    }
    if let Some(parsed) = var("REEL_DB_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.database.connect_timeout_ms = parsed;
    }
    if let Some(level) = var("REEL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("REEL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").expect("empty config should parse");
        assert_eq!(config.database.path, "reel.db");
        assert_eq!(
            config.database.runtime_settings(),
            DbRuntimeSettings::default()
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn file_values_are_read() {
        let config = parse_config(
            r#"
            [database]
            path = "/var/lib/reel/library.db"
            pool_max_size = 2

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.database.path, "/var/lib/reel/library.db");
        assert_eq!(config.database.pool_max_size, 2);
        assert_eq!(
            config.database.busy_timeout_ms,
            DbRuntimeSettings::default().busy_timeout_ms
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn mistyped_value_is_a_parse_error() {
        let err = parse_config("[database]\npool_max_size = \"many\"\n")
            .expect_err("string is not a pool size");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REEL_DB_PATH", "override.db"),
            ("REEL_DB_BUSY_TIMEOUT_MS", "750"),
            ("REEL_DB_POOL_MAX_SIZE", "not-a-number"),
            ("REEL_DB_CONNECT_TIMEOUT_MS", "1250"),
            ("REEL_LOG_JSON", "1"),
        ]);
        let mut config = Config::default();

        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, "override.db");
        assert_eq!(config.database.busy_timeout_ms, 750);
        assert_eq!(
            config.database.pool_max_size,
            DbRuntimeSettings::default().pool_max_size,
            "unparseable overrides are ignored"
        );
        assert_eq!(config.database.connect_timeout_ms, 1250);
        assert_eq!(config.database.runtime_settings().connect_timeout_ms, 1250);
        assert!(config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.logging.level, default_log_level());
    }
}
