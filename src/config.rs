//! Configuration file support for ctxstore
//!
//! Reads from .ctxstore/config.toml, then applies environment overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory that holds the config file and the default database
pub const CONFIG_DIR: &str = ".ctxstore";
pub const DB_PATH_ENV: &str = "CTXSTORE_DB_PATH";
pub const LOG_ENV: &str = "CTXSTORE_LOG";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Connection pool sizing and timeouts
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory the config file was loaded from, if any
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. Relative paths resolve against the directory
    /// that contains `.ctxstore/`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Pool settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolConfig {
    /// Maximum number of live connections
    /// Default: 10
    #[serde(default = "default_max_size")]
    pub max_size: u32,

    /// Connections kept open while idle (None = max_size)
    #[serde(default)]
    pub min_idle: Option<u32>,

    /// How long `acquire` blocks before failing
    /// Default: 2000
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Idle connections older than this are closed
    /// Default: 30000
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// SQLite busy timeout applied to every connection
    /// Default: 5000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Reachability attempts at startup before giving up
    /// Default: 5
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial backoff between startup attempts, doubled each time
    /// Default: 200
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_size() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    2000
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_connect_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            min_idle: None,
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.max_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(min) = self.min_idle {
            if min > self.max_size {
                return Err(ConfigError::Invalid {
                    key: "pool.min_idle".to_string(),
                    reason: format!("{} exceeds pool.max_size ({})", min, self.max_size),
                });
            }
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.connection_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.idle_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.connect_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.connect_retries".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Server identity and shutdown behaviour
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Name advertised in the MCP `initialize` response
    #[serde(default = "default_server_name")]
    pub name: String,

    /// How long shutdown waits for in-flight tool calls and pool drain
    /// Default: 5000
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_server_name() -> String {
    "ctxstore".to_string()
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from .ctxstore/config.toml found by walking up from the
    /// current directory, then apply environment overrides.
    /// Returns the default config if no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.pool.validate()?;
        Ok(config)
    }

    /// Load config from an explicit file path, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.pool.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        // .ctxstore/config.toml -> project root
        config.source_dir = path
            .parent()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.database.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.is_empty() {
                self.logging.filter = filter;
            }
        }
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(CONFIG_DIR).join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// The database file this config points at
    pub fn db_path(&self) -> PathBuf {
        let root = self.source_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        match &self.database.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root.join(p),
            None => root.join(CONFIG_DIR).join("ctxstore.db"),
        }
    }
}
