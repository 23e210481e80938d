//! Configuration loading from TOML files and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Idle-session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Total allowed inactivity in seconds before forced logout.
    #[serde(default = "default_idle_limit_secs")]
    pub idle_limit_secs: u64,
    /// Length of the warning countdown in seconds. Must be shorter than
    /// the idle limit.
    #[serde(default = "default_warn_secs")]
    pub warn_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_limit_secs: default_idle_limit_secs(),
            warn_secs: default_warn_secs(),
        }
    }
}

impl SessionConfig {
    pub fn idle_limit(&self) -> Duration {
        Duration::from_secs(self.idle_limit_secs)
    }

    pub fn warn_duration(&self) -> Duration {
        Duration::from_secs(self.warn_secs)
    }
}

/// Shared heartbeat storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Profile data directory shared by all session contexts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// How often to poll the shared heartbeat for foreign writes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl HeartbeatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the session audit logs directory path.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Auth collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Sign-out endpoint. When unset the session is local-only.
    #[serde(default)]
    pub signout_url: Option<String>,
    /// Login surface the user is sent to after the session ends.
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signout_url: None,
            login_url: default_login_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_idle_limit_secs() -> u64 {
    1800
}

fn default_warn_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_login_url() -> String {
    "./login.html".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".zportal"))
        .unwrap_or_else(|| PathBuf::from(".zportal"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::from_file(path)?
        } else {
            // Try default config locations
            let default_paths = [
                PathBuf::from("config/default.toml"),
                dirs::config_dir()
                    .map(|d| d.join("zportal/config.toml"))
                    .unwrap_or_default(),
            ];

            let mut loaded = None;
            for path in &default_paths {
                if path.exists() {
                    loaded = Some(Self::from_file(path)?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        };

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Expand home directory in data_dir
        config.heartbeat.data_dir = expand_tilde(&config.heartbeat.data_dir);

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ZPORTAL_IDLE_LIMIT") {
            if let Ok(v) = val.parse() {
                self.session.idle_limit_secs = v;
            }
        }
        if let Ok(val) = std::env::var("ZPORTAL_WARN_SECS") {
            if let Ok(v) = val.parse() {
                self.session.warn_secs = v;
            }
        }
        if let Ok(val) = std::env::var("ZPORTAL_POLL_INTERVAL_MS") {
            if let Ok(v) = val.parse() {
                self.heartbeat.poll_interval_ms = v;
            }
        }
        if let Ok(val) = std::env::var("ZPORTAL_DATA_DIR") {
            self.heartbeat.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("ZPORTAL_SIGNOUT_URL") {
            self.auth.signout_url = Some(val);
        }
        if let Ok(val) = std::env::var("ZPORTAL_LOGIN_URL") {
            self.auth.login_url = val;
        }
        if let Ok(val) = std::env::var("ZPORTAL_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.session.idle_limit_secs == 0 {
            anyhow::bail!("Idle limit must be greater than 0");
        }
        if self.session.warn_secs == 0 {
            anyhow::bail!("Warning duration must be greater than 0");
        }
        if self.session.warn_secs >= self.session.idle_limit_secs {
            anyhow::bail!(
                "Warning duration ({}s) must be shorter than the idle limit ({}s)",
                self.session.warn_secs,
                self.session.idle_limit_secs
            );
        }
        if self.heartbeat.poll_interval_ms == 0 {
            anyhow::bail!("Heartbeat poll interval must be greater than 0");
        }
        if self.auth.login_url.is_empty() {
            anyhow::bail!("Login URL cannot be empty");
        }
        Ok(())
    }
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if path_str.starts_with("~") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&path_str[2..]);
            }
        }
    }
    path.to_path_buf()
}
