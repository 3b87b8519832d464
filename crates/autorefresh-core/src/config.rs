use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::TabId;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_EMAIL_API: &str = "http://localhost:3000";
pub const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HISTORY_CLEANUP_SECS: u64 = 3600;

/// Top-level config (autorefresh.toml + AUTOREFRESH_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoRefreshConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Tabs known to the HTTP tab host at start.
    #[serde(default)]
    pub tabs: Vec<TabSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Outbound e-mail notification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Base URL (without trailing slash) of the mail relay service.
    #[serde(default = "default_email_api")]
    pub api_base_url: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_email_api(),
            timeout_secs: default_email_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often expired refresh history is pruned.
    #[serde(default = "default_cleanup_secs")]
    pub history_cleanup_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_cleanup_interval_secs: default_cleanup_secs(),
        }
    }
}

/// A refreshable target registered before any client connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSeed {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_email_api() -> String {
    DEFAULT_EMAIL_API.to_string()
}
fn default_email_timeout() -> u64 {
    DEFAULT_EMAIL_TIMEOUT_SECS
}
fn default_cleanup_secs() -> u64 {
    DEFAULT_HISTORY_CLEANUP_SECS
}
fn default_db_path() -> String {
    format!("{}/autorefresh.db", data_dir())
}

fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autorefresh", home)
}

impl AutoRefreshConfig {
    /// Load config from a TOML file with AUTOREFRESH_* env var overrides.
    ///
    /// Nested keys use a double underscore: `AUTOREFRESH_SERVER__PORT=9000`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::AutoRefreshError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUTOREFRESH_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/autorefresh.toml", data_dir())
}

/// Create the parent directory of a file path (database, logs) if missing.
pub fn ensure_parent_dir(path: &str) -> crate::error::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
