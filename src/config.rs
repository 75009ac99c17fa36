// src/config.rs

//! Manages service configuration: loading from the environment and validation.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::env;

fn default_database_path() -> String {
    "data/topic_mirror.db".to_string()
}
fn default_sessions_dir() -> String {
    "sessions".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_panel_host() -> String {
    "0.0.0.0".to_string()
}
fn default_panel_port() -> u16 {
    8080
}
fn default_monitor_interval() -> u64 {
    60
}
fn default_standby_refresh() -> u64 {
    120
}
fn default_recovery_max_retry() -> u32 {
    3
}
fn default_panel_session_ttl() -> u64 {
    86400
}

/// The final, validated service configuration.
///
/// Every field is settable through the process environment; the panel password
/// is never serialized back out.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    #[serde(skip_serializing)]
    pub bot_token: String,

    pub database_path: String,
    pub sessions_dir: String,

    pub notify_chat_id: Option<i64>,
    pub monitor_interval_seconds: u64,
    pub standby_refresh_seconds: u64,
    pub recovery_max_retry: u32,

    #[serde(skip_serializing)]
    pub panel_password: String,
    pub panel_session_ttl_seconds: u64,
    pub panel_host: String,
    pub panel_port: u16,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            bot_token: String::new(),
            database_path: default_database_path(),
            sessions_dir: default_sessions_dir(),
            notify_chat_id: None,
            monitor_interval_seconds: default_monitor_interval(),
            standby_refresh_seconds: default_standby_refresh(),
            recovery_max_retry: default_recovery_max_retry(),
            panel_password: String::new(),
            panel_session_ttl_seconds: default_panel_session_ttl(),
            panel_host: default_panel_host(),
            panel_port: default_panel_port(),
            log_level: default_log_level(),
        }
    }
}

fn env_string(key: &str, default: impl FnOnce() -> String) -> String {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default(),
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: '{v}'")),
        _ => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from the process environment and validates it.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api_id: env_parsed("API_ID", 0)?,
            api_hash: env_string("API_HASH", String::new),
            bot_token: env_string("BOT_TOKEN", String::new),
            database_path: env_string("DATABASE_PATH", default_database_path),
            sessions_dir: env_string("SESSIONS_DIR", default_sessions_dir),
            notify_chat_id: match env::var("NOTIFY_CHAT_ID") {
                Ok(v) if !v.trim().is_empty() => Some(
                    v.trim()
                        .parse::<i64>()
                        .with_context(|| format!("Invalid value for NOTIFY_CHAT_ID: '{v}'"))?,
                ),
                _ => None,
            },
            monitor_interval_seconds: env_parsed(
                "MONITOR_INTERVAL_SECONDS",
                default_monitor_interval(),
            )?,
            standby_refresh_seconds: env_parsed(
                "STANDBY_REFRESH_SECONDS",
                default_standby_refresh(),
            )?,
            recovery_max_retry: env_parsed("RECOVERY_MAX_RETRY", default_recovery_max_retry())?,
            panel_password: env_string("PANEL_PASSWORD", String::new),
            panel_session_ttl_seconds: env_parsed(
                "PANEL_SESSION_TTL_SECONDS",
                default_panel_session_ttl(),
            )?,
            panel_host: env_string("PANEL_HOST", default_panel_host),
            panel_port: env_parsed("PANEL_PORT", default_panel_port())?,
            log_level: env_string("LOG_LEVEL", default_log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.panel_password.trim().is_empty() {
            return Err(anyhow!("PANEL_PASSWORD is not configured, refusing to start"));
        }
        if self.panel_session_ttl_seconds == 0 {
            return Err(anyhow!("PANEL_SESSION_TTL_SECONDS must be greater than 0"));
        }
        if self.panel_port == 0 {
            return Err(anyhow!("PANEL_PORT cannot be 0"));
        }
        if self.panel_host.trim().is_empty() {
            return Err(anyhow!("PANEL_HOST cannot be empty"));
        }
        if self.monitor_interval_seconds == 0 {
            return Err(anyhow!("MONITOR_INTERVAL_SECONDS cannot be 0"));
        }
        if self.standby_refresh_seconds == 0 {
            return Err(anyhow!("STANDBY_REFRESH_SECONDS cannot be 0"));
        }
        if self.recovery_max_retry == 0 {
            return Err(anyhow!("RECOVERY_MAX_RETRY cannot be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_panel_password_is_rejected() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn populated_config_validates() {
        let config = Config {
            panel_password: "secret".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
