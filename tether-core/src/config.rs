// ABOUTME: Configuration loaded from tether.toml with TETHER_* environment overrides.
// ABOUTME: Produces the channel address and connection settings for a session.

use crate::address::ChannelAddress;
use crate::connection::ConnectionConfig;
use crate::paths;
use crate::reconnect::BackoffConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// host[:port] of the agent backend
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub secure: bool,
    /// Page-style origin (https://...); when set, wins over host/secure
    #[serde(default)]
    pub origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            secure: false,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_base_delay_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Seconds between pings while connected; 0 disables
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: default_base_delay_ms(),
            reconnect_max_attempts: default_max_attempts(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown log format '{}', expected 'pretty' or 'json'", other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "localhost:8000".to_string()
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn parse_env<T: FromStr>(key: &str, val: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} must be a valid value, got '{}': {}", key, val, e))
}

fn parse_bool(key: &str, val: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean, got '{}'", key, val),
    }
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. TETHER_CONFIG_PATH env var (if set)
    /// 2. ./tether.toml
    /// 3. the platform config dir (~/.config/tether/tether.toml on Linux)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("TETHER_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("tether.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let user_config = paths::config_file();
        if user_config.exists() {
            return Some(user_config);
        }

        None
    }

    /// Load from the first config file found (or defaults), then apply
    /// environment overrides and validate
    pub fn load() -> Result<Self> {
        let config = Self::read(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path; a missing file is an error here
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Self::read(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    /// File (explicit or searched) plus environment overrides, not yet
    /// validated. For callers that layer more overrides on top.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::find_config_file() {
                Some(path) => Self::read_file(&path)?,
                None => {
                    tracing::info!(
                        "No config file found, using environment variables and defaults"
                    );
                    Config::default()
                }
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TETHER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("TETHER_SECURE") {
            self.server.secure = parse_bool("TETHER_SECURE", &val)?;
        }
        if let Ok(val) = std::env::var("TETHER_ORIGIN") {
            self.server.origin = Some(val).filter(|v| !v.trim().is_empty());
        }
        if let Ok(val) = std::env::var("TETHER_RECONNECT_BASE_MS") {
            self.channel.reconnect_base_ms = parse_env("TETHER_RECONNECT_BASE_MS", &val)?;
        }
        if let Ok(val) = std::env::var("TETHER_RECONNECT_MAX_ATTEMPTS") {
            self.channel.reconnect_max_attempts =
                parse_env("TETHER_RECONNECT_MAX_ATTEMPTS", &val)?;
        }
        if let Ok(val) = std::env::var("TETHER_HEARTBEAT_SECS") {
            self.channel.heartbeat_secs = parse_env("TETHER_HEARTBEAT_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("TETHER_LOG_FORMAT") {
            self.logging.format = val.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.origin.is_none() && self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty (or set server.origin)");
        }
        if self.server.host.contains("://") {
            anyhow::bail!(
                "server.host '{}' must not include a scheme; use server.secure or server.origin",
                self.server.host
            );
        }
        if self.channel.reconnect_max_attempts == 0 {
            anyhow::bail!("channel.reconnect_max_attempts must be at least 1");
        }
        if self.channel.reconnect_base_ms == 0 {
            anyhow::bail!("channel.reconnect_base_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(self.channel.reconnect_base_ms),
                max_attempts: self.channel.reconnect_max_attempts,
            },
            heartbeat_interval: (self.channel.heartbeat_secs > 0)
                .then(|| Duration::from_secs(self.channel.heartbeat_secs)),
        }
    }

    /// Channel address for a session, preferring the origin when configured
    pub fn address(&self, session_id: &str) -> Result<ChannelAddress> {
        let address = match &self.server.origin {
            Some(origin) => ChannelAddress::from_origin(origin, session_id),
            None => ChannelAddress::new(&self.server.host, self.server.secure, session_id),
        };
        address.context("Failed to build channel address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reconnect_policy() {
        let config = Config::default();
        let connection = config.connection_config();
        assert_eq!(connection.backoff, BackoffConfig::default());
        assert_eq!(connection.heartbeat_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
                [server]
                host = "agent.internal:9000"
                secure = true
            "#,
        )
        .unwrap();
        assert_eq!(config.channel, ChannelConfig::default());
        assert_eq!(
            config.address("s1").unwrap().url(),
            "wss://agent.internal:9000/ws/s1"
        );
    }

    #[test]
    fn test_origin_wins_over_host() {
        let config = Config {
            server: ServerConfig {
                host: "ignored:1".to_string(),
                secure: false,
                origin: Some("https://agent.example.com".to_string()),
            },
            ..Config::default()
        };
        assert_eq!(
            config.address("s1").unwrap().url(),
            "wss://agent.example.com/ws/s1"
        );
    }

    #[test]
    fn test_zero_heartbeat_disables_pings() {
        let mut config = Config::default();
        config.channel.heartbeat_secs = 0;
        assert_eq!(config.connection_config().heartbeat_interval, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.channel.reconnect_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.host = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.host = "ws://host".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
