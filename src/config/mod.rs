use crate::sync::channel::ReconnectPolicy;
use crate::sync::poller::PollerConfig;
use crate::sync::SyncConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Week submitted when triggering a run without an explicit --week.
    #[serde(default)]
    pub default_week: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8900".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_week: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_not_found_tolerance")]
    pub not_found_tolerance: u32,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_not_found_tolerance() -> u32 {
    3
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay() -> u64 {
    3
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            not_found_tolerance: default_not_found_tolerance(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                delay: Duration::from_secs(self.reconnect_delay_secs),
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            },
            poller: PollerConfig {
                interval: Duration::from_secs(self.poll_interval_secs),
                not_found_tolerance: self.not_found_tolerance,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    250
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "steward")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load the config file, falling back to defaults when it does not exist.
/// Every field has a sane local default, so a missing file is not an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8900");
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.sync.reconnect_attempts, 5);
        assert_eq!(config.ui.tick_ms, 250);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            poll_interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.poll_interval_secs, 10);
        assert_eq!(config.sync.not_found_tolerance, 3);
    }

    #[test]
    fn load_reads_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            base_url = "http://pipeline.internal:9000"
            default_week = "2026-W30"
            "#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.server.base_url, "http://pipeline.internal:9000");
        assert_eq!(config.server.default_week.as_deref(), Some("2026-W30"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8900");
    }

    #[test]
    fn settings_convert_to_sync_config() {
        let settings = SyncSettings::default();
        let sync = settings.to_sync_config();
        assert_eq!(sync.poller.interval, Duration::from_secs(5));
        assert_eq!(sync.reconnect.max_attempts, 5);
        assert_eq!(sync.reconnect.delay, Duration::from_secs(3));
    }
}
