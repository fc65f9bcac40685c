//! Server configuration.

use anyhow::Result;
use rollcall_core::HostProfile;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Saved chat page (HTML or JSON tree) to watch. Without it, snapshots
    /// arrive through `PUT /api/document`.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_auto_export_interval")]
    pub auto_export_interval_hours: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub profile: HostProfile,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rollcall")
}

fn default_db_path() -> PathBuf {
    data_dir().join("rollcall.db")
}

fn default_poll_interval() -> u64 {
    3
}

fn default_export_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| data_dir().join("exports"))
}

fn default_auto_export_interval() -> u64 {
    24
}

fn default_event_capacity() -> usize {
    rollcall_core::DEFAULT_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            snapshot_path: None,
            poll_interval_secs: default_poll_interval(),
            export_dir: default_export_dir(),
            auto_export_interval_hours: default_auto_export_interval(),
            event_capacity: default_event_capacity(),
            profile: HostProfile::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn auto_export_interval(&self) -> Duration {
        Duration::from_secs(self.auto_export_interval_hours.max(1) * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.auto_export_interval(), Duration::from_secs(24 * 3600));
        assert_eq!(config.event_capacity, 1000);
        assert!(config.snapshot_path.is_none());
        assert_eq!(config.profile, HostProfile::default());
    }

    #[test]
    fn test_profile_override() {
        let config: Config = toml::from_str(
            r##"
            port = 9000
            snapshot_path = "/tmp/chat.html"

            [profile]
            panel_selectors = ["#chat"]
            title_pattern = '(.+?) \| Messenger'

            [[profile.sender_rules]]
            selector = "[data-author]"
            attribute = "data-author"
            "##,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/chat.html")));
        assert_eq!(config.profile.panel_selectors[0].as_str(), "#chat");
        assert_eq!(config.profile.sender_rules.len(), 1);
        assert_eq!(config.profile.sender_rules[0].attribute, "data-author");
        assert_eq!(config.profile.text_selectors, HostProfile::default().text_selectors);
    }

    #[test]
    fn test_invalid_selector_fails_load() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[profile]\nspan_selector = \"span::before\"");
        assert!(result.is_err());
    }
}
