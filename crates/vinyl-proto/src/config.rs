use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;
use super::protocol::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Where the recognition/display server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Cadence of each independent status source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    #[serde(default = "default_recognizer_interval")]
    pub recognizer_interval_secs: u64,
    #[serde(default = "default_device_interval")]
    pub device_interval_secs: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Older servers expose the device status as `/api/pixoo/state`.
    #[serde(default = "default_device_status_path")]
    pub device_status_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsConfig {
    /// Quiet period after the last slider/channel input before a command goes out.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_reboot_cooldown_ms")]
    pub reboot_cooldown_ms: u64,
    /// Rows shown per ranked stats list before the "More" toggle.
    #[serde(default = "default_stats_visible")]
    pub stats_visible: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_placeholder_cover")]
    pub placeholder_cover: String,
    #[serde(default = "default_lyrics_search_url")]
    pub lyrics_search_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval(),
            recognizer_interval_secs: default_recognizer_interval(),
            device_interval_secs: default_device_interval(),
            stats_interval_secs: default_stats_interval(),
            device_status_path: default_device_status_path(),
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            reboot_cooldown_ms: default_reboot_cooldown_ms(),
            stats_visible: default_stats_visible(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            placeholder_cover: default_placeholder_cover(),
            lyrics_search_url: default_lyrics_search_url(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_status_interval() -> u64 {
    15
}

fn default_recognizer_interval() -> u64 {
    15
}

fn default_device_interval() -> u64 {
    30
}

fn default_stats_interval() -> u64 {
    60
}

fn default_device_status_path() -> String {
    paths::DEVICE_STATUS.to_string()
}

fn default_settle_ms() -> u64 {
    150
}

fn default_reboot_cooldown_ms() -> u64 {
    3000
}

fn default_stats_visible() -> usize {
    5
}

fn default_placeholder_cover() -> String {
    "/logo.png".to_string()
}

fn default_lyrics_search_url() -> String {
    "https://genius.com/search".to_string()
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PollingConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn recognizer_interval(&self) -> Duration {
        Duration::from_secs(self.recognizer_interval_secs.max(1))
    }

    pub fn device_interval(&self) -> Duration {
        Duration::from_secs(self.device_interval_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}

impl ControlsConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reboot_cooldown(&self) -> Duration {
        Duration::from_millis(self.reboot_cooldown_ms)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, writing a default config there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.polling.status_interval(), Duration::from_secs(15));
        assert_eq!(config.polling.device_status_path, "/api/pixoo/status");
        assert_eq!(config.controls.settle(), Duration::from_millis(150));
        assert_eq!(config.controls.stats_visible, 5);
        assert_eq!(config.display.placeholder_cover, "/logo.png");
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            base_url = "http://pi.local:8080"

            [polling]
            device_status_path = "/api/pixoo/state"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.base_url, "http://pi.local:8080");
        assert_eq!(config.server.request_timeout_ms, 5000);
        assert_eq!(config.polling.device_status_path, "/api/pixoo/state");
        assert_eq!(config.polling.recognizer_interval_secs, 15);
        assert_eq!(config.controls.reboot_cooldown_ms, 3000);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let mut config = Config::default();
        config.polling.stats_interval_secs = 0;
        assert_eq!(config.polling.stats_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_creates_missing_file() {
        let path = std::env::temp_dir()
            .join(format!("vinyl-proto-config-{}", std::process::id()))
            .join("config.toml");
        let _ = std::fs::remove_file(&path);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.polling.device_interval_secs, 30);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.server.base_url, config.server.base_url);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
