//! psyportal configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PortalError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub push: PushConfig,
}

impl PortalConfig {
    /// Load config from the default path (~/.psyportal/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PortalError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PortalError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PortalError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Environment overrides, applied after the file is read.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PSYPORTAL_API_URL")
            && !url.trim().is_empty()
        {
            self.api.base_url = url.trim().trim_end_matches('/').to_string();
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the psyportal home directory, where all local state lives.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".psyportal")
    }
}

/// Clinic backend connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String { "http://127.0.0.1:8001".into() }
fn default_timeout_secs() -> u64 { 15 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Poll channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_interval_secs() -> u64 { 60 }
fn default_heartbeat_secs() -> u64 { 60 }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

/// Where local notifications are shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// `log` or `webhook`.
    #[serde(default = "default_sink")]
    pub sink: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_headers: Vec<(String, String)>,
}

fn default_sink() -> String { "log".into() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            webhook_url: String::new(),
            webhook_headers: Vec::new(),
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    /// Delivery token issued to this device by the cloud messaging provider.
    /// Empty means no token can be acquired and the poll channel stays authoritative.
    #[serde(default)]
    pub device_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortalConfig::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8001");
        assert_eq!(config.poll.interval_secs, 60);
        assert_eq!(config.poll.heartbeat_secs, 60);
        assert_eq!(config.notify.sink, "log");
        assert!(config.push.device_token.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [api]
            base_url = "https://clinic.example.org"

            [poll]
            interval_secs = 30

            [notify]
            sink = "webhook"
            webhook_url = "http://localhost:9000/hook"
        "#;

        let config: PortalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.base_url, "https://clinic.example.org");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.poll.heartbeat_secs, 60);
        assert_eq!(config.notify.sink, "webhook");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: PortalConfig = toml::from_str("").unwrap();
        assert_eq!(config.poll.interval_secs, 60);
        assert_eq!(config.notify.sink, "log");
    }

    #[test]
    fn test_load_from_bad_file() {
        let dir = std::env::temp_dir().join("psyportal-test-config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[poll\ninterval_secs = ").unwrap();
        let err = PortalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, PortalError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_to_then_load_from() {
        let dir = std::env::temp_dir().join("psyportal-test-config-save");
        let path = dir.join("nested").join("config.toml");
        let mut config = PortalConfig::default();
        config.poll.interval_secs = 30;
        config.notify.sink = "webhook".into();
        config.notify.webhook_url = "http://localhost:9/hook".into();
        config.save_to(&path).unwrap();

        let loaded = PortalConfig::load_from(&path).unwrap();
        assert_eq!(loaded.poll.interval_secs, 30);
        assert_eq!(loaded.notify.webhook_url, "http://localhost:9/hook");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = PortalConfig::home_dir();
        assert!(home.to_string_lossy().contains("psyportal"));
        assert_eq!(PortalConfig::default_path(), home.join("config.toml"));
    }
}
