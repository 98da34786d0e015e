use crate::presence::ProcessPresence;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streamctl_rpc::{AlwaysPresent, DEFAULT_PORT, Presence, endpoint_url};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Host the streaming application listens on
    #[serde(default = "default_host")]
    pub host: String,

    /// Remote-control port of the streaming application
    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay between reconnection attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Process name probed before connecting; unset means always present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            retry_delay_ms: default_retry_delay_ms(),
            process_name: None,
        }
    }
}

impl Config {
    /// Load config from file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, &path.display().to_string());
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the standard user location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        match super::config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the session cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        if self.retry_delay_ms == 0 {
            return Err(Error::Config("retryDelayMs must be positive".to_string()));
        }
        if self
            .process_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(Error::Config("processName must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        endpoint_url(&self.host, self.port)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Presence predicate matching this configuration.
    #[must_use]
    pub fn presence(&self) -> Arc<dyn Presence> {
        match &self.process_name {
            Some(name) => Arc::new(ProcessPresence::new(name.clone())),
            None => Arc::new(AlwaysPresent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9002);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.endpoint(), "ws://localhost:9002/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"port": 9100, "processName": "streamer"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.process_name.as_deref(), Some("streamer"));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ port: ").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9500,
            retry_delay_ms: 250,
            process_name: None,
        };

        config.save(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"retryDelayMs\": 250"));
        assert!(!content.contains("processName"));
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("port")));

        let config = Config {
            host: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("host")));

        let config = Config {
            retry_delay_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            process_name: Some(String::new()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presence_defaults_to_always_present() {
        assert!(Config::default().presence().is_running());
    }
}
