//! Configuration management for DataChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{DatachatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for DataChat
///
/// Holds everything the client needs: where the backend lives, how to
/// authenticate, and how the interactive chat behaves.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Interactive chat configuration
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the backend (e.g. `http://localhost:8000/`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Project scope sent with chat and session-list requests
    #[serde(default)]
    pub project_id: Option<u64>,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Watchdog interval in seconds after which a silent turn is flagged
    /// as stalled (the turn is never auto-aborted)
    #[serde(default = "default_stall")]
    pub stall_secs: u64,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_base_url() -> String {
    "http://localhost:8000/".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_stall() -> u64 {
    30
}

fn default_token_env() -> String {
    "DATACHAT_TOKEN".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: None,
            connect_timeout_secs: default_connect_timeout(),
            stall_secs: default_stall(),
            token_env: default_token_env(),
        }
    }
}

/// Interactive chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Render reasoning deltas as they stream in
    #[serde(default = "default_show_thinking")]
    pub show_thinking: bool,
}

fn default_show_thinking() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            show_thinking: default_show_thinking(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with env and CLI overrides
    ///
    /// Missing files are not an error; defaults are used so the binary
    /// works out of the box against a local backend.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DatachatError::Config(format!("failed to read {}: {}", path, e)))?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("DATACHAT_BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Ok(project) = std::env::var("DATACHAT_PROJECT_ID") {
            if let Ok(id) = project.parse::<u64>() {
                self.server.project_id = Some(id);
            }
        }
    }

    /// Apply CLI overrides
    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.server {
            self.server.base_url = base_url.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `DatachatError::Config` for an unparseable base URL or
    /// zero timeouts.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.server.base_url)
            .map_err(|e| DatachatError::Config(format!("invalid base_url: {}", e)))?;

        if self.server.connect_timeout_secs == 0 {
            return Err(
                DatachatError::Config("connect_timeout_secs must be positive".to_string()).into(),
            );
        }
        if self.server.stall_secs == 0 {
            return Err(DatachatError::Config("stall_secs must be positive".to_string()).into());
        }

        Ok(())
    }

    /// The parsed base URL
    ///
    /// Call [`validate`](Self::validate) first; this re-parses and
    /// propagates the same error otherwise.
    pub fn base_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.server.base_url)
            .map_err(|e| DatachatError::Config(format!("invalid base_url: {}", e)).into())
    }

    /// The bearer token from the configured environment variable, if set
    pub fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.server.token_env).ok().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.base_url, "http://localhost:8000/");
        assert_eq!(config.server.stall_secs, 30);
        assert!(config.chat.show_thinking);
    }

    #[test]
    fn test_parse_yaml_with_partial_fields() {
        let yaml = r#"
server:
  base_url: "https://analytics.example.com/"
  project_id: 7
"#;
        let config: Config = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.server.base_url, "https://analytics.example.com/");
        assert_eq!(config.server.project_id, Some(7));
        // Unspecified fields fall back to defaults.
        assert_eq!(config.server.connect_timeout_secs, 10);
        assert_eq!(config.server.token_env, "DATACHAT_TOKEN");
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.server.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_stall() {
        let mut config = Config::default();
        config.server.stall_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_parses() {
        let config = Config::default();
        let url = config.base_url().expect("url");
        assert_eq!(url.scheme(), "http");
    }
}
