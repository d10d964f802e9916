//! Configuration module for Resumable Uploadr
//!
//! YAML configuration for the upload client. Values may reference
//! environment variables, and everything is validated on load.

use crate::upload::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Substitute `${NAME}` and `${NAME:-fallback}` placeholders from the environment.
///
/// An unset variable without a fallback is left as written.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'json', 'pretty', or 'compact'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Upload client configuration
///
/// Field names also accept their camelCase spellings (`serverUrl`,
/// `chunkSize`, `apiKey`).
///
/// # Example
///
/// ```yaml
/// client:
///   id: "ResumableUpload"
///   server_url: "http://localhost:1352"
///   chunk_size: 1048576
///   api_key: "${RESUMABLE_UPLOAD_API_KEY}"
///   timeout_seconds: 30
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identifier the uploader registers under. Default: "ResumableUpload"
    #[serde(default = "default_uploader_id")]
    pub id: String,

    /// Base URL of the upload server. Default: "http://localhost:1352"
    #[serde(default = "default_server_url", alias = "serverUrl")]
    pub server_url: String,

    /// Chunk size in bytes. Default: 1 MiB
    #[serde(default = "default_chunk_size", alias = "chunkSize")]
    pub chunk_size: u64,

    /// API key. Falls back to RESUMABLE_UPLOAD_API_KEY when unset
    #[serde(default, alias = "apiKey", skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout. Default: none
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: default_uploader_id(),
            server_url: default_server_url(),
            chunk_size: default_chunk_size(),
            api_key: None,
            timeout_seconds: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Uploader id cannot be empty".into(),
            ));
        }

        if !is_valid_http_url(&self.server_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid server URL '{}': must start with http:// or https://",
                self.server_url
            )));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "Chunk size must be greater than zero".into(),
            ));
        }

        if self.timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "Timeout must be greater than zero when set".into(),
            ));
        }

        Ok(())
    }
}

fn default_uploader_id() -> String {
    "ResumableUpload".to_string()
}

fn default_server_url() -> String {
    "http://localhost:1352".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// Log output configuration
///
/// `RUST_LOG`, when set, overrides `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json", "pretty" or "compact". Default: "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Metrics configuration
///
/// `enabled: false` stops all recording, not just `--print-metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.id, "ResumableUpload");
        assert_eq!(config.server_url, "http://localhost:1352");
        assert_eq!(config.chunk_size, 1048576);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_chunk_size() {
        let config = Config {
            client: ClientConfig {
                chunk_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = Config::default();
        config.client.server_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camel_case_aliases() {
        let yaml = r#"
client:
  serverUrl: "https://uploads.example.com"
  chunkSize: 2048
  apiKey: "abc"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.server_url, "https://uploads.example.com");
        assert_eq!(config.client.chunk_size, 2048);
        assert_eq!(config.client.api_key.as_deref(), Some("abc"));
        assert_eq!(config.client.id, "ResumableUpload");
    }

    #[test]
    fn test_expand_env_vars_default() {
        let result = expand_env_vars("${RESUMABLE_TEST_SURELY_UNSET:-fallback}");
        assert_eq!(result, "fallback");

        let result = expand_env_vars("${RESUMABLE_TEST_SURELY_UNSET}");
        assert_eq!(result, "${RESUMABLE_TEST_SURELY_UNSET}");
    }
}
