//! Configuration types for the SOAP host.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration for the SOAP host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapHostConfig {
    /// Config version
    pub version: String,

    /// Servlet root path; must start with `/`
    pub servlet_path: String,

    /// Prefix used to build the published URL of endpoints that do not set
    /// one explicitly, e.g. `https://api.example.com/soap`
    pub published_endpoint_url_prefix: Option<String>,

    /// Client proxy defaults
    pub client: ClientDefaults,
}

impl Default for SoapHostConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            servlet_path: "/soap".to_string(),
            published_endpoint_url_prefix: None,
            client: ClientDefaults::default(),
        }
    }
}

impl SoapHostConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.servlet_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "servlet_path must start with '/': {}",
                self.servlet_path
            )));
        }
        if let Some(prefix) = &self.published_endpoint_url_prefix {
            if prefix.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "published_endpoint_url_prefix is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Timeouts applied to client proxies built with
/// [`ClientBuilder::with_defaults`](crate::ClientBuilder::with_defaults).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientDefaults {
    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Receive timeout (milliseconds)
    pub receive_timeout_ms: u64,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 500,
            receive_timeout_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SoapHostConfig::default();
        assert_eq!(config.servlet_path, "/soap");
        assert!(config.published_endpoint_url_prefix.is_none());
        assert_eq!(config.client.connect_timeout_ms, 500);
        assert_eq!(config.client.receive_timeout_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = SoapHostConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SoapHostConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
servlet_path: /services
published_endpoint_url_prefix: https://api.example.com/services
client:
  receive_timeout_ms: 5000
"#;
        let config = SoapHostConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.servlet_path, "/services");
        assert_eq!(
            config.published_endpoint_url_prefix.as_deref(),
            Some("https://api.example.com/services")
        );
        assert_eq!(config.client.connect_timeout_ms, 500);
        assert_eq!(config.client.receive_timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_servlet_path() {
        let err = SoapHostConfig::from_yaml_str("servlet_path: soap").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "servlet_path: /ws").unwrap();

        let config = SoapHostConfig::load(file.path()).unwrap();
        assert_eq!(config.servlet_path, "/ws");
        assert!(matches!(
            SoapHostConfig::load("/nonexistent/zentinel-soap.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
