//! Configuration file loading.

use crate::config::{validate_config, Config};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a YAML file.
///
/// Reads the file, parses the YAML, and validates the result. Every section
/// is optional; an empty file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    // serde_yaml reads an empty document as unit, not as an empty map
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents)?
    };

    validate_config(&config).map_err(ConfigError::ValidationError)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, MergePolicy};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
global:
  log_level: debug
  log_format: pretty

producer:
  api_url: "http://monitor.internal:3001"
  channel_url: "ws://monitor.internal:3001"
  fetch_timeout: 3s

reconnect:
  initial_delay: 500ms
  max_delay: 10s
  max_attempts: 5

merge_policy: monotonic

server:
  address: "0.0.0.0:9100"
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.global.log_format, LogFormat::Pretty);
        assert_eq!(config.producer.api_url, "http://monitor.internal:3001");
        assert_eq!(config.producer.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert_eq!(config.merge_policy, MergePolicy::Monotonic);
        assert_eq!(config.server.address.port(), 9100);
        assert_eq!(config.server.metrics_path, "/metrics");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.producer.channel_url, "ws://localhost:3001");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.yaml");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::ReadError(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not: valid: yaml: {{{}}}").unwrap();

        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_runs_on_load() {
        let result = parse_config("producer:\n  fetch_timeout: 0s\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_infinite_multiplier_rejected() {
        let result = parse_config("reconnect:\n  multiplier: .inf\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
