//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Where the health producer lives
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Reconnect backoff for the update channel
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// How incremental updates are merged into existing state
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// HTTP server exposing state to the rendering layer
    #[serde(default)]
    pub server: ServerConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Producer endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    /// Base URL of the snapshot API (`GET {api_url}/api/services`)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// URL of the live update channel
    #[serde(default = "default_channel_url")]
    pub channel_url: String,

    /// Upper bound on a snapshot fetch
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Upper bound on opening the update channel
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            channel_url: default_channel_url(),
            fetch_timeout: default_fetch_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Ceiling for the delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor applied after each failed attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Give up after this many consecutive failed attempts (unbounded if unset)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

/// Merge policy for incremental updates.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Last event to arrive wins, whatever its timestamp.
    #[default]
    ArrivalOrder,
    /// Skip updates whose `lastUpdated` is older than the stored one.
    Monotonic,
}

/// Exposure server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Whether the server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind
    #[serde(default = "default_server_address")]
    pub address: SocketAddr,

    /// Path for the Prometheus endpoint
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_server_address(),
            metrics_path: default_metrics_path(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_channel_url() -> String {
    "ws://localhost:3001".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_server_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.producer.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.merge_policy, MergePolicy::ArrivalOrder);
        assert!(config.reconnect.max_attempts.is_none());
    }

    #[test]
    fn test_merge_policy_serde() {
        let policy: MergePolicy = serde_yaml::from_str("arrival_order").unwrap();
        assert_eq!(policy, MergePolicy::ArrivalOrder);

        let policy: MergePolicy = serde_yaml::from_str("monotonic").unwrap();
        assert_eq!(policy, MergePolicy::Monotonic);
    }

    #[test]
    fn test_humantime_durations() {
        let reconnect: ReconnectConfig =
            serde_yaml::from_str("initial_delay: 250ms\nmax_delay: 1m\n").unwrap();
        assert_eq!(reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(reconnect.max_delay, Duration::from_secs(60));
        assert_eq!(reconnect.multiplier, 2.0);
    }
}
