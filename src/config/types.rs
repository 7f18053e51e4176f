//! Configuration data types.

use crate::metrics::DEFAULT_BUCKETS;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// URLs to probe
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,

    /// Metrics endpoint configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics: MetricsConfig::default(),
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

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// TCP connect timeout, per resolved address
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// DNS resolution timeout
    #[serde(default = "default_dns_timeout", with = "humantime_serde")]
    pub dns_timeout: Duration,

    /// TLS handshake timeout
    #[serde(default = "default_tls_handshake_timeout", with = "humantime_serde")]
    pub tls_handshake_timeout: Duration,

    /// Histogram buckets in seconds, shared by all client histograms
    #[serde(default)]
    pub buckets: Option<Vec<f64>>,
}

impl ClientConfig {
    /// Timeouts for the base transport.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            dns_timeout: self.dns_timeout,
            tls_handshake_timeout: self.tls_handshake_timeout,
        }
    }

    /// Configured buckets, or [`DEFAULT_BUCKETS`].
    pub fn buckets(&self) -> &[f64] {
        self.buckets.as_deref().unwrap_or(DEFAULT_BUCKETS)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            dns_timeout: default_dns_timeout(),
            tls_handshake_timeout: default_tls_handshake_timeout(),
            buckets: None,
        }
    }
}

/// A URL probed periodically.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Unique name for this target
    pub name: String,

    /// Absolute http or https URL
    pub url: String,

    /// Request method
    #[serde(default = "default_method")]
    pub method: String,

    /// How often to probe
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dns_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_tls_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(15)
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
        assert_eq!(config.global.metrics.path, "/metrics");
        assert_eq!(config.client.buckets(), DEFAULT_BUCKETS);
        assert_eq!(config.client.transport_config(), TransportConfig::default());
    }

    #[test]
    fn test_target_defaults() {
        let target: TargetConfig = serde_yaml::from_str(
            r#"
name: api
url: "https://example.com/health"
"#,
        )
        .unwrap();
        assert_eq!(target.method, "GET");
        assert_eq!(target.interval, Duration::from_secs(15));
    }

    #[test]
    fn test_client_durations_and_buckets() {
        let client: ClientConfig = serde_yaml::from_str(
            r#"
connect_timeout: 2s
tls_handshake_timeout: 1500ms
buckets: [0.01, 0.1, 1]
"#,
        )
        .unwrap();
        assert_eq!(client.connect_timeout, Duration::from_secs(2));
        assert_eq!(client.dns_timeout, Duration::from_secs(5));
        assert_eq!(client.tls_handshake_timeout, Duration::from_millis(1500));
        assert_eq!(client.buckets(), &[0.01, 0.1, 1.0]);
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_yaml::from_str("pretty").unwrap();
        assert_eq!(format, LogFormat::Pretty);
    }
}
