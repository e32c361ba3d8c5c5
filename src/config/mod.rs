//! Configuration management for Courier Core

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Delivery behaviour
    pub delivery: DeliveryConfig,
    /// Base64-encoded AES-256 key for sensitive connection fields
    pub encryption_key: Option<String>,
    /// JSON file backing the connection store
    pub connections_file: PathBuf,
    /// Mailgun API endpoints
    pub mailgun: MailgunConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Outbound provider HTTP timeout in seconds
    pub http_timeout_secs: u64,
    /// Call `authenticate` once per connection before its first send in a pass
    pub authenticate_before_send: bool,
    /// From-name used when neither the request nor the connection supplies one
    pub default_from_name: String,
}

impl DeliveryConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            authenticate_before_send: false,
            default_from_name: "WordPress".to_string(),
        }
    }
}

/// Mailgun endpoint bases, without the API version segment
#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_base_us: String,
    pub api_base_eu: String,
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_base_us: "https://api.mailgun.net".to_string(),
            api_base_eu: "https://api.eu.mailgun.net".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "pretty" or "json"
    pub log_format: String,
    pub service_name: String,
    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            service_name: "courier-core".to_string(),
            metrics_enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DeliveryConfig::default();

        Ok(Self {
            delivery: DeliveryConfig {
                http_timeout_secs: lookup("COURIER_HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|| "30".to_string())
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .context("Invalid COURIER_HTTP_TIMEOUT_SECS: expected a positive number of seconds")?,
                authenticate_before_send: lookup("COURIER_AUTHENTICATE_BEFORE_SEND")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                default_from_name: lookup("COURIER_DEFAULT_FROM_NAME")
                    .unwrap_or(defaults.default_from_name),
            },
            encryption_key: lookup("SETTINGS_ENCRYPTION_KEY").filter(|k| !k.trim().is_empty()),
            connections_file: lookup("COURIER_CONNECTIONS_FILE")
                .unwrap_or_else(|| "connections.json".to_string())
                .into(),
            mailgun: {
                let defaults = MailgunConfig::default();
                MailgunConfig {
                    api_base_us: lookup("MAILGUN_API_BASE_US").unwrap_or(defaults.api_base_us),
                    api_base_eu: lookup("MAILGUN_API_BASE_EU").unwrap_or(defaults.api_base_eu),
                }
            },
            telemetry: TelemetryConfig {
                log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
                service_name: lookup("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|| "courier-core".to_string()),
                metrics_enabled: lookup("METRICS_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.delivery.http_timeout_secs, 30);
        assert!(!config.delivery.authenticate_before_send);
        assert_eq!(config.delivery.default_from_name, "WordPress");
        assert!(config.encryption_key.is_none());
        assert_eq!(config.connections_file, PathBuf::from("connections.json"));
        assert_eq!(config.mailgun.api_base_us, "https://api.mailgun.net");
        assert_eq!(config.mailgun.api_base_eu, "https://api.eu.mailgun.net");
        assert_eq!(config.telemetry.log_format, "pretty");
        assert!(!config.telemetry.metrics_enabled);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("COURIER_HTTP_TIMEOUT_SECS", "5"),
            ("COURIER_AUTHENTICATE_BEFORE_SEND", "TRUE"),
            ("MAILGUN_API_BASE_US", "http://127.0.0.1:9000"),
            ("SETTINGS_ENCRYPTION_KEY", "a2V5"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.delivery.http_timeout(), Duration::from_secs(5));
        assert!(config.delivery.authenticate_before_send);
        assert_eq!(config.mailgun.api_base_us, "http://127.0.0.1:9000");
        assert_eq!(config.encryption_key.as_deref(), Some("a2V5"));
        assert_eq!(config.telemetry.log_format, "json");
    }

    #[test]
    fn test_config_blank_encryption_key_is_none() {
        let config =
            Config::from_lookup(lookup_from(&[("SETTINGS_ENCRYPTION_KEY", "  ")])).unwrap();
        assert!(config.encryption_key.is_none());
    }

    #[test]
    fn test_config_invalid_timeout() {
        let result = Config::from_lookup(lookup_from(&[("COURIER_HTTP_TIMEOUT_SECS", "soon")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_zero_timeout_rejected() {
        let err = Config::from_lookup(lookup_from(&[("COURIER_HTTP_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("COURIER_HTTP_TIMEOUT_SECS"));
    }
}
