//! Configuration management for Quotagate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{QuotaGateError, Result};

/// Prefix for environment overrides, e.g. `QUOTAGATE__SERVER__HTTP_ADDR`.
const ENV_PREFIX: &str = "QUOTAGATE";

/// Main configuration for the Quotagate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Cross-origin headers attached to every response
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            cors: CorsConfig::default(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// CORS header values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,

    #[serde(default = "default_allow_headers")]
    pub allow_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: default_allow_origin(),
            allow_headers: default_allow_headers(),
        }
    }
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_headers() -> String {
    "authorization, x-client-info, apikey, content-type".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML policy table; the built-in table is used when unset
    pub policies_path: Option<String>,

    /// Interval between sweeps of expired entries, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            policies_path: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

impl RateLimitingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl AppConfig {
    /// Load configuration from an optional file, then apply environment overrides.
    ///
    /// Nested keys are separated by a double underscore:
    /// `QUOTAGATE__RATE_LIMITING__SWEEP_INTERVAL_SECS=60`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuotaGateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would leave the service unable to run.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(QuotaGateError::Config(
                "rate_limiting.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.server.cors.allow_origin, "*");
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(300));
        assert!(config.rate_limiting.policies_path.is_none());
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
rate_limiting:
  sweep_interval_secs: 30
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_limiting.sweep_interval_secs, 30);
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = AppConfig::default();
        config.rate_limiting.sweep_interval_secs = 0;
        assert_err!(config.validate());
    }

    #[test]
    fn test_load_without_file() {
        let config = assert_ok!(AppConfig::load(None));
        assert!(config.rate_limiting.sweep_interval_secs > 0);
    }
}
