//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub ingress: IngressConfig,
    pub paths: PathsConfig,
    pub handler_caps: HandlerCapsConfig,
    pub admin_notification: AdminNotificationConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            ingress: IngressConfig::default(),
            paths: PathsConfig::default(),
            handler_caps: HandlerCapsConfig::default(),
            admin_notification: AdminNotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_url: String,
    pub status_path: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".to_string(),
            status_path: "get_status".to_string(),
            timeout_seconds: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub host: String,
    pub port: u16,
    pub callback_path: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            callback_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub plugins_dir: String,
    pub worker_binary_path: String,
    pub history_db_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugins_dir: "./plugins".to_string(),
            worker_binary_path: "./bf-worker".to_string(),
            history_db_file: "./data/history.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerCapsConfig {
    pub max_cpu_time_seconds: f64,
    pub max_wall_time_seconds: f64,
    pub memory_limit_mb: u64,
    pub monitor_interval_seconds: f64,
}

impl Default for HandlerCapsConfig {
    fn default() -> Self {
        Self {
            max_cpu_time_seconds: 3.0,
            max_wall_time_seconds: 30.0,
            memory_limit_mb: 100,
            monitor_interval_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminNotificationConfig {
    pub enabled: bool,
    pub admin_id: i64,
    pub notify_level: String,
    pub rate_limit_seconds: u64,
    pub message_format: String,
}

impl Default for AdminNotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_id: 999999999,
            notify_level: "WARNING".to_string(),
            rate_limit_seconds: 300,
            message_format: "[{level}] {message}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration via the standard search path, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Reject nonsensical values up front rather than at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_retries must be at least 1".to_string(),
            ));
        }
        if self.handler_caps.max_cpu_time_seconds <= 0.0 {
            return Err(ConfigError::ValidationError(
                "handler_caps.max_cpu_time_seconds must be positive".to_string(),
            ));
        }
        if self.handler_caps.max_wall_time_seconds <= 0.0 {
            return Err(ConfigError::ValidationError(
                "handler_caps.max_wall_time_seconds must be positive".to_string(),
            ));
        }
        if self.handler_caps.memory_limit_mb == 0 {
            return Err(ConfigError::ValidationError(
                "handler_caps.memory_limit_mb must be positive".to_string(),
            ));
        }
        if self.handler_caps.monitor_interval_seconds <= 0.0 {
            return Err(ConfigError::ValidationError(
                "handler_caps.monitor_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration.
    pub fn example_toml() -> String {
        r#"# Bot framework kernel configuration
# Environment variables override these settings

[gateway]
api_url = "http://127.0.0.1:3000"
status_path = "get_status"
timeout_seconds = 10
max_retries = 3

[ingress]
host = "0.0.0.0"
port = 8000
callback_path = "/"

[paths]
plugins_dir = "./plugins"
worker_binary_path = "./bf-worker"
history_db_file = "./data/history.db"

[handler_caps]
max_cpu_time_seconds = 3.0
max_wall_time_seconds = 30.0
memory_limit_mb = 100
monitor_interval_seconds = 0.1

[admin_notification]
enabled = false
admin_id = 999999999
notify_level = "WARNING"
rate_limit_seconds = 300
message_format = "[{level}] {message}"

[logging]
format = "text"
level = "info"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_retries_rejected() {
        let mut cfg = AppConfig::default();
        cfg.gateway.max_retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_toml_parses_back_to_defaults() {
        let parsed: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(parsed.gateway.max_retries, 3);
        assert_eq!(parsed.handler_caps.memory_limit_mb, 100);
    }
}
