//! Configuration loader with file and environment variable support.

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths, checked in order.
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "bf.toml",
    "./config/config.toml",
    "/etc/bf/config.toml",
];

/// Configuration loader.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader pinned to a specific config file path.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("BF_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // Gateway
        if let Ok(val) = env::var("BF_GATEWAY_API_URL") {
            config.gateway.api_url = val;
        }
        if let Ok(val) = env::var("BF_GATEWAY_TIMEOUT_SECONDS") {
            if let Ok(secs) = val.parse() {
                config.gateway.timeout_seconds = secs;
            }
        }
        if let Ok(val) = env::var("BF_GATEWAY_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                config.gateway.max_retries = retries;
            }
        }

        // Ingress
        if let Ok(val) = env::var("BF_INGRESS_HOST") {
            config.ingress.host = val;
        }
        if let Ok(val) = env::var("BF_INGRESS_PORT") {
            if let Ok(port) = val.parse() {
                config.ingress.port = port;
            }
        }
        if let Ok(val) = env::var("BF_INGRESS_CALLBACK_PATH") {
            config.ingress.callback_path = val;
        }

        // Paths
        if let Ok(val) = env::var("BF_PLUGINS_DIR") {
            config.paths.plugins_dir = val;
        }
        if let Ok(val) = env::var("BF_WORKER_BINARY_PATH") {
            config.paths.worker_binary_path = val;
        }
        if let Ok(val) = env::var("BF_HISTORY_DB_FILE") {
            config.paths.history_db_file = val;
        }

        // Handler caps
        if let Ok(val) = env::var("BF_MAX_CPU_TIME_SECONDS") {
            if let Ok(v) = val.parse() {
                config.handler_caps.max_cpu_time_seconds = v;
            }
        }
        if let Ok(val) = env::var("BF_MAX_WALL_TIME_SECONDS") {
            if let Ok(v) = val.parse() {
                config.handler_caps.max_wall_time_seconds = v;
            }
        }
        if let Ok(val) = env::var("BF_MEMORY_LIMIT_MB") {
            if let Ok(v) = val.parse() {
                config.handler_caps.memory_limit_mb = v;
            }
        }
        if let Ok(val) = env::var("BF_MONITOR_INTERVAL_SECONDS") {
            if let Ok(v) = val.parse() {
                config.handler_caps.monitor_interval_seconds = v;
            }
        }

        // Admin notification
        if let Ok(val) = env::var("BF_ADMIN_NOTIFICATION_ENABLED") {
            config.admin_notification.enabled = val.parse().unwrap_or(false);
        }
        if let Ok(val) = env::var("BF_ADMIN_ID") {
            if let Ok(v) = val.parse() {
                config.admin_notification.admin_id = v;
            }
        }
        if let Ok(val) = env::var("BF_ADMIN_NOTIFY_LEVEL") {
            config.admin_notification.notify_level = val;
        }
        if let Ok(val) = env::var("BF_ADMIN_RATE_LIMIT_SECONDS") {
            if let Ok(v) = val.parse() {
                config.admin_notification.rate_limit_seconds = v;
            }
        }

        // Logging
        if let Ok(val) = env::var("LOG_FORMAT") {
            config.logging.format = val;
        }
        if let Ok(val) = env::var("RUST_LOG") {
            config.logging.level = val;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::with_path("/nonexistent/path/config.toml");
        let config = loader.load().unwrap();
        assert_eq!(config.gateway.max_retries, 3);
    }

    #[test]
    fn explicit_path_is_loaded_when_present() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[gateway]\nmax_retries = 7\n").unwrap();
        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load().unwrap();
        assert_eq!(config.gateway.max_retries, 7);
    }

    #[test]
    fn env_override_wins_over_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[gateway]\nmax_retries = 7\n").unwrap();
        env::set_var("BF_GATEWAY_MAX_RETRIES", "9");
        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load().unwrap();
        assert_eq!(config.gateway.max_retries, 9);
        env::remove_var("BF_GATEWAY_MAX_RETRIES");
    }
}
