//! Load — config loading from file and environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use super::error::ConfigError;
use super::model::ShipperConfig;
use crate::metrics::route::HEALTH_PATH;

/// Environment variable naming the TOML config file.
pub const CONFIG_FILE_ENV: &str = "SHIPPER_CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/shipper/config.toml";

/// Longest accepted flush interval, one day.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

impl ShipperConfig {
    /// Load configuration from file and environment variables.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var(CONFIG_FILE_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using defaults and environment variables", config_path);
            Self::default()
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Override settings from environment variables.
    ///
    /// `lookup` resolves a variable name to its value; the process
    /// environment in production, a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LOG_PATH") {
            self.settings.log_path = path;
        }
        if let Some(value) = lookup("FLUSH_INTERVAL") {
            self.settings.interval = parse_env("FLUSH_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("SEEK_FROM_END") {
            self.settings.seek_from_end = parse_bool("SEEK_FROM_END", &value)?;
        }

        if let Some(host) = lookup("CLICKHOUSE_HOST") {
            self.clickhouse.host = host;
        }
        if let Some(value) = lookup("CLICKHOUSE_PORT") {
            self.clickhouse.port = parse_env("CLICKHOUSE_PORT", &value)?;
        }
        if let Some(db) = lookup("CLICKHOUSE_DB") {
            self.clickhouse.db = db;
        }
        if let Some(table) = lookup("CLICKHOUSE_TABLE") {
            self.clickhouse.table = table;
        }
        if let Some(user) = lookup("CLICKHOUSE_USER") {
            self.clickhouse.user = user;
        }
        if let Some(password) = lookup("CLICKHOUSE_PASSWORD") {
            self.clickhouse.password = password;
        }

        if let Some(log_type) = lookup("NGINX_LOG_TYPE") {
            self.nginx.log_type = log_type;
        }
        if let Some(log_format) = lookup("NGINX_LOG_FORMAT") {
            self.nginx.log_format = log_format;
        }

        if let Some(bind) = lookup("METRICS_BIND_ADDRESS") {
            self.metrics.bind_address = bind;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.interval == 0 {
            return Err(invalid("settings.interval must be > 0"));
        }
        if self.settings.interval > MAX_INTERVAL_SECS {
            return Err(invalid(&format!(
                "settings.interval must be at most {} seconds",
                MAX_INTERVAL_SECS
            )));
        }
        if self.settings.log_path.trim().is_empty() {
            return Err(invalid("settings.log_path must not be empty"));
        }
        if self.settings.poll_interval_ms == 0 {
            return Err(invalid("settings.poll_interval_ms must be > 0"));
        }
        if self.clickhouse.host.is_empty() {
            return Err(invalid("clickhouse.host must not be empty"));
        }
        if self.clickhouse.port == 0 {
            return Err(invalid("clickhouse.port must be > 0"));
        }
        if self.clickhouse.db.is_empty() || self.clickhouse.table.is_empty() {
            return Err(invalid("clickhouse.db and clickhouse.table must not be empty"));
        }
        if self.clickhouse.timeout_secs == 0 {
            return Err(invalid("clickhouse.timeout_secs must be > 0"));
        }
        if self.clickhouse.columns.is_empty() {
            return Err(invalid("clickhouse.columns must map at least one column"));
        }
        if self.nginx.log_format.trim().is_empty() {
            return Err(invalid("nginx.log_format must not be empty"));
        }
        if self.metrics.enabled {
            self.metrics
                .bind_address
                .parse::<SocketAddr>()
                .map_err(|e| invalid(&format!("metrics.bind_address {:?}: {}", self.metrics.bind_address, e)))?;
            check_metrics_path(&self.metrics.path)?;
        }
        Ok(())
    }
}

/// Reject paths the exporter router cannot register.
fn check_metrics_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(invalid("metrics.path must start with '/'"));
    }
    if path == HEALTH_PATH {
        return Err(invalid(&format!("metrics.path must not be {}", HEALTH_PATH)));
    }
    // Captures and wildcards would turn the path into a pattern.
    if path.contains(['{', '}', '*']) || path.split('/').any(|segment| segment.starts_with(':')) {
        return Err(invalid(&format!("metrics.path {:?} must be a literal path", path)));
    }
    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
