//! Model — ShipperConfig and related structs.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// nginx `main` log format, the default when no format is configured.
pub const DEFAULT_LOG_FORMAT: &str = "$remote_addr - $remote_user [$time_local] \"$request\" $status $bytes_sent \"$http_referer\" \"$http_user_agent\"";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub settings: SettingsConfig,
    pub clickhouse: ClickHouseConfig,
    pub nginx: NginxConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Source and flush-cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Flush interval in seconds.
    pub interval: u64,
    pub log_path: String,
    /// Start following at the end of the file instead of the beginning.
    pub seek_from_end: bool,
    /// How often the follower polls the file for new bytes.
    pub poll_interval_ms: u64,
    /// Drain and save once more when the source ends or on shutdown.
    pub final_flush: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub table: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
    /// ClickHouse column -> nginx variable (without the leading `$`).
    pub columns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    pub log_type: String,
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogOutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutputFormat {
    Json,
    Pretty,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            interval: 5,
            log_path: "/var/log/nginx/access.log".to_string(),
            seek_from_end: false,
            poll_interval_ms: 250,
            final_flush: true,
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        let columns = [
            ("RemoteAddr", "remote_addr"),
            ("RemoteUser", "remote_user"),
            ("TimeLocal", "time_local"),
            ("Request", "request"),
            ("Status", "status"),
            ("BytesSent", "bytes_sent"),
            ("HttpReferer", "http_referer"),
            ("HttpUserAgent", "http_user_agent"),
        ]
        .into_iter()
        .map(|(column, variable)| (column.to_string(), variable.to_string()))
        .collect();

        Self {
            host: "localhost".to_string(),
            port: 8123,
            db: "metrics".to_string(),
            table: "nginx".to_string(),
            user: "default".to_string(),
            password: String::new(),
            timeout_secs: 10,
            columns,
        }
    }
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            log_type: "main".to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:2112".to_string(),
            path: "/metrics".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogOutputFormat::Pretty,
        }
    }
}
