//! Conf module — configuration model, loading and validation.

pub mod model;
pub mod load;
pub mod error;

pub use model::{
    ClickHouseConfig, LogOutputFormat, LoggingConfig, MetricsConfig, NginxConfig, SettingsConfig,
    ShipperConfig, DEFAULT_LOG_FORMAT,
};
pub use error::ConfigError;
