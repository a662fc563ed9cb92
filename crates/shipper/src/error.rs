use thiserror::Error;

use crate::conf::ConfigError;
use crate::parser::FormatError;
use crate::pipeline::PipelineError;
use crate::sink::SinkError;
use crate::source::SourceError;

/// Startup and lifecycle failures. Anything returned as a `ShipperError`
/// stops the process; per-batch and per-line problems are handled inside
/// the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid log format: {0}")]
    Format(#[from] FormatError),

    #[error("Column {column} maps to ${variable}, which log format {format:?} does not define")]
    UnknownColumnVariable {
        column: String,
        variable: String,
        format: String,
    },

    #[error("Log source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Metrics server error: {0}")]
    Server(#[from] std::io::Error),
}

pub type ShipperResult<T> = Result<T, ShipperError>;
