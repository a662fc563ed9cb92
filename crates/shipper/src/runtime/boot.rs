//! Boot — logging init, config checks, and wiring of the pipeline parts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::conf::{LogOutputFormat, LoggingConfig, ShipperConfig};
use crate::error::{ShipperError, ShipperResult};
use crate::metrics::ShipperMetrics;
use crate::parser::LogFormat;
use crate::pipeline::{BatchProcessor, LineBuffer, Pipeline};
use crate::sink::{ClickHouseSink, Sink};
use crate::source::{FileFollower, FollowConfig, LineSource, LineStream, StartPosition};

/// Phase 1 logging, active only until the config has been read.
///
/// Uses `set_default` (thread-local) so [`init_logging`] can install the
/// global subscriber afterwards.
pub fn init_logging_basic() -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

/// Phase 2 logging from `[logging]`. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogOutputFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogOutputFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

/// Everything needed to run, built and checked up front.
pub struct Shipper {
    pub config: ShipperConfig,
    pub metrics: Arc<ShipperMetrics>,
    pub pipeline: Pipeline,
    pub lines: LineStream,
}

impl Shipper {
    /// Wire a pipeline from `config` around an existing sink and line stream.
    pub fn assemble(config: ShipperConfig, sink: Arc<dyn Sink>, lines: LineStream) -> ShipperResult<Self> {
        config.validate()?;
        let format = compile_format(&config)?;

        let metrics = Arc::new(ShipperMetrics::new());
        let processor = BatchProcessor::new(
            Arc::new(LineBuffer::new()),
            Arc::new(format),
            sink,
            Arc::clone(&metrics),
        )
        .with_save_timeout(Duration::from_secs(config.clickhouse.timeout_secs));

        let pipeline = Pipeline::new(processor, Duration::from_secs(config.settings.interval))
            .with_final_flush(config.settings.final_flush);

        Ok(Self {
            config,
            metrics,
            pipeline,
            lines,
        })
    }
}

/// Compile the nginx format and check every ClickHouse column against it.
pub fn compile_format(config: &ShipperConfig) -> ShipperResult<LogFormat> {
    let format = LogFormat::compile(&config.nginx.log_type, &config.nginx.log_format)?;

    for (column, variable) in &config.clickhouse.columns {
        if !format.has_variable(variable) {
            return Err(ShipperError::UnknownColumnVariable {
                column: column.clone(),
                variable: variable.clone(),
                format: config.nginx.log_type.clone(),
            });
        }
    }

    info!(
        "Log format {:?} compiled with {} variables",
        format.name(),
        format.variables().len()
    );
    debug!("Log format {:?}: {}", format.name(), format.source());
    Ok(format)
}

/// Build the ClickHouse sink and open the log file.
///
/// Any error here is fatal: nothing has been read or sent yet.
pub async fn boot(config: ShipperConfig) -> ShipperResult<Shipper> {
    config.validate()?;

    let sink = ClickHouseSink::new(&config.clickhouse)?;
    info!("Shipping to {} table {}.{}", sink.describe(), config.clickhouse.db, config.clickhouse.table);

    let start = StartPosition::from_seek_from_end(config.settings.seek_from_end);
    let follow = FollowConfig {
        poll_interval: Duration::from_millis(config.settings.poll_interval_ms),
        reopen: true,
    };
    let follower = FileFollower::open(&config.settings.log_path, start, follow)
        .await
        .map_err(|e| {
            error!("Cannot open log file: {}", e);
            e
        })?;

    Shipper::assemble(config, Arc::new(sink), follower.into_lines())
}
