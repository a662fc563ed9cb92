//! Serve — run the pipeline next to the metrics exporter until shutdown.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{ShipperError, ShipperResult};
use crate::metrics::route;
use crate::pipeline::PipelineReport;
use crate::runtime::boot::Shipper;

/// Run until the source ends or `signal` resolves.
///
/// The exporter keeps answering scrapes through the final flush and is
/// stopped only once the pipeline reports `Stopped`. A pipeline failure is
/// returned after the exporter has shut down.
pub async fn run<F>(shipper: Shipper, signal: F) -> ShipperResult<PipelineReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let Shipper {
        config,
        metrics,
        pipeline,
        lines,
    } = shipper;

    let shutdown = CancellationToken::new();
    let stop_server = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signal.await;
            shutdown.cancel();
        });
    }

    let server = if config.metrics.enabled {
        let addr: SocketAddr = config.metrics.bind_address.parse().map_err(|e| {
            ShipperError::Config(crate::conf::ConfigError::Invalid(format!(
                "metrics.bind_address {:?}: {}",
                config.metrics.bind_address, e
            )))
        })?;
        let listener = TcpListener::bind(addr).await?;
        let app = route::router(metrics, pipeline.state(), &config.metrics.path);
        info!("Serving metrics on http://{}{}", addr, config.metrics.path);

        let stop = stop_server.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        }))
    } else {
        info!("Metrics exporter disabled");
        None
    };

    info!(
        "Following {} (flush every {}s)",
        config.settings.log_path, config.settings.interval
    );
    let outcome = pipeline.run(lines, shutdown).await;

    stop_server.cancel();
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Metrics server error: {}", e),
            Err(e) => error!("Metrics server task failed: {}", e),
        }
    }

    let report = outcome?;
    info!(
        "Shipper stopped: {} lines read, {} committed, {} not committed",
        report.ingest.appended, report.flush.committed_lines, report.flush.failed_lines
    );
    Ok(report)
}
