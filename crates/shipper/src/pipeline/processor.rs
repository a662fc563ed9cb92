//! Processor — one drain, parse and save cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{error, info, warn};

use super::buffer::LineBuffer;
use super::policy::{DropBatch, FailurePolicy};
use crate::metrics::ShipperMetrics;
use crate::parser::{self, LogFormat};
use crate::sink::{Sink, SinkError};

pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a single flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; the sink was not called.
    Empty,
    /// The sink stored the batch of this many lines.
    Committed(usize),
    /// The sink failed or timed out on a batch of this many lines.
    Failed(usize),
}

pub struct BatchProcessor {
    buffer: Arc<LineBuffer>,
    format: Arc<LogFormat>,
    sink: Arc<dyn Sink>,
    metrics: Arc<ShipperMetrics>,
    policy: Arc<dyn FailurePolicy>,
    save_timeout: Duration,
}

impl BatchProcessor {
    pub fn new(
        buffer: Arc<LineBuffer>,
        format: Arc<LogFormat>,
        sink: Arc<dyn Sink>,
        metrics: Arc<ShipperMetrics>,
    ) -> Self {
        Self {
            buffer,
            format,
            sink,
            metrics,
            policy: Arc::new(DropBatch),
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub fn buffer(&self) -> &Arc<LineBuffer> {
        &self.buffer
    }

    /// Drain the buffer and push its contents to the sink.
    ///
    /// Counters move by the size of the drained batch, whatever the parser
    /// made of individual lines.
    pub async fn flush_once(&self) -> FlushOutcome {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let lines = batch.len();
        info!("Preparing to save {} new log entries.", lines);

        let outcome = parser::parse(&self.format, &batch);
        for failure in &outcome.failures {
            warn!(
                line = failure.line_index,
                "Skipping malformed log line: {}", failure.error
            );
        }

        let saved = match time::timeout(self.save_timeout, self.sink.save(outcome.records)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.save_timeout)),
        };

        match saved {
            Ok(()) => {
                self.metrics.record_committed(lines as u64);
                info!("Saved {} new logs.", lines);
                FlushOutcome::Committed(lines)
            }
            Err(e) => {
                self.metrics.record_failed(lines as u64);
                error!("Can't save logs: {}", e);
                self.policy.on_failure(batch, &e);
                FlushOutcome::Failed(lines)
            }
        }
    }
}
