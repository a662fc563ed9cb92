//! Pipeline — ingestion, buffering and periodic flushing.
//!
//! Two tasks share one [`LineBuffer`]:
//!
//! - `ingest.rs`: appends every line the source yields
//! - `flush.rs`: on each tick drains the buffer through a [`BatchProcessor`]
//!
//! [`Pipeline::run`] wires them together and owns the lifecycle
//! `Starting → Running → DrainingFinal → Stopped`.

pub mod buffer;
pub mod flush;
pub mod ingest;
pub mod policy;
pub mod processor;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use buffer::LineBuffer;
pub use flush::{FlushService, FlushStats};
pub use ingest::{ingest, IngestEnd, IngestStats};
pub use policy::{DropBatch, FailurePolicy};
pub use processor::{BatchProcessor, FlushOutcome};

use crate::source::LineStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Starting,
    Running,
    DrainingFinal,
    Stopped,
}

/// Lifecycle state readable from the HTTP side.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<RwLock<PipelineState>>);

impl StateHandle {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(PipelineState::Starting)))
    }

    pub fn get(&self) -> PipelineState {
        *self.0.read()
    }

    pub(crate) fn set(&self, state: PipelineState) {
        *self.0.write() = state;
        info!("Pipeline state: {:?}", state);
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary returned once the pipeline has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub ingest: IngestStats,
    pub ended_by: IngestEnd,
    pub flush: FlushStats,
}

/// The flush loop ended on its own; nothing would reach the sink any more.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Flush loop stopped while ingestion was still running")]
    FlushStopped,

    #[error("Flush task failed: {0}")]
    FlushTask(#[source] JoinError),
}

pub struct Pipeline {
    processor: Arc<BatchProcessor>,
    interval: Duration,
    final_flush: bool,
    state: StateHandle,
}

impl Pipeline {
    pub fn new(processor: BatchProcessor, interval: Duration) -> Self {
        Self {
            processor: Arc::new(processor),
            interval,
            final_flush: true,
            state: StateHandle::new(),
        }
    }

    pub fn with_final_flush(mut self, enabled: bool) -> Self {
        self.final_flush = enabled;
        self
    }

    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// Run until `lines` ends or `shutdown` is cancelled.
    ///
    /// Ingestion is stopped and joined before the flush loop is told to
    /// stop, so the final flush sees every line that was read. If the
    /// flush loop dies first, ingestion is stopped and the error returned.
    pub async fn run(self, lines: LineStream, shutdown: CancellationToken) -> Result<PipelineReport, PipelineError> {
        let buffer = Arc::clone(self.processor.buffer());

        let ingest_stop = shutdown.child_token();
        let flush_stop = CancellationToken::new();

        let mut ingest_task = tokio::spawn(ingest(lines, buffer, ingest_stop.clone()));
        let mut flush_task = tokio::spawn(
            FlushService::new(Arc::clone(&self.processor), self.interval)
                .with_final_flush(self.final_flush)
                .run(flush_stop.clone()),
        );
        self.state.set(PipelineState::Running);

        let ingested = tokio::select! {
            joined = &mut ingest_task => joined,
            _ = shutdown.cancelled() => {
                ingest_stop.cancel();
                ingest_task.await
            }
            flushed = &mut flush_task => {
                error!("Flush loop ended early, stopping ingestion");
                ingest_stop.cancel();
                if let Err(e) = ingest_task.await {
                    error!("Ingest task failed: {}", e);
                }
                self.state.set(PipelineState::Stopped);
                return Err(match flushed {
                    Ok(_) => PipelineError::FlushStopped,
                    Err(e) => PipelineError::FlushTask(e),
                });
            }
        };

        let (ingest, ended_by) = match ingested {
            Ok(result) => result,
            Err(e) => {
                error!("Ingest task failed: {}", e);
                (IngestStats::default(), IngestEnd::Cancelled)
            }
        };
        if ended_by == IngestEnd::SourceClosed {
            info!("Log source closed after {} lines", ingest.appended);
        }

        self.state.set(PipelineState::DrainingFinal);
        flush_stop.cancel();
        let flushed = flush_task.await;
        self.state.set(PipelineState::Stopped);

        let flush = flushed.map_err(PipelineError::FlushTask)?;
        Ok(PipelineReport { ingest, ended_by, flush })
    }
}
