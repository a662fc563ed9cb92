//! Ingest — move lines from a source stream into the buffer.

use std::sync::Arc;

use futures_util::FutureExt;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::buffer::LineBuffer;
use crate::source::{LineStream, SourceError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub appended: u64,
    pub skipped_empty: u64,
    pub read_errors: u64,
}

impl IngestStats {
    fn accept(&mut self, item: Result<String, SourceError>, buffer: &LineBuffer) {
        match item {
            Ok(line) => {
                if buffer.append(&line) {
                    self.appended += 1;
                } else {
                    self.skipped_empty += 1;
                }
            }
            Err(e) => {
                self.read_errors += 1;
                warn!("Failed to read log line: {}", e);
            }
        }
    }
}

/// Why ingestion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestEnd {
    SourceClosed,
    Cancelled,
}

/// Consume `lines` until the stream ends or `shutdown` is cancelled.
///
/// Read errors are logged and skipped; only the end of the stream or
/// cancellation stops the loop. On cancellation, lines the source has
/// already read and can hand over without waiting are still appended.
pub async fn ingest(
    mut lines: LineStream,
    buffer: Arc<LineBuffer>,
    shutdown: CancellationToken,
) -> (IngestStats, IngestEnd) {
    let mut stats = IngestStats::default();

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            next = lines.next() => Some(next),
        };

        match next {
            Some(Some(item)) => stats.accept(item, &buffer),
            Some(None) => break IngestEnd::SourceClosed,
            None => {
                while let Some(Some(item)) = lines.next().now_or_never() {
                    stats.accept(item, &buffer);
                }
                break IngestEnd::Cancelled;
            }
        }
    };

    debug!(
        appended = stats.appended,
        skipped = stats.skipped_empty,
        errors = stats.read_errors,
        "Ingestion stopped: {:?}",
        end
    );
    (stats, end)
}
