//! Failure policy — what happens to a batch the sink did not store.

use tracing::warn;

use crate::sink::SinkError;

/// Decides the fate of a batch after a failed save.
///
/// The processor has already counted the lines as not processed by the
/// time this runs. Implementations that keep the batch around for another
/// attempt must do so without blocking the flush loop.
pub trait FailurePolicy: Send + Sync {
    fn on_failure(&self, batch: Vec<String>, error: &SinkError);
}

/// Drop the batch. Delivery is at-most-once.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropBatch;

impl FailurePolicy for DropBatch {
    fn on_failure(&self, batch: Vec<String>, error: &SinkError) {
        warn!(dropped = batch.len(), "Dropping {} log lines after failed save: {}", batch.len(), error);
    }
}
