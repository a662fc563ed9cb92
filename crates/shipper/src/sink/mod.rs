//! Sink trait — abstract interface for batch storage.
//!
//! The pipeline only ever talks to storage through [`Sink`].
//! `clickhouse.rs` provides the real HTTP-backed implementation.
//! `fake.rs` provides a test double.

pub mod clickhouse;
pub mod convert;
pub mod fake;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::parser::ParsedRecord;

pub use clickhouse::ClickHouseSink;
pub use fake::FakeSink;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend rejected batch ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Save timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// Storage backend accepting whole batches of parsed records.
///
/// Object-safe thanks to the boxed future, so the pipeline can hold an
/// `Arc<dyn Sink>`. A batch either succeeds or fails as a unit.
pub trait Sink: Send + Sync {
    fn save(&self, records: Vec<ParsedRecord>) -> SinkFuture<'_>;

    /// Short human-readable destination, used in logs.
    fn describe(&self) -> String;
}
