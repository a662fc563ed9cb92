//! Source module — sequential line streams feeding the pipeline.

pub mod follow;

use std::path::PathBuf;
use std::pin::Pin;

use thiserror::Error;
use futures_util::Stream;

pub use follow::{FileFollower, FollowConfig, StartPosition};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to reopen {path} after rotation: {source}")]
    Reopen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An ordered stream of raw lines. Errors are transient: the stream keeps
/// going after yielding one.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, SourceError>> + Send>>;

/// Anything that can be turned into a [`LineStream`].
pub trait LineSource {
    fn into_lines(self) -> LineStream;
}

/// A finite in-memory source, mostly useful for replaying fixtures.
pub struct StaticLines(pub Vec<String>);

impl LineSource for StaticLines {
    fn into_lines(self) -> LineStream {
        Box::pin(tokio_stream::iter(self.0.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_static_lines_yield_in_order_then_end() {
        let mut lines = StaticLines(vec!["a".into(), "b".into()]).into_lines();
        assert_eq!(lines.next().await.unwrap().unwrap(), "a");
        assert_eq!(lines.next().await.unwrap().unwrap(), "b");
        assert!(lines.next().await.is_none());
    }
}
