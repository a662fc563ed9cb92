//! Fake — test double for the storage sink.
//!
//! Provides a deterministic [`FakeSink`] that implements [`Sink`] using
//! in-memory state. It records every batch it receives, can be scripted
//! to fail, and can hold each save open until the test releases it,
//! which makes flush overlap observable.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::{Sink, SinkError, SinkFuture};
use crate::parser::ParsedRecord;

#[derive(Default)]
struct Inner {
    received: Vec<Vec<ParsedRecord>>,
    committed: Vec<Vec<ParsedRecord>>,
    fail_remaining: usize,
    fail_always: bool,
}

/// An in-memory sink for deterministic testing.
#[derive(Default)]
pub struct FakeSink {
    inner: Mutex<Inner>,
    gate: Option<Semaphore>,
    started: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSink {
    /// A sink that accepts every batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every batch.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.inner.lock().fail_always = true;
        sink
    }

    /// A sink whose saves block until [`FakeSink::release`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Reject the next `n` batches.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().fail_remaining += n;
    }

    /// Let `n` blocked (or future) saves complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until a save has started since the last call.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Number of save calls that reached the sink.
    pub fn calls(&self) -> usize {
        self.inner.lock().received.len()
    }

    /// Every batch received, successful or not, in call order.
    pub fn received(&self) -> Vec<Vec<ParsedRecord>> {
        self.inner.lock().received.clone()
    }

    /// Records from successful saves, flattened in order.
    pub fn committed_records(&self) -> Vec<ParsedRecord> {
        self.inner.lock().committed.iter().flatten().cloned().collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running saves observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Sink for FakeSink {
    fn save(&self, records: Vec<ParsedRecord>) -> SinkFuture<'_> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let result = {
                let mut state = self.inner.lock();
                state.received.push(records.clone());
                if state.fail_always {
                    Err(SinkError::Other("fake sink configured to fail".to_string()))
                } else if state.fail_remaining > 0 {
                    state.fail_remaining -= 1;
                    Err(SinkError::Other("fake sink scripted failure".to_string()))
                } else {
                    state.committed.push(records);
                    Ok(())
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}
