//! Flush — the timer-driven loop around [`BatchProcessor::flush_once`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::processor::{BatchProcessor, FlushOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Cycles that found something to send, final flush included.
    pub cycles: u64,
    pub committed_lines: u64,
    pub failed_lines: u64,
}

impl FlushStats {
    fn record(&mut self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Empty => {}
            FlushOutcome::Committed(n) => {
                self.cycles += 1;
                self.committed_lines += n as u64;
            }
            FlushOutcome::Failed(n) => {
                self.cycles += 1;
                self.failed_lines += n as u64;
            }
        }
    }
}

pub struct FlushService {
    processor: Arc<BatchProcessor>,
    period: Duration,
    final_flush: bool,
}

impl FlushService {
    pub fn new(processor: Arc<BatchProcessor>, period: Duration) -> Self {
        Self {
            processor,
            period,
            final_flush: true,
        }
    }

    pub fn with_final_flush(mut self, enabled: bool) -> Self {
        self.final_flush = enabled;
        self
    }

    /// Flush every `period` until `shutdown` is cancelled.
    ///
    /// Runs as a single task and awaits each cycle before waiting for the
    /// next tick, so cycles never overlap. Ticks missed during a slow save
    /// are skipped. A cycle already in progress when `shutdown` fires runs
    /// to completion; the final flush follows it.
    ///
    /// Returns before `shutdown` only when `period` cannot be scheduled.
    pub async fn run(self, shutdown: CancellationToken) -> FlushStats {
        info!("Starting flush loop (interval: {:?})", self.period);
        let mut stats = FlushStats::default();

        // First tick one period from now, not immediately.
        let Some(start) = Instant::now().checked_add(self.period) else {
            error!("Flush interval {:?} is out of range", self.period);
            return stats;
        };
        let mut interval = time::interval_at(start, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let outcome = self.processor.flush_once().await;
                    stats.record(outcome);
                }
            }
        }

        if self.final_flush {
            debug!("Running final flush");
            let outcome = self.processor.flush_once().await;
            stats.record(outcome);
        }

        info!(
            cycles = stats.cycles,
            committed = stats.committed_lines,
            failed = stats.failed_lines,
            "Flush loop stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ShipperMetrics;
    use crate::parser::LogFormat;
    use crate::pipeline::LineBuffer;
    use crate::sink::{FakeSink, Sink};

    // ── Helpers ──────────────────────────────────────────────────

    struct Harness {
        buffer: Arc<LineBuffer>,
        metrics: Arc<ShipperMetrics>,
        sink: Arc<FakeSink>,
        processor: Arc<BatchProcessor>,
    }

    fn harness(sink: FakeSink) -> Harness {
        let buffer = Arc::new(LineBuffer::new());
        let metrics = Arc::new(ShipperMetrics::new());
        let sink = Arc::new(sink);
        let format = Arc::new(LogFormat::compile("t", "$line").expect("format compiles"));
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&buffer),
            format,
            Arc::clone(&sink) as Arc<dyn Sink>,
            Arc::clone(&metrics),
        ));
        Harness { buffer, metrics, sink, processor }
    }

    fn lines(h: &Harness) -> Vec<String> {
        h.sink
            .committed_records()
            .iter()
            .map(|r| r.get("line").unwrap_or_default().to_string())
            .collect()
    }

    // ── Scenarios ────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_tick_flushes_buffered_lines() {
        let h = harness(FakeSink::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            FlushService::new(Arc::clone(&h.processor), Duration::from_secs(1)).run(shutdown.clone()),
        );

        for line in ["a", "b", "", "c"] {
            h.buffer.append(line);
        }
        time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(h.sink.calls(), 1);
        assert_eq!(lines(&h), vec!["a", "b", "c"]);
        assert_eq!(h.metrics.committed(), 3);
        assert_eq!(h.metrics.failed(), 0);

        shutdown.cancel();
        let stats = task.await.expect("task joins");
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.committed_lines, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_not_retried() {
        let h = harness(FakeSink::new());
        h.sink.fail_next(1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            FlushService::new(Arc::clone(&h.processor), Duration::from_secs(1)).run(shutdown.clone()),
        );

        for line in ["a", "b", "", "c"] {
            h.buffer.append(line);
        }
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.metrics.failed(), 3);
        assert_eq!(h.metrics.committed(), 0);

        // Next tick has nothing new: no sink call.
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.sink.calls(), 1);

        shutdown.cancel();
        task.await.expect("task joins");
        assert_eq!(h.sink.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let h = harness(FakeSink::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            FlushService::new(Arc::clone(&h.processor), Duration::from_secs(5))
                .with_final_flush(false)
                .run(shutdown.clone()),
        );

        h.buffer.append("a");
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.sink.calls(), 0);

        shutdown.cancel();
        task.await.expect("task joins");
        // Final flush disabled: the line stays buffered.
        assert_eq!(h.sink.calls(), 0);
        assert_eq!(h.buffer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_on_shutdown() {
        let h = harness(FakeSink::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            FlushService::new(Arc::clone(&h.processor), Duration::from_secs(60)).run(shutdown.clone()),
        );

        h.buffer.append("late");
        shutdown.cancel();
        let stats = task.await.expect("task joins");

        assert_eq!(lines(&h), vec!["late"]);
        assert_eq!(stats.committed_lines, 1);
        assert_eq!(h.metrics.committed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedulable_period_returns_at_once() {
        let h = harness(FakeSink::new());
        h.buffer.append("a");

        let stats = FlushService::new(Arc::clone(&h.processor), Duration::MAX)
            .run(CancellationToken::new())
            .await;

        assert_eq!(stats, FlushStats::default());
        assert_eq!(h.sink.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        let h = harness(FakeSink::gated());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            FlushService::new(Arc::clone(&h.processor), Duration::from_secs(1))
                .with_final_flush(false)
                .run(shutdown.clone()),
        );

        h.buffer.append("first");
        h.sink.wait_started().await;

        // Several periods elapse while the first save is blocked.
        h.buffer.append("second");
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.sink.in_flight(), 1);

        h.sink.release(1);
        h.sink.wait_started().await;
        assert_eq!(h.sink.max_in_flight(), 1);

        h.sink.release(1);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lines(&h), vec!["first", "second"]);
        assert_eq!(h.sink.max_in_flight(), 1);

        shutdown.cancel();
        task.await.expect("task joins");
    }
}
