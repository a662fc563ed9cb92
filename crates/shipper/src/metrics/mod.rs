//! Metrics — shipping counters and their Prometheus text exposition.

pub mod route;

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

pub const LINES_PROCESSED: &str = "nginx_clickhouse_lines_processed_total";
pub const LINES_NOT_PROCESSED: &str = "nginx_clickhouse_lines_not_processed_total";

/// Committed / failed line counters.
///
/// Only the batch processor writes them; the exporter reads them at any
/// time. All operations use `Ordering::Relaxed`: the two counters are
/// independent and a scrape may observe one flush's update before the
/// other's, which is fine for monotonic totals.
#[derive(Debug, Default)]
pub struct ShipperMetrics {
    lines_processed: AtomicU64,
    lines_not_processed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lines_processed: u64,
    pub lines_not_processed: u64,
}

impl ShipperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines whose batch was accepted by the sink.
    #[inline]
    pub fn record_committed(&self, lines: u64) {
        self.lines_processed.fetch_add(lines, Ordering::Relaxed);
    }

    /// Lines whose batch the sink failed to store.
    #[inline]
    pub fn record_failed(&self, lines: u64) {
        self.lines_not_processed.fetch_add(lines, Ordering::Relaxed);
    }

    pub fn committed(&self) -> u64 {
        self.lines_processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.lines_not_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_processed: self.committed(),
            lines_not_processed: self.failed(),
        }
    }

    /// Render in the Prometheus text exposition format (version 0.0.4).
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::with_capacity(512);
        write_counter(
            &mut out,
            LINES_PROCESSED,
            "The total number of processed log lines",
            snapshot.lines_processed,
        );
        write_counter(
            &mut out,
            LINES_NOT_PROCESSED,
            "The total number of log lines which was not processed",
            snapshot.lines_not_processed,
        );
        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
}
