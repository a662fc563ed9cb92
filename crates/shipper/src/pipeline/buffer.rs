//! Buffer — raw lines waiting for the next flush.

use parking_lot::Mutex;

/// Ordered lines shared between ingestion and the flush loop.
///
/// The lock is held only for the push or the swap, never while a batch is
/// parsed or sent.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: Mutex<Vec<String>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trim `line` and append it. Returns `false` when the line was empty
    /// after trimming and nothing was stored.
    pub fn append(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        self.lines.lock().push(line.to_string());
        true
    }

    /// Take everything buffered so far, leaving the buffer empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    /// Advisory only: a concurrent append may land right after this returns.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }
}
