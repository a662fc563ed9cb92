/// Access-log parsing
///
/// Turns raw nginx access-log lines into structured records according to
/// a configured `log_format` string.
///
/// - `format.rs`: compiles a `log_format` string into a line matcher
/// - `model.rs`: records, per-line failures and error types
///
/// Parsing is pure: the same format and lines always produce the same
/// outcome, and a malformed line never aborts the rest of the batch.

pub mod format;
pub mod model;

pub use format::LogFormat;
pub use model::{FormatError, LineFailure, ParseError, ParseOutcome, ParsedRecord};

/// Parse a batch of raw lines.
///
/// Records keep the relative order of their source lines. Lines that do
/// not match are reported in `failures` with their batch position.
pub fn parse<S: AsRef<str>>(format: &LogFormat, lines: &[S]) -> ParseOutcome {
    let mut outcome = ParseOutcome {
        records: Vec::with_capacity(lines.len()),
        failures: Vec::new(),
    };

    for (line_index, line) in lines.iter().enumerate() {
        match format.parse_line(line.as_ref()) {
            Ok(record) => outcome.records.push(record),
            Err(error) => outcome.failures.push(LineFailure { line_index, error }),
        }
    }

    outcome
}
