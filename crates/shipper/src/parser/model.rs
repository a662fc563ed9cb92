use thiserror::Error;
use serde::Serialize;

/// Errors raised while compiling an nginx `log_format` string.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Log format is empty")]
    Empty,

    #[error("Log format contains no $variables")]
    NoVariables,

    #[error("Invalid variable name: {0:?}")]
    InvalidVariable(String),

    #[error("Variable ${0} appears more than once")]
    DuplicateVariable(String),

    #[error("Variables ${0} and ${1} are not separated by literal text")]
    AdjacentVariables(String, String),

    #[error("Compiled pattern rejected: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty line")]
    Empty,

    #[error("Line does not match log format {0:?}")]
    NoMatch(String),
}

/// Structured fields extracted from one raw line, in log-format order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedRecord {
    pub fields: Vec<(String, String)>,
}

impl ParsedRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Value of `variable` (name without the leading `$`).
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == variable)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A line the parser could not map to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    /// Position of the line in the parsed batch.
    pub line_index: usize,
    pub error: ParseError,
}

/// Result of parsing a batch: records in input order plus per-line failures.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
    pub failures: Vec<LineFailure>,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
