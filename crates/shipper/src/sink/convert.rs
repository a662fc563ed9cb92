//! Convert — nginx variable values to typed ClickHouse JSON values.
//!
//! nginx writes everything as text. Numeric and time variables are
//! converted so they land in `UInt*`, `Float*` and `DateTime` columns;
//! nginx's `-` placeholder (and anything unparsable) becomes zero.

use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";
const CLICKHOUSE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const INTEGER_VARIABLES: &[&str] = &[
    "status",
    "bytes_sent",
    "body_bytes_sent",
    "request_length",
    "connection",
    "connection_requests",
    "upstream_status",
    "upstream_bytes_received",
    "upstream_bytes_sent",
    "remote_port",
    "server_port",
    "pid",
];

const FLOAT_VARIABLES: &[&str] = &[
    "request_time",
    "upstream_response_time",
    "upstream_connect_time",
    "upstream_header_time",
    "msec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    DateTime,
    Iso8601,
    Integer,
    Float,
    Text,
}

pub fn kind_of(variable: &str) -> ValueKind {
    if variable == "time_local" {
        ValueKind::DateTime
    } else if variable == "time_iso8601" {
        ValueKind::Iso8601
    } else if INTEGER_VARIABLES.contains(&variable) {
        ValueKind::Integer
    } else if FLOAT_VARIABLES.contains(&variable) {
        ValueKind::Float
    } else {
        ValueKind::Text
    }
}

/// Typed JSON value for `raw`, the text nginx logged for `variable`.
pub fn typed_value(variable: &str, raw: &str) -> Value {
    match kind_of(variable) {
        ValueKind::DateTime => match DateTime::parse_from_str(raw, TIME_LOCAL_FORMAT) {
            Ok(ts) => Value::String(ts.with_timezone(&Utc).format(CLICKHOUSE_DATETIME_FORMAT).to_string()),
            Err(_) => Value::String(raw.to_string()),
        },
        ValueKind::Iso8601 => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Value::String(ts.with_timezone(&Utc).format(CLICKHOUSE_DATETIME_FORMAT).to_string()),
            Err(_) => Value::String(raw.to_string()),
        },
        ValueKind::Integer => Value::Number(Number::from(first_of(raw).parse::<u64>().unwrap_or(0))),
        ValueKind::Float => {
            let value = first_of(raw).parse::<f64>().unwrap_or(0.0);
            Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or_else(|| Value::Number(Number::from(0)))
        }
        ValueKind::Text => Value::String(raw.to_string()),
    }
}

/// First entry of an upstream list.
///
/// nginx joins per-upstream values with `, ` when a request was retried
/// and with ` : ` across internal redirects ("502, 200 : 404").
fn first_of(raw: &str) -> &str {
    raw.split([',', ':']).next().unwrap_or("").trim()
}
