//! In-memory row operations: filter, sort, aggregation and pivot.
//!
//! Everything here is a pure function over already-extracted rows.

pub mod aggregate;
pub mod filter;

pub use aggregate::{aggregate, pivot, AggregationConfig, GroupBy, MetricOp, MetricSpec};
pub use filter::{apply_filters, sort_rows, Filter, Operator, SortDirection, SortSpec};

use serde_json::Value;

/// Coerce a JSON value to a number.
///
/// Numbers pass through; strings are accepted when they look numeric after
/// trimming. Everything else is not a number.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// String form of a value used for lexical comparison and group keys.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
