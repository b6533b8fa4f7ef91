//! Column type inference and per-value conversion

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Rows sampled per column when inferring its type
pub const SAMPLE_SIZE: usize = 100;

/// Share of sampled values that must parse for a date or number column
pub const MATCH_THRESHOLD: f64 = 0.8;

const CURRENCY_SYMBOLS: [char; 6] = ['$', '€', '£', '¥', '₹', '₩'];

const TRUE_TOKENS: [&str; 3] = ["true", "yes", "1"];
const FALSE_TOKENS: [&str; 3] = ["false", "no", "0"];

/// Date-only formats, tried in order (US month-first before day-first)
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").expect("numeric pattern is valid")
    })
}

/// Inferred column type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
        }
    }
}

/// Display hint for number columns whose raw values carried markers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFormat {
    Currency,
    Percentage,
}

/// A column in a tabular source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ColumnFormat>,
}

impl ColumnInfo {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::String,
            format: None,
        }
    }
}

/// Infer a column's type from its sampled raw values.
///
/// Empty values are ignored. A column with no non-empty samples is a string
/// column.
pub fn infer_column(name: &str, samples: &[&str]) -> ColumnInfo {
    let values: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(SAMPLE_SIZE)
        .collect();

    let mut info = ColumnInfo::string(name);
    if values.is_empty() {
        return info;
    }

    if values.iter().all(|v| parse_bool(v).is_some()) {
        info.column_type = ColumnType::Boolean;
        return info;
    }

    let threshold = (values.len() as f64 * MATCH_THRESHOLD).ceil() as usize;

    let dates = values.iter().filter(|v| parse_date(v).is_some()).count();
    if dates >= threshold {
        info.column_type = ColumnType::Date;
        return info;
    }

    let numbers = values.iter().filter(|v| parse_number(v).is_some()).count();
    if numbers >= threshold {
        info.column_type = ColumnType::Number;
        info.format = if values.iter().any(|v| v.contains(CURRENCY_SYMBOLS)) {
            Some(ColumnFormat::Currency)
        } else if values.iter().any(|v| v.contains('%')) {
            Some(ColumnFormat::Percentage)
        } else {
            None
        };
    }

    info
}

/// Convert one raw cell according to its column type.
///
/// Empty cells in typed columns become null; values that fail to parse are
/// kept as the original string.
pub fn convert_value(raw: &str, column_type: ColumnType) -> Value {
    let trimmed = raw.trim();
    if column_type == ColumnType::String {
        return Value::String(raw.to_string());
    }
    if trimmed.is_empty() {
        return Value::Null;
    }

    let converted = match column_type {
        ColumnType::Number => parse_number(trimmed).map(number_value),
        ColumnType::Boolean => parse_bool(trimmed).map(Value::Bool),
        ColumnType::Date => parse_date(trimmed).map(|dt| Value::String(canonical_timestamp(dt))),
        ColumnType::String => None,
    };

    converted.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Parse a boolean token (`true/false/yes/no/1/0`, case-insensitive).
pub fn parse_bool(value: &str) -> Option<bool> {
    let lower = value.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number after stripping currency symbols, thousands separators
/// and percent signs.
pub fn parse_number(value: &str) -> Option<f64> {
    let stripped: String = value
        .trim()
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && *c != '%' && !c.is_whitespace())
        .collect();

    if !numeric_pattern().is_match(&stripped) {
        return None;
    }
    stripped.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a date or timestamp in any recognized pattern, normalized to UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    // Bare numbers are never dates
    if value.is_empty() || numeric_pattern().is_match(value) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Canonical timestamp string for converted date cells
pub fn canonical_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON number for an f64, using an integer when the value is whole.
pub fn number_value(n: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < MAX_EXACT {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
