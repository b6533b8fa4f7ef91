//! Group-by aggregation
//!
//! Output rows carry the group fields, the group's row `count`, and one
//! `{field}_{operation}` entry per metric. Groups are ordered by count
//! descending so the dominant categories come first.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::{coerce_number, display_string};
use crate::tabular::number_value;
use crate::{Error, Result, Row};

/// Separator for composite group keys, never present in ordinary values
const KEY_SEPARATOR: char = '\u{1f}';

/// Output token for a null or missing group value
pub const NULL_GROUP: &str = "null";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GroupBy {
    One(String),
    Many(Vec<String>),
}

impl GroupBy {
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::One(field) => vec![field.clone()],
            Self::Many(fields) => fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricOp {
    Count,
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Min,
    Max,
}

impl fmt::Display for MetricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSpec {
    pub field: String,
    pub operation: MetricOp,
}

impl MetricSpec {
    pub fn new(field: impl Into<String>, operation: MetricOp) -> Self {
        Self {
            field: field.into(),
            operation,
        }
    }

    /// Output key, e.g. `premium_sum`
    pub fn output_key(&self) -> String {
        format!("{}_{}", self.field, self.operation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationConfig {
    #[serde(alias = "groupBy")]
    pub group_by: GroupBy,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    /// Reshape two-field groupings into one wide row per primary value
    #[serde(default)]
    pub pivot: bool,
}

impl AggregationConfig {
    pub fn new(group_by: GroupBy, metrics: Vec<MetricSpec>) -> Self {
        Self {
            group_by,
            metrics,
            pivot: false,
        }
    }

    /// Field names of an aggregated row, in output order.
    pub fn output_fields(&self) -> Vec<String> {
        let mut fields = self.group_by.fields();
        fields.push("count".to_string());
        fields.extend(self.metrics.iter().map(MetricSpec::output_key));
        fields
    }
}

struct Group<'a> {
    values: Vec<Value>,
    members: Vec<&'a Row>,
}

/// Group rows and compute per-group metrics.
pub fn aggregate(rows: &[Row], config: &AggregationConfig) -> Result<Vec<Row>> {
    let fields = config.group_by.fields();
    if fields.is_empty() || fields.iter().any(|f| f.is_empty()) {
        return Err(Error::Aggregation(
            "group_by must name at least one field".to_string(),
        ));
    }
    let reserved: Vec<String> = std::iter::once("count".to_string())
        .chain(config.metrics.iter().map(MetricSpec::output_key))
        .collect();
    if let Some(clash) = fields.iter().find(|f| reserved.contains(f)) {
        return Err(Error::Aggregation(format!(
            "group_by field '{}' collides with an output key",
            clash
        )));
    }

    let mut groups: HashMap<String, Group> = HashMap::new();
    for row in rows {
        let values: Vec<Value> = fields
            .iter()
            .map(|f| match row.get(f) {
                None | Some(Value::Null) => Value::String(NULL_GROUP.to_string()),
                Some(v) => v.clone(),
            })
            .collect();
        let key = values
            .iter()
            .map(display_string)
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string());

        groups
            .entry(key)
            .or_insert_with(|| Group {
                values,
                members: Vec::new(),
            })
            .members
            .push(row);
    }

    let mut ordered: Vec<(String, Group)> = groups.into_iter().collect();
    ordered.sort_by(|(ka, a), (kb, b)| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then_with(|| ka.cmp(kb))
    });

    let output = ordered
        .into_iter()
        .map(|(_, group)| {
            let mut out = Row::new();
            for (field, value) in fields.iter().zip(group.values) {
                out.insert(field.clone(), value);
            }
            out.insert("count".to_string(), Value::from(group.members.len()));
            for metric in &config.metrics {
                out.insert(metric.output_key(), compute_metric(&group.members, metric));
            }
            out
        })
        .collect();

    Ok(output)
}

fn compute_metric(members: &[&Row], metric: &MetricSpec) -> Value {
    let numbers: Vec<f64> = members
        .iter()
        .filter_map(|row| row.get(&metric.field).and_then(coerce_number))
        .collect();

    if numbers.is_empty() {
        return Value::Null;
    }

    match metric.operation {
        MetricOp::Count => Value::from(numbers.len()),
        MetricOp::Sum => number_value(round2(numbers.iter().sum())),
        MetricOp::Avg => number_value(round2(numbers.iter().sum::<f64>() / numbers.len() as f64)),
        MetricOp::Min => number_value(numbers.iter().copied().fold(f64::INFINITY, f64::min)),
        MetricOp::Max => number_value(numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Wide-format aggregation result
#[derive(Debug, Clone, Default)]
pub struct Pivoted {
    pub rows: Vec<Row>,
    /// Primary field followed by one column per series value
    pub fields: Vec<String>,
}

/// Pivot aggregated rows on the second group field.
///
/// Each output row holds one primary-field value plus one column per
/// distinct secondary value, filled with the first metric (or `count`).
/// Missing combinations are null. Returns `None` unless the grouping has at
/// least two fields.
pub fn pivot(aggregated: &[Row], config: &AggregationConfig) -> Option<Pivoted> {
    let fields = config.group_by.fields();
    if fields.len() < 2 {
        return None;
    }
    let primary = &fields[0];
    let series_field = &fields[1];
    let value_key = config
        .metrics
        .first()
        .map(MetricSpec::output_key)
        .unwrap_or_else(|| "count".to_string());

    let mut series: Vec<String> = Vec::new();
    let mut primaries: Vec<(Value, HashMap<String, Value>, u64)> = Vec::new();

    for row in aggregated {
        let primary_value = row.get(primary).cloned().unwrap_or(Value::Null);
        let mut series_name = display_string(row.get(series_field).unwrap_or(&Value::Null));
        // A series column may not shadow the primary column
        if series_name == *primary {
            series_name = format!("{}_{}", series_field, series_name);
        }
        if !series.contains(&series_name) {
            series.push(series_name.clone());
        }

        let cell = row.get(&value_key).cloned().unwrap_or(Value::Null);
        let count = row.get("count").and_then(Value::as_u64).unwrap_or(0);
        match primaries.iter_mut().find(|(v, _, _)| *v == primary_value) {
            Some((_, cells, total)) => {
                cells.insert(series_name, cell);
                *total += count;
            }
            None => {
                let mut cells = HashMap::new();
                cells.insert(series_name, cell);
                primaries.push((primary_value, cells, count));
            }
        }
    }
    primaries.sort_by(|a, b| b.2.cmp(&a.2));

    let rows = primaries
        .into_iter()
        .map(|(primary_value, mut cells, _)| {
            let mut out = Row::new();
            out.insert(primary.clone(), primary_value);
            for name in &series {
                out.insert(name.clone(), cells.remove(name).unwrap_or(Value::Null));
            }
            out
        })
        .collect();

    let mut out_fields = vec![primary.clone()];
    out_fields.extend(series);
    Some(Pivoted {
        rows,
        fields: out_fields,
    })
}
