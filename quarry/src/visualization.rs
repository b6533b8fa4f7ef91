//! Chart recommendation from result shape
//!
//! Rules are checked in a fixed order and the first match wins. An explicit
//! chart type from the caller always overrides the recommendation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::query::display_string;
use crate::tabular::{parse_date, MATCH_THRESHOLD};
use crate::Row;

const PIE_MIN_DISTINCT: usize = 2;
const PIE_MAX_DISTINCT: usize = 8;
const PIE_MAX_ROWS: usize = 20;
const SCATTER_MIN_ROWS: usize = 30;
const RADAR_MAX_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Table,
    Bar,
    #[serde(alias = "stackedBar", alias = "grouped_bar")]
    StackedBar,
    Line,
    Pie,
    Scatter,
    Radar,
}

/// Caller-supplied visualization preference
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisualizationRequest {
    #[serde(default, alias = "chartType")]
    pub chart_type: Option<ChartType>,
    #[serde(default, alias = "xField")]
    pub x_field: Option<String>,
    #[serde(default, alias = "yField")]
    pub y_field: Option<String>,
    #[serde(default, alias = "groupBy")]
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationHint {
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub explicit: bool,
}

impl VisualizationHint {
    fn new(chart_type: ChartType, reason: impl Into<String>) -> Self {
        Self {
            chart_type,
            x_field: None,
            y_field: None,
            group_by: None,
            reason: reason.into(),
            explicit: false,
        }
    }

    fn axes(mut self, x: Option<String>, y: Option<String>) -> Self {
        self.x_field = x;
        self.y_field = y;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Date,
    Text,
}

struct FieldProfile {
    name: String,
    kind: FieldKind,
    distinct: usize,
}

fn profile(rows: &[Row], fields: &[String]) -> Vec<FieldProfile> {
    fields
        .iter()
        .filter_map(|name| {
            let values: Vec<&Value> = rows
                .iter()
                .filter_map(|r| r.get(name))
                .filter(|v| !v.is_null())
                .collect();
            if values.is_empty() {
                return None;
            }

            let kind = if values.iter().all(|v| v.is_number()) {
                FieldKind::Numeric
            } else if values.iter().all(|v| v.is_string()) && is_date_like(&values) {
                FieldKind::Date
            } else {
                FieldKind::Text
            };
            let distinct = values
                .iter()
                .map(|v| display_string(v))
                .collect::<HashSet<_>>()
                .len();

            Some(FieldProfile {
                name: name.clone(),
                kind,
                distinct,
            })
        })
        .collect()
}

fn is_date_like(values: &[&Value]) -> bool {
    let parsed = values
        .iter()
        .filter(|v| v.as_str().and_then(parse_date).is_some())
        .count();
    parsed as f64 >= values.len() as f64 * MATCH_THRESHOLD
}

fn of_kind(profiles: &[FieldProfile], kind: FieldKind) -> Vec<&FieldProfile> {
    profiles.iter().filter(|p| p.kind == kind).collect()
}

/// Recommend a chart for result rows.
///
/// `group_fields` are the aggregation group-by fields (empty for raw rows)
/// and `value_field` the primary metric key of an aggregation.
pub fn recommend(
    rows: &[Row],
    fields: &[String],
    group_fields: &[String],
    value_field: Option<&str>,
) -> VisualizationHint {
    let profiles = profile(rows, fields);
    let numeric = of_kind(&profiles, FieldKind::Numeric);
    let dates = of_kind(&profiles, FieldKind::Date);
    let text = of_kind(&profiles, FieldKind::Text);
    let first_numeric = numeric.first().map(|p| p.name.clone());
    let first_text = text.first().map(|p| p.name.clone());

    let distinguishing = text.iter().any(|p| p.distinct >= 2);
    if rows.len() <= 1 || (rows.len() == 2 && !distinguishing) {
        return VisualizationHint::new(ChartType::Table, "Too few rows for a chart");
    }

    if group_fields.len() >= 2 {
        let mut hint = VisualizationHint::new(
            ChartType::StackedBar,
            "Multiple group-by fields suit a stacked bar chart",
        )
        .axes(
            Some(group_fields[0].clone()),
            Some(value_field.unwrap_or("count").to_string()),
        );
        hint.group_by = Some(group_fields[1].clone());
        return hint;
    }

    if let (Some(date), Some(value)) = (dates.first(), &first_numeric) {
        return VisualizationHint::new(ChartType::Line, "Date field with numeric values")
            .axes(Some(date.name.clone()), Some(value.clone()));
    }

    let pie_candidates: Vec<&&FieldProfile> = text
        .iter()
        .filter(|p| (PIE_MIN_DISTINCT..=PIE_MAX_DISTINCT).contains(&p.distinct))
        .collect();
    if pie_candidates.len() == 1 && rows.len() <= PIE_MAX_ROWS {
        return VisualizationHint::new(ChartType::Pie, "Few categories in a small result")
            .axes(Some(pie_candidates[0].name.clone()), first_numeric);
    }

    if numeric.len() >= 2 && rows.len() > SCATTER_MIN_ROWS {
        let mut hint = VisualizationHint::new(ChartType::Scatter, "Two numeric fields over many rows")
            .axes(Some(numeric[0].name.clone()), Some(numeric[1].name.clone()));
        hint.group_by = first_text;
        return hint;
    }

    if numeric.len() >= 3 && rows.len() <= RADAR_MAX_ROWS {
        return VisualizationHint::new(ChartType::Radar, "Several numeric measures on few rows")
            .axes(first_text, first_numeric);
    }

    let x = first_text.or_else(|| fields.first().cloned());
    let y = first_numeric.or_else(|| value_field.map(str::to_string));
    VisualizationHint::new(ChartType::Bar, "Category with a value").axes(x, y)
}

/// Final hint for a result: the explicit request if given, the
/// recommendation otherwise. Empty results get no recommendation.
pub fn resolve_hint(
    request: Option<&VisualizationRequest>,
    rows: &[Row],
    fields: &[String],
    group_fields: &[String],
    value_field: Option<&str>,
) -> Option<VisualizationHint> {
    let recommended =
        (!rows.is_empty()).then(|| recommend(rows, fields, group_fields, value_field));

    match request.and_then(|r| r.chart_type.map(|c| (r, c))) {
        Some((request, chart_type)) => {
            let (x, y, group) = match recommended {
                Some(r) => (r.x_field, r.y_field, r.group_by),
                None => (None, None, None),
            };
            Some(VisualizationHint {
                chart_type,
                x_field: request.x_field.clone().or(x),
                y_field: request.y_field.clone().or(y),
                group_by: request.group_by.clone().or(group),
                reason: "Requested by caller".to_string(),
                explicit: true,
            })
        }
        None => recommended,
    }
}
