//! Filter, sort, aggregate-or-paginate and visualization over fetched rows

use serde_json::Value;

use super::request::QueryRequest;
use crate::query::{aggregate, apply_filters, pivot, sort_rows, MetricSpec};
use crate::visualization::{resolve_hint, VisualizationHint};
use crate::{Result, Row};

/// Row limits applied to raw row pages
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl PageLimits {
    /// Clamp a requested limit into `1..=max_limit`.
    pub fn effective_limit(&self, requested: Option<i64>) -> usize {
        let max = self.max_limit.max(1);
        match requested {
            Some(n) if n < 1 => 1,
            Some(n) => (n as u64).min(max as u64) as usize,
            None => self.default_limit.clamp(1, max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub rows: Vec<Row>,
    pub fields: Vec<String>,
    pub total_records: u64,
    pub hint: Option<VisualizationHint>,
}

/// Run the in-memory stages over extracted rows.
///
/// `declared_fields` come from the source schema; when empty the fields are
/// taken from the rows. `upstream_total` is used for `total_records` only
/// when no filters narrowed the result.
pub fn run(
    rows: Vec<Row>,
    declared_fields: Vec<String>,
    upstream_total: Option<u64>,
    request: &QueryRequest,
    limits: &PageLimits,
) -> Result<PipelineOutput> {
    let filters = request.filters();
    let mut rows = apply_filters(rows, filters);

    let total_records = match upstream_total {
        Some(total) if filters.is_empty() => total,
        _ => rows.len() as u64,
    };

    if let Some(config) = &request.aggregation {
        let mut aggregated = aggregate(&rows, config)?;
        let mut fields = config.output_fields();

        // An explicit sort on an output field replaces the count ordering
        if let Some(sort) = &request.sort {
            if fields.contains(&sort.field) {
                sort_rows(&mut aggregated, sort);
            }
        }

        let group_fields = config.group_by.fields();
        let value_field = config
            .metrics
            .first()
            .map(MetricSpec::output_key)
            .unwrap_or_else(|| "count".to_string());

        if config.pivot {
            if let Some(pivoted) = pivot(&aggregated, config) {
                aggregated = pivoted.rows;
                fields = pivoted.fields;
            }
        }

        let hint = resolve_hint(
            request.visualization.as_ref(),
            &aggregated,
            &fields,
            &group_fields,
            Some(&value_field),
        );
        return Ok(PipelineOutput {
            rows: aggregated,
            fields,
            total_records,
            hint,
        });
    }

    if let Some(sort) = &request.sort {
        sort_rows(&mut rows, sort);
    }

    let offset = request.offset.unwrap_or(0).max(0) as usize;
    let limit = limits.effective_limit(request.limit);
    let page: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

    let fields = if declared_fields.is_empty() {
        fields_from_rows(&page)
    } else {
        declared_fields
    };

    let hint = resolve_hint(request.visualization.as_ref(), &page, &fields, &[], None);
    Ok(PipelineOutput {
        rows: page,
        fields,
        total_records,
        hint,
    })
}

/// Field names in first-seen order across rows
pub fn fields_from_rows(rows: &[Row]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !fields.contains(key) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

/// Coerce an extracted record into a row; scalars land under `value`.
pub fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => {
            let mut row = Row::new();
            row.insert("value".to_string(), other);
            row
        }
    }
}
