//! Filter predicates and stable sort

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::{coerce_number, display_string};
use crate::Row;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[serde(alias = "=", alias = "==")]
    Eq,
    #[serde(alias = "!=", alias = "<>")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<=")]
    Lte,
    Contains,
    In,
}

/// A single predicate; a filter list is combined with AND.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.field).unwrap_or(&Value::Null);
        match self.operator {
            Operator::Eq => values_equal(actual, &self.value),
            Operator::Ne => !values_equal(actual, &self.value),
            Operator::Gt => ordered(actual, &self.value, |o| o == Ordering::Greater),
            Operator::Lt => ordered(actual, &self.value, |o| o == Ordering::Less),
            Operator::Gte => ordered(actual, &self.value, |o| o != Ordering::Less),
            Operator::Lte => ordered(actual, &self.value, |o| o != Ordering::Greater),
            Operator::Contains => match (actual, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                _ => false,
            },
            Operator::In => match &self.value {
                Value::Array(candidates) => candidates.iter().any(|c| values_equal(actual, c)),
                _ => false,
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => display_string(a) == display_string(b),
    }
}

/// Range comparisons never match a missing value.
fn ordered(a: &Value, b: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    compare_values(a, b).map(accept).unwrap_or(false)
}

/// Numeric comparison when both sides coerce, lexical otherwise.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(display_string(a).cmp(&display_string(b))),
    }
}

/// Keep the rows matching every filter, preserving order.
pub fn apply_filters(rows: Vec<Row>, filters: &[Filter]) -> Vec<Row> {
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ascending", alias = "ASC")]
    Asc,
    #[serde(alias = "descending", alias = "DESC")]
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Stable sort by one field. Nulls go last ascending and first descending.
pub fn sort_rows(rows: &mut [Row], spec: &SortSpec) {
    rows.sort_by(|a, b| {
        let left = a.get(&spec.field).filter(|v| !v.is_null());
        let right = b.get(&spec.field).filter(|v| !v.is_null());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => panic!("row must be an object"),
            })
            .collect()
    }

    #[test]
    fn test_gt_falls_back_to_lexical() {
        let data = rows(vec![json!({"name": "alpha"}), json!({"name": "zeta"})]);
        let filter = Filter::new("name", Operator::Gt, json!("m"));
        let kept = apply_filters(data, &[filter]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["name"], "zeta");
    }

    #[test]
    fn test_numeric_compare_with_numeric_strings() {
        let data = rows(vec![json!({"v": 9}), json!({"v": "10"}), json!({"v": 100})]);
        let kept = apply_filters(data, &[Filter::new("v", Operator::Gte, json!(10))]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_filters_are_anded() {
        let data = rows(vec![
            json!({"dept": "hr", "age": 30}),
            json!({"dept": "hr", "age": 50}),
            json!({"dept": "it", "age": 50}),
        ]);
        let filters = vec![
            Filter::new("dept", Operator::Eq, json!("hr")),
            Filter::new("age", Operator::Gt, json!(40)),
        ];
        let kept = apply_filters(data, &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["age"], 50);
    }

    #[test]
    fn test_contains_is_case_insensitive_and_string_only() {
        let data = rows(vec![
            json!({"title": "Annual Leave Policy"}),
            json!({"title": 42}),
        ]);
        let kept = apply_filters(data, &[Filter::new("title", Operator::Contains, json!("leave"))]);
        assert_eq!(kept.len(), 1);

        let data = rows(vec![json!({"title": "x"})]);
        let kept = apply_filters(data, &[Filter::new("title", Operator::Contains, json!(1))]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_in_requires_array() {
        let data = rows(vec![json!({"s": "open"}), json!({"s": "closed"}), json!({"s": "new"})]);
        let kept = apply_filters(
            data.clone(),
            &[Filter::new("s", Operator::In, json!(["open", "new"]))],
        );
        assert_eq!(kept.len(), 2);

        let kept = apply_filters(data, &[Filter::new("s", Operator::In, json!("open"))]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_missing_field_never_matches_range() {
        let data = rows(vec![json!({"a": 1}), json!({})]);
        let kept = apply_filters(data.clone(), &[Filter::new("a", Operator::Lt, json!(5))]);
        assert_eq!(kept.len(), 1);
        let kept = apply_filters(data, &[Filter::new("a", Operator::Ne, json!(1))]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_operator_symbol_aliases() {
        let filter: Filter =
            serde_json::from_value(json!({"field": "x", "operator": ">=", "value": 1})).unwrap();
        assert_eq!(filter.operator, Operator::Gte);
    }

    #[test]
    fn test_sort_null_placement() {
        let mut data = rows(vec![json!({"x": 1}), json!({"x": null}), json!({"x": 2})]);
        sort_rows(
            &mut data,
            &SortSpec {
                field: "x".into(),
                direction: SortDirection::Asc,
            },
        );
        let xs: Vec<Value> = data.iter().map(|r| r["x"].clone()).collect();
        assert_eq!(xs, vec![json!(1), json!(2), Value::Null]);

        sort_rows(
            &mut data,
            &SortSpec {
                field: "x".into(),
                direction: SortDirection::Desc,
            },
        );
        let xs: Vec<Value> = data.iter().map(|r| r["x"].clone()).collect();
        assert_eq!(xs, vec![Value::Null, json!(2), json!(1)]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut data = rows(vec![
            json!({"k": 1, "id": "a"}),
            json!({"k": 0, "id": "b"}),
            json!({"k": 1, "id": "c"}),
        ]);
        sort_rows(
            &mut data,
            &SortSpec {
                field: "k".into(),
                direction: SortDirection::Asc,
            },
        );
        let ids: Vec<&str> = data.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
