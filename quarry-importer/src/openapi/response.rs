//! Success response schema to response structure

use quarry::source::{FieldDef, FieldType, ResponseFormat, ResponseStructure};
use serde_json::Value;

use super::document::SpecVersion;
use super::resolve::{deref, resolve_schema};

/// Object keys that commonly wrap the record array
pub const ENVELOPE_KEYS: &[&str] = &["data", "results", "items", "records"];

/// Keys that commonly carry the total record count beside the array
pub const TOTAL_KEYS: &[&str] = &["total", "count", "total_count", "totalCount"];

/// What the success response tells us about the payload
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMapping {
    pub structure: ResponseStructure,
    pub format: ResponseFormat,
    pub sample: Option<Value>,
}

impl Default for ResponseMapping {
    fn default() -> Self {
        Self {
            structure: ResponseStructure::default(),
            format: ResponseFormat::Json,
            sample: None,
        }
    }
}

/// The success response: 200, then 201, then any 2xx, then `default`.
fn success_response<'a>(doc: &'a Value, op: &'a Value) -> Option<&'a Value> {
    let responses = op.get("responses")?.as_object()?;
    let response = responses
        .get("200")
        .or_else(|| responses.get("201"))
        .or_else(|| {
            responses
                .iter()
                .find(|(code, _)| code.starts_with('2'))
                .map(|(_, r)| r)
        })
        .or_else(|| responses.get("default"))?;
    Some(deref(doc, response))
}

pub fn map_response(
    doc: &Value,
    version: SpecVersion,
    op: &Value,
    warnings: &mut Vec<String>,
) -> ResponseMapping {
    let Some(response) = success_response(doc, op) else {
        warnings.push("No success response declared, using the document root".to_string());
        return ResponseMapping::default();
    };

    let mut mapping = ResponseMapping::default();
    let schema = match version {
        SpecVersion::Swagger2 => {
            mapping.sample = response
                .pointer("/examples/application~1json")
                .cloned();
            response.get("schema")
        }
        SpecVersion::OpenApi3 => {
            let content = response.get("content").and_then(Value::as_object);
            let json = content.and_then(|c| {
                c.iter()
                    .find(|(ct, _)| ct.contains("json"))
                    .map(|(_, media)| media)
            });
            match json {
                Some(media) => {
                    mapping.sample = media.get("example").cloned().or_else(|| {
                        media
                            .get("examples")
                            .and_then(Value::as_object)
                            .and_then(|e| e.values().next())
                            .and_then(|e| e.get("value"))
                            .cloned()
                    });
                    media.get("schema")
                }
                None => {
                    if content.is_some_and(|c| c.keys().any(|ct| ct.contains("csv"))) {
                        mapping.format = ResponseFormat::Csv;
                        return mapping;
                    }
                    None
                }
            }
        }
    };

    let Some(schema) = schema else {
        warnings.push("Success response has no JSON schema".to_string());
        return mapping;
    };
    mapping.structure = structure_from_schema(&resolve_schema(doc, schema));
    mapping
}

/// Locate the record collection in a resolved response schema.
pub fn structure_from_schema(schema: &Value) -> ResponseStructure {
    if is_array(schema) {
        return ResponseStructure {
            data_path: "$".to_string(),
            is_array: true,
            fields: item_fields(schema),
            total_path: None,
        };
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        // One level of nesting covers `{"data": {"items": [...]}}`
        let candidates = ENVELOPE_KEYS.iter().filter_map(|k| props.get(*k).map(|s| (*k, s)));
        for (key, prop) in candidates {
            if is_array(prop) {
                return ResponseStructure {
                    data_path: format!("$.{}", key),
                    is_array: true,
                    fields: item_fields(prop),
                    total_path: total_key(props).map(|t| format!("$.{}", t)),
                };
            }
            if let Some(inner) = prop.get("properties").and_then(Value::as_object) {
                let nested = ENVELOPE_KEYS
                    .iter()
                    .find_map(|k| inner.get(*k).filter(|s| is_array(s)).map(|s| (*k, s)));
                if let Some((inner_key, array)) = nested {
                    let total_path = total_key(inner)
                        .map(|t| format!("$.{}.{}", key, t))
                        .or_else(|| total_key(props).map(|t| format!("$.{}", t)));
                    return ResponseStructure {
                        data_path: format!("$.{}.{}", key, inner_key),
                        is_array: true,
                        fields: item_fields(array),
                        total_path,
                    };
                }
            }
        }
    }

    ResponseStructure {
        data_path: "$".to_string(),
        is_array: false,
        fields: object_fields(schema),
        total_path: None,
    }
}

fn is_array(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("array") || schema.get("items").is_some()
}

fn total_key(props: &serde_json::Map<String, Value>) -> Option<&'static str> {
    TOTAL_KEYS.iter().copied().find(|k| {
        props
            .get(*k)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .is_some_and(|t| t == "integer" || t == "number")
    })
}

fn item_fields(array_schema: &Value) -> Vec<FieldDef> {
    array_schema
        .get("items")
        .map(object_fields)
        .unwrap_or_default()
}

fn object_fields(schema: &Value) -> Vec<FieldDef> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    props
        .iter()
        .map(|(name, prop)| {
            let mut field = FieldDef::new(name, field_type(prop));
            field.description = prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            field.children = match field.field_type {
                FieldType::Object => object_fields(prop),
                FieldType::Array => item_fields(prop),
                _ => Vec::new(),
            };
            field
        })
        .collect()
}

fn field_type(schema: &Value) -> FieldType {
    let format = schema.get("format").and_then(Value::as_str);
    match schema.get("type").and_then(Value::as_str) {
        Some("string") if matches!(format, Some("date") | Some("date-time")) => FieldType::Date,
        Some("number") => FieldType::Number,
        Some("integer") => FieldType::Integer,
        Some("boolean") => FieldType::Boolean,
        Some("array") => FieldType::Array,
        Some("object") => FieldType::Object,
        None if schema.get("properties").is_some() => FieldType::Object,
        _ => FieldType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_array() {
        let s = structure_from_schema(&json!({
            "type": "array",
            "items": {"properties": {"id": {"type": "integer"}, "at": {"type": "string", "format": "date-time"}}}
        }));
        assert_eq!(s.data_path, "$");
        assert!(s.is_array);
        assert_eq!(s.fields[1].field_type, FieldType::Date);
    }

    #[test]
    fn test_envelope_with_total() {
        let s = structure_from_schema(&json!({
            "type": "object",
            "properties": {
                "results": {"type": "array", "items": {"properties": {"name": {"type": "string"}}}},
                "totalCount": {"type": "integer"}
            }
        }));
        assert_eq!(s.data_path, "$.results");
        assert_eq!(s.total_path.as_deref(), Some("$.totalCount"));
        assert_eq!(s.fields[0].name, "name");
    }

    #[test]
    fn test_nested_envelope() {
        let s = structure_from_schema(&json!({
            "properties": {"data": {"properties": {
                "items": {"type": "array", "items": {"properties": {"id": {"type": "integer"}}}},
                "total": {"type": "integer"}
            }}}
        }));
        assert_eq!(s.data_path, "$.data.items");
        assert_eq!(s.total_path.as_deref(), Some("$.data.total"));
    }

    #[test]
    fn test_plain_object_with_nested_fields() {
        let s = structure_from_schema(&json!({
            "properties": {
                "id": {"type": "integer"},
                "owner": {"type": "object", "properties": {"name": {"type": "string"}}}
            }
        }));
        assert_eq!(s.data_path, "$");
        assert!(!s.is_array);
        assert_eq!(s.fields[1].children[0].name, "name");
    }

    #[test]
    fn test_openapi_response_picks_2xx_example() {
        let op = json!({"responses": {
            "404": {"description": "missing"},
            "202": {"content": {"application/json": {
                "schema": {"type": "array", "items": {}},
                "example": [{"id": 1}]
            }}}
        }});
        let mut warnings = Vec::new();
        let mapping = map_response(&json!({}), SpecVersion::OpenApi3, &op, &mut warnings);
        assert_eq!(mapping.sample, Some(json!([{"id": 1}])));
        assert!(mapping.structure.is_array);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_csv_response() {
        let op = json!({"responses": {"200": {"content": {"text/csv": {}}}}});
        let mapping = map_response(&json!({}), SpecVersion::OpenApi3, &op, &mut Vec::new());
        assert_eq!(mapping.format, ResponseFormat::Csv);
    }
}
