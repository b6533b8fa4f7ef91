//! Operations and their parameters

use quarry::source::{HttpMethod, ParamLocation, ParamType, ParameterDef};
use serde::Serialize;
use serde_json::Value;

use super::document::SpecVersion;
use super::resolve::{deref, resolve_schema};

/// Methods an endpoint can be imported for, in preference order
pub const IMPORTABLE_METHODS: &[&str] = &["get", "post"];

/// One importable operation of a document
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub fn parse_method(method: &str) -> Option<HttpMethod> {
    match method.to_ascii_lowercase().as_str() {
        "get" => Some(HttpMethod::Get),
        "post" => Some(HttpMethod::Post),
        _ => None,
    }
}

fn method_key(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "get",
        HttpMethod::Post => "post",
    }
}

/// Every GET and POST operation, in document order.
pub fn list_operations(doc: &Value) -> Vec<OperationInfo> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut ops = Vec::new();
    for (path, item) in paths {
        for method in IMPORTABLE_METHODS {
            if let Some(op) = item.get(*method) {
                ops.push(info(path, method, op));
            }
        }
    }
    ops
}

/// The first path with a GET or POST, preferring GET within that path.
pub fn select_operation(doc: &Value) -> Option<OperationInfo> {
    let paths = doc.get("paths")?.as_object()?;
    paths.iter().find_map(|(path, item)| {
        IMPORTABLE_METHODS
            .iter()
            .find_map(|method| item.get(*method).map(|op| info(path, method, op)))
    })
}

fn info(path: &str, method: &str, op: &Value) -> OperationInfo {
    OperationInfo {
        path: path.to_string(),
        method: parse_method(method).unwrap_or_default(),
        operation_id: op.get("operationId").and_then(Value::as_str).map(str::to_string),
        summary: op
            .get("summary")
            .or_else(|| op.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// The path item and operation objects for `path` + `method`
pub fn find_operation<'a>(
    doc: &'a Value,
    path: &str,
    method: HttpMethod,
) -> Option<(&'a Value, &'a Value)> {
    let item = doc.get("paths")?.get(path)?;
    let op = item.get(method_key(method))?;
    Some((item, op))
}

/// Map path-level and operation-level parameters.
///
/// Operation parameters override path-level ones with the same name and
/// placement. Cookie and form parameters are dropped; a Swagger 2 body
/// parameter expands into one body parameter per schema property.
pub fn map_parameters(
    doc: &Value,
    version: SpecVersion,
    item: &Value,
    op: &Value,
    warnings: &mut Vec<String>,
) -> Vec<ParameterDef> {
    let mut raw: Vec<&Value> = Vec::new();
    for list in [item.get("parameters"), op.get("parameters")] {
        let Some(list) = list.and_then(Value::as_array) else {
            continue;
        };
        for param in list {
            let param = deref(doc, param);
            let key = (param.get("name"), param.get("in"));
            raw.retain(|p| (p.get("name"), p.get("in")) != key);
            raw.push(param);
        }
    }

    let mut params = Vec::new();
    for param in raw {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let placement = param.get("in").and_then(Value::as_str).unwrap_or("query");
        let location = match placement {
            "query" => ParamLocation::Query,
            "path" => ParamLocation::Path,
            "header" => ParamLocation::Header,
            "body" if version == SpecVersion::Swagger2 => {
                if let Some(schema) = param.get("schema") {
                    params.extend(body_parameters(doc, schema));
                }
                continue;
            }
            other => {
                warnings.push(format!("Dropped {} parameter '{}'", other, name));
                continue;
            }
        };
        params.push(map_parameter(doc, name, location, param));
    }

    if version == SpecVersion::OpenApi3 {
        if let Some(schema) = request_body_schema(doc, op) {
            params.extend(body_parameters(doc, schema));
        }
    }
    params
}

fn map_parameter(doc: &Value, name: &str, location: ParamLocation, param: &Value) -> ParameterDef {
    // Swagger 2 keeps type information on the parameter itself
    let schema = param
        .get("schema")
        .map(|s| resolve_schema(doc, s))
        .unwrap_or_else(|| param.clone());

    let mut def = ParameterDef::new(name, location);
    def.param_type = param_type(&schema);
    def.required = location == ParamLocation::Path
        || param.get("required").and_then(Value::as_bool).unwrap_or(false);
    def.description = param
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    def.default = schema.get("default").cloned();
    def.example = param
        .get("example")
        .or_else(|| schema.get("example"))
        .cloned();
    def.allowed_values = schema
        .get("enum")
        .and_then(Value::as_array)
        .cloned();
    def
}

fn request_body_schema<'a>(doc: &'a Value, op: &'a Value) -> Option<&'a Value> {
    let body = deref(doc, op.get("requestBody")?);
    let content = body.get("content")?.as_object()?;
    content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(ct, _)| ct.contains("json"))
                .map(|(_, v)| v)
        })?
        .get("schema")
}

fn body_parameters(doc: &Value, schema: &Value) -> Vec<ParameterDef> {
    let schema = resolve_schema(doc, schema);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    props
        .iter()
        .map(|(name, prop)| {
            let mut def = ParameterDef::new(name, ParamLocation::Body);
            def.param_type = param_type(prop);
            def.required = required.contains(&name.as_str());
            def.description = prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            def.default = prop.get("default").cloned();
            def.example = prop.get("example").cloned();
            def.allowed_values = prop.get("enum").and_then(Value::as_array).cloned();
            def
        })
        .collect()
}

fn param_type(schema: &Value) -> ParamType {
    match schema.get("type").and_then(Value::as_str) {
        Some("number") => ParamType::Number,
        Some("integer") => ParamType::Integer,
        Some("boolean") => ParamType::Boolean,
        Some("array") => ParamType::Array,
        Some("object") => ParamType::Object,
        _ => ParamType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_prefers_get_on_first_path() {
        let doc = json!({"paths": {
            "/a": {"post": {}, "get": {}},
            "/b": {"get": {}}
        }});
        let op = select_operation(&doc).unwrap();
        assert_eq!(op.path, "/a");
        assert_eq!(op.method, HttpMethod::Get);
    }

    #[test]
    fn test_select_skips_paths_without_get_or_post() {
        let doc = json!({"paths": {
            "/a": {"delete": {}},
            "/b": {"post": {"operationId": "createB"}}
        }});
        let op = select_operation(&doc).unwrap();
        assert_eq!(op.path, "/b");
        assert_eq!(op.operation_id.as_deref(), Some("createB"));
    }

    #[test]
    fn test_list_operations() {
        let doc = json!({"paths": {"/a": {"get": {}, "post": {}, "put": {}}, "/b": {"get": {}}}});
        assert_eq!(list_operations(&doc).len(), 3);
    }

    #[test]
    fn test_parameters_mapped_and_overridden() {
        let doc = json!({"components": {"parameters": {
            "Limit": {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 20}}
        }}});
        let item = json!({"parameters": [
            {"name": "id", "in": "path", "schema": {"type": "string"}},
            {"name": "status", "in": "query", "schema": {"type": "string"}}
        ]});
        let op = json!({"parameters": [
            {"$ref": "#/components/parameters/Limit"},
            {"name": "status", "in": "query", "required": true,
             "schema": {"type": "string", "enum": ["open", "closed"]}},
            {"name": "session", "in": "cookie"}
        ]});

        let mut warnings = Vec::new();
        let params = map_parameters(&doc, SpecVersion::OpenApi3, &item, &op, &mut warnings);
        assert_eq!(params.len(), 3);

        let id = params.iter().find(|p| p.name == "id").unwrap();
        assert!(id.required);
        assert_eq!(id.location, ParamLocation::Path);

        let limit = params.iter().find(|p| p.name == "limit").unwrap();
        assert_eq!(limit.param_type, ParamType::Integer);
        assert_eq!(limit.default, Some(json!(20)));

        let status = params.iter().find(|p| p.name == "status").unwrap();
        assert!(status.required);
        assert_eq!(status.allowed_values, Some(vec![json!("open"), json!("closed")]));

        assert_eq!(warnings, vec!["Dropped cookie parameter 'session'"]);
    }

    #[test]
    fn test_request_body_becomes_body_params() {
        let doc = json!({"components": {"schemas": {"New": {
            "type": "object",
            "required": ["title"],
            "properties": {"title": {"type": "string"}, "priority": {"type": "integer"}}
        }}}});
        let op = json!({"requestBody": {"content": {"application/json": {
            "schema": {"$ref": "#/components/schemas/New"}
        }}}});
        let params = map_parameters(&doc, SpecVersion::OpenApi3, &json!({}), &op, &mut Vec::new());
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.location == ParamLocation::Body));
        assert!(params.iter().find(|p| p.name == "title").unwrap().required);
    }

    #[test]
    fn test_swagger_body_parameter() {
        let op = json!({"parameters": [
            {"name": "body", "in": "body", "schema": {"properties": {"q": {"type": "string"}}}},
            {"name": "page", "in": "query", "type": "integer"}
        ]});
        let params = map_parameters(&json!({}), SpecVersion::Swagger2, &json!({}), &op, &mut Vec::new());
        assert_eq!(params[0].name, "q");
        assert_eq!(params[0].location, ParamLocation::Body);
        assert_eq!(params[1].param_type, ParamType::Integer);
    }
}
