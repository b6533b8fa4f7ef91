//! Loading a description document and reading its top-level facts

use serde_json::Value;

use crate::error::{ImportError, Result};

/// Major description format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    Swagger2,
    OpenApi3,
}

impl SpecVersion {
    /// Detect from the `openapi` / `swagger` version field
    pub fn detect(doc: &Value) -> Option<Self> {
        if let Some(v) = doc.get("openapi").and_then(version_string) {
            return v.starts_with("3.").then_some(Self::OpenApi3);
        }
        if let Some(v) = doc.get("swagger").and_then(version_string) {
            return v.starts_with("2.").then_some(Self::Swagger2);
        }
        None
    }
}

/// YAML reads an unquoted `3.0` as a number
fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => n.as_f64().map(|f| format!("{:.1}", f)),
        _ => None,
    }
}

/// Parse document text, JSON first and YAML otherwise.
pub fn load_document(text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(doc) => Ok(doc),
        Err(json_err) => match serde_yaml::from_str::<Value>(text) {
            Ok(doc) if doc.is_object() => Ok(doc),
            Ok(_) => Err(ImportError::Parse("top level is not a mapping".to_string())),
            Err(yaml_err) => Err(ImportError::Parse(format!(
                "JSON: {}; YAML: {}",
                json_err, yaml_err
            ))),
        },
    }
}

pub fn title(doc: &Value) -> Option<&str> {
    doc.pointer("/info/title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn description(doc: &Value) -> Option<&str> {
    doc.pointer("/info/description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Base URL of the API without a trailing slash.
///
/// OpenAPI 3 uses the first server with its variables substituted by their
/// defaults. Swagger 2 combines the first scheme, `host` and `basePath`.
pub fn base_url(doc: &Value) -> Option<String> {
    let raw = match SpecVersion::detect(doc)? {
        SpecVersion::OpenApi3 => {
            let server = doc.pointer("/servers/0")?;
            let mut url = server.get("url")?.as_str()?.trim().to_string();
            if let Some(vars) = server.get("variables").and_then(Value::as_object) {
                for (name, var) in vars {
                    if let Some(default) = var.get("default").and_then(Value::as_str) {
                        url = url.replace(&format!("{{{}}}", name), default);
                    }
                }
            }
            url
        }
        SpecVersion::Swagger2 => {
            let host = doc.get("host")?.as_str()?.trim();
            let scheme = doc
                .pointer("/schemes/0")
                .and_then(Value::as_str)
                .unwrap_or("https");
            let base_path = doc.get("basePath").and_then(Value::as_str).unwrap_or("");
            format!("{}://{}{}", scheme, host, base_path)
        }
    };
    let trimmed = raw.trim_end_matches('/').to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}
