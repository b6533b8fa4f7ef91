//! Structural validation ahead of parsing
//!
//! Problems are collected rather than returned one at a time: errors block
//! the import, warnings are reported alongside the result.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::document::{self, SpecVersion};
use super::operation::IMPORTABLE_METHODS;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationIssue {
    /// JSON pointer to the offending node
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.path))
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

pub fn validate(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !doc.is_object() {
        report
            .errors
            .push(ValidationIssue::new("", "Document must be an object"));
        return report;
    }

    let version = SpecVersion::detect(doc);
    if version.is_none() {
        report.errors.push(ValidationIssue::new(
            "/openapi",
            "Missing or unsupported version, expected openapi 3.x or swagger 2.0",
        ));
    }

    if document::title(doc).is_none() {
        report
            .errors
            .push(ValidationIssue::new("/info/title", "Missing API title"));
    }
    if document::description(doc).is_none() {
        report
            .warnings
            .push(ValidationIssue::new("/info/description", "Missing API description"));
    }

    if version.is_some() {
        let pointer = match version {
            Some(SpecVersion::Swagger2) => "/host",
            _ => "/servers",
        };
        match document::base_url(doc) {
            None => report
                .errors
                .push(ValidationIssue::new(pointer, "Missing base server URL")),
            Some(url) => {
                if url::Url::parse(&url).is_err() {
                    report.errors.push(ValidationIssue::new(
                        pointer,
                        format!("Server URL '{}' is not an absolute URL", url),
                    ));
                }
            }
        }
    }

    check_paths(doc, &mut report);
    report
}

fn check_paths(doc: &Value, report: &mut ValidationReport) {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        report
            .errors
            .push(ValidationIssue::new("/paths", "Missing paths object"));
        return;
    };

    let mut importable = 0;
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in IMPORTABLE_METHODS {
            let Some(op) = item.get(*method) else {
                continue;
            };
            importable += 1;
            let pointer = format!("/paths/{}/{}", escape_pointer(path), method);
            if op.get("responses").is_none() {
                report
                    .warnings
                    .push(ValidationIssue::new(&pointer, "Operation has no responses"));
            }
            if op.get("summary").is_none() && op.get("description").is_none() {
                report
                    .warnings
                    .push(ValidationIssue::new(&pointer, "Operation has no summary"));
            }
        }
    }

    if importable == 0 {
        report.errors.push(ValidationIssue::new(
            "/paths",
            "No path defines a GET or POST operation",
        ));
    }
}

/// Escape a key for use in a JSON pointer
pub fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Claims", "description": "Claims API"},
            "servers": [{"url": "https://api.test"}],
            "paths": {"/claims": {"get": {"summary": "List", "responses": {"200": {}}}}}
        })
    }

    #[test]
    fn test_minimal_is_valid() {
        let report = validate(&minimal());
        assert!(report.is_valid(), "{}", report);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_collects_every_error() {
        let report = validate(&json!({"info": {}, "paths": {"/x": {"delete": {}}}}));
        let paths: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/openapi", "/info/title", "/paths"]);
    }

    #[test]
    fn test_missing_server() {
        let mut doc = minimal();
        doc.as_object_mut().unwrap().remove("servers");
        let report = validate(&doc);
        assert_eq!(report.errors[0].message, "Missing base server URL");
    }

    #[test]
    fn test_relative_server_rejected() {
        let mut doc = minimal();
        doc["servers"] = json!([{"url": "/api"}]);
        assert!(!validate(&doc).is_valid());
    }

    #[test]
    fn test_warnings_do_not_block() {
        let mut doc = minimal();
        doc["info"] = json!({"title": "Claims"});
        doc["paths"]["/claims"]["get"] = json!({});
        let report = validate(&doc);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 3);
    }
}
