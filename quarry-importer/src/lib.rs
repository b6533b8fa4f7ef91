//! quarry-importer: turn API description documents into quarry API sources
//!
//! Supported formats:
//! - OpenAPI 3.x (JSON or YAML)
//! - Swagger 2.0 (JSON or YAML)

pub mod error;
pub mod openapi;

use quarry::source::{ApiSource, ConfigMethod, DataSource, SourceKind};
use serde_json::Value;

pub use error::{ImportError, Result};
pub use openapi::{list_operations, load_document, validate, OperationInfo, ValidationReport};

use openapi::operation::{find_operation, map_parameters, parse_method};
use openapi::response::map_response;
use openapi::security::map_security;
use openapi::{document, SpecVersion};

/// One endpoint built from a description document
#[derive(Debug, Clone)]
pub struct ImportedEndpoint {
    pub title: String,
    pub description: Option<String>,
    pub operation: OperationInfo,
    pub api: ApiSource,
    /// Non-fatal findings from validation and mapping
    pub warnings: Vec<String>,
}

impl ImportedEndpoint {
    /// Wrap the endpoint as an untested source visible to `category_ids`.
    pub fn into_source(self, name: impl Into<String>, category_ids: Vec<String>) -> DataSource {
        let description = self
            .operation
            .summary
            .clone()
            .or(self.description)
            .unwrap_or(self.title);
        DataSource::new(name, category_ids, SourceKind::Api(self.api)).with_description(description)
    }
}

/// Validate a parsed document and build the endpoint for its selected operation.
pub fn parse_document(doc: &Value) -> Result<ImportedEndpoint> {
    let report = checked(doc)?;
    let selected = openapi::select_operation(doc).ok_or_else(|| ImportError::OperationNotFound {
        path: "*".to_string(),
        method: "GET|POST".to_string(),
    })?;
    build(doc, selected, report)
}

/// Validate a parsed document and build the endpoint for `method path`.
pub fn parse_operation(doc: &Value, path: &str, method: &str) -> Result<ImportedEndpoint> {
    let report = checked(doc)?;
    let http_method =
        parse_method(method).ok_or_else(|| ImportError::UnsupportedMethod(method.to_string()))?;
    let selected = list_operations(doc)
        .into_iter()
        .find(|op| op.path == path && op.method == http_method)
        .ok_or_else(|| ImportError::OperationNotFound {
            path: path.to_string(),
            method: http_method.to_string(),
        })?;
    build(doc, selected, report)
}

/// Load JSON or YAML text and import its selected operation.
pub fn import_str(text: &str) -> Result<ImportedEndpoint> {
    let doc = load_document(text)?;
    parse_document(&doc)
}

fn checked(doc: &Value) -> Result<ValidationReport> {
    let report = validate(doc);
    if !report.is_valid() {
        return Err(ImportError::Invalid(report));
    }
    Ok(report)
}

fn build(doc: &Value, selected: OperationInfo, report: ValidationReport) -> Result<ImportedEndpoint> {
    // Validation guarantees a version, a title and an absolute base URL
    let version = SpecVersion::detect(doc).unwrap_or(SpecVersion::OpenApi3);
    let base = document::base_url(doc).unwrap_or_default();
    url::Url::parse(&base)?;

    let (item, op) = find_operation(doc, &selected.path, selected.method).ok_or_else(|| {
        ImportError::OperationNotFound {
            path: selected.path.clone(),
            method: selected.method.to_string(),
        }
    })?;

    let mut warnings: Vec<String> = report
        .warnings
        .iter()
        .map(|w| format!("{} ({})", w.message, w.path))
        .collect();

    let mut api = ApiSource::new(format!("{}{}", base, selected.path));
    api.method = selected.method;
    api.config_method = ConfigMethod::Openapi;
    api.parameters = map_parameters(doc, version, item, op, &mut warnings);
    let response = map_response(doc, version, op, &mut warnings);
    api.response_structure = response.structure;
    api.response_format = response.format;
    api.sample_response = response.sample;
    api.auth = map_security(doc, version, op, &mut warnings);
    api.openapi_spec = Some(doc.clone());

    for warning in &warnings {
        tracing::warn!("{} {}: {}", selected.method, selected.path, warning);
    }
    tracing::debug!(
        "Imported {} {} with {} parameters",
        selected.method,
        selected.path,
        api.parameters.len()
    );

    Ok(ImportedEndpoint {
        title: document::title(doc).unwrap_or_default().to_string(),
        description: document::description(doc).map(str::to_string),
        operation: selected,
        api,
        warnings,
    })
}
