//! Data source records
//!
//! A source is either a described remote API or a stored tabular file. The
//! variant is carried in `sourceType` and dispatched exhaustively by the
//! engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::tabular::{ColumnInfo, ParseOptions};
use crate::Row;

/// Default deadline for remote calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default TTL for cached remote responses
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Lifecycle status of a source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    #[default]
    Untested,
    Active,
    Inactive,
    Error,
}

/// A named, category-scoped data source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// An empty list hides the source from the tool entirely
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: SourceStatus,
    #[serde(default)]
    pub last_tested: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Source variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sourceType", rename_all = "lowercase")]
pub enum SourceKind {
    Api(ApiSource),
    Csv(TabularSource),
}

impl SourceKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Api(_) => "api",
            Self::Csv(_) => "csv",
        }
    }
}

impl DataSource {
    pub fn new(name: impl Into<String>, category_ids: Vec<String>, kind: SourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            category_ids,
            created_by: None,
            created_at: now,
            updated_at: now,
            status: SourceStatus::Untested,
            last_tested: None,
            last_error: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether a caller holding `categories` may query this source.
    pub fn is_queryable_by(&self, categories: &[String]) -> bool {
        !self.category_ids.is_empty() && self.category_ids.iter().any(|c| categories.contains(c))
    }

    /// Declared field names, in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        match &self.kind {
            SourceKind::Api(api) => api
                .response_structure
                .fields
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            SourceKind::Csv(tab) => tab.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Csv,
}

/// How the endpoint configuration was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMethod {
    #[default]
    Manual,
    Openapi,
}

/// Remote API source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub auth: AuthDescriptor,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub response_structure: ResponseStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi_spec: Option<Value>,
    #[serde(default)]
    pub config_method: ConfigMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
}

impl ApiSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: HttpMethod::Get,
            response_format: ResponseFormat::Json,
            auth: AuthDescriptor::default(),
            headers: BTreeMap::new(),
            parameters: Vec::new(),
            response_structure: ResponseStructure::default(),
            sample_response: None,
            openapi_spec: None,
            config_method: ConfigMethod::Manual,
            timeout_secs: None,
            cache_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    #[default]
    Query,
    Path,
    Header,
    Body,
}

/// A declared endpoint parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default, alias = "in")]
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, location: ParamLocation) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::String,
            location,
            required: false,
            description: None,
            default: None,
            example: None,
            allowed_values: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Object,
    Array,
}

/// Shape of one record field, optionally nested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: None,
            children: Vec::new(),
        }
    }
}

/// Where the record collection lives in a response payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStructure {
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default = "default_true")]
    pub is_array: bool,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_path: Option<String>,
}

fn default_data_path() -> String {
    "$".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ResponseStructure {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            is_array: true,
            fields: Vec::new(),
            total_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Stored (encrypted) credential values
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthCredentials")
            .field("token", &redact(&self.token))
            .field("api_key", &redact(&self.api_key))
            .field("username", &redact(&self.username))
            .field("password", &redact(&self.password))
            .finish()
    }
}

/// Authentication descriptor for a remote source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthDescriptor {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub credentials: AuthCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_header: Option<String>,
    #[serde(default)]
    pub api_key_location: ApiKeyLocation,
}

/// Stored tabular file source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularSource {
    pub file_path: PathBuf,
    pub original_filename: String,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub sample_rows: Vec<Row>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub options: ParseOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<DateTime<Utc>>,
}
