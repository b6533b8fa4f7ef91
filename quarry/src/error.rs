use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required field: source_name")]
    MissingSourceName,

    #[error("No categories available for this request")]
    NoCategories,

    #[error("Data source not found: {name}")]
    SourceNotFound { name: String, available: Vec<String> },

    #[error("Access denied to data source: {0}")]
    AccessDenied(String),

    #[error("Data source is inactive: {0}")]
    SourceInactive(String),

    #[error("Stored file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("Invalid data path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error code carried in the failure envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MissingSourceName,
    NoCategories,
    SourceNotFound,
    AccessDenied,
    SourceInactive,
    FileNotFound,
    InvalidRequest,
    QueryError,
    AggregationError,
    Timeout,
    RequestError,
    Http(u16),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSourceName => write!(f, "MISSING_SOURCE_NAME"),
            Self::NoCategories => write!(f, "NO_CATEGORIES"),
            Self::SourceNotFound => write!(f, "SOURCE_NOT_FOUND"),
            Self::AccessDenied => write!(f, "ACCESS_DENIED"),
            Self::SourceInactive => write!(f, "SOURCE_INACTIVE"),
            Self::FileNotFound => write!(f, "FILE_NOT_FOUND"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::QueryError => write!(f, "QUERY_ERROR"),
            Self::AggregationError => write!(f, "AGGREGATION_ERROR"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::RequestError => write!(f, "REQUEST_ERROR"),
            Self::Http(status) => write!(f, "HTTP_{}", status),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingSourceName => ErrorCode::MissingSourceName,
            Self::NoCategories => ErrorCode::NoCategories,
            Self::SourceNotFound { .. } => ErrorCode::SourceNotFound,
            Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::SourceInactive(_) => ErrorCode::SourceInactive,
            Self::FileNotFound(_) => ErrorCode::FileNotFound,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Aggregation(_) => ErrorCode::AggregationError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Request(_) | Self::Credentials(_) => ErrorCode::RequestError,
            Self::Http { status, .. } => ErrorCode::Http(*status),
            Self::Query(_)
            | Self::InvalidPath { .. }
            | Self::Registry(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => ErrorCode::QueryError,
        }
    }

    /// Structured details for the failure envelope, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::SourceNotFound { available, .. } => Some(json!({
                "availableSources": available,
            })),
            Self::Http { status, body } => Some(json!({
                "status": status,
                "body": body,
            })),
            Self::InvalidPath { path, .. } => Some(json!({ "path": path })),
            _ => None,
        }
    }
}
