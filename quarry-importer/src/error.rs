use thiserror::Error;

use crate::openapi::validate::ValidationReport;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Document is neither valid JSON nor YAML: {0}")]
    Parse(String),

    #[error("Invalid API description: {0}")]
    Invalid(ValidationReport),

    #[error("Operation not found: {method} {path}")]
    OperationNotFound { path: String, method: String },

    #[error("Unsupported method '{0}', only GET and POST can be imported")]
    UnsupportedMethod(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImportError>;
