//! The one response shape every tool call produces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::visualization::VisualizationHint;
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub source: String,
    pub source_type: String,
    pub record_count: usize,
    pub total_records: u64,
    pub fields: Vec<String>,
    pub execution_time_ms: u64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_hint: Option<VisualizationHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn success(
        metadata: ResponseMetadata,
        data: Vec<Value>,
        visualization_hint: Option<VisualizationHint>,
    ) -> Self {
        Self {
            success: true,
            metadata: Some(metadata),
            data: Some(data),
            visualization_hint,
            error: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            metadata: None,
            data: None,
            visualization_hint: None,
            error: Some(ErrorBody {
                code: error.code().to_string(),
                message: error.to_string(),
                details: error.details(),
            }),
        }
    }

    /// Error code of a failed envelope
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "error": {"code": "QUERY_ERROR", "message": e.to_string()},
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_shape() {
        let envelope = ResponseEnvelope::failure(&Error::SourceNotFound {
            name: "x".to_string(),
            available: vec!["claims".to_string()],
        });
        let value = envelope.to_json();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "SOURCE_NOT_FOUND");
        assert_eq!(value["error"]["details"]["availableSources"], json!(["claims"]));
        assert!(value.get("metadata").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_success_shape_camel_case() {
        let envelope = ResponseEnvelope::success(
            ResponseMetadata {
                source: "claims".to_string(),
                source_type: "csv".to_string(),
                record_count: 1,
                total_records: 10,
                fields: vec!["a".to_string()],
                execution_time_ms: 3,
                cached: false,
                fetched_at: None,
            },
            vec![json!({"a": 1})],
            None,
        );
        let value = envelope.to_json();
        assert_eq!(value["metadata"]["sourceType"], "csv");
        assert_eq!(value["metadata"]["recordCount"], 1);
        assert_eq!(value["metadata"]["totalRecords"], 10);
        assert_eq!(value["metadata"]["executionTimeMs"], 3);
        assert!(value.get("visualizationHint").is_none());
        assert!(value.get("error").is_none());
    }
}
