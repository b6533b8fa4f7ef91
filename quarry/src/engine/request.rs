//! Tool invocation arguments

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::{AggregationConfig, Filter, SortSpec};
use crate::visualization::VisualizationRequest;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    #[serde(alias = "sourceName")]
    pub source_name: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub filters: Option<Vec<Filter>>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub visualization: Option<VisualizationRequest>,
    #[serde(default)]
    pub aggregation: Option<AggregationConfig>,
    #[serde(default, alias = "categoryIds")]
    pub category_ids: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Parse raw tool arguments.
    ///
    /// A missing or blank `source_name` is reported before any other shape
    /// problem.
    pub fn from_args(args: &Value) -> Result<Self> {
        let name = args
            .get("source_name")
            .or_else(|| args.get("sourceName"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if name.is_empty() {
            return Err(Error::MissingSourceName);
        }

        let mut request: QueryRequest = serde_json::from_value(args.clone())
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        request.source_name = name.to_string();
        Ok(request)
    }

    pub fn filters(&self) -> &[Filter] {
        self.filters.as_deref().unwrap_or(&[])
    }

    /// Explicit categories, ignoring an empty list
    pub fn explicit_categories(&self) -> Option<&[String]> {
        self.category_ids.as_deref().filter(|c| !c.is_empty())
    }
}
