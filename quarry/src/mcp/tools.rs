//! MCP tool registry and the data source tools

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{QueryEngine, RequestContext, ResponseEnvelope};
use crate::{Error, Result};

/// Context passed to tool calls
pub struct ToolContext {
    pub engine: Arc<QueryEngine>,
    pub request: RequestContext,
}

#[async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (used in tools/call)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool. Domain failures come back as a failure envelope in
    /// `Ok`; `Err` is reserved for protocol-level problems.
    async fn call(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Registry of available MCP tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn McpTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// List all tools in MCP format, sorted by name
    pub fn list(&self) -> Vec<Value> {
        let mut tools: Vec<&Arc<dyn McpTool>> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema()
                })
            })
            .collect()
    }

    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::InvalidRequest(format!("Tool not found: {}", name)))?;

        tool.call(params, ctx).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Query one named data source
pub struct QueryDataSourceTool;

#[async_trait]
impl McpTool for QueryDataSourceTool {
    fn name(&self) -> &str {
        "query_data_source"
    }

    fn description(&self) -> &str {
        "Fetch, filter, sort, aggregate and visualize records from a named data source. \
         Use list_data_sources first to see which sources and fields are available."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source_name": {
                    "type": "string",
                    "description": "Name of the data source"
                },
                "parameters": {
                    "type": "object",
                    "description": "Request parameters for API sources"
                },
                "filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "field": {"type": "string"},
                            "operator": {
                                "type": "string",
                                "enum": ["eq", "ne", "gt", "lt", "gte", "lte", "contains", "in"]
                            },
                            "value": {}
                        },
                        "required": ["field", "operator", "value"]
                    }
                },
                "sort": {
                    "type": "object",
                    "properties": {
                        "field": {"type": "string"},
                        "direction": {"type": "string", "enum": ["asc", "desc"]}
                    },
                    "required": ["field"]
                },
                "limit": {
                    "type": "integer",
                    "description": "Max raw rows returned (ignored with aggregation)"
                },
                "offset": {
                    "type": "integer",
                    "default": 0
                },
                "aggregation": {
                    "type": "object",
                    "properties": {
                        "group_by": {
                            "oneOf": [
                                {"type": "string"},
                                {"type": "array", "items": {"type": "string"}}
                            ]
                        },
                        "metrics": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "field": {"type": "string"},
                                    "operation": {
                                        "type": "string",
                                        "enum": ["count", "sum", "avg", "min", "max"]
                                    }
                                },
                                "required": ["field", "operation"]
                            }
                        },
                        "pivot": {"type": "boolean", "default": false}
                    },
                    "required": ["group_by"]
                },
                "visualization": {
                    "type": "object",
                    "properties": {
                        "chart_type": {
                            "type": "string",
                            "enum": ["table", "bar", "stacked_bar", "line", "pie", "scatter", "radar"]
                        },
                        "x_field": {"type": "string"},
                        "y_field": {"type": "string"},
                        "group_by": {"type": "string"}
                    }
                },
                "category_ids": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            },
            "required": ["source_name"]
        })
    }

    async fn call(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let envelope = ctx.engine.execute(&params, &ctx.request).await;
        Ok(envelope.to_json())
    }
}

/// List the sources the caller may query
pub struct ListDataSourcesTool;

#[async_trait]
impl McpTool for ListDataSourcesTool {
    fn name(&self) -> &str {
        "list_data_sources"
    }

    fn description(&self) -> &str {
        "List the data sources available to you, with their fields and parameters"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn call(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        match ctx.engine.list_sources(&ctx.request).await {
            Ok(sources) => Ok(json!({
                "success": true,
                "sources": sources,
            })),
            Err(e) => Ok(ResponseEnvelope::failure(&e).to_json()),
        }
    }
}

/// Register the data source tools
pub fn register_data_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(QueryDataSourceTool));
    registry.register(Arc::new(ListDataSourcesTool));
}
