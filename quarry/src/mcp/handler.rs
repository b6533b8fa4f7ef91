//! MCP JSON-RPC 2.0 handler

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::tools::{ToolContext, ToolRegistry};
use crate::engine::{QueryEngine, RequestContext};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }
}

/// MCP protocol handler
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
    engine: Arc<QueryEngine>,
}

impl McpHandler {
    pub fn new(tools: Arc<ToolRegistry>, engine: Arc<QueryEngine>) -> Self {
        Self { tools, engine }
    }

    /// Handle a JSON-RPC request under the transport's request context
    pub async fn handle(&self, req: JsonRpcRequest, ctx: RequestContext) -> JsonRpcResponse {
        if req.jsonrpc != "2.0" {
            return JsonRpcResponse::error(req.id, -32600, "Invalid JSON-RPC version");
        }
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id),
            "initialized" | "notifications/initialized" => JsonRpcResponse::success(req.id, json!({})),
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params, ctx).await,
            "ping" => JsonRpcResponse::success(req.id, json!({})),
            _ => {
                JsonRpcResponse::error(req.id, -32601, &format!("Method not found: {}", req.method))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "quarry",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.tools.list();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        mut request: RequestContext,
    ) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::error(id, -32602, "Missing params"),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, -32602, "Missing tool name"),
        };

        // _meta.category_ids replaces the transport's categories
        if let Some(categories) = params
            .pointer("/_meta/category_ids")
            .and_then(Value::as_array)
        {
            request.category_ids = categories
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let ctx = ToolContext {
            engine: self.engine.clone(),
            request,
        };

        match self.tools.call(name, arguments, &ctx).await {
            Ok(result) => {
                let is_error = result.get("success") == Some(&Value::Bool(false));
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{
                            "type": "text",
                            "text": serde_json::to_string_pretty(&result).unwrap_or_default()
                        }],
                        "structuredContent": result,
                        "isError": is_error
                    }),
                )
            }
            Err(e) => JsonRpcResponse::error(id, -32602, &e.to_string()),
        }
    }
}
