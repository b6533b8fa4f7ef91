//! MCP (Model Context Protocol) tool surface
//!
//! - McpHandler: JSON-RPC 2.0 request handling
//! - ToolRegistry: the data source tools exposed to the LLM

pub mod handler;
pub mod tools;

pub use handler::{JsonRpcRequest, JsonRpcResponse, McpHandler};
pub use tools::{register_data_tools, ToolContext, ToolRegistry};
