//! quarry: data source query and aggregation engine
//!
//! Lets an LLM tool-caller fetch, filter, aggregate and visualize data from
//! uploaded tabular files and described HTTP APIs through one contract:
//! - `tabular`: delimited-text parsing with column type inference
//! - `remote`: parameterized HTTP calls with auth, deadline and cache
//! - `query`: filter, sort, aggregation and pivot over in-memory rows
//! - `visualization`: chart recommendation from result shape
//! - `engine`: the tool entry point producing one response envelope

pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod query;
pub mod registry;
pub mod remote;
pub mod source;
pub mod tabular;
pub mod visualization;

pub use config::Config;
pub use engine::{QueryEngine, RequestContext, ResponseEnvelope};
pub use error::{Error, ErrorCode, Result};
pub use source::{DataSource, SourceKind};

/// One record: field name to JSON value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;
